//! Evaluation of the `If:` header.
//!
//! Only the pure parts live here. Looking up the state of a resource
//! (its entity tag and the locks on it) is up to the handler.
use crate::davheaders::{If, IfItem, IfList};

pub(crate) const NO_LOCK: &str = "DAV:no-lock";

/// State of one resource as far as the If: header is concerned.
#[derive(Debug, Clone, Default)]
pub(crate) struct IfState {
    /// Quoted entity tag, `None` if the resource does not exist.
    pub etag: Option<String>,
    pub lock_tokens: Vec<String>,
}

/// Shortcut for `DAV:no-lock`.
///
/// If every positive state token is `DAV:no-lock` the header can never
/// match. If `DAV:no-lock` is negated somewhere, it always matches.
/// Otherwise the header has to be evaluated properly.
pub(crate) fn no_lock_override(ifh: &If) -> Option<bool> {
    let mut positive = ifh.tokens(false).peekable();
    if positive.peek().is_some() && positive.all(|t| t == NO_LOCK) {
        return Some(false);
    }
    if ifh.tokens(true).any(|t| t == NO_LOCK) {
        return Some(true);
    }
    None
}

// compare entity tags, ignoring weakness and quoting.
fn etag_eq(a: &str, b: &str) -> bool {
    fn bare(s: &str) -> &str {
        let s = s.trim();
        let s = s.strip_prefix("W/").unwrap_or(s);
        s.trim_matches('"')
    }
    bare(a) == bare(b)
}

/// Does every condition of `list` hold for `state`.
pub(crate) fn list_matches(list: &IfList, state: &IfState) -> bool {
    list.conditions.iter().all(|c| {
        let holds = match &c.item {
            IfItem::StateToken(t) => state.lock_tokens.iter().any(|l| l == t),
            IfItem::ETag(e) => state.etag.as_deref().map(|x| etag_eq(x, e)).unwrap_or(false),
        };
        holds != c.not
    })
}
