use headers::HeaderMapExt;
use http::Request;

use crate::davheaders;

/// Per-request state that is shared by all resources of one request.
///
/// Holds the lock tokens the client presented, either in the `If:`
/// header or in the `Lock-Token:` header.
#[derive(Debug, Clone, Default)]
pub(crate) struct DavSession {
    lock_tokens: Vec<String>,
}

impl DavSession {
    pub(crate) fn from_request(req: &Request<()>) -> DavSession {
        let mut lock_tokens = Vec::new();
        if let Some(ifh) = req.headers().typed_get::<davheaders::If>() {
            lock_tokens.extend(ifh.tokens(false).map(str::to_string));
        }
        if let Some(davheaders::LockToken(token)) = req.headers().typed_get() {
            lock_tokens.push(token);
        }
        DavSession { lock_tokens }
    }

    pub(crate) fn lock_tokens(&self) -> &[String] {
        &self.lock_tokens
    }

    pub(crate) fn has_token(&self, token: &str) -> bool {
        self.lock_tokens.iter().any(|t| t == token)
    }
}
