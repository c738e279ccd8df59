use std::time::Duration;

use headers::Header;
use http::header::{HeaderName, HeaderValue};

lazy_static! {
    static ref DEPTH: HeaderName = HeaderName::from_static("depth");
    static ref DESTINATION: HeaderName = HeaderName::from_static("destination");
    static ref IF: HeaderName = HeaderName::from_static("if");
    static ref LOCK_TOKEN: HeaderName = HeaderName::from_static("lock-token");
    static ref OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
    static ref TIMEOUT: HeaderName = HeaderName::from_static("timeout");
    static ref X_EXPECTED_ENTITY_LENGTH: HeaderName =
        HeaderName::from_static("x-expected-entity-length");
}

// helper: the single value of a header as a string.
fn one<'i, I>(values: &mut I) -> Result<&'i str, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(headers::Error::invalid)?;
    if values.next().is_some() {
        return Err(headers::Error::invalid());
    }
    v.to_str().map(str::trim).map_err(|_| headers::Error::invalid())
}

fn encode_str<E: Extend<HeaderValue>>(values: &mut E, s: &str) {
    if let Ok(v) = HeaderValue::from_str(s) {
        values.extend(std::iter::once(v));
    }
}

/// Depth: header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Depth {
    Zero,
    One,
    Infinity,
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)? {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            s if s.eq_ignore_ascii_case("infinity") => Ok(Depth::Infinity),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let value = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// Destination: header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        // clients send raw UTF-8 here, which to_str() rejects.
        let v = values.next().ok_or_else(headers::Error::invalid)?;
        if values.next().is_some() {
            return Err(headers::Error::invalid());
        }
        let s = std::str::from_utf8(v.as_bytes())
            .map_err(|_| headers::Error::invalid())?
            .trim();
        if s.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(Destination(s.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        encode_str(values, &self.0);
    }
}

/// Overwrite: header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)? {
            "F" | "f" => Ok(Overwrite(false)),
            "T" | "t" => Ok(Overwrite(true)),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let value = if self.0 { "T" } else { "F" };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// Lock-Token: header. The angle brackets are not part of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LockToken(pub String);

impl Header for LockToken {
    fn name() -> &'static HeaderName {
        &LOCK_TOKEN
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?;
        let token = s
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .ok_or_else(headers::Error::invalid)?;
        Ok(LockToken(token.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        encode_str(values, &format!("<{}>", self.0));
    }
}

/// Timeout: header. The first value we understand wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timeout {
    Seconds(u64),
    Infinite,
}

impl Timeout {
    pub(crate) fn duration(&self) -> Option<Duration> {
        match *self {
            Timeout::Seconds(n) => Some(Duration::from_secs(n)),
            Timeout::Infinite => None,
        }
    }
}

impl Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        for value in values {
            let value = value.to_str().map_err(|_| headers::Error::invalid())?;
            for word in value.split(',').map(str::trim) {
                if word.eq_ignore_ascii_case("infinite") {
                    return Ok(Timeout::Infinite);
                }
                let secs = word
                    .get(..7)
                    .filter(|p| p.eq_ignore_ascii_case("second-"))
                    .and_then(|_| word[7..].parse().ok());
                if let Some(secs) = secs {
                    return Ok(Timeout::Seconds(secs));
                }
            }
        }
        Err(headers::Error::invalid())
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        match *self {
            Timeout::Seconds(n) => encode_str(values, &format!("Second-{n}")),
            Timeout::Infinite => values.extend(std::iter::once(HeaderValue::from_static("Infinite"))),
        }
    }
}

/// X-Expected-Entity-Length: header, sent by the macOS WebDAV client
/// instead of a Content-Length on chunked uploads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct XExpectedEntityLength(pub u64);

impl Header for XExpectedEntityLength {
    fn name() -> &'static HeaderName {
        &X_EXPECTED_ENTITY_LENGTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        one(values)?
            .parse()
            .map(XExpectedEntityLength)
            .map_err(|_| headers::Error::invalid())
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        encode_str(values, &self.0.to_string());
    }
}

/// One condition of an If: header list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IfItem {
    StateToken(String),
    ETag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IfCondition {
    pub not: bool,
    pub item: IfItem,
}

/// A parenthesized list, optionally tagged with the resource it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IfList {
    pub resource_tag: Option<String>,
    pub conditions: Vec<IfCondition>,
}

/// If: header (RFC 4918, section 10.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct If(pub Vec<IfList>);

impl If {
    pub(crate) fn parse(value: &str) -> Option<If> {
        let mut lists = Vec::new();
        let mut tag = None;
        let mut rest = value.trim_start();
        while !rest.is_empty() {
            if let Some(r) = rest.strip_prefix('<') {
                let end = r.find('>')?;
                tag = Some(r[..end].to_string());
                rest = r[end + 1..].trim_start();
                if !rest.starts_with('(') {
                    return None;
                }
            } else if let Some(r) = rest.strip_prefix('(') {
                let (conditions, r) = parse_list(r)?;
                lists.push(IfList {
                    resource_tag: tag.clone(),
                    conditions,
                });
                rest = r.trim_start();
            } else {
                return None;
            }
        }
        if lists.is_empty() {
            None
        } else {
            Some(If(lists))
        }
    }

    /// All state tokens, either the positive or the negated ones.
    pub(crate) fn tokens(&self, negated: bool) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .flat_map(|l| l.conditions.iter())
            .filter(move |c| c.not == negated)
            .filter_map(|c| match &c.item {
                IfItem::StateToken(t) => Some(t.as_str()),
                IfItem::ETag(_) => None,
            })
    }
}

// parse the inside of a list, up to and including the closing ')'.
fn parse_list(mut s: &str) -> Option<(Vec<IfCondition>, &str)> {
    let mut conditions = Vec::new();
    loop {
        s = s.trim_start();
        let not = s.get(..3).map(|w| w.eq_ignore_ascii_case("not")).unwrap_or(false);
        if not {
            s = s[3..].trim_start();
        }
        if let Some(r) = s.strip_prefix('<') {
            let end = r.find('>')?;
            conditions.push(IfCondition {
                not,
                item: IfItem::StateToken(r[..end].to_string()),
            });
            s = &r[end + 1..];
        } else if let Some(r) = s.strip_prefix('[') {
            let end = r.find(']')?;
            conditions.push(IfCondition {
                not,
                item: IfItem::ETag(r[..end].to_string()),
            });
            s = &r[end + 1..];
        } else if let Some(r) = s.strip_prefix(')') {
            if not || conditions.is_empty() {
                return None;
            }
            return Some((conditions, r));
        } else {
            return None;
        }
    }
}

impl Header for If {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let mut lists = Vec::new();
        for value in values {
            let value = value.to_str().map_err(|_| headers::Error::invalid())?;
            let If(l) = If::parse(value).ok_or_else(headers::Error::invalid)?;
            lists.extend(l);
        }
        if lists.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(If(lists))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let mut s = String::new();
        for list in &self.0 {
            if let Some(tag) = &list.resource_tag {
                s.push_str(&format!("<{tag}> "));
            }
            s.push('(');
            let conds: Vec<String> = list
                .conditions
                .iter()
                .map(|c| {
                    let item = match &c.item {
                        IfItem::StateToken(t) => format!("<{t}>"),
                        IfItem::ETag(e) => format!("[{e}]"),
                    };
                    if c.not {
                        format!("Not {item}")
                    } else {
                        item
                    }
                })
                .collect();
            s.push_str(&conds.join(" "));
            s.push_str(") ");
        }
        encode_str(values, s.trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_untagged() {
        let h = If::parse("(<opaquelocktoken:a> [\"etag\"]) (Not <DAV:no-lock>)").unwrap();
        assert_eq!(h.0.len(), 2);
        assert_eq!(
            h.0[0].conditions,
            vec![
                IfCondition {
                    not: false,
                    item: IfItem::StateToken("opaquelocktoken:a".into())
                },
                IfCondition {
                    not: false,
                    item: IfItem::ETag("\"etag\"".into())
                },
            ]
        );
        assert!(h.0[1].conditions[0].not);
        assert_eq!(h.tokens(false).collect::<Vec<_>>(), vec!["opaquelocktoken:a"]);
        assert_eq!(h.tokens(true).collect::<Vec<_>>(), vec!["DAV:no-lock"]);
    }

    #[test]
    fn if_tagged() {
        let h = If::parse("<http://x/a> (<t1>) <http://x/b> (<t2>) (<t3>)").unwrap();
        let tags: Vec<_> = h.0.iter().map(|l| l.resource_tag.as_deref()).collect();
        assert_eq!(tags, vec![Some("http://x/a"), Some("http://x/b"), Some("http://x/b")]);
    }

    #[test]
    fn if_malformed() {
        for s in ["", "()", "(<a>", "<http://x/a>", "(Not)", "(foo)", "(<a>) junk"] {
            assert!(If::parse(s).is_none(), "{s}");
        }
    }

    #[test]
    fn timeout_picks_first_known() {
        let v = HeaderValue::from_static("Extended, Second-4100000000");
        let t = Timeout::decode(&mut std::iter::once(&v)).unwrap();
        assert_eq!(t, Timeout::Seconds(4100000000));
        let v = HeaderValue::from_static("Infinite, Second-10");
        assert_eq!(Timeout::decode(&mut std::iter::once(&v)).unwrap(), Timeout::Infinite);
    }

    #[test]
    fn expected_entity_length() {
        let v = HeaderValue::from_static("NaN");
        assert!(XExpectedEntityLength::decode(&mut std::iter::once(&v)).is_err());
        let v = HeaderValue::from_static(" 42 ");
        assert_eq!(
            XExpectedEntityLength::decode(&mut std::iter::once(&v)).unwrap(),
            XExpectedEntityLength(42)
        );
    }
}
