//! Addressing of resources.
//!
//! A [`ResourceLocator`] is the pair of a URL prefix (everything up to and
//! including the mount point, always ending in `/`) and a decoded resource
//! path relative to it. The resource path never starts or ends with a
//! slash; the empty path is the root of the exposed tree.
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

// Encode all non-unreserved characters, except '/'.
// See RFC3986, and https://en.wikipedia.org/wiki/Percent-encoding .
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Reasons a locator cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// The prefix does not end in `/`.
    PrefixWithoutTrailingSlash(String),
    /// The resource path starts with `/`.
    LeadingSlash(String),
    /// Percent-decoding did not produce valid UTF-8.
    InvalidEncoding(String),
    /// The decoded path has a `.` or `..` segment.
    DotSegment(String),
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorError::PrefixWithoutTrailingSlash(p) => write!(f, "prefix must end with '/': {p}"),
            LocatorError::LeadingSlash(p) => write!(f, "resource path must not start with '/': {p}"),
            LocatorError::InvalidEncoding(p) => write!(f, "invalid percent-encoding: {p}"),
            LocatorError::DotSegment(p) => write!(f, "dot segment in path: {p}"),
        }
    }
}

impl std::error::Error for LocatorError {}

/// Identity of a resource: prefix plus resource path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocator {
    prefix: String,
    resource_path: String,
}

impl ResourceLocator {
    /// Build a locator. Trailing slashes of `resource_path` are dropped.
    pub fn new(
        prefix: impl Into<String>,
        resource_path: impl Into<String>,
    ) -> Result<ResourceLocator, LocatorError> {
        let prefix = prefix.into();
        let mut resource_path = resource_path.into();
        if !prefix.ends_with('/') {
            return Err(LocatorError::PrefixWithoutTrailingSlash(prefix));
        }
        if resource_path.starts_with('/') {
            return Err(LocatorError::LeadingSlash(resource_path));
        }
        while resource_path.ends_with('/') {
            resource_path.pop();
        }
        Ok(ResourceLocator {
            prefix,
            resource_path,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Decoded path relative to the prefix.
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn is_root(&self) -> bool {
        self.resource_path.is_empty()
    }

    /// Last path segment, empty for the root.
    pub fn name(&self) -> &str {
        match self.resource_path.rsplit_once('/') {
            Some((_, name)) => name,
            None => &self.resource_path,
        }
    }

    /// The locator of the parent. `None` for the root.
    pub fn resolve_parent(&self) -> Option<ResourceLocator> {
        if self.is_root() {
            return None;
        }
        let parent = match self.resource_path.rsplit_once('/') {
            Some((parent, _)) => parent,
            None => "",
        };
        Some(ResourceLocator {
            prefix: self.prefix.clone(),
            resource_path: parent.to_string(),
        })
    }

    /// The locator of a direct child named `name`.
    pub fn resolve_child(&self, name: &str) -> ResourceLocator {
        let resource_path = if self.is_root() {
            name.to_string()
        } else {
            format!("{}/{}", self.resource_path, name)
        };
        ResourceLocator {
            prefix: self.prefix.clone(),
            resource_path,
        }
    }

    /// True if `self` is `other` or lives below it.
    pub fn is_within(&self, other: &ResourceLocator) -> bool {
        other.is_root()
            || self.resource_path == other.resource_path
            || self
                .resource_path
                .strip_prefix(&other.resource_path)
                .map(|rest| rest.starts_with('/'))
                .unwrap_or(false)
    }

    /// Percent-encoded href. Collections get a trailing slash.
    pub fn href(&self, collection: bool) -> String {
        let mut href = self.prefix.clone();
        href.extend(utf8_percent_encode(&self.resource_path, PATH_ENCODE_SET));
        if collection && !self.is_root() {
            href.push('/');
        }
        href
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.resource_path)
    }
}

/// Turns hrefs from requests into locators.
#[derive(Debug, Clone, Default)]
pub struct LocatorFactory;

impl LocatorFactory {
    /// Create a locator from a prefix and an (encoded) href.
    ///
    /// A missing trailing slash on the prefix is added. The prefix is
    /// stripped from the href if present, the remainder is percent-decoded
    /// and one leading slash is removed. Paths with `.` or `..` segments
    /// (encoded or not) are refused, so that the locator always names the
    /// file that is acted on.
    pub fn create_locator(&self, prefix: &str, href: &str) -> Result<ResourceLocator, LocatorError> {
        let prefix = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        let rest = match href.strip_prefix(prefix.as_str()) {
            Some(rest) => rest,
            // the mount point itself, without the slash.
            None if href == &prefix[..prefix.len() - 1] => "",
            None => href,
        };
        let decoded = percent_decode_str(rest)
            .decode_utf8()
            .map_err(|_| LocatorError::InvalidEncoding(rest.to_string()))?;
        let path: &str = &decoded;
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(LocatorError::DotSegment(path.to_string()));
        }
        ResourceLocator::new(prefix.clone(), path)
    }
}
