//! Route matching logic.
//!
//! # Responsibilities
//! - Match host (exact match, case-insensitive, port ignored)
//! - Match path prefix (case-sensitive, segment aware)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Matchers see a `RequestHead`, not a full request, so `forward:` paths can be
//!   matched without building one
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::{header, Request};

/// The parts of a request that routing looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
}

impl<'a> RequestHead<'a> {
    pub fn new(host: Option<&'a str>, path: &'a str) -> Self {
        Self { host, path }
    }

    /// Host header (falling back to the URI authority) and path of `req`.
    pub fn from_request<B>(req: &'a Request<B>) -> Self {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| req.uri().host());
        Self {
            host,
            path: req.uri().path(),
        }
    }
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, head: &RequestHead<'_>) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, head: &RequestHead<'_>) -> bool {
        head.host
            .map(strip_port)
            .is_some_and(|h| h.eq_ignore_ascii_case(&self.expected_host))
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        // Leave bracketed IPv6 literals without a port alone.
        Some((name, port)) if !port.contains(']') => name,
        _ => host,
    }
}

/// Matches the request path prefix on segment boundaries.
///
/// `/api` matches `/api` and `/api/v1`, not `/apix`.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, head: &RequestHead<'_>) -> bool {
        let Some(rest) = head.path.strip_prefix(&self.prefix) else {
            return false;
        };
        self.prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/')
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, head: &RequestHead<'_>) -> bool {
        self.matchers.iter().all(|m| m.matches(head))
    }
}
