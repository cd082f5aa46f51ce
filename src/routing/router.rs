//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request or a `forward:` path
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks); reloads swap a new table in
//! - Ordered by priority, then by prefix length, so the most specific route wins ties
//! - O(n) scan (acceptable for typical route counts)

use std::sync::Arc;

use axum::http::Request;

use crate::dispatch::Destination;
use crate::resilience::filter::{BreakerBinding, CircuitBreakerFilter, FilterContext};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher, RequestHead};

/// A validated route, ready to be compiled.
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub name: String,
    pub host: Option<String>,
    pub path_prefix: Option<String>,
    pub priority: u32,
    pub destination: Destination,
    pub breaker: Option<BreakerBinding>,
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub priority: u32,
    pub destination: Destination,
    pub breaker: Option<Arc<CircuitBreakerFilter>>,
    matcher: AndMatcher,
    prefix_len: usize,
}

impl Route {
    fn compile(spec: RouteSpec, filters: &FilterContext) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = spec.host {
            matchers.push(Box::new(HostMatcher::new(host)));
        }
        let prefix_len = spec.path_prefix.as_ref().map_or(0, String::len);
        if let Some(prefix) = spec.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
        }

        Self {
            name: spec.name,
            priority: spec.priority,
            destination: spec.destination,
            breaker: spec.breaker.map(|binding| Arc::new(filters.build(binding))),
            matcher: AndMatcher::new(matchers),
            prefix_len,
        }
    }

    pub fn matches(&self, head: &RequestHead<'_>) -> bool {
        self.matcher.matches(head)
    }
}

/// Ordered route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(specs: Vec<RouteSpec>, filters: &FilterContext) -> Self {
        let mut routes: Vec<Route> = specs
            .into_iter()
            .map(|spec| Route::compile(spec, filters))
            .collect();
        // Stable sort keeps declaration order among equals.
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.prefix_len.cmp(&a.prefix_len))
        });
        Self { routes }
    }

    pub fn match_head(&self, head: &RequestHead<'_>) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(head))
    }

    pub fn match_request<B>(&self, request: &Request<B>) -> Option<&Route> {
        self.match_head(&RequestHead::from_request(request))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
