//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Buffered request + Destination
//!     → gateway.rs (forward:/path → re-enter route table)
//!     → http.rs (http://origin → hyper client)
//!     → Response or DispatchError
//! ```
//!
//! # Design Decisions
//! - Dispatch is a trait so the breaker filter can be exercised without sockets
//! - Requests are buffered (`Request<Bytes>`) so they can be replayed against a fallback
//! - Dispatch errors are values; the filter decides what they mean

pub mod gateway;
pub mod http;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use thiserror::Error;
use url::Url;

pub use gateway::GatewayDispatcher;
pub use http::HttpDispatcher;

const FORWARD_SCHEME: &str = "forward:";

/// Where a request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `forward:/path`: handled by the gateway's own route table.
    Forward(String),
    /// `http://host[:port][/path]`: forwarded to that origin.
    Http(Url),
}

impl Destination {
    pub fn is_forward(&self) -> bool {
        matches!(self, Destination::Forward(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationError {
    #[error("forward destination `{0}` must be an absolute path")]
    RelativeForward(String),

    #[error("invalid destination url `{value}`: {reason}")]
    InvalidUrl { value: String, reason: String },

    #[error("unsupported destination scheme `{0}` (expected http or forward)")]
    UnsupportedScheme(String),
}

impl FromStr for Destination {
    type Err = DestinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix(FORWARD_SCHEME) {
            if !path.starts_with('/') {
                return Err(DestinationError::RelativeForward(s.to_string()));
            }
            return Ok(Destination::Forward(path.to_string()));
        }

        let url = Url::parse(s).map_err(|e| DestinationError::InvalidUrl {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" if url.host().is_some() => Ok(Destination::Http(url)),
            "http" => Err(DestinationError::InvalidUrl {
                value: s.to_string(),
                reason: "missing host".to_string(),
            }),
            other => Err(DestinationError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Forward(path) => write!(f, "{FORWARD_SCHEME}{path}"),
            Destination::Http(url) => write!(f, "{url}"),
        }
    }
}

/// Errors produced while dispatching a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("upstream transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("upstream call exceeded {0:?}")]
    Timeout(Duration),

    #[error("no route matches forward path `{0}`")]
    NoRoute(String),

    #[error("cannot build upstream request: {0}")]
    InvalidTarget(String),
}

/// The routing/dispatch collaborator.
pub trait Dispatcher: Send + Sync {
    fn dispatch<'a>(
        &'a self,
        request: Request<Bytes>,
        destination: &'a Destination,
    ) -> BoxFuture<'a, Result<Response<Body>, DispatchError>>;
}

/// Rebuild a buffered request so it can be sent twice.
///
/// Extensions are not carried over.
pub fn clone_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut clone = Request::new(request.body().clone());
    *clone.method_mut() = request.method().clone();
    *clone.uri_mut() = request.uri().clone();
    *clone.version_mut() = request.version();
    *clone.headers_mut() = request.headers().clone();
    clone
}
