//! Upstream HTTP forwarding.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, Response, Uri, Version};
use futures_util::future::{BoxFuture, FutureExt};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::TimeoutConfig;
use crate::dispatch::{Destination, DispatchError, Dispatcher};
use crate::http::response::strip_hop_by_hop;

/// Forwards buffered requests to `http://` origins over a pooled hyper client.
#[derive(Clone)]
pub struct HttpDispatcher {
    client: Client<HttpConnector, Body>,
}

impl HttpDispatcher {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        Self { client }
    }

    /// Send `request` to `origin`, keeping the request path unless the origin has one.
    pub async fn send(
        &self,
        request: Request<Bytes>,
        origin: &Url,
    ) -> Result<Response<Body>, DispatchError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = target_uri(origin, &parts.uri)?;
        parts.version = Version::HTTP_11;
        parts.headers.remove(header::HOST);
        strip_hop_by_hop(&mut parts.headers);

        tracing::trace!(uri = %parts.uri, method = %parts.method, "Forwarding upstream");

        let upstream = Request::from_parts(parts, Body::from(body));
        let response = self
            .client
            .request(upstream)
            .await
            .map_err(|e| DispatchError::Transport(Box::new(e)))?;

        let mut response = response.map(Body::new);
        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }
}

impl Dispatcher for HttpDispatcher {
    fn dispatch<'a>(
        &'a self,
        request: Request<Bytes>,
        destination: &'a Destination,
    ) -> BoxFuture<'a, Result<Response<Body>, DispatchError>> {
        async move {
            match destination {
                Destination::Http(origin) => self.send(request, origin).await,
                Destination::Forward(path) => Err(DispatchError::NoRoute(path.clone())),
            }
        }
        .boxed()
    }
}

/// Combine an origin with the path and query of the incoming request.
fn target_uri(origin: &Url, original: &Uri) -> Result<Uri, DispatchError> {
    let mut url = origin.clone();
    if origin.path().is_empty() || origin.path() == "/" {
        url.set_path(original.path());
    }
    url.set_query(original.query());

    url.as_str()
        .parse::<Uri>()
        .map_err(|e| DispatchError::InvalidTarget(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_keeps_request_path() {
        let origin = Url::parse("http://127.0.0.1:3000").unwrap();
        let uri: Uri = "/api/items?page=2".parse().unwrap();
        assert_eq!(
            target_uri(&origin, &uri).unwrap(),
            "http://127.0.0.1:3000/api/items?page=2"
        );
    }

    #[test]
    fn test_target_uses_origin_path() {
        let origin = Url::parse("http://127.0.0.1:3000/static/fallback").unwrap();
        let uri: Uri = "/api/items".parse().unwrap();
        assert_eq!(
            target_uri(&origin, &uri).unwrap(),
            "http://127.0.0.1:3000/static/fallback"
        );
    }
}
