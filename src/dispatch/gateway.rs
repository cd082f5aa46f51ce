//! Gateway-level dispatch: `forward:` paths re-enter the route table.
//!
//! # Design Decisions
//! - Forwarded requests are matched against the live route table, with the
//!   original Host header
//! - Forwarded requests bypass breaker filters; a fallback never trips a breaker
//! - Holds only a weak handle on the table, which in turn owns the filters
//!   that own this dispatcher

use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use axum::body::{Body, Bytes};
use axum::http::{header, Request, Response, Uri};
use futures_util::future::{BoxFuture, FutureExt};

use crate::dispatch::{Destination, DispatchError, Dispatcher, HttpDispatcher};
use crate::routing::matcher::RequestHead;
use crate::routing::Router;

pub struct GatewayDispatcher {
    http: HttpDispatcher,
    routes: Weak<ArcSwap<Router>>,
}

impl GatewayDispatcher {
    pub fn new(http: HttpDispatcher, routes: &Arc<ArcSwap<Router>>) -> Self {
        Self {
            http,
            routes: Arc::downgrade(routes),
        }
    }

    async fn forward(&self, mut request: Request<Bytes>, target: &str) -> Result<Response<Body>, DispatchError> {
        let routes = self
            .routes
            .upgrade()
            .ok_or_else(|| DispatchError::NoRoute(target.to_string()))?;
        let routes = routes.load_full();

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, request.uri().query()),
        };

        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| request.uri().host());
        let route = routes
            .match_head(&RequestHead::new(host, path))
            .ok_or_else(|| DispatchError::NoRoute(target.to_string()))?;

        let origin = match &route.destination {
            Destination::Http(origin) => origin.clone(),
            Destination::Forward(_) => {
                return Err(DispatchError::InvalidTarget(format!(
                    "route `{}` cannot be the target of a forward",
                    route.name
                )))
            }
        };

        let rewritten = match query {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };
        *request.uri_mut() = rewritten
            .parse::<Uri>()
            .map_err(|e| DispatchError::InvalidTarget(e.to_string()))?;

        tracing::debug!(
            forward = %target,
            route = %route.name,
            origin = %origin,
            "Forwarding to gateway route"
        );
        self.http.send(request, &origin).await
    }
}

impl Dispatcher for GatewayDispatcher {
    fn dispatch<'a>(
        &'a self,
        request: Request<Bytes>,
        destination: &'a Destination,
    ) -> BoxFuture<'a, Result<Response<Body>, DispatchError>> {
        async move {
            match destination {
                Destination::Forward(path) => self.forward(request, path).await,
                Destination::Http(origin) => self.http.send(request, origin).await,
            }
        }
        .boxed()
    }
}
