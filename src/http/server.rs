//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handler
//! - Wire up middleware (timeout, tracing, request ID)
//! - Buffer request bodies so guarded calls can be replayed to a fallback
//! - Dispatch matched requests, through the route's breaker when it has one
//! - Swap in new route tables on config reload
//! - Graceful shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, Response, StatusCode},
    routing::any,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{compile_routes, validate_config, GatewayConfig, ValidationError};
use crate::dispatch::{Dispatcher, GatewayDispatcher, HttpDispatcher};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response::gateway_error;
use crate::observability::metrics;
use crate::resilience::{BreakerConfig, BreakerRegistry, FallbackReason, FilterContext};
use crate::routing::{RouteSpec, Router};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<Router>>,
    pub registry: Arc<BreakerRegistry>,
    pub dispatcher: Arc<GatewayDispatcher>,
    pub max_body_size: usize,
    pub slow_call_threshold: Duration,
    pub admin_api_key: Arc<str>,
    pub started_at: Instant,
}

impl AppState {
    /// Build state with an empty route table; call [`AppState::install_routes`] next.
    pub fn new(config: &GatewayConfig) -> Self {
        let routes = Arc::new(ArcSwap::from_pointee(Router::empty()));
        let dispatcher = Arc::new(GatewayDispatcher::new(
            HttpDispatcher::new(&config.timeouts),
            &routes,
        ));
        let registry = Arc::new(BreakerRegistry::with_capacity_limit(
            BreakerConfig::from(&config.circuit_breaker),
            config.circuit_breaker.max_breakers,
        ));

        Self {
            routes,
            registry,
            dispatcher,
            max_body_size: config.security.max_body_size,
            slow_call_threshold: Duration::from_millis(config.circuit_breaker.slow_call_threshold_ms),
            admin_api_key: Arc::from(config.admin.api_key.as_str()),
            started_at: Instant::now(),
        }
    }

    fn filter_context(&self) -> FilterContext {
        FilterContext {
            registry: Arc::clone(&self.registry),
            dispatcher: self.dispatcher.clone(),
            slow_call_threshold: self.slow_call_threshold,
        }
    }

    /// Compile `specs` and atomically replace the live route table.
    pub fn install_routes(&self, specs: Vec<RouteSpec>) {
        let router = Router::new(specs, &self.filter_context());
        let count = router.len();
        self.routes.store(Arc::new(router));
        tracing::info!(routes = count, "Route table installed");
    }

    /// Apply the routes of a reloaded config. Breakers and their defaults are kept.
    pub fn apply_config(&self, config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
        let specs = compile_routes(&config.routes)?;
        self.install_routes(specs);
        Ok(())
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: axum::Router,
    state: AppState,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server, rejecting an invalid configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, Vec<ValidationError>> {
        validate_config(&config)?;
        let specs = compile_routes(&config.routes)?;

        let state = AppState::new(&config);
        state.install_routes(specs);

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> axum::Router {
        axum::Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Shared state, for the admin API.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` replace the route table.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reloader = config_updates.map(|mut updates| {
            let state = self.state.clone();
            tokio::spawn(async move {
                while let Some(config) = updates.recv().await {
                    if let Err(errors) = state.apply_config(&config) {
                        for error in &errors {
                            tracing::error!(error = %error, "Rejected reloaded route");
                        }
                    }
                }
            })
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        if let Some(task) = reloader {
            task.abort();
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main gateway handler.
/// Matches a route, buffers the body and forwards the request.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let request_id = request.request_id().unwrap_or("unknown").to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Routing request"
    );

    let routes = state.routes.load_full();
    let Some(route) = routes.match_request(&request) else {
        tracing::warn!(request_id = %request_id, path = %path, "No route matched");
        metrics::record_request("none", method.as_str(), 404, start);
        return gateway_error(StatusCode::NOT_FOUND, "No matching route found");
    };

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejected request body");
            metrics::record_request(&route.name, method.as_str(), 413, start);
            return gateway_error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
    };
    let request = Request::from_parts(parts, body);

    let response = match &route.breaker {
        Some(filter) => match filter.handle(request, &route.destination).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = %request_id, route = %route.name, error = %e, "Breaker unavailable");
                gateway_error(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
        },
        None => match state.dispatcher.dispatch(request, &route.destination).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = %request_id, route = %route.name, error = %e, "Upstream error");
                gateway_error(StatusCode::BAD_GATEWAY, "Upstream request failed")
            }
        },
    };

    if let Some(reason) = response.extensions().get::<FallbackReason>() {
        tracing::info!(
            request_id = %request_id,
            route = %route.name,
            reason = reason.as_str(),
            "Served by fallback"
        );
    }
    metrics::record_request(&route.name, method.as_str(), response.status().as_u16(), start);
    response
}
