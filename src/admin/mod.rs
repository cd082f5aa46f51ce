//! Admin API.
//!
//! # Endpoints
//! - `GET  /admin/status`
//! - `GET  /admin/breakers`
//! - `GET  /admin/breakers/{name}`
//! - `POST /admin/breakers/{name}/customize`
//! - `POST /admin/breakers/{name}/reset`
//!
//! Every endpoint requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(list_breakers))
        .route("/admin/breakers/{name}", get(get_breaker))
        .route("/admin/breakers/{name}/customize", post(customize_breaker))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::resilience::shortcut::parse_shortcut;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn state() -> AppState {
        let mut config = GatewayConfig::default();
        config.admin.api_key = KEY.to_string();
        AppState::new(&config)
    }

    fn request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {KEY}"));
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let app = setup_admin_router(state());
        let response = app
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let app = setup_admin_router(state());
        let response = app
            .oneshot(
                Request::get("/admin/status")
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status_and_listing() {
        let state = state();
        state
            .registry
            .get_or_create(&parse_shortcut("ordersCb,forward:/fallback,500").unwrap())
            .unwrap();
        let app = setup_admin_router(state);

        let status = json(app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap()).await;
        assert_eq!(status["status"], "operational");
        assert_eq!(status["breakers"], 1);

        let list = json(app.clone().oneshot(request("GET", "/admin/breakers", None)).await.unwrap()).await;
        assert_eq!(list[0]["name"], "ordersCb");
        assert_eq!(list[0]["state"], "CLOSED");

        let missing = app.oneshot(request("GET", "/admin/breakers/nope", None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_customize_live_and_pending() {
        let state = state();
        state
            .registry
            .get_or_create(&parse_shortcut("ordersCb,forward:/fallback").unwrap())
            .unwrap();
        let app = setup_admin_router(state.clone());

        let live = app
            .clone()
            .oneshot(request(
                "POST",
                "/admin/breakers/ordersCb/customize",
                Some(r#"{"failure_rate_threshold": 25, "wait_duration_open": "5s"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(live.status(), StatusCode::OK);
        let config = state.registry.get("ordersCb").unwrap().config();
        assert_eq!(config.failure_rate_threshold, 25.0);
        assert_eq!(config.wait_duration_open, std::time::Duration::from_secs(5));

        let pending = app
            .clone()
            .oneshot(request(
                "POST",
                "/admin/breakers/laterCb/customize",
                Some(r#"{"failure_rate_threshold": 10}"#),
            ))
            .await
            .unwrap();
        assert_eq!(pending.status(), StatusCode::ACCEPTED);
        assert_eq!(json(pending).await["applied"], false);

        let empty = app
            .clone()
            .oneshot(request("POST", "/admin/breakers/ordersCb/customize", Some("{}")))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let invalid = app
            .oneshot(request(
                "POST",
                "/admin/breakers/ordersCb/customize",
                Some(r#"{"failure_rate_threshold": 150}"#),
            ))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_customize_unknown_name_over_cap() {
        let mut config = GatewayConfig::default();
        config.admin.api_key = KEY.to_string();
        config.circuit_breaker.max_breakers = Some(1);
        let app = setup_admin_router(AppState::new(&config));

        let body = Some(r#"{"failure_rate_threshold": 10}"#);
        let first = app
            .clone()
            .oneshot(request("POST", "/admin/breakers/aCb/customize", body))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = app
            .oneshot(request("POST", "/admin/breakers/bCb/customize", body))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_reset() {
        let state = state();
        state
            .registry
            .get_or_create(&parse_shortcut("ordersCb,forward:/fallback").unwrap())
            .unwrap();
        let app = setup_admin_router(state);

        let reset = app
            .clone()
            .oneshot(request("POST", "/admin/breakers/ordersCb/reset", None))
            .await
            .unwrap();
        assert_eq!(reset.status(), StatusCode::OK);
        assert_eq!(json(reset).await["state"], "CLOSED");

        let missing = app
            .oneshot(request("POST", "/admin/breakers/nope/reset", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
