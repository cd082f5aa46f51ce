use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::server::AppState;
use crate::resilience::shortcut::parse_duration;
use crate::resilience::{BreakerOverrides, BreakerSnapshot, ConfigError, RegistryError};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
    pub breakers: usize,
}

/// Body of `POST /admin/breakers/{name}/customize`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CustomizeRequest {
    pub failure_rate_threshold: Option<f32>,
    /// Same grammar as the shortcut field: bare milliseconds or a humantime literal.
    pub wait_duration_open: Option<String>,
}

impl CustomizeRequest {
    fn overrides(&self) -> Result<BreakerOverrides, ConfigError> {
        let mut overrides = BreakerOverrides::new();
        if let Some(threshold) = self.failure_rate_threshold {
            overrides = overrides.with_failure_rate_threshold(threshold)?;
        }
        if let Some(wait) = &self.wait_duration_open {
            overrides = overrides.with_wait_duration_open(parse_duration(wait)?)?;
        }
        Ok(overrides)
    }
}

#[derive(Serialize)]
pub struct CustomizeResponse {
    pub name: String,
    /// False when no breaker with this name exists yet; the overrides apply on creation.
    pub applied: bool,
    pub breaker: Option<BreakerSnapshot>,
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unknown circuit breaker `{0}`")]
    NotFound(String),

    #[error(transparent)]
    InvalidOverride(#[from] ConfigError),

    #[error("no overrides given")]
    EmptyCustomization,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match self {
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::InvalidOverride(_) | AdminError::EmptyCustomization => StatusCode::BAD_REQUEST,
            AdminError::Registry(_) => StatusCode::CONFLICT,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        routes: state.routes.load().len(),
        breakers: state.registry.len(),
    })
}

pub async fn list_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.registry.snapshot())
}

pub async fn get_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, AdminError> {
    state
        .registry
        .get(&name)
        .map(|breaker| Json(breaker.snapshot()))
        .ok_or(AdminError::NotFound(name))
}

pub async fn customize_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<CustomizeRequest>,
) -> Result<(StatusCode, Json<CustomizeResponse>), AdminError> {
    let overrides = request.overrides()?;
    if overrides.is_empty() {
        return Err(AdminError::EmptyCustomization);
    }
    let applied = state.registry.customize(&name, overrides)?;
    tracing::info!(breaker = %name, applied, "Admin customized circuit breaker");

    let status = if applied {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    let breaker = state.registry.get(&name).map(|b| b.snapshot());
    Ok((
        status,
        Json(CustomizeResponse {
            name,
            applied,
            breaker,
        }),
    ))
}

pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, AdminError> {
    if !state.registry.reset(&name) {
        return Err(AdminError::NotFound(name));
    }
    tracing::info!(breaker = %name, "Admin reset circuit breaker");
    state
        .registry
        .get(&name)
        .map(|breaker| Json(breaker.snapshot()))
        .ok_or(AdminError::NotFound(name))
}
