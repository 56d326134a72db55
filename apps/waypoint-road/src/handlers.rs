use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use waypoint_core::{FieldUpdate, SessionCode, SessionFields};

use crate::service::{ServiceError, SessionService};

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionService,
    pub metrics: Option<PrometheusHandle>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/metrics", get(render_metrics))
        .route("/session/:session", get(get_session))
        .route("/session/:session/progress", post(post_progress))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of `POST /session/:session/progress`.
///
/// `value` distinguishes a missing member (`None`) from an explicit `null`.
#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub ok: bool,
    pub data: SessionFields,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    backend: &'static str,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(err) => ApiError::BadRequest(err.to_string()),
            ServiceError::Backend(_) => ApiError::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };
        (status, Json(ApiErrorBody { ok: false, error })).into_response()
    }
}

/// POST /session/:session/progress - Write one field or merge a state snapshot
pub async fn post_progress(
    State(state): State<AppState>,
    Path(session): Path<String>,
    payload: Result<Json<ProgressRequest>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        warn!(session = %session, error = %rejection.body_text(), "rejected progress body");
        ApiError::BadRequest("Invalid request body".to_string())
    })?;

    let update = FieldUpdate::from_request(&session, payload.key.as_ref(), payload.value)
        .map_err(ServiceError::from)?;
    state.sessions.apply(update).await?;
    Ok(Json(AckResponse { ok: true }))
}

/// GET /session/:session - Current merged view; an unknown session is an empty object
pub async fn get_session(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = SessionCode::parse(&session).map_err(ServiceError::from)?;
    let data = state.sessions.read(&session).await?;
    Ok(Json(SessionResponse { ok: true, data }))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        backend: state.sessions.backend_name(),
    })
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
