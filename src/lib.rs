//! AI Classification Sidecar: accepts batches of telemetry items, forwards
//! redacted content to an external classification model, and returns a
//! routing decision for each item, degrading gracefully whenever the
//! upstream is unavailable.
//!
//! One `Router` built from `AppState`, with `tower_http::TraceLayer` added
//! for per-request spans.

pub mod ai_client;
pub mod circuit_breaker;
pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod orchestrator;
pub mod ratelimiter;
pub mod redact;
pub mod types;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use ai_client::AiClient;
use circuit_breaker::CircuitBreaker;
use config::Config;
use lifecycle::Lifecycle;
use metrics::{MetricsRegistry, SharedMetrics};
use orchestrator::{Orchestrator, OrchestratorError};
use ratelimiter::TokenBucket;
use types::{Batch, ErrorBody};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: SharedMetrics,
    pub lifecycle: Lifecycle,
}

impl AppState {
    pub fn build(config: Config) -> Self {
        let config = Arc::new(config);
        let metrics: SharedMetrics = Arc::new(MetricsRegistry::new());
        let rate_limiter = Arc::new(TokenBucket::new(
            config.rate_limit_capacity,
            config.rate_limit_window,
        ));
        let breaker = Arc::new(CircuitBreaker::new(
            config.circuit_failure_threshold,
            config.circuit_reset,
        ));
        let ai_client = Arc::new(AiClient::new(
            config.clone(),
            rate_limiter,
            breaker,
            metrics.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(config.clone(), ai_client, metrics.clone()));
        Self {
            config,
            orchestrator,
            metrics,
            lifecycle: Lifecycle::new(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/sort", post(sort_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn is_authorized(state: &AppState, headers: &HeaderMap) -> bool {
    match &state.config.strict_auth_key {
        None => true,
        Some(expected) => headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(|presented| presented == expected)
            .unwrap_or(false),
    }
}

fn error_response(
    status: StatusCode,
    code: &'static str,
    error: &str,
    details: &str,
    request_id: &str,
) -> Response {
    let body = ErrorBody {
        error: error.to_string(),
        code,
        details: details.to_string(),
        request_id: request_id.to_string(),
    };
    (status, Json(body)).into_response()
}

async fn sort_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Batch>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("sort_request", request_id = %request_id);
    async move {
        if !is_authorized(&state, &headers) {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "MISSING_API_KEY",
                "authentication required",
                "missing or invalid X-API-Key header",
                &request_id,
            );
        }

        let batch = match body {
            Ok(Json(batch)) => batch,
            Err(rejection) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "INVALID_REQUEST",
                    "request body is not a valid batch",
                    &rejection.to_string(),
                    &request_id,
                )
            }
        };

        let start = Instant::now();
        let result = state.orchestrator.sort(batch).await;
        state
            .metrics
            .observe_request_duration_ms(start.elapsed().as_millis() as u64);

        match result {
            Ok(results) => Json(results).into_response(),
            Err(err @ OrchestratorError::EmptyBatch) | Err(err @ OrchestratorError::BatchTooLarge(_)) => {
                error_response(
                    StatusCode::BAD_REQUEST,
                    "INVALID_REQUEST",
                    "invalid batch",
                    &err.to_string(),
                    &request_id,
                )
            }
            Err(OrchestratorError::Overloaded) => {
                warn!("rejecting request: admission capacity exceeded");
                let mut response = error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "OVERLOADED",
                    "too many in-flight requests",
                    "admission capacity exceeded, retry shortly",
                    &request_id,
                );
                response
                    .headers_mut()
                    .insert("retry-after", axum::http::HeaderValue::from_static("1"));
                response
            }
        }
    }
    .instrument(span)
    .await
}

async fn healthz_handler() -> StatusCode {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<AppState>) -> StatusCode {
    if state.lifecycle.is_ready() && state.config.has_api_key() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
