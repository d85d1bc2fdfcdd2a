//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - JSON API under `/api/v1/...` (including the clinician dashboard and ops report)
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/challenge/today", get(http::http_get_today))
        .route("/api/v1/challenge/complete", post(http::http_post_complete))
        .route("/api/v1/streak", get(http::http_get_streak))
        .route("/api/v1/insight", post(http::http_post_insight))
        .route("/api/v1/assessment/submit", post(http::http_post_assessment))
        .route("/api/v1/assessment/history", get(http::http_get_history))
        .route("/api/v1/simulate", post(http::http_post_simulate))
        .route("/api/v1/share-card", get(http::http_get_share_card))
        .route("/api/v1/clinician/link", post(http::http_post_clinician_link))
        .route("/api/v1/clinician/dashboard/:code", get(http::http_get_clinician_dashboard))
        .route("/api/v1/ops/report", get(http::http_get_ops_report))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
