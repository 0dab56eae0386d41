//! HTTP front end: health check, metrics exposition, and an operator
//! trigger for out-of-band digest runs.

use std::sync::Arc;

use axum::extract::{FromRef, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use wikisurge_core::digest::{DigestPeriod, Scheduler};
use wikisurge_core::metrics;
use wikisurge_core::store::Store;

use crate::errors::ServerError;
use crate::ws::{ws_handler, LocalBroadcaster};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub scheduler: Arc<Scheduler>,
    pub broadcaster: Arc<LocalBroadcaster>,
}

impl FromRef<AppState> for Arc<LocalBroadcaster> {
    fn from_ref(state: &AppState) -> Self {
        state.broadcaster.clone()
    }
}

pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .route("/digest/run", post(run_digest))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    state.store.ping().await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn metrics_endpoint() -> impl IntoResponse {
    metrics::registry().render_prometheus()
}

#[derive(Debug, Deserialize)]
struct RunDigestQuery {
    period: String,
}

async fn run_digest(
    State(state): State<AppState>,
    Query(query): Query<RunDigestQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let period = match query.period.as_str() {
        "daily" => DigestPeriod::Daily,
        "weekly" => DigestPeriod::Weekly,
        other => return Err(ServerError::BadRequest(format!("unknown digest period: {other}"))),
    };
    let result = state.scheduler.run_now(period).await?;
    metrics::registry().record_digest_sent(result.sent, result.skipped, result.errored);
    Ok(Json(json!({
        "sent": result.sent,
        "skipped": result.skipped,
        "errored": result.errored,
    })))
}
