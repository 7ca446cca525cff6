use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use faultline_common::types::DiagnosisResult;
use faultline_ingest::{BusError, BusReceiver};
use faultline_recovery::{RecoveryEngine, RecoveryError};
use faultline_state::StateStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub recovery: Arc<RecoveryEngine>,
    pub bus: Arc<BusReceiver>,
    pub store: Arc<StateStore>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/diagnosis", post(submit_diagnosis))
        .route("/ingest/bus", post(ingest_bus))
        .route("/state/alerts", get(active_alerts))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// External diagnosis submission. Body parsing is done by hand so a broken
/// payload maps to a plain 400 rather than an extractor rejection.
async fn submit_diagnosis(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let event: DiagnosisResult = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected diagnosis payload");
            return (StatusCode::BAD_REQUEST, "invalid json");
        }
    };

    match state.recovery.submit(event) {
        Ok(()) => (StatusCode::ACCEPTED, "accepted"),
        Err(RecoveryError::QueueFull) => (StatusCode::SERVICE_UNAVAILABLE, "queue full"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "engine unavailable"),
    }
}

/// Raw component-bus packet submission for producer services.
async fn ingest_bus(State(state): State<AppState>, body: Bytes) -> (StatusCode, &'static str) {
    match state.bus.submit(body.to_vec()) {
        Ok(()) => (StatusCode::ACCEPTED, "accepted"),
        Err(BusError::QueueFull) => (StatusCode::SERVICE_UNAVAILABLE, "queue full"),
        Err(BusError::Closed) => (StatusCode::SERVICE_UNAVAILABLE, "receiver stopped"),
        Err(_) => (StatusCode::BAD_REQUEST, "invalid packet"),
    }
}

async fn active_alerts(State(state): State<AppState>) -> Json<Vec<String>> {
    let mut alerts = state.store.active_alerts();
    alerts.sort();
    Json(alerts)
}
