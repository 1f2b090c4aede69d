use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let ai = state.engine.ai_status();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ai": ai.status,
    }))
}

/// GET /ai/status — the full language-model health beacon.
pub async fn ai_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snap = state.engine.ai_status();
    Json(json!({
        "configured": snap.configured,
        "status": snap.status,
        "last_ok_at": snap.last_ok_at,
        "last_error_at": snap.last_error_at,
        "last_error": snap.last_error,
        "model": snap.model,
    }))
}
