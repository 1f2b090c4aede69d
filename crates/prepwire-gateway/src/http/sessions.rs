use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use prepwire_core::types::{CompanyStyle, Difficulty, Track};
use prepwire_engine::CreateSessionRequest;
use prepwire_store::types::{Evaluation, InterviewSession, StoredMessage};

use crate::app::AppState;
use crate::http::{caller_id, ApiResult};

#[derive(Deserialize)]
pub struct CreateBody {
    pub role: String,
    pub track: Track,
    pub company: CompanyStyle,
    pub difficulty: Difficulty,
    pub behavioral_target: Option<u32>,
}

#[derive(Deserialize)]
pub struct MessageBody {
    pub content: String,
}

#[derive(Deserialize)]
pub struct FeedbackBody {
    pub stars: Option<u8>,
    pub thumb: Option<String>,
    pub rubric_ratings: Option<Value>,
    pub comment: Option<String>,
}

/// The session shape returned over the wire — internal bags like
/// `skill_state` stay server-side.
#[derive(Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub role: String,
    pub track: Track,
    pub company: CompanyStyle,
    pub difficulty_current: Difficulty,
    pub stage: String,
    pub questions_asked_count: u32,
    pub max_questions: u32,
    pub behavioral_target: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<InterviewSession> for SessionSummary {
    fn from(s: InterviewSession) -> Self {
        Self {
            id: s.id,
            role: s.role,
            track: s.track,
            company: s.company,
            difficulty_current: s.difficulty_current,
            stage: s.stage.to_string(),
            questions_asked_count: s.questions_asked_count,
            max_questions: s.max_questions,
            behavioral_target: s.behavioral_target,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// POST /sessions
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> ApiResult<Json<SessionSummary>> {
    let user_id = caller_id(&headers)?;
    let session = state.engine.create_session(&CreateSessionRequest {
        user_id,
        role: body.role,
        track: body.track,
        company: body.company,
        difficulty: body.difficulty,
        behavioral_target: body.behavioral_target,
    })?;
    Ok(Json(session.into()))
}

/// GET /sessions
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    let user_id = caller_id(&headers)?;
    let sessions = state.engine.list_sessions(&user_id, 50)?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

/// POST /sessions/{id}/start
pub async fn start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<StoredMessage>> {
    let user_id = caller_id(&headers)?;
    Ok(Json(state.engine.start_session(&user_id, &id)?))
}

/// POST /sessions/{id}/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> ApiResult<Json<StoredMessage>> {
    let user_id = caller_id(&headers)?;
    Ok(Json(
        state.engine.send_message(&user_id, &id, &body.content).await?,
    ))
}

/// GET /sessions/{id}/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<StoredMessage>>> {
    let user_id = caller_id(&headers)?;
    Ok(Json(state.engine.list_messages(&user_id, &id)?))
}

/// POST /sessions/{id}/finalize
pub async fn finalize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Evaluation>> {
    let user_id = caller_id(&headers)?;
    Ok(Json(state.engine.finalize(&user_id, &id).await?))
}

/// DELETE /sessions/{id}
pub async fn remove(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user_id = caller_id(&headers)?;
    state.engine.delete_session(&user_id, &id)?;
    Ok(Json(json!({ "ok": true })))
}

/// POST /sessions/{id}/feedback
pub async fn feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<FeedbackBody>,
) -> ApiResult<Json<Value>> {
    let user_id = caller_id(&headers)?;
    state.engine.submit_feedback(
        &user_id,
        &id,
        body.stars,
        body.thumb,
        body.rubric_ratings,
        body.comment,
    )?;
    Ok(Json(json!({ "ok": true })))
}
