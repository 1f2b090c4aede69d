use serde::{Deserialize, Serialize};

use prepwire_core::types::{
    CompanyStyle, Difficulty, EvaluationSummary, HireSignal, MessageRole, QuestionType, Rubric,
    SkillState, Stage, Track,
};

/// Platform account. Signup and verification flows live elsewhere;
/// the store only guarantees the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Argon2 PHC string. Never serialized out of the store layer.
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub verified: bool,
    /// Open-ended preference bag.
    pub prefs: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Immutable catalog entry in the question pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub track: Track,
    pub company: CompanyStyle,
    pub difficulty: Difficulty,
    pub title: String,
    pub prompt: String,
    /// Ordered tag set, e.g. ["arrays", "two-pointers"].
    pub tags: Vec<String>,
    pub question_type: QuestionType,
    /// Scripted follow-ups, asked in order before free-form ones.
    pub followups: Vec<String>,
    pub meta: serde_json::Value,
    pub created_at: String,
}

/// One live (or finished) interview, owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: String,
    pub user_id: String,
    pub role: String,
    pub track: Track,
    pub company: CompanyStyle,
    /// The hardest difficulty the user opted into.
    pub difficulty_ceiling: Difficulty,
    /// The adaptive difficulty the selector currently targets.
    pub difficulty_current: Difficulty,
    pub stage: Stage,
    pub questions_asked_count: u32,
    pub followups_used: u32,
    pub max_questions: u32,
    pub max_followups_per_question: u32,
    pub behavioral_target: u32,
    pub current_question_id: Option<String>,
    pub skill_state: SkillState,
    pub created_at: String,
    pub updated_at: String,
}

/// Append-only transcript row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    /// Question in play when the message was written.
    pub current_question_id: Option<String>,
    /// SHA-256 of the content — consecutive-duplicate detection.
    pub content_hash: String,
    pub created_at: String,
}

/// One scored student turn — the quick-rubric stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnScore {
    pub id: i64,
    pub session_id: String,
    pub message_id: i64,
    pub question_id: Option<String>,
    pub rubric: Rubric,
    pub note: Option<String>,
    pub created_at: String,
}

/// Final calibrated evaluation, unique per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub session_id: String,
    /// 0–100.
    pub overall_score: u8,
    pub rubric: Rubric,
    pub summary: EvaluationSummary,
    pub hire_signal: Option<HireSignal>,
    /// True when the model could not produce a usable evaluation and
    /// the neutral synthetic one was persisted instead.
    pub was_fallback: bool,
    pub created_at: String,
}

/// Per-completed-session transcript embedding with a small digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEmbedding {
    pub session_id: String,
    pub vector: Vec<f32>,
    pub digest: serde_json::Value,
    pub created_at: String,
}

/// High-quality student turn kept as an exemplar for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseExample {
    pub id: i64,
    pub session_id: String,
    pub question_id: String,
    pub content: String,
    /// Quick-rubric mean at extraction time, always ≥ the quality floor.
    pub quality: f64,
    pub tags: Vec<String>,
    pub created_at: String,
}

/// Optional user rating of a finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFeedback {
    pub id: i64,
    pub session_id: String,
    pub stars: Option<u8>,
    pub thumb: Option<String>,
    pub rubric_ratings: Option<serde_json::Value>,
    pub comment: Option<String>,
    pub created_at: String,
}

/// Pool filter used by the selector.
#[derive(Debug, Clone)]
pub struct QuestionFilter {
    pub track: Track,
    pub company: Option<CompanyStyle>,
    pub difficulty: Option<Difficulty>,
    pub question_type: Option<QuestionType>,
}
