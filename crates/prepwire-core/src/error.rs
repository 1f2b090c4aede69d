use thiserror::Error;

/// Workspace-wide error type. Component crates keep their own small
/// error enums and convert into this at the engine boundary.
#[derive(Debug, Error)]
pub enum PrepwireError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing *or not owned by the caller* — ownership failures are
    /// reported as not-found so session ids cannot be enumerated.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid stage: {stage} does not allow {action}")]
    InvalidStage { stage: String, action: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("AI service error: {0}")]
    AiError(String),

    #[error("AI request timed out after {secs}s")]
    AiTimeout { secs: u64 },

    #[error("model returned unparseable structure: {0}")]
    ParseError(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PrepwireError {
    /// Short stable code string sent to clients in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            PrepwireError::Validation(_) => "VALIDATION",
            PrepwireError::NotFound(_) => "NOT_FOUND",
            PrepwireError::InvalidStage { .. } => "INVALID_STAGE",
            PrepwireError::RateLimited(_) => "RATE_LIMITED",
            PrepwireError::AiError(_) => "AI_ERROR",
            PrepwireError::AiTimeout { .. } => "AI_TIMEOUT",
            PrepwireError::ParseError(_) => "PARSE_ERROR",
            PrepwireError::Database(_) => "DATABASE_ERROR",
            PrepwireError::Serialization(_) => "SERIALIZATION_ERROR",
            PrepwireError::Config(_) => "CONFIG_ERROR",
            PrepwireError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the gateway maps this error onto.
    pub fn http_status(&self) -> u16 {
        match self {
            PrepwireError::Validation(_) => 400,
            PrepwireError::NotFound(_) => 404,
            PrepwireError::InvalidStage { .. } => 409,
            PrepwireError::RateLimited(_) => 429,
            PrepwireError::AiError(_) => 502,
            PrepwireError::AiTimeout { .. } => 504,
            PrepwireError::ParseError(_) => 422,
            PrepwireError::Database(_)
            | PrepwireError::Serialization(_)
            | PrepwireError::Config(_)
            | PrepwireError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, PrepwireError>;
