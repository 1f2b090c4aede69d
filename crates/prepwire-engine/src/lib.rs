pub mod engine;
pub mod finalize;
pub mod intent;
pub mod prompts;
pub mod selector;
pub mod signals;
pub mod skills;

pub use engine::{CreateSessionRequest, InterviewEngine};

/// Quick-rubric mean at or above which a turn counts toward a good
/// streak.
pub const GOOD_TURN_THRESHOLD: f64 = 7.0;
/// Quick-rubric mean at or below which a turn counts toward a weak
/// streak (and can escalate hints).
pub const WEAK_TURN_THRESHOLD: f64 = 4.5;
/// Below this quick-rubric mean the interviewer follows up rather than
/// advancing, budget permitting.
pub const FOLLOWUP_QUALITY_THRESHOLD: f64 = 6.0;
/// Scaffolding ceiling — level 3 walks through the approach but never
/// reveals the full solution.
pub const HINT_MAX: u8 = 3;
/// Consecutive LLM failures on a session before the finalizer stops
/// retrying and persists the synthetic evaluation.
pub const FALLBACK_AFTER_FAILURES: u32 = 2;
/// Caps on the running skill-state counters.
pub const SKILL_N_CAP: u32 = 10_000;
pub const SKILL_SUM_CAP: u32 = 1_000_000;
/// Seconds within which an identical consecutive student message is
/// treated as a retry of the same turn.
pub const DEDUP_WINDOW_SECS: i64 = 5;
