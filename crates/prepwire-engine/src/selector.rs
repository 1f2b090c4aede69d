//! Question selection: pool construction with a broadening ladder,
//! additive scoring against the candidate's weaknesses, behavioral
//! quota enforcement, and a deterministic tie-break.

use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use prepwire_core::types::{CompanyStyle, QuestionType, RubricDim};
use prepwire_store::types::{InterviewSession, Question, QuestionFilter};
use prepwire_store::{Result as StoreResult, Store};

pub struct QuestionSelector {
    store: Arc<Store>,
}

impl QuestionSelector {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Pick the next main question for a session, or `None` when every
    /// broadening step comes up empty — the engine then wraps up.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn select_next(&self, session: &InterviewSession) -> StoreResult<Option<Question>> {
        let mut excluded = self.store.seen_questions(&session.user_id)?;
        excluded.extend(self.store.session_questions(&session.id)?);

        // Behavioral quota: while quota remains and there is still room
        // to fill it, behavioral questions take priority.
        let remaining_slots = session
            .max_questions
            .saturating_sub(session.questions_asked_count);
        let remaining_quota = session
            .behavioral_target
            .saturating_sub(session.skill_state.behavioral_asked);
        if remaining_quota > 0 && remaining_slots >= remaining_quota {
            if let Some(q) = self.pick(session, &excluded, Some(QuestionType::Behavioral))? {
                return Ok(Some(q));
            }
            // No behavioral questions available anywhere: fall through
            // rather than stalling the interview.
            debug!("behavioral quota unfillable, selecting without type filter");
        }

        self.pick(session, &excluded, None)
    }

    fn pick(
        &self,
        session: &InterviewSession,
        excluded: &HashSet<String>,
        question_type: Option<QuestionType>,
    ) -> StoreResult<Option<Question>> {
        for (step, filter) in broadening_ladder(session, question_type).into_iter().enumerate() {
            let pool: Vec<Question> = self
                .store
                .fetch_pool(&filter)?
                .into_iter()
                .filter(|q| !excluded.contains(&q.id))
                .collect();
            if !pool.is_empty() {
                debug!(step, pool = pool.len(), "pool found");
                return Ok(Some(pick_best(pool, session)));
            }
        }
        Ok(None)
    }
}

/// Pool filters in broadening order: exact match, then company falls
/// back to general, then difficulty relaxes one step each way, then
/// the company filter drops entirely.
fn broadening_ladder(
    session: &InterviewSession,
    question_type: Option<QuestionType>,
) -> Vec<QuestionFilter> {
    let difficulty = session.difficulty_current;
    let mut ladder = vec![QuestionFilter {
        track: session.track,
        company: Some(session.company),
        difficulty: Some(difficulty),
        question_type,
    }];

    if session.company != CompanyStyle::General {
        ladder.push(QuestionFilter {
            track: session.track,
            company: Some(CompanyStyle::General),
            difficulty: Some(difficulty),
            question_type,
        });
    }

    for relaxed in [difficulty.step_down(), difficulty.step_up()] {
        if relaxed != difficulty {
            ladder.push(QuestionFilter {
                track: session.track,
                company: Some(CompanyStyle::General),
                difficulty: Some(relaxed),
                question_type,
            });
        }
    }

    ladder.push(QuestionFilter {
        track: session.track,
        company: None,
        difficulty: None,
        question_type,
    });

    ladder
}

/// Score every candidate and take the best; ties resolve through a
/// hash of (question id, session id) so the order differs between
/// sessions but never between retries of the same turn.
fn pick_best(pool: Vec<Question>, session: &InterviewSession) -> Question {
    let weakest = session.skill_state.weakest_dim();
    pool.into_iter()
        .map(|q| {
            let score = score_question(&q, session, weakest);
            let hash = tie_break(&q.id, &session.id);
            (score, hash, q)
        })
        // Highest score wins; on a tie the lower hash does.
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
        .map(|(_, _, q)| q)
        .expect("pool is non-empty")
}

/// Additive integer score for one candidate question.
pub fn score_question(question: &Question, session: &InterviewSession, weakest: RubricDim) -> i32 {
    let mut score = 0i32;
    let weakness = weakness_tags(weakest);

    for tag in &question.tags {
        if weakness.contains(&tag.as_str()) {
            score += 5;
        }
        if session.skill_state.tags_seen.contains_key(tag) {
            score -= 1;
        }
    }

    let prompt = question.prompt.to_lowercase();
    for keyword in weakness {
        if prompt.contains(keyword) {
            score += 1;
        }
    }

    if question.question_type == preferred_type(weakest) {
        score += 10;
    }

    score
}

/// Canonical tag set per rubric dimension — what the selector boosts
/// when that dimension is the candidate's weakest.
pub fn weakness_tags(dim: RubricDim) -> &'static [&'static str] {
    match dim {
        RubricDim::Communication => &["communication", "explanation", "storytelling"],
        RubricDim::ProblemSolving => &["problem-solving", "algorithms", "recursion", "puzzles"],
        RubricDim::CorrectnessReasoning => &["correctness", "invariants", "proof", "testing"],
        RubricDim::Complexity => &["complexity", "big-o", "optimization", "performance"],
        RubricDim::EdgeCases => &["edge-case", "edge-cases", "boundary", "null"],
    }
}

/// Question type that most directly exercises a weak dimension.
fn preferred_type(dim: RubricDim) -> QuestionType {
    match dim {
        RubricDim::Communication => QuestionType::Behavioral,
        RubricDim::ProblemSolving => QuestionType::Coding,
        RubricDim::CorrectnessReasoning => QuestionType::Conceptual,
        RubricDim::Complexity => QuestionType::Coding,
        RubricDim::EdgeCases => QuestionType::Coding,
    }
}

fn tie_break(question_id: &str, session_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(question_id.as_bytes());
    hasher.update(b":");
    hasher.update(session_id.as_bytes());
    hasher.finalize().into()
}
