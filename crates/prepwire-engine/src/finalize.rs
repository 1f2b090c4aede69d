//! Finalization: the scoring pass that turns a finished session into
//! a calibrated evaluation, with an at-most-once guarantee under
//! concurrency and a flagged synthetic fallback when the model cannot
//! produce a usable one.

use tracing::{info, instrument, warn};

use prepwire_core::types::{EvaluationSummary, Rubric, Stage};
use prepwire_core::{PrepwireError, Result};
use prepwire_store::evaluations::NewEvaluation;
use prepwire_store::types::{Evaluation, InterviewSession, Question};

use crate::engine::{rubric_from_json, InterviewEngine};
use crate::prompts;
use crate::FALLBACK_AFTER_FAILURES;

/// Transcript budget for the evaluator prompt.
const MAX_EVAL_TRANSCRIPT_CHARS: usize = 12_000;
/// Narrative arrays are trimmed to this many items.
const MAX_SUMMARY_ITEMS: usize = 10;

const FINALIZABLE: [Stage; 4] = [
    Stage::Question,
    Stage::Followups,
    Stage::CandidateSolution,
    Stage::Wrapup,
];

impl InterviewEngine {
    /// Produce (or return) the session's evaluation.
    ///
    /// Idempotent once the session is `done`; concurrent callers race
    /// on the stage CAS and the evaluation's uniqueness constraint,
    /// and every caller that doesn't error returns the same row.
    #[instrument(skip(self))]
    pub async fn finalize(&self, user_id: &str, session_id: &str) -> Result<Evaluation> {
        let session = self.store.get_session(user_id, session_id)?;

        if session.stage == Stage::Done {
            return self.existing_evaluation(session_id);
        }
        if !session.stage.finalizable() {
            return Err(PrepwireError::InvalidStage {
                stage: session.stage.to_string(),
                action: "finalize".to_string(),
            });
        }

        // Pre-transition before any model call: losing this CAS means a
        // peer is (or was) finalizing.
        if !self
            .store
            .cas_stage(session_id, &FINALIZABLE, Stage::Evaluation)?
        {
            let fresh = self.store.get_session(user_id, session_id)?;
            match fresh.stage {
                Stage::Done => return self.existing_evaluation(session_id),
                // A peer is mid-finalize: compute anyway and let the
                // uniqueness constraint pick the winner.
                Stage::Evaluation => {}
                other => {
                    return Err(PrepwireError::InvalidStage {
                        stage: other.to_string(),
                        action: "finalize".to_string(),
                    })
                }
            }
        }

        match self.run_evaluation(&session).await {
            Ok(new_eval) => {
                let eval = self.store.insert_or_get_evaluation(&new_eval)?;
                self.store
                    .cas_stage(session_id, &[Stage::Evaluation], Stage::Done)?;
                self.note_ai_ok(session_id);
                info!(session_id, overall = eval.overall_score, "session finalized");
                self.spawn_indexing(session_id);
                Ok(eval)
            }
            Err(e) => {
                self.note_ai_failure(session_id);
                if self.ai_failure_count(session_id) >= FALLBACK_AFTER_FAILURES {
                    warn!(session_id, error = %e, "model evaluation keeps failing, persisting fallback");
                    let eval = self
                        .store
                        .insert_or_get_evaluation(&fallback_evaluation(session_id))?;
                    self.store.cas_stage(
                        session_id,
                        &[Stage::Evaluation, Stage::Wrapup],
                        Stage::Done,
                    )?;
                    self.spawn_indexing(session_id);
                    return Ok(eval);
                }
                // Revert so the caller can retry.
                self.store
                    .cas_stage(session_id, &[Stage::Evaluation], Stage::Wrapup)?;
                warn!(session_id, error = %e, "finalize failed, stage reverted to wrapup");
                Err(e)
            }
        }
    }

    fn existing_evaluation(&self, session_id: &str) -> Result<Evaluation> {
        self.store.get_evaluation(session_id)?.ok_or_else(|| {
            PrepwireError::Internal(format!("session {session_id} is done without an evaluation"))
        })
    }

    /// Assemble the evaluator inputs, call the model, and map the
    /// response into a calibrated evaluation payload.
    async fn run_evaluation(&self, session: &InterviewSession) -> Result<NewEvaluation> {
        let messages = self.store.all_messages(&session.id)?;
        let questions: Vec<Question> = self
            .store
            .session_questions(&session.id)?
            .iter()
            .filter_map(|qid| self.store.get_question(qid).ok())
            .collect();

        let transcript =
            prepwire_rag::indexer::render_transcript(&messages, MAX_EVAL_TRANSCRIPT_CHARS);
        let retrieval_context = self
            .retriever
            .build_context(&session.id, &transcript, questions.last())
            .await;

        let system = prompts::evaluator_system();
        let user = prompts::evaluator_user(&questions, &transcript, retrieval_context.as_deref());
        let obj = self.llm.chat_json(&system, &user, &[]).await?;

        Ok(parse_evaluation(&session.id, &obj))
    }

    fn spawn_indexing(&self, session_id: &str) {
        let indexer = std::sync::Arc::clone(&self.indexer);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = indexer.index_session(&session_id).await {
                warn!(session_id, error = %e, "post-finalize indexing failed");
            }
        });
    }
}

/// Map the evaluator's JSON into the evaluation schema: clamp the
/// rubric and overall score, trim narrative arrays, then apply the
/// under-confidence calibration.
fn parse_evaluation(
    session_id: &str,
    obj: &serde_json::Map<String, serde_json::Value>,
) -> NewEvaluation {
    let rubric = rubric_from_json(obj).clamped();
    let mean10 = rubric.mean() * 10.0;

    let mut overall = obj
        .get("overall_score")
        .and_then(|v| v.as_i64())
        .map(|v| v.clamp(0, 100) as u8)
        // A missing overall reads as the rubric mean on the 0-100 scale.
        .unwrap_or_else(|| mean10.round().clamp(0.0, 100.0) as u8);

    overall = calibrate(overall, &rubric);

    let summary = EvaluationSummary {
        strengths: string_array(obj, "strengths"),
        weaknesses: string_array(obj, "weaknesses"),
        next_steps: string_array(obj, "next_steps"),
    };
    let hire_signal = obj
        .get("hire_signal")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok());

    NewEvaluation {
        session_id: session_id.to_string(),
        overall_score: overall,
        rubric,
        summary,
        hire_signal,
        was_fallback: false,
    }
}

/// The language model tends to under-score candidates it describes
/// well. Two corrections, both upward only: pull a far-below-rubric
/// overall up to just under the rubric mean, and floor the overall at
/// 75 when the rubric itself averages 8+.
fn calibrate(overall: u8, rubric: &Rubric) -> u8 {
    let mean10 = rubric.mean() * 10.0;
    let mut out = overall;
    if (out as f64) < mean10 - 5.0 {
        out = (mean10 - 2.0).round().clamp(0.0, 100.0) as u8;
    }
    if rubric.mean() >= 8.0 && out < 70 {
        out = 75;
    }
    out
}

fn string_array(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .take(MAX_SUMMARY_ITEMS)
                .collect()
        })
        .unwrap_or_default()
}

/// The neutral synthetic evaluation used when the model cannot produce
/// a valid one. Always flagged.
fn fallback_evaluation(session_id: &str) -> NewEvaluation {
    NewEvaluation {
        session_id: session_id.to_string(),
        overall_score: 50,
        rubric: Rubric::uniform(5),
        summary: EvaluationSummary {
            strengths: vec!["Completed the interview session.".to_string()],
            weaknesses: vec![
                "The automated evaluation was unavailable, so no detailed analysis exists."
                    .to_string(),
            ],
            next_steps: vec![
                "Run another practice session to get a full evaluation.".to_string()
            ],
        },
        hire_signal: None,
        was_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepwire_core::types::HireSignal;

    fn obj(json: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        json.as_object().unwrap().clone()
    }

    #[test]
    fn parse_maps_and_clamps() {
        let parsed = parse_evaluation(
            "s1",
            &obj(serde_json::json!({
                "overall_score": 140,
                "rubric": {
                    "communication": 12,
                    "problem_solving": 8,
                    "correctness_reasoning": 8,
                    "complexity": 8,
                    "edge_cases": 8
                },
                "strengths": ["clear", "", "thorough"],
                "weaknesses": ["slow start"],
                "next_steps": ["practice DP"],
                "hire_signal": "lean_yes"
            })),
        );
        assert_eq!(parsed.overall_score, 100);
        assert_eq!(parsed.rubric.communication, 10);
        assert_eq!(parsed.summary.strengths, vec!["clear", "thorough"]);
        assert_eq!(parsed.hire_signal, Some(HireSignal::LeanYes));
        assert!(!parsed.was_fallback);
    }

    #[test]
    fn summary_arrays_trim_to_ten() {
        let many: Vec<String> = (0..25).map(|i| format!("item {i}")).collect();
        let parsed = parse_evaluation(
            "s1",
            &obj(serde_json::json!({ "overall_score": 60, "strengths": many })),
        );
        assert_eq!(parsed.summary.strengths.len(), MAX_SUMMARY_ITEMS);
    }

    #[test]
    fn calibration_lifts_underconfident_overall() {
        // Rubric mean 7.0 => mean10 70; overall 50 < 65 => lifted to 68.
        assert_eq!(calibrate(50, &Rubric::uniform(7)), 68);
        // Within 5 points of the mean: untouched.
        assert_eq!(calibrate(66, &Rubric::uniform(7)), 66);
    }

    #[test]
    fn calibration_floors_strong_rubrics() {
        // Mean 8.0 with overall 76: rule one leaves it (76 > 75), rule
        // two doesn't apply (>= 70).
        assert_eq!(calibrate(76, &Rubric::uniform(8)), 76);
        // Mean 8.0 with overall 76 - far low case: 40 -> lifted to 78.
        assert_eq!(calibrate(40, &Rubric::uniform(8)), 78);
        // Mean 9, overall 69: within 5 of 90? No - 69 < 85, so rule one
        // lifts to 88 and rule two is moot.
        assert_eq!(calibrate(69, &Rubric::uniform(9)), 88);
    }

    #[test]
    fn calibration_is_idempotent() {
        for uniform in 0..=10u8 {
            let rubric = Rubric::uniform(uniform);
            for overall in [0u8, 30, 50, 70, 90, 100] {
                let once = calibrate(overall, &rubric);
                assert_eq!(calibrate(once, &rubric), once);
            }
        }
    }

    #[test]
    fn missing_overall_defaults_to_rubric_mean() {
        let parsed = parse_evaluation(
            "s1",
            &obj(serde_json::json!({
                "rubric": {
                    "communication": 6, "problem_solving": 6,
                    "correctness_reasoning": 6, "complexity": 6, "edge_cases": 6
                }
            })),
        );
        assert_eq!(parsed.overall_score, 60);
    }

    #[test]
    fn fallback_shape() {
        let f = fallback_evaluation("s1");
        assert_eq!(f.overall_score, 50);
        assert_eq!(f.rubric, Rubric::uniform(5));
        assert!(f.was_fallback);
    }
}
