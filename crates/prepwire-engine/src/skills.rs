//! Skill-state tracking: running totals, EMA, streaks, and the
//! adaptive-difficulty proposal consumed by the question selector.
//!
//! All functions are pure over the typed `SkillState`; persistence is
//! a single full-replacement write by the caller.

use prepwire_core::types::{Difficulty, QuestionType, Rubric, RubricDim, SkillState};
use prepwire_store::types::Question;

use crate::{GOOD_TURN_THRESHOLD, SKILL_N_CAP, SKILL_SUM_CAP, WEAK_TURN_THRESHOLD};

/// Fold one quick rubric into the running state.
pub fn apply_turn(state: &mut SkillState, rubric: &Rubric, alpha: f64) {
    state.n = (state.n + 1).min(SKILL_N_CAP);

    for dim in RubricDim::ALL {
        let score = *rubric.get(dim);
        let sum = state.sum.get_mut(dim);
        *sum = (*sum + score as u32).min(SKILL_SUM_CAP);
        *state.last.get_mut(dim) = score;
        let ema = state.ema.get_mut(dim);
        *ema = ((1.0 - alpha) * *ema + alpha * score as f64).clamp(0.0, 10.0);
    }

    let avg = rubric.mean();
    if avg >= GOOD_TURN_THRESHOLD {
        state.streak.good += 1;
        state.streak.weak = 0;
    } else if avg <= WEAK_TURN_THRESHOLD {
        state.streak.weak += 1;
        state.streak.good = 0;
    } else {
        // Middling turn: decay both streaks toward zero.
        state.streak.good = state.streak.good.saturating_sub(1);
        state.streak.weak = state.streak.weak.saturating_sub(1);
    }
}

/// Record that a main question was asked: tag exposure plus the
/// behavioral quota counter. Follow-ups never pass through here.
pub fn note_question_asked(state: &mut SkillState, question: &Question) {
    for tag in &question.tags {
        *state.tags_seen.entry(tag.clone()).or_insert(0) += 1;
    }
    if question.question_type == QuestionType::Behavioral {
        state.behavioral_asked += 1;
    }
}

/// Adaptive difficulty: two consecutive good turns step up (bounded by
/// the user's ceiling), two consecutive weak turns step down, anything
/// else holds.
pub fn propose_difficulty(
    state: &SkillState,
    current: Difficulty,
    ceiling: Difficulty,
) -> Difficulty {
    if state.streak.good >= 2 {
        current.step_up().min(ceiling)
    } else if state.streak.weak >= 2 {
        current.step_down()
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepwire_core::types::{CompanyStyle, Track};
    use prepwire_store::types::Question as StoreQuestion;

    fn behavioral_question() -> StoreQuestion {
        StoreQuestion {
            id: "qb".into(),
            track: Track::SweIntern,
            company: CompanyStyle::General,
            difficulty: Difficulty::Easy,
            title: "Conflict story".into(),
            prompt: "Tell me about a disagreement with a teammate.".into(),
            tags: vec!["teamwork".into(), "communication".into()],
            question_type: QuestionType::Behavioral,
            followups: vec![],
            meta: serde_json::json!({}),
            created_at: String::new(),
        }
    }

    #[test]
    fn apply_turn_updates_all_fields() {
        let mut state = SkillState::default();
        let rubric = Rubric {
            communication: 8,
            problem_solving: 7,
            correctness_reasoning: 9,
            complexity: 6,
            edge_cases: 5,
        };
        apply_turn(&mut state, &rubric, 0.35);

        assert_eq!(state.n, 1);
        assert_eq!(state.sum.communication, 8);
        assert_eq!(state.last.edge_cases, 5);
        assert!((state.ema.communication - 0.35 * 8.0).abs() < 1e-9);
        assert_eq!(state.streak.good, 1);
        assert_eq!(state.streak.weak, 0);
    }

    #[test]
    fn n_increments_by_exactly_one_per_turn() {
        let mut state = SkillState::default();
        for i in 1..=5u32 {
            apply_turn(&mut state, &Rubric::uniform(6), 0.35);
            assert_eq!(state.n, i);
        }
    }

    #[test]
    fn counters_cap() {
        let mut state = SkillState::default();
        state.n = SKILL_N_CAP;
        state.sum.communication = SKILL_SUM_CAP;
        apply_turn(&mut state, &Rubric::uniform(10), 0.35);
        assert_eq!(state.n, SKILL_N_CAP);
        assert_eq!(state.sum.communication, SKILL_SUM_CAP);
    }

    #[test]
    fn ema_clamps_and_converges() {
        let mut state = SkillState::default();
        for _ in 0..50 {
            apply_turn(&mut state, &Rubric::uniform(10), 0.35);
        }
        assert!(state.ema.complexity <= 10.0);
        assert!(state.ema.complexity > 9.5);
    }

    #[test]
    fn weak_streak_resets_good_streak() {
        let mut state = SkillState::default();
        apply_turn(&mut state, &Rubric::uniform(8), 0.35);
        apply_turn(&mut state, &Rubric::uniform(8), 0.35);
        assert_eq!(state.streak.good, 2);

        apply_turn(&mut state, &Rubric::uniform(3), 0.35);
        assert_eq!(state.streak.good, 0);
        assert_eq!(state.streak.weak, 1);
    }

    #[test]
    fn middling_turn_decays_streaks() {
        let mut state = SkillState::default();
        apply_turn(&mut state, &Rubric::uniform(8), 0.35);
        apply_turn(&mut state, &Rubric::uniform(8), 0.35);
        apply_turn(&mut state, &Rubric::uniform(6), 0.35);
        assert_eq!(state.streak.good, 1);
        assert_eq!(state.streak.weak, 0);
    }

    #[test]
    fn difficulty_steps_respect_ceiling() {
        let mut state = SkillState::default();
        state.streak.good = 2;
        assert_eq!(
            propose_difficulty(&state, Difficulty::Easy, Difficulty::Hard),
            Difficulty::Medium
        );
        // Ceiling holds the step-up.
        assert_eq!(
            propose_difficulty(&state, Difficulty::Medium, Difficulty::Medium),
            Difficulty::Medium
        );

        state.streak.good = 0;
        state.streak.weak = 2;
        assert_eq!(
            propose_difficulty(&state, Difficulty::Medium, Difficulty::Hard),
            Difficulty::Easy
        );
        assert_eq!(
            propose_difficulty(&state, Difficulty::Easy, Difficulty::Hard),
            Difficulty::Easy
        );

        state.streak.weak = 1;
        assert_eq!(
            propose_difficulty(&state, Difficulty::Medium, Difficulty::Hard),
            Difficulty::Medium
        );
    }

    #[test]
    fn behavioral_questions_count_toward_quota() {
        let mut state = SkillState::default();
        note_question_asked(&mut state, &behavioral_question());
        assert_eq!(state.behavioral_asked, 1);
        assert_eq!(state.tags_seen.get("teamwork"), Some(&1));
        note_question_asked(&mut state, &behavioral_question());
        assert_eq!(state.tags_seen.get("teamwork"), Some(&2));
    }
}
