//! Intent classification and hint escalation.
//!
//! The model-backed classifier and the keyword heuristic sit behind
//! one shape; classifier failures degrade silently to the heuristic
//! and are never surfaced to the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use prepwire_core::types::{Intent, SkillState};
use prepwire_llm::{LlmClient, LlmStatus};
use prepwire_store::types::TurnScore;

use crate::prompts;
use crate::signals::{self, ContentSignals};
use crate::{HINT_MAX, WEAK_TURN_THRESHOLD};

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f64,
    pub source: ClassifierSource,
}

pub struct IntentClassifier {
    llm: Arc<LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Classify a student turn. The model path is skipped entirely when
    /// the beacon already reports the provider offline.
    pub async fn classify(&self, content: &str) -> IntentResult {
        if self.llm.health().status() == LlmStatus::Offline {
            debug!("provider offline, using heuristic intent classification");
            return heuristic_result(content);
        }

        match self
            .llm
            .chat_json(&prompts::intent_classifier_system(), content, &[])
            .await
        {
            Ok(obj) => {
                let parsed = obj
                    .get("intent")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<Intent>().ok());
                match parsed {
                    Some(intent) => IntentResult {
                        intent,
                        confidence: obj
                            .get("confidence")
                            .and_then(|v| v.as_f64())
                            .unwrap_or(0.5)
                            .clamp(0.0, 1.0),
                        source: ClassifierSource::Model,
                    },
                    None => {
                        warn!("classifier returned no usable intent, falling back to heuristic");
                        heuristic_result(content)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "intent classifier failed, falling back to heuristic");
                heuristic_result(content)
            }
        }
    }
}

fn heuristic_result(content: &str) -> IntentResult {
    IntentResult {
        intent: heuristic_classify(content),
        confidence: 0.4,
        source: ClassifierSource::Heuristic,
    }
}

/// Keyword + length heuristic, used whenever the model path is
/// unavailable or unusable.
pub fn heuristic_classify(content: &str) -> Intent {
    let lowered = content.trim().to_lowercase();
    let short = lowered.len() < 40;

    if short
        && ["what", "what?", "repeat", "again", "huh", "huh?", "come again"]
            .iter()
            .any(|kw| lowered.contains(kw))
    {
        return Intent::Clarification;
    }
    if short
        && ["skip", "move on", "next question", "next"]
            .iter()
            .any(|kw| lowered.contains(kw))
    {
        return Intent::MoveOn;
    }
    if ["don't know", "dont know", "no idea", "not sure at all"]
        .iter()
        .any(|kw| lowered.contains(kw))
    {
        return Intent::DontKnow;
    }
    if short
        && ["hi", "hello", "hey", "good morning", "good afternoon"]
            .iter()
            .any(|kw| lowered.starts_with(kw))
    {
        return Intent::Greeting;
    }

    let sig = signals::detect(content);
    if sig.has_code || content.len() >= 120 || sig.count() >= 1 {
        return Intent::Answering;
    }

    Intent::Thinking
}

/// Current hint level for a main question, derived from its scored
/// turns: starts at 0, and each weak turn after the first (i.e. once
/// follow-ups have begun) escalates by one, capped at 3.
pub fn hint_level(scores_on_question: &[TurnScore]) -> u8 {
    let weak = scores_on_question
        .iter()
        .skip(1)
        .filter(|s| s.rubric.mean() <= WEAK_TURN_THRESHOLD)
        .count();
    (weak as u8).min(HINT_MAX)
}

/// Cross-question behavioral patterns, rendered as one short paragraph
/// for the interviewer prompt. Needs at least two scored turns to say
/// anything.
pub fn detect_patterns(turn_signals: &[ContentSignals], state: &SkillState) -> Option<String> {
    if turn_signals.len() < 2 {
        return None;
    }
    let n = turn_signals.len();
    let count = |f: fn(&ContentSignals) -> bool| turn_signals.iter().filter(|s| f(s)).count();

    let mut phrases: Vec<String> = Vec::new();

    let complexity = count(|s| s.mentions_complexity);
    if complexity == n {
        phrases.push("consistently analyzes complexity".into());
    } else if complexity == 0 {
        phrases.push("never mentions complexity".into());
    } else if complexity * 2 >= n {
        phrases.push(format!("mentions complexity in {complexity}/{n} answers"));
    }

    let approach = count(|s| s.mentions_approach);
    if approach == n {
        phrases.push("always explains an approach before diving in".into());
    } else if approach == 0 {
        phrases.push("rarely outlines an approach first".into());
    }

    if count(|s| s.mentions_tradeoffs) == 0 {
        phrases.push("never discusses trade-offs".into());
    }

    if count(|s| s.has_code) * 2 >= n && state.ema.correctness_reasoning >= 7.5 {
        phrases.push("strong on coding".into());
    }

    if phrases.is_empty() {
        return None;
    }
    let mut out = format!("The candidate {}.", phrases.join("; "));
    if out.len() > 200 {
        out.truncate(197);
        out.push_str("...");
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepwire_core::types::Rubric;

    fn score(mean: u8) -> TurnScore {
        TurnScore {
            id: 0,
            session_id: "s".into(),
            message_id: 0,
            question_id: Some("q".into()),
            rubric: Rubric::uniform(mean),
            note: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn heuristic_clarification_and_move_on() {
        assert_eq!(heuristic_classify("what?"), Intent::Clarification);
        assert_eq!(heuristic_classify("huh"), Intent::Clarification);
        assert_eq!(heuristic_classify("can we skip this"), Intent::MoveOn);
        assert_eq!(heuristic_classify("next question please"), Intent::MoveOn);
    }

    #[test]
    fn heuristic_dont_know_beats_length() {
        assert_eq!(
            heuristic_classify("honestly I don't know where to even begin with this one"),
            Intent::DontKnow
        );
        assert_eq!(heuristic_classify("no idea"), Intent::DontKnow);
    }

    #[test]
    fn heuristic_answering_paths() {
        // Fenced code.
        assert_eq!(
            heuristic_classify("```rust\nfn main() {}\n```"),
            Intent::Answering
        );
        // Technical keyword.
        assert_eq!(
            heuristic_classify("I'd check the edge case of an empty list"),
            Intent::Answering
        );
        // Long free-form answer.
        let long = "so I believe the general shape of the thing we want here is \
                    something that processes every element exactly one time and then some";
        assert_eq!(heuristic_classify(long), Intent::Answering);
    }

    #[test]
    fn heuristic_defaults_to_thinking() {
        assert_eq!(heuristic_classify("hmm give me a moment"), Intent::Thinking);
    }

    #[test]
    fn heuristic_greeting() {
        assert_eq!(heuristic_classify("hello!"), Intent::Greeting);
    }

    #[test]
    fn hint_level_starts_at_zero_and_escalates() {
        assert_eq!(hint_level(&[]), 0);
        // First turn weak: follow-ups haven't begun, no escalation yet.
        assert_eq!(hint_level(&[score(3)]), 0);
        assert_eq!(hint_level(&[score(3), score(3)]), 1);
        assert_eq!(hint_level(&[score(3), score(3), score(4)]), 2);
        // Caps at 3 no matter how long the struggle.
        assert_eq!(
            hint_level(&[score(3), score(2), score(2), score(1), score(1)]),
            3
        );
        // A decent follow-up answer doesn't escalate.
        assert_eq!(hint_level(&[score(3), score(7)]), 0);
    }

    #[test]
    fn patterns_need_two_turns() {
        let sig = ContentSignals {
            mentions_complexity: true,
            ..Default::default()
        };
        assert!(detect_patterns(&[sig], &SkillState::default()).is_none());
    }

    #[test]
    fn patterns_report_consistent_habits() {
        let always = ContentSignals {
            mentions_complexity: true,
            mentions_approach: true,
            ..Default::default()
        };
        let out = detect_patterns(&[always, always, always], &SkillState::default()).unwrap();
        assert!(out.contains("consistently analyzes complexity"));
        assert!(out.contains("always explains an approach"));
        assert!(out.contains("never discusses trade-offs"));
        assert!(out.len() <= 200);
    }
}
