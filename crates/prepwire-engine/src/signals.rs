//! Content-signal detection over student messages.
//!
//! A fixed set of regexes tags each turn with what the answer actually
//! covered; the engine combines low signal counts with short length to
//! decide when a follow-up should ask for the missing element.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use prepwire_core::types::QuestionType;

/// Answers shorter than this with little signal get a follow-up.
pub const SHORT_ANSWER_CHARS: usize = 160;

/// Flags describing what a student turn touched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentSignals {
    pub has_code: bool,
    pub mentions_complexity: bool,
    pub mentions_edge_cases: bool,
    pub mentions_constraints: bool,
    pub mentions_approach: bool,
    pub mentions_tradeoffs: bool,
    pub mentions_correctness: bool,
    pub mentions_tests: bool,
}

impl ContentSignals {
    pub fn count(&self) -> usize {
        [
            self.has_code,
            self.mentions_complexity,
            self.mentions_edge_cases,
            self.mentions_constraints,
            self.mentions_approach,
            self.mentions_tradeoffs,
            self.mentions_correctness,
            self.mentions_tests,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

struct SignalPatterns {
    code: Regex,
    complexity: Regex,
    edge_cases: Regex,
    constraints: Regex,
    approach: Regex,
    tradeoffs: Regex,
    correctness: Regex,
    tests: Regex,
}

fn patterns() -> &'static SignalPatterns {
    static PATTERNS: OnceLock<SignalPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SignalPatterns {
        code: Regex::new(r"```").expect("static regex"),
        complexity: Regex::new(r"(?i)\bO\(|big[- ]o|time complexity|space complexity|logarithmic|linear time|quadratic")
            .expect("static regex"),
        edge_cases: Regex::new(r"(?i)edge case|corner case|boundary|empty (input|list|array|string)|null|overflow|off[- ]by[- ]one")
            .expect("static regex"),
        constraints: Regex::new(r"(?i)constraint|assumption|assume|requirement|within (memory|time)|limit")
            .expect("static regex"),
        approach: Regex::new(r"(?i)\bapproach\b|first,? (i|we)|my plan|i would start|strategy|step one|let'?s break")
            .expect("static regex"),
        tradeoffs: Regex::new(r"(?i)trade[- ]?off|on the other hand|alternative|versus|instead of|downside|at the cost")
            .expect("static regex"),
        correctness: Regex::new(r"(?i)correct|invariant|proof|guarantee|always holds|terminates")
            .expect("static regex"),
        tests: Regex::new(r"(?i)\btest(s|ing|case)?\b|unit test|verify with|sanity check")
            .expect("static regex"),
    })
}

/// Tag one message with its content signals.
pub fn detect(content: &str) -> ContentSignals {
    let p = patterns();
    ContentSignals {
        has_code: p.code.is_match(content),
        mentions_complexity: p.complexity.is_match(content),
        mentions_edge_cases: p.edge_cases.is_match(content),
        mentions_constraints: p.constraints.is_match(content),
        mentions_approach: p.approach.is_match(content),
        mentions_tradeoffs: p.tradeoffs.is_match(content),
        mentions_correctness: p.correctness.is_match(content),
        mentions_tests: p.tests.is_match(content),
    }
}

/// Elements a follow-up should ask for, given the question type and
/// what the answer covered. Empty means the answer touched everything
/// the type expects.
pub fn missing_elements(question_type: QuestionType, signals: &ContentSignals) -> Vec<&'static str> {
    let mut missing = Vec::new();
    match question_type {
        QuestionType::Coding => {
            if !signals.mentions_approach && !signals.has_code {
                missing.push("your overall approach");
            }
            if !signals.mentions_complexity {
                missing.push("time and space complexity");
            }
            if !signals.mentions_edge_cases {
                missing.push("edge cases");
            }
        }
        QuestionType::SystemDesign => {
            if !signals.mentions_constraints {
                missing.push("requirements and constraints");
            }
            if !signals.mentions_tradeoffs {
                missing.push("trade-offs between alternatives");
            }
            if !signals.mentions_approach {
                missing.push("your high-level design");
            }
        }
        QuestionType::Behavioral => {
            // Behavioral answers are judged by the rubric, not regexes.
        }
        QuestionType::Conceptual => {
            if !signals.mentions_correctness {
                missing.push("the reasoning behind your answer");
            }
        }
    }
    missing
}

/// Whether the turn is thin enough to warrant a follow-up on its own:
/// little signal and a short answer.
pub fn is_low_signal(content: &str, signals: &ContentSignals) -> bool {
    signals.count() <= 1 && content.len() < SHORT_ANSWER_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_code_fences_and_complexity() {
        let s = detect("Here's my solution:\n```python\nfor x in xs: ...\n```\nIt runs in O(n) time.");
        assert!(s.has_code);
        assert!(s.mentions_complexity);
        assert!(!s.mentions_tradeoffs);
    }

    #[test]
    fn detects_edge_cases_and_tests() {
        let s = detect("I'd watch for the empty array and off-by-one errors, then add unit tests.");
        assert!(s.mentions_edge_cases);
        assert!(s.mentions_tests);
    }

    #[test]
    fn detects_tradeoffs_and_constraints() {
        let s = detect(
            "Assuming we must stay within memory limits, a bloom filter is a \
             trade-off between accuracy and space.",
        );
        assert!(s.mentions_constraints);
        assert!(s.mentions_tradeoffs);
    }

    #[test]
    fn plain_chatter_has_no_signal() {
        let s = detect("hmm okay let me think about that for a second");
        assert_eq!(s.count(), 0);
        assert!(is_low_signal("hmm okay", &s));
    }

    #[test]
    fn long_answers_are_not_low_signal() {
        let content = "a".repeat(SHORT_ANSWER_CHARS + 1);
        let s = detect(&content);
        assert!(!is_low_signal(&content, &s));
    }

    #[test]
    fn missing_elements_follow_question_type() {
        let s = detect("I'd use a hash map as my approach.");
        let missing = missing_elements(QuestionType::Coding, &s);
        assert!(missing.contains(&"time and space complexity"));
        assert!(missing.contains(&"edge cases"));
        assert!(!missing.contains(&"your overall approach"));

        let missing = missing_elements(QuestionType::Behavioral, &s);
        assert!(missing.is_empty());
    }
}
