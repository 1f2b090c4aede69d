//! Prompt assembly — pure functions of session state.
//!
//! Nothing here samples randomness or reads the clock: identical
//! inputs always produce identical prompts, which keeps turn handling
//! reproducible and the prompt layer trivially testable.

use prepwire_core::types::{CompanyStyle, InterviewerProfile, RubricDim, Stage};
use prepwire_store::types::Question;

/// Rubric definitions shared by the interviewer, quick-rubric and
/// evaluator prompts.
pub fn rubric_definitions() -> String {
    let mut out = String::from("Scoring rubric (each dimension 0-10):\n");
    for dim in RubricDim::ALL {
        let desc = match dim {
            RubricDim::Communication => "clarity, structure, and thinking out loud",
            RubricDim::ProblemSolving => "decomposition, strategy, and adaptability",
            RubricDim::CorrectnessReasoning => "soundness of the approach and the reasoning behind it",
            RubricDim::Complexity => "time/space analysis and optimisation awareness",
            RubricDim::EdgeCases => "boundary conditions, invalid input, and failure modes",
        };
        out.push_str(&format!("- {} ({}): {}\n", dim.label(), dim.key(), desc));
    }
    out
}

fn company_blurb(company: CompanyStyle) -> &'static str {
    match company {
        CompanyStyle::General => "a general big-tech interview style",
        CompanyStyle::Amazon => "Amazon's style: leadership principles, bar-raising follow-ups, customer obsession",
        CompanyStyle::Apple => "Apple's style: depth over breadth, polish, strong ownership of details",
        CompanyStyle::Google => "Google's style: analytical rigor, scalability, clean generalizable solutions",
        CompanyStyle::Microsoft => "Microsoft's style: collaborative problem solving and growth mindset",
        CompanyStyle::Meta => "Meta's style: speed, pragmatism, and impact focus",
    }
}

/// Inputs for the interviewer controller prompt.
pub struct InterviewerPromptInput<'a> {
    pub persona: &'a InterviewerProfile,
    pub company: CompanyStyle,
    pub role: &'a str,
    pub stage: Stage,
    pub current_question: Option<&'a Question>,
    pub hint_level: u8,
    pub patterns: Option<&'a str>,
    pub retrieval_context: Option<&'a str>,
    /// What the interviewer should do with this turn.
    pub directive: &'a str,
}

/// System prompt for the interviewer controller — persona, company
/// style, stage, rubric, observed patterns, hint directive, and the
/// optional retrieval paragraph, in a fixed order.
pub fn interviewer_system(input: &InterviewerPromptInput<'_>) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str(&format!(
        "You are {}, a technical interviewer. Your manner: {}.\n",
        input.persona.name, input.persona.style
    ));
    out.push_str(&format!(
        "You are running a mock interview for the role of {} in {}.\n",
        input.role,
        company_blurb(input.company)
    ));
    out.push_str(&format!("Current interview stage: {}.\n\n", input.stage));
    out.push_str(&rubric_definitions());

    if let Some(q) = input.current_question {
        out.push_str(&format!(
            "\nQuestion in play: {} — {}\n",
            q.title, q.prompt
        ));
    }

    if let Some(patterns) = input.patterns {
        out.push_str(&format!("\nObserved candidate patterns: {patterns}\n"));
    }

    if input.hint_level > 0 {
        out.push_str(&format!("\n{}\n", hint_directive(input.hint_level)));
    }

    if let Some(ctx) = input.retrieval_context {
        out.push_str(&format!(
            "\nBackground from prior practice data (for your calibration only): {ctx}\n"
        ));
    }

    out.push_str(&format!("\nThis turn: {}\n", input.directive));
    out.push_str(
        "\nConstraints: respond in at most 120 words, ask at most one question, \
         use no markdown formatting, and never reference other candidates, \
         sessions, or any background data.",
    );
    out
}

/// Scaffolding instruction for the current hint level.
pub fn hint_directive(level: u8) -> String {
    match level {
        0 => "Give no hints; keep the question open.".to_string(),
        1 => "Hint level 1: nudge indirectly by reframing the question; do not name a technique.".to_string(),
        2 => "Hint level 2: reveal the class of technique that applies, without applying it.".to_string(),
        _ => "Hint level 3: walk through the approach together step by step, \
              but never state the full solution outright."
            .to_string(),
    }
}

/// System prompt for the per-turn quick rubric.
pub fn quick_rubric_system() -> String {
    let mut out = rubric_definitions();
    out.push_str(
        "\nScore the candidate's latest answer only. Reply with a single JSON \
         object whose keys are exactly the five dimension keys mapped to \
         integers 0-10, plus an optional \"note\" key with one short sentence. \
         No other text.",
    );
    out
}

/// User prompt for the quick rubric: the question and the answer.
pub fn quick_rubric_user(question: Option<&Question>, answer: &str) -> String {
    match question {
        Some(q) => format!("Question: {}\n\nCandidate answer:\n{answer}", q.prompt),
        None => format!("Candidate answer:\n{answer}"),
    }
}

/// System prompt for the final evaluator.
pub fn evaluator_system() -> String {
    let mut out = String::from(
        "You are grading a completed mock technical interview. Be specific and \
         calibrated; an average performance scores near 60.\n\n",
    );
    out.push_str(&rubric_definitions());
    out.push_str(
        "\nReply with a single JSON object with keys: \"overall_score\" (integer \
         0-100), \"rubric\" (object of the five dimension keys to integers 0-10), \
         \"strengths\", \"weaknesses\", \"next_steps\" (arrays of short strings), \
         and optionally \"hire_signal\" (one of strong_yes, yes, lean_yes, \
         lean_no, no, strong_no) and \"patterns\" (one short sentence). \
         No other text.",
    );
    out
}

/// User prompt for the final evaluator: asked questions, transcript,
/// and optional retrieval examples.
pub fn evaluator_user(
    questions: &[Question],
    transcript: &str,
    retrieval_context: Option<&str>,
) -> String {
    let mut out = String::with_capacity(transcript.len() + 512);
    out.push_str("Questions asked:\n");
    for (i, q) in questions.iter().enumerate() {
        out.push_str(&format!("{}. [{}] {}\n", i + 1, q.question_type, q.title));
    }
    if let Some(ctx) = retrieval_context {
        out.push_str(&format!(
            "\nCalibration reference from comparable sessions: {ctx}\n"
        ));
    }
    out.push_str("\nFull transcript:\n");
    out.push_str(transcript);
    out
}

/// System prompt for the intent classifier.
pub fn intent_classifier_system() -> String {
    "Classify the candidate's latest message in a technical interview. Reply \
     with one JSON object: {\"intent\": one of answering, clarification, \
     move_on, dont_know, thinking, greeting; \"confidence\": 0.0-1.0; \
     \"reasoning\": one short sentence}. No other text."
        .to_string()
}

/// Deterministic warmup greeting — the first interviewer turn.
pub fn greeting(persona: &InterviewerProfile, company: CompanyStyle, role: &str) -> String {
    let company_part = match company {
        CompanyStyle::General => "a general technical".to_string(),
        other => format!("a {}-style", company_label(other)),
    };
    format!(
        "Hi, I'm {} — I'll be your interviewer today. We'll run {} interview \
         for the {} role. We'll work through a few questions together; think \
         out loud as much as you can, and feel free to ask for clarification. \
         Ready when you are — tell me a bit about yourself to get us started.",
        persona.name, company_part, role
    )
}

fn company_label(company: CompanyStyle) -> &'static str {
    match company {
        CompanyStyle::General => "General",
        CompanyStyle::Amazon => "Amazon",
        CompanyStyle::Apple => "Apple",
        CompanyStyle::Google => "Google",
        CompanyStyle::Microsoft => "Microsoft",
        CompanyStyle::Meta => "Meta",
    }
}

/// Deterministic presentation of a newly selected question. Question
/// text goes out verbatim so a retried turn poses exactly the same
/// problem.
pub fn present_question_message(question: &Question) -> String {
    format!(
        "Alright, let's work on this one. {}: {}",
        question.title, question.prompt
    )
}

/// Directive for a follow-up probing what the answer was missing.
pub fn followup_directive(missing: &[&str], scripted: Option<&str>) -> String {
    if let Some(scripted) = scripted {
        return format!("Ask this follow-up next: \"{scripted}\"");
    }
    if missing.is_empty() {
        "Ask one follow-up that probes deeper into the weakest part of the answer.".to_string()
    } else {
        format!(
            "The answer did not cover: {}. Ask one follow-up that asks \
             specifically for the most important missing element.",
            missing.join(", ")
        )
    }
}

/// The wrap-up advisory posted when the question pool is exhausted.
pub fn wrapup_message(persona: &InterviewerProfile) -> String {
    format!(
        "That's everything I wanted to cover — thanks for working through it \
         with me. I'm {} , and it's been a pleasure. Any final thoughts before \
         we close out? When you're ready, finish the session to get your \
         evaluation.",
        persona.name
    )
}

/// Closing line after the candidate's wrap-up acknowledgement.
pub fn closing_message() -> String {
    "Thanks! We're all wrapped up — finish the session whenever you like to \
     see your detailed evaluation."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepwire_core::types::{Difficulty, QuestionType, Track};

    fn sample_question() -> Question {
        Question {
            id: "q1".into(),
            track: Track::SweIntern,
            company: CompanyStyle::Google,
            difficulty: Difficulty::Medium,
            title: "Two sum".into(),
            prompt: "Given an array, find two numbers adding to a target.".into(),
            tags: vec!["arrays".into()],
            question_type: QuestionType::Coding,
            followups: vec![],
            meta: serde_json::json!({}),
            created_at: String::new(),
        }
    }

    #[test]
    fn interviewer_prompt_is_deterministic() {
        let persona = InterviewerProfile::pick("session-1");
        let q = sample_question();
        let input = InterviewerPromptInput {
            persona: &persona,
            company: CompanyStyle::Google,
            role: "SWE Intern",
            stage: Stage::Question,
            current_question: Some(&q),
            hint_level: 2,
            patterns: Some("rarely discusses trade-offs"),
            retrieval_context: None,
            directive: "Respond to the candidate's answer.",
        };
        let a = interviewer_system(&input);
        let b = interviewer_system(&input);
        assert_eq!(a, b);
        assert!(a.contains(&persona.name));
        assert!(a.contains("Google"));
        assert!(a.contains("120 words"));
        assert!(a.contains("class of technique"));
        assert!(a.contains("rarely discusses trade-offs"));
    }

    #[test]
    fn hint_directives_escalate_without_revealing() {
        assert!(hint_directive(1).contains("reframing"));
        assert!(hint_directive(2).contains("class of technique"));
        let l3 = hint_directive(3);
        assert!(l3.contains("never state the full solution"));
    }

    #[test]
    fn greeting_names_persona_and_company() {
        let persona = InterviewerProfile::pick("abc");
        let g = greeting(&persona, CompanyStyle::Google, "SWE Intern");
        assert!(g.contains(&persona.name));
        assert!(g.contains("Google"));
        assert!(g.contains("SWE Intern"));
    }

    #[test]
    fn rubric_definitions_cover_all_dims() {
        let defs = rubric_definitions();
        for dim in RubricDim::ALL {
            assert!(defs.contains(dim.key()));
        }
    }

    #[test]
    fn followup_directive_prefers_scripted() {
        let d = followup_directive(&["complexity"], Some("What is the runtime?"));
        assert!(d.contains("What is the runtime?"));
        let d = followup_directive(&["complexity", "edge cases"], None);
        assert!(d.contains("complexity, edge cases"));
    }
}
