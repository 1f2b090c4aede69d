use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Role lanes a candidate can interview for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    SweIntern,
    SweEngineer,
    SeniorEngineer,
    Cybersecurity,
    DataScience,
    DevopsCloud,
    ProductManagement,
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SweIntern => "swe_intern",
            Self::SweEngineer => "swe_engineer",
            Self::SeniorEngineer => "senior_engineer",
            Self::Cybersecurity => "cybersecurity",
            Self::DataScience => "data_science",
            Self::DevopsCloud => "devops_cloud",
            Self::ProductManagement => "product_management",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Track {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "swe_intern" => Ok(Self::SweIntern),
            "swe_engineer" => Ok(Self::SweEngineer),
            "senior_engineer" => Ok(Self::SeniorEngineer),
            "cybersecurity" => Ok(Self::Cybersecurity),
            "data_science" => Ok(Self::DataScience),
            "devops_cloud" => Ok(Self::DevopsCloud),
            "product_management" => Ok(Self::ProductManagement),
            other => Err(format!("unknown track: {other}")),
        }
    }
}

/// Brand flavour of the interview. `General` is also the broadening
/// fallback when a brand-specific pool is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStyle {
    General,
    Amazon,
    Apple,
    Google,
    Microsoft,
    Meta,
}

impl std::fmt::Display for CompanyStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::General => "general",
            Self::Amazon => "amazon",
            Self::Apple => "apple",
            Self::Google => "google",
            Self::Microsoft => "microsoft",
            Self::Meta => "meta",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for CompanyStyle {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "amazon" => Ok(Self::Amazon),
            "apple" => Ok(Self::Apple),
            "google" => Ok(Self::Google),
            "microsoft" => Ok(Self::Microsoft),
            "meta" => Ok(Self::Meta),
            other => Err(format!("unknown company style: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// One step harder, saturating at `Hard`.
    pub fn step_up(self) -> Self {
        match self {
            Self::Easy => Self::Medium,
            Self::Medium | Self::Hard => Self::Hard,
        }
    }

    /// One step easier, saturating at `Easy`.
    pub fn step_down(self) -> Self {
        match self {
            Self::Hard => Self::Medium,
            Self::Medium | Self::Easy => Self::Easy,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Coding,
    SystemDesign,
    Behavioral,
    Conceptual,
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Coding => "coding",
            Self::SystemDesign => "system_design",
            Self::Behavioral => "behavioral",
            Self::Conceptual => "conceptual",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for QuestionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coding" => Ok(Self::Coding),
            "system_design" => Ok(Self::SystemDesign),
            "behavioral" => Ok(Self::Behavioral),
            "conceptual" => Ok(Self::Conceptual),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Lifecycle stage of an interview session.
///
/// `Evaluation` is an internal transient: only the finalizer moves a
/// session into it, and no student input is accepted while it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intro,
    Question,
    Followups,
    CandidateSolution,
    Wrapup,
    Evaluation,
    Done,
}

impl Stage {
    /// Whether a student turn may be ingested in this stage.
    pub fn accepts_student_input(self) -> bool {
        !matches!(self, Self::Evaluation | Self::Done)
    }

    /// Stages the finalizer may transition into `Evaluation` from.
    pub fn finalizable(self) -> bool {
        matches!(
            self,
            Self::Question | Self::Followups | Self::CandidateSolution | Self::Wrapup
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Intro => "intro",
            Self::Question => "question",
            Self::Followups => "followups",
            Self::CandidateSolution => "candidate_solution",
            Self::Wrapup => "wrapup",
            Self::Evaluation => "evaluation",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Stage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intro" => Ok(Self::Intro),
            "question" => Ok(Self::Question),
            "followups" => Ok(Self::Followups),
            "candidate_solution" => Ok(Self::CandidateSolution),
            "wrapup" => Ok(Self::Wrapup),
            "evaluation" => Ok(Self::Evaluation),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Interviewer,
    Student,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Interviewer => "interviewer",
            Self::Student => "student",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interviewer" => Ok(Self::Interviewer),
            "student" => Ok(Self::Student),
            "system" => Ok(Self::System),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// What the student is doing with their latest turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Answering,
    Clarification,
    MoveOn,
    DontKnow,
    Thinking,
    Greeting,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Answering => "answering",
            Self::Clarification => "clarification",
            Self::MoveOn => "move_on",
            Self::DontKnow => "dont_know",
            Self::Thinking => "thinking",
            Self::Greeting => "greeting",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Intent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "answering" => Ok(Self::Answering),
            "clarification" => Ok(Self::Clarification),
            "move_on" => Ok(Self::MoveOn),
            "dont_know" => Ok(Self::DontKnow),
            "thinking" => Ok(Self::Thinking),
            "greeting" => Ok(Self::Greeting),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

/// Optional qualitative tag in the final evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HireSignal {
    StrongYes,
    Yes,
    LeanYes,
    LeanNo,
    No,
    StrongNo,
}

impl std::fmt::Display for HireSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongYes => "strong_yes",
            Self::Yes => "yes",
            Self::LeanYes => "lean_yes",
            Self::LeanNo => "lean_no",
            Self::No => "no",
            Self::StrongNo => "strong_no",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for HireSignal {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strong_yes" => Ok(Self::StrongYes),
            "yes" => Ok(Self::Yes),
            "lean_yes" => Ok(Self::LeanYes),
            "lean_no" => Ok(Self::LeanNo),
            "no" => Ok(Self::No),
            "strong_no" => Ok(Self::StrongNo),
            other => Err(format!("unknown hire signal: {other}")),
        }
    }
}

/// The five scoring axes. Order here is the canonical iteration order
/// everywhere (prompts, persistence, reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricDim {
    Communication,
    ProblemSolving,
    CorrectnessReasoning,
    Complexity,
    EdgeCases,
}

impl RubricDim {
    pub const ALL: [RubricDim; 5] = [
        RubricDim::Communication,
        RubricDim::ProblemSolving,
        RubricDim::CorrectnessReasoning,
        RubricDim::Complexity,
        RubricDim::EdgeCases,
    ];

    /// Stable key used in JSON payloads and prompts.
    pub fn key(self) -> &'static str {
        match self {
            Self::Communication => "communication",
            Self::ProblemSolving => "problem_solving",
            Self::CorrectnessReasoning => "correctness_reasoning",
            Self::Complexity => "complexity",
            Self::EdgeCases => "edge_cases",
        }
    }

    /// Human label used in rubric definitions inside prompts.
    pub fn label(self) -> &'static str {
        match self {
            Self::Communication => "Communication",
            Self::ProblemSolving => "Problem solving",
            Self::CorrectnessReasoning => "Correctness & reasoning",
            Self::Complexity => "Complexity analysis",
            Self::EdgeCases => "Edge cases",
        }
    }
}

impl std::fmt::Display for RubricDim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Fixed-shape record keyed by the five rubric dimensions.
///
/// The shape is the schema: serialization always produces exactly the
/// five known keys, so nothing structural hides inside an open map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimMap<T> {
    pub communication: T,
    pub problem_solving: T,
    pub correctness_reasoning: T,
    pub complexity: T,
    pub edge_cases: T,
}

impl<T> DimMap<T> {
    pub fn get(&self, dim: RubricDim) -> &T {
        match dim {
            RubricDim::Communication => &self.communication,
            RubricDim::ProblemSolving => &self.problem_solving,
            RubricDim::CorrectnessReasoning => &self.correctness_reasoning,
            RubricDim::Complexity => &self.complexity,
            RubricDim::EdgeCases => &self.edge_cases,
        }
    }

    pub fn get_mut(&mut self, dim: RubricDim) -> &mut T {
        match dim {
            RubricDim::Communication => &mut self.communication,
            RubricDim::ProblemSolving => &mut self.problem_solving,
            RubricDim::CorrectnessReasoning => &mut self.correctness_reasoning,
            RubricDim::Complexity => &mut self.complexity,
            RubricDim::EdgeCases => &mut self.edge_cases,
        }
    }

    /// Build a map by evaluating `f` once per dimension.
    pub fn from_fn(mut f: impl FnMut(RubricDim) -> T) -> Self
    where
        T: Default,
    {
        let mut out = Self {
            communication: T::default(),
            problem_solving: T::default(),
            correctness_reasoning: T::default(),
            complexity: T::default(),
            edge_cases: T::default(),
        };
        for dim in RubricDim::ALL {
            *out.get_mut(dim) = f(dim);
        }
        out
    }
}

/// A per-turn (or final) rubric: integer scores 0–10 per dimension.
pub type Rubric = DimMap<u8>;

impl Rubric {
    /// Uniform rubric — used by the fallback evaluation.
    pub fn uniform(score: u8) -> Self {
        Self::from_fn(|_| score.min(10))
    }

    /// Clamp every dimension into [0, 10]. Idempotent.
    pub fn clamped(mut self) -> Self {
        for dim in RubricDim::ALL {
            let v = self.get_mut(dim);
            *v = (*v).min(10);
        }
        self
    }

    pub fn mean(&self) -> f64 {
        let sum: u32 = RubricDim::ALL.iter().map(|d| *self.get(*d) as u32).sum();
        sum as f64 / RubricDim::ALL.len() as f64
    }
}

/// Aggregate good/weak streak counters over scored turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    pub good: u32,
    pub weak: u32,
}

/// The persona the interviewer adopts for one session. Chosen at intro
/// and persisted inside `skill_state` so it survives restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewerProfile {
    pub name: String,
    pub style: String,
}

/// Fixed persona roster. Selection hashes the session id so the same
/// session always greets with the same interviewer.
const PERSONAS: [(&str, &str); 4] = [
    ("Cephas", "calm and methodical, favors precise follow-ups"),
    ("Mason", "direct and fast-paced, pushes on trade-offs"),
    ("Erica", "warm and encouraging, asks for concrete examples"),
    ("Maya", "curious and analytical, digs into edge cases"),
];

impl InterviewerProfile {
    pub fn pick(session_id: &str) -> Self {
        let digest = Sha256::digest(session_id.as_bytes());
        let idx = digest[0] as usize % PERSONAS.len();
        let (name, style) = PERSONAS[idx];
        Self {
            name: name.to_string(),
            style: style.to_string(),
        }
    }
}

/// Running per-session scoring state, persisted as one JSON column and
/// always written back by full replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillState {
    /// Count of scored responses, capped at 10 000.
    #[serde(default)]
    pub n: u32,
    /// Cumulative per-dimension totals, each capped at 1 000 000.
    #[serde(default)]
    pub sum: DimMap<u32>,
    /// Most recent per-turn score per dimension.
    #[serde(default)]
    pub last: DimMap<u8>,
    /// Exponential moving average per dimension, clamped to [0, 10].
    #[serde(default)]
    pub ema: DimMap<f64>,
    #[serde(default)]
    pub streak: Streaks,
    /// Tag → times a question carrying it has been asked.
    #[serde(default)]
    pub tags_seen: BTreeMap<String, u32>,
    /// Behavioral *main* questions asked so far (follow-ups excluded).
    #[serde(default)]
    pub behavioral_asked: u32,
    #[serde(default)]
    pub interviewer: Option<InterviewerProfile>,
}

impl SkillState {
    /// The dimension with the lowest EMA — the current weakness the
    /// selector targets. Ties resolve to the earliest dimension in
    /// canonical order.
    pub fn weakest_dim(&self) -> RubricDim {
        let mut weakest = RubricDim::Communication;
        let mut best = f64::MAX;
        for dim in RubricDim::ALL {
            let v = *self.ema.get(dim);
            if v < best {
                best = v;
                weakest = dim;
            }
        }
        weakest
    }
}

/// Narrative block of a final evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn enum_roundtrips() {
        for s in [
            "swe_intern",
            "senior_engineer",
            "product_management",
        ] {
            assert_eq!(Track::from_str(s).unwrap().to_string(), s);
        }
        for s in ["intro", "candidate_solution", "done"] {
            assert_eq!(Stage::from_str(s).unwrap().to_string(), s);
        }
        assert!(Track::from_str("barista").is_err());
        assert!(Stage::from_str("paused").is_err());
    }

    #[test]
    fn stage_gates() {
        assert!(Stage::Question.accepts_student_input());
        assert!(Stage::Wrapup.accepts_student_input());
        assert!(!Stage::Evaluation.accepts_student_input());
        assert!(!Stage::Done.accepts_student_input());

        assert!(Stage::Wrapup.finalizable());
        assert!(Stage::CandidateSolution.finalizable());
        assert!(!Stage::Intro.finalizable());
        assert!(!Stage::Done.finalizable());
    }

    #[test]
    fn difficulty_steps_saturate() {
        assert_eq!(Difficulty::Easy.step_up(), Difficulty::Medium);
        assert_eq!(Difficulty::Hard.step_up(), Difficulty::Hard);
        assert_eq!(Difficulty::Easy.step_down(), Difficulty::Easy);
        assert_eq!(Difficulty::Hard.step_down(), Difficulty::Medium);
    }

    #[test]
    fn rubric_clamp_is_idempotent() {
        let r = Rubric {
            communication: 14,
            problem_solving: 10,
            correctness_reasoning: 3,
            complexity: 0,
            edge_cases: 255,
        };
        let once = r.clone().clamped();
        assert_eq!(once.communication, 10);
        assert_eq!(once.edge_cases, 10);
        assert_eq!(once.correctness_reasoning, 3);
        assert_eq!(once.clone().clamped(), once);
    }

    #[test]
    fn rubric_mean() {
        let r = Rubric::uniform(8);
        assert!((r.mean() - 8.0).abs() < f64::EPSILON);
        let mixed = Rubric {
            communication: 10,
            problem_solving: 5,
            correctness_reasoning: 5,
            complexity: 5,
            edge_cases: 0,
        };
        assert!((mixed.mean() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn persona_pick_is_deterministic() {
        let a = InterviewerProfile::pick("0193e5c2-aaaa");
        let b = InterviewerProfile::pick("0193e5c2-aaaa");
        assert_eq!(a, b);
        assert!(["Cephas", "Mason", "Erica", "Maya"].contains(&a.name.as_str()));
    }

    #[test]
    fn weakest_dim_prefers_lowest_ema() {
        let mut state = SkillState::default();
        state.ema = DimMap::from_fn(|_| 6.0);
        state.ema.edge_cases = 2.5;
        assert_eq!(state.weakest_dim(), RubricDim::EdgeCases);
    }

    #[test]
    fn skill_state_roundtrips_json() {
        let mut state = SkillState::default();
        state.n = 3;
        state.tags_seen.insert("arrays".into(), 2);
        state.interviewer = Some(InterviewerProfile::pick("x"));
        let json = serde_json::to_string(&state).unwrap();
        let back: SkillState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
