//! The interview engine: session lifecycle and the per-turn state
//! machine that stitches the classifier, selector, skill tracker,
//! prompt layer and LLM client together.
//!
//! Concurrency discipline: any await may suspend this handler while a
//! peer mutates the same session, so the engine re-reads the session
//! after suspension points before mutating, and all counter/stage
//! mutations go through the store's conditional writes.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use prepwire_core::config::PrepwireConfig;
use prepwire_core::types::{
    CompanyStyle, Difficulty, Intent, InterviewerProfile, MessageRole, Rubric, RubricDim, Stage,
    Track,
};
use prepwire_core::{PrepwireError, Result};
use prepwire_llm::{ChatMessage, ChatRole, HealthSnapshot, LlmClient};
use prepwire_rag::{Indexer, Retriever};
use prepwire_store::rag::NewSessionFeedback;
use prepwire_store::sessions::NewSession;
use prepwire_store::types::{InterviewSession, Question, StoredMessage};
use prepwire_store::Store;

use crate::intent::{self, IntentClassifier};
use crate::prompts::{self, InterviewerPromptInput};
use crate::selector::QuestionSelector;
use crate::signals;
use crate::skills;
use crate::{DEDUP_WINDOW_SECS, FOLLOWUP_QUALITY_THRESHOLD};

/// Inputs for creating a session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub role: String,
    pub track: Track,
    pub company: CompanyStyle,
    pub difficulty: Difficulty,
    pub behavioral_target: Option<u32>,
}

struct RateWindow {
    bucket: i64,
    count: u32,
}

pub struct InterviewEngine {
    pub(crate) store: Arc<Store>,
    pub(crate) llm: Arc<LlmClient>,
    pub(crate) retriever: Arc<Retriever>,
    pub(crate) indexer: Arc<Indexer>,
    pub(crate) config: PrepwireConfig,
    selector: QuestionSelector,
    classifier: IntentClassifier,
    /// Per-session fixed-window counters for the turn rate cap.
    rate: DashMap<String, RateWindow>,
    /// Consecutive LLM failures per session — feeds the finalizer's
    /// fallback decision.
    pub(crate) ai_failures: DashMap<String, u32>,
}

impl InterviewEngine {
    pub fn new(
        store: Arc<Store>,
        llm: Arc<LlmClient>,
        retriever: Arc<Retriever>,
        indexer: Arc<Indexer>,
        config: PrepwireConfig,
    ) -> Self {
        Self {
            selector: QuestionSelector::new(Arc::clone(&store)),
            classifier: IntentClassifier::new(Arc::clone(&llm)),
            store,
            llm,
            retriever,
            indexer,
            config,
            rate: DashMap::new(),
            ai_failures: DashMap::new(),
        }
    }

    /// Health beacon snapshot for the status endpoint.
    pub fn ai_status(&self) -> HealthSnapshot {
        self.llm.health().snapshot()
    }

    /// Create a session in stage `intro`, with the behavioral target
    /// silently capped and the interviewer persona pinned.
    #[instrument(skip(self, req), fields(user_id = %req.user_id, track = %req.track))]
    pub fn create_session(&self, req: &CreateSessionRequest) -> Result<InterviewSession> {
        let role = req.role.trim();
        if role.is_empty() {
            return Err(PrepwireError::Validation("role must not be empty".into()));
        }
        self.ensure_pool_exists(req)?;

        let interview = &self.config.interview;
        let behavioral_cap = interview.max_questions.saturating_sub(2);
        let behavioral_target = req
            .behavioral_target
            .unwrap_or(interview.default_behavioral_target)
            .min(behavioral_cap);

        let mut session = self.store.create_session(&NewSession {
            user_id: req.user_id.clone(),
            role: role.to_string(),
            track: req.track,
            company: req.company,
            difficulty: req.difficulty,
            max_questions: interview.max_questions,
            max_followups_per_question: interview.max_followups_per_question,
            behavioral_target,
            skill_state: Default::default(),
        })?;

        // Pin the persona now so every later turn (and restart) greets
        // with the same interviewer.
        session.skill_state.interviewer = Some(InterviewerProfile::pick(&session.id));
        self.store
            .replace_skill_state(&session.id, &session.skill_state)?;

        info!(session_id = %session.id, behavioral_target, "session created");
        Ok(session)
    }

    /// The no-questions guard at creation: some pool must exist for
    /// the chosen track, after company/difficulty broadening.
    fn ensure_pool_exists(&self, req: &CreateSessionRequest) -> Result<()> {
        use prepwire_store::types::QuestionFilter;
        let filters = [
            QuestionFilter {
                track: req.track,
                company: Some(req.company),
                difficulty: Some(req.difficulty),
                question_type: None,
            },
            QuestionFilter {
                track: req.track,
                company: Some(CompanyStyle::General),
                difficulty: None,
                question_type: None,
            },
            QuestionFilter {
                track: req.track,
                company: None,
                difficulty: None,
                question_type: None,
            },
        ];
        for filter in &filters {
            if self.store.count_pool(filter)? > 0 {
                return Ok(());
            }
        }
        Err(PrepwireError::Validation(format!(
            "no questions available for track {}",
            req.track
        )))
    }

    /// Return the opening interviewer message, writing it on first
    /// call. Calling start twice returns the same greeting.
    #[instrument(skip(self))]
    pub fn start_session(&self, user_id: &str, session_id: &str) -> Result<StoredMessage> {
        let session = self.store.get_session(user_id, session_id)?;

        if let Some(greeting) = self
            .store
            .all_messages(session_id)?
            .into_iter()
            .find(|m| m.role == MessageRole::Interviewer)
        {
            return Ok(greeting);
        }

        if session.stage != Stage::Intro {
            return Err(invalid_stage(session.stage, "start"));
        }

        let persona = persona_of(&session);
        let greeting = prompts::greeting(&persona, session.company, &session.role);
        let stored = self.append_interviewer(&session.id, &greeting, None)?;
        info!(session_id, persona = %persona.name, "session started");
        Ok(stored)
    }

    /// Handle one student turn end to end, bounded by the global turn
    /// timeout. On timeout the session is left in its prior stage.
    pub async fn send_message(
        &self,
        user_id: &str,
        session_id: &str,
        content: &str,
    ) -> Result<StoredMessage> {
        let secs = self.config.interview.turn_timeout_secs;
        match tokio::time::timeout(
            Duration::from_secs(secs),
            self.handle_turn(user_id, session_id, content),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PrepwireError::AiTimeout { secs }),
        }
    }

    #[instrument(skip(self, content))]
    async fn handle_turn(
        &self,
        user_id: &str,
        session_id: &str,
        content: &str,
    ) -> Result<StoredMessage> {
        let content = sanitize_student_message(content, self.config.limits.message_max_chars)?;

        let session = self.store.get_session(user_id, session_id)?;
        if !session.stage.accepts_student_input() {
            return Err(invalid_stage(session.stage, "send_message"));
        }

        // One acknowledgement turn is allowed in wrapup; everything
        // after that is refused before any mutation.
        let transcript = self.store.all_messages(session_id)?;
        if session.stage == Stage::Wrapup && wrapup_ack_used(&transcript) {
            return Err(invalid_stage(session.stage, "send_message"));
        }

        // An identical consecutive student message within the dedup
        // window is a retry of the same turn, not a new turn: reuse the
        // stored row and do not charge the rate budget.
        let student_msg = match duplicate_of(transcript.last(), &content) {
            Some(existing) => existing,
            None => {
                self.check_rate(session_id)?;
                self.store.append_message(
                    session_id,
                    MessageRole::Student,
                    &content,
                    session.current_question_id.as_deref(),
                )?
            }
        };

        match session.stage {
            Stage::Intro => self.handle_intro_turn(&session).await,
            Stage::Wrapup => self.handle_wrapup_ack(&session),
            Stage::Question | Stage::Followups | Stage::CandidateSolution => {
                self.handle_question_turn(&session, &student_msg).await
            }
            Stage::Evaluation | Stage::Done => unreachable!("gated above"),
        }
    }

    /// First student turn: pick the opening question and move to
    /// `question`.
    async fn handle_intro_turn(&self, session: &InterviewSession) -> Result<StoredMessage> {
        // Re-read: a parallel intro turn may have advanced already.
        let fresh = self.store.get_session(&session.user_id, &session.id)?;
        if fresh.stage != Stage::Intro {
            if let Some(reply) = self
                .store
                .last_message_by_role(&session.id, MessageRole::Interviewer)?
            {
                return Ok(reply);
            }
        }

        match self.selector.select_next(&fresh)? {
            Some(question) => {
                if !self
                    .store
                    .advance_question_count(&fresh.id, fresh.questions_asked_count)?
                {
                    // A parallel intro turn won; reuse its question.
                    let peer = self.store.get_session(&fresh.user_id, &fresh.id)?;
                    if let Some(qid) = peer.current_question_id.as_deref() {
                        let question = self.store.get_question(qid)?;
                        let reply = prompts::present_question_message(&question);
                        return self.append_interviewer(&peer.id, &reply, Some(qid));
                    }
                }
                self.commit_new_question(&fresh, &question)?;
                self.store
                    .cas_stage(&fresh.id, &[Stage::Intro], Stage::Question)?;
                let reply = prompts::present_question_message(&question);
                self.append_interviewer(&fresh.id, &reply, Some(&question.id))
            }
            None => self.enter_wrapup(&fresh, &[Stage::Intro]),
        }
    }

    /// The acknowledgement turn in wrapup gets one closing line.
    fn handle_wrapup_ack(&self, session: &InterviewSession) -> Result<StoredMessage> {
        self.append_interviewer(&session.id, &prompts::closing_message(), None)
    }

    /// A turn in question/followups/candidate_solution: classify, then
    /// either restate, advance, or score-and-respond.
    async fn handle_question_turn(
        &self,
        session: &InterviewSession,
        student_msg: &StoredMessage,
    ) -> Result<StoredMessage> {
        let classification = self.classifier.classify(&student_msg.content).await;
        debug!(
            intent = %classification.intent,
            confidence = classification.confidence,
            source = ?classification.source,
            "turn classified"
        );

        // Re-read after the classifier await before mutating anything.
        let session = self.store.get_session(&session.user_id, &session.id)?;
        let current_question = match session.current_question_id.as_deref() {
            Some(qid) => Some(self.store.get_question(qid)?),
            None => None,
        };

        match classification.intent {
            Intent::Clarification => self.restate_question(&session, current_question.as_ref()),
            Intent::MoveOn | Intent::DontKnow => self.advance_question(&session).await,
            Intent::Answering | Intent::Thinking | Intent::Greeting => {
                self.score_and_respond(&session, student_msg, current_question.as_ref())
                    .await
            }
        }
    }

    /// Clarification: restate the question with no scoring and no
    /// counter movement.
    fn restate_question(
        &self,
        session: &InterviewSession,
        question: Option<&Question>,
    ) -> Result<StoredMessage> {
        let reply = match question {
            Some(q) => format!("Of course — here's the question again: {}", q.prompt),
            // No question in play: repeat the last interviewer line.
            None => self
                .store
                .last_message_by_role(&session.id, MessageRole::Interviewer)?
                .map(|m| m.content)
                .unwrap_or_else(|| "Take your time — the question stands.".to_string()),
        };
        self.append_interviewer(
            &session.id,
            &reply,
            session.current_question_id.as_deref(),
        )
    }

    /// The scored path: quick rubric, skill-state update, then either
    /// a follow-up or an advance to the next question.
    async fn score_and_respond(
        &self,
        session: &InterviewSession,
        student_msg: &StoredMessage,
        current_question: Option<&Question>,
    ) -> Result<StoredMessage> {
        let turn_signals = signals::detect(&student_msg.content);

        // A retried turn may already be scored; never score a message
        // twice (skill_state.n advances by exactly one per turn).
        let prior_scores = self.store.turn_scores(&session.id)?;
        let already = prior_scores
            .iter()
            .find(|s| s.message_id == student_msg.id)
            .cloned();

        let rubric = match already {
            Some(existing) => Some(existing.rubric),
            None => self.score_turn(session, student_msg, current_question).await?,
        };

        // Re-read after the scoring await; counters may have moved.
        let session = self.store.get_session(&session.user_id, &session.id)?;

        let quality = rubric.as_ref().map(|r| r.mean());
        let missing = current_question
            .map(|q| signals::missing_elements(q.question_type, &turn_signals))
            .unwrap_or_default();
        let low_signal = signals::is_low_signal(&student_msg.content, &turn_signals);

        let wants_followup = session.followups_used < session.max_followups_per_question
            && (quality.is_some_and(|q| q < FOLLOWUP_QUALITY_THRESHOLD)
                || !missing.is_empty()
                || low_signal);

        if wants_followup {
            self.follow_up(&session, student_msg, current_question, &missing)
                .await
        } else {
            self.advance_question(&session).await
        }
    }

    /// Call the quick rubric and fold it into the skill state. A parse
    /// failure skips scoring for the turn; a transport failure fails
    /// the turn so the caller can retry.
    async fn score_turn(
        &self,
        session: &InterviewSession,
        student_msg: &StoredMessage,
        current_question: Option<&Question>,
    ) -> Result<Option<Rubric>> {
        let system = prompts::quick_rubric_system();
        let user = prompts::quick_rubric_user(current_question, &student_msg.content);

        let obj = match self.llm.chat_json(&system, &user, &[]).await {
            Ok(obj) => obj,
            Err(prepwire_llm::LlmError::InvalidJson) => {
                warn!(session_id = %session.id, "quick rubric unparseable, skipping skill update");
                return Ok(None);
            }
            Err(e) => {
                self.note_ai_failure(&session.id);
                return Err(e.into());
            }
        };
        self.note_ai_ok(&session.id);

        let rubric = rubric_from_json(&obj);
        let note = obj.get("note").and_then(|v| v.as_str());

        self.store.insert_turn_score(
            &session.id,
            student_msg.id,
            session.current_question_id.as_deref(),
            &rubric,
            note,
        )?;

        // Full replacement write, computed from a fresh read.
        let mut fresh = self.store.get_session(&session.user_id, &session.id)?;
        skills::apply_turn(
            &mut fresh.skill_state,
            &rubric,
            self.config.interview.ema_alpha,
        );
        self.store
            .replace_skill_state(&fresh.id, &fresh.skill_state)?;

        // A fenced solution moves the dialogue into the candidate
        // solution phase for this question.
        if signals::detect(&student_msg.content).has_code {
            self.store.cas_stage(
                &fresh.id,
                &[Stage::Question, Stage::Followups],
                Stage::CandidateSolution,
            )?;
        }

        Ok(Some(rubric))
    }

    /// Generate a probing follow-up on the current question.
    async fn follow_up(
        &self,
        session: &InterviewSession,
        student_msg: &StoredMessage,
        current_question: Option<&Question>,
        missing: &[&str],
    ) -> Result<StoredMessage> {
        let followups_used = session.followups_used + 1;
        self.store
            .set_followups_used(&session.id, followups_used)?;
        self.store.cas_stage(
            &session.id,
            &[Stage::Question],
            Stage::Followups,
        )?;

        let scripted = current_question.and_then(|q| {
            q.followups
                .get((followups_used - 1) as usize)
                .map(|s| s.as_str())
        });
        let directive = prompts::followup_directive(missing, scripted);

        let scores_on_question = self.scores_for_current_question(session)?;
        let hint_level = intent::hint_level(&scores_on_question);
        let reply = self
            .interviewer_reply(session, current_question, hint_level, &directive, &student_msg.content)
            .await?;

        self.append_interviewer(
            &session.id,
            &reply,
            session.current_question_id.as_deref(),
        )
    }

    /// Advance: adaptive difficulty, next question (or wrapup when the
    /// pool is dry), and a conditional counter bump so two handlers
    /// never advance the same session twice.
    async fn advance_question(&self, session: &InterviewSession) -> Result<StoredMessage> {
        let from_stages = [Stage::Question, Stage::Followups, Stage::CandidateSolution];

        // Difficulty is reconsidered once per advance.
        let proposed = skills::propose_difficulty(
            &session.skill_state,
            session.difficulty_current,
            session.difficulty_ceiling,
        );
        if proposed != session.difficulty_current {
            info!(session_id = %session.id, from = %session.difficulty_current, to = %proposed, "adaptive difficulty step");
            self.store.set_difficulty_current(&session.id, proposed)?;
        }

        let fresh = self.store.get_session(&session.user_id, &session.id)?;
        if fresh.questions_asked_count >= fresh.max_questions {
            return self.enter_wrapup(&fresh, &from_stages);
        }

        let Some(question) = self.selector.select_next(&fresh)? else {
            return self.enter_wrapup(&fresh, &from_stages);
        };

        // Conditional bump: losing means a peer advanced first, so
        // adopt its question instead of asking a second one.
        if !self
            .store
            .advance_question_count(&fresh.id, fresh.questions_asked_count)?
        {
            let peer = self.store.get_session(&fresh.user_id, &fresh.id)?;
            if let Some(qid) = peer.current_question_id.as_deref() {
                if peer.current_question_id != session.current_question_id {
                    let question = self.store.get_question(qid)?;
                    let reply = prompts::present_question_message(&question);
                    return self.append_interviewer(&peer.id, &reply, Some(qid));
                }
            }
            return self.enter_wrapup(&peer, &from_stages);
        }

        self.commit_new_question(&fresh, &question)?;
        self.store
            .cas_stage(&fresh.id, &from_stages, Stage::Question)?;
        let reply = prompts::present_question_message(&question);
        self.append_interviewer(&fresh.id, &reply, Some(&question.id))
    }

    /// Record a newly selected main question everywhere it must exist:
    /// the session linkage, the user's seen set, the session pointer,
    /// and the skill-state tag/behavioral counters.
    fn commit_new_question(&self, session: &InterviewSession, question: &Question) -> Result<()> {
        let fresh = self.store.get_session(&session.user_id, &session.id)?;
        let position = fresh.questions_asked_count.saturating_sub(1);
        self.store
            .add_session_question(&session.id, &question.id, position)?;
        self.store
            .mark_question_seen(&session.user_id, &question.id)?;
        self.store
            .set_current_question(&session.id, Some(&question.id))?;

        let mut state = fresh.skill_state;
        skills::note_question_asked(&mut state, question);
        self.store.replace_skill_state(&session.id, &state)?;

        info!(session_id = %session.id, question_id = %question.id, position, "question asked");
        Ok(())
    }

    /// Pool exhausted (or question budget spent): one advisory message
    /// and the session waits in wrapup for finalization.
    fn enter_wrapup(
        &self,
        session: &InterviewSession,
        from_stages: &[Stage],
    ) -> Result<StoredMessage> {
        let moved = self
            .store
            .cas_stage(&session.id, from_stages, Stage::Wrapup)?;
        self.store.set_current_question(&session.id, None)?;
        if moved {
            info!(session_id = %session.id, "entering wrapup");
            let advisory = prompts::wrapup_message(&persona_of(session));
            self.append_interviewer(&session.id, &advisory, None)
        } else {
            // A peer posted the advisory; hand back its message.
            self.store
                .last_message_by_role(&session.id, MessageRole::Interviewer)?
                .ok_or_else(|| PrepwireError::Internal("wrapup without advisory".into()))
        }
    }

    /// One interviewer-controller LLM call with the full prompt stack;
    /// degrades to the deterministic fallback only after scoring has
    /// already been persisted.
    async fn interviewer_reply(
        &self,
        session: &InterviewSession,
        current_question: Option<&Question>,
        hint_level: u8,
        directive: &str,
        student_content: &str,
    ) -> Result<String> {
        let recent = self
            .store
            .recent_messages(&session.id, self.config.limits.recent_messages)?;
        let history = chat_history(&recent, student_content);

        let patterns = self.session_patterns(session)?;
        let transcript = prepwire_rag::indexer::render_transcript(&recent, 4_000);
        let retrieval_context = self
            .retriever
            .build_context(&session.id, &transcript, current_question)
            .await;

        let input = InterviewerPromptInput {
            persona: &persona_of(session),
            company: session.company,
            role: &session.role,
            stage: session.stage,
            current_question,
            hint_level,
            patterns: patterns.as_deref(),
            retrieval_context: retrieval_context.as_deref(),
            directive,
        };
        let system = prompts::interviewer_system(&input);

        match self.llm.chat(&system, student_content, &history).await {
            Ok(reply) => {
                self.note_ai_ok(&session.id);
                Ok(reply)
            }
            Err(e) => {
                self.note_ai_failure(&session.id);
                warn!(session_id = %session.id, error = %e, "interviewer reply failed, using deterministic fallback");
                Ok(
                    "Let's dig a little deeper — can you walk me through the part \
                     you're least sure about?"
                        .to_string(),
                )
            }
        }
    }

    /// Cross-question behavioral patterns from the scored turns.
    fn session_patterns(&self, session: &InterviewSession) -> Result<Option<String>> {
        let scores = self.store.turn_scores(&session.id)?;
        if scores.len() < 2 {
            return Ok(None);
        }
        let messages = self.store.all_messages(&session.id)?;
        let turn_signals: Vec<_> = scores
            .iter()
            .filter_map(|s| messages.iter().find(|m| m.id == s.message_id))
            .map(|m| signals::detect(&m.content))
            .collect();
        Ok(intent::detect_patterns(&turn_signals, &session.skill_state))
    }

    fn scores_for_current_question(
        &self,
        session: &InterviewSession,
    ) -> Result<Vec<prepwire_store::types::TurnScore>> {
        let scores = self.store.turn_scores(&session.id)?;
        Ok(scores
            .into_iter()
            .filter(|s| s.question_id == session.current_question_id)
            .collect())
    }

    /// Ordered transcript for the owner.
    pub fn list_messages(&self, user_id: &str, session_id: &str) -> Result<Vec<StoredMessage>> {
        self.store.get_session(user_id, session_id)?;
        Ok(self.store.all_messages(session_id)?)
    }

    pub fn get_session(&self, user_id: &str, session_id: &str) -> Result<InterviewSession> {
        Ok(self.store.get_session(user_id, session_id)?)
    }

    pub fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<InterviewSession>> {
        Ok(self.store.list_sessions(user_id, limit)?)
    }

    pub fn delete_session(&self, user_id: &str, session_id: &str) -> Result<()> {
        self.store.delete_session(user_id, session_id)?;
        self.rate.remove(session_id);
        self.ai_failures.remove(session_id);
        Ok(())
    }

    /// Feedback is only accepted on finished sessions.
    pub fn submit_feedback(
        &self,
        user_id: &str,
        session_id: &str,
        stars: Option<u8>,
        thumb: Option<String>,
        rubric_ratings: Option<serde_json::Value>,
        comment: Option<String>,
    ) -> Result<()> {
        let session = self.store.get_session(user_id, session_id)?;
        if session.stage != Stage::Done {
            return Err(invalid_stage(session.stage, "feedback"));
        }
        self.store.insert_session_feedback(&NewSessionFeedback {
            session_id: session_id.to_string(),
            stars,
            thumb,
            rubric_ratings,
            comment,
        })?;
        Ok(())
    }

    fn append_interviewer(
        &self,
        session_id: &str,
        content: &str,
        question_id: Option<&str>,
    ) -> Result<StoredMessage> {
        let capped = truncate_chars(content, self.config.limits.reply_max_chars);
        Ok(self
            .store
            .append_message(session_id, MessageRole::Interviewer, &capped, question_id)?)
    }

    /// Fixed-window rate check, counting accepted turns only.
    fn check_rate(&self, session_id: &str) -> Result<()> {
        let limit = self.config.interview.rate_limit_per_minute;
        let minute = chrono::Utc::now().timestamp() / 60;
        let mut window = self.rate.entry(session_id.to_string()).or_insert(RateWindow {
            bucket: minute,
            count: 0,
        });
        if window.bucket != minute {
            window.bucket = minute;
            window.count = 0;
        }
        if window.count >= limit {
            return Err(PrepwireError::RateLimited(format!(
                "limit of {limit} messages per minute reached"
            )));
        }
        window.count += 1;
        Ok(())
    }

    pub(crate) fn note_ai_failure(&self, session_id: &str) {
        *self.ai_failures.entry(session_id.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn note_ai_ok(&self, session_id: &str) {
        self.ai_failures.remove(session_id);
    }

    pub(crate) fn ai_failure_count(&self, session_id: &str) -> u32 {
        self.ai_failures.get(session_id).map(|c| *c).unwrap_or(0)
    }
}

fn invalid_stage(stage: Stage, action: &str) -> PrepwireError {
    PrepwireError::InvalidStage {
        stage: stage.to_string(),
        action: action.to_string(),
    }
}

fn persona_of(session: &InterviewSession) -> InterviewerProfile {
    session
        .skill_state
        .interviewer
        .clone()
        .unwrap_or_else(|| InterviewerProfile::pick(&session.id))
}

/// Strip null bytes, trim, reject empty, and cap length with a
/// visible truncation note.
fn sanitize_student_message(content: &str, max_chars: usize) -> Result<String> {
    let cleaned: String = content.chars().filter(|c| *c != '\0').collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Err(PrepwireError::Validation("message must not be empty".into()));
    }
    if trimmed.chars().count() > max_chars {
        let mut truncated: String = trimmed.chars().take(max_chars).collect();
        truncated.push_str("\n[truncated]");
        return Ok(truncated);
    }
    Ok(trimmed.to_string())
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

/// The retry-of-same-turn detector: the previous transcript row is the
/// same student content within the dedup window.
fn duplicate_of(last: Option<&StoredMessage>, content: &str) -> Option<StoredMessage> {
    let last = last?;
    if last.role != MessageRole::Student {
        return None;
    }
    if last.content_hash != prepwire_store::messages::content_hash(content) {
        return None;
    }
    let created = chrono::DateTime::parse_from_rfc3339(&last.created_at).ok()?;
    let age = chrono::Utc::now().signed_duration_since(created).num_seconds();
    if age <= DEDUP_WINDOW_SECS {
        Some(last.clone())
    } else {
        None
    }
}

/// Map recent transcript rows into LLM chat history, excluding the
/// in-flight student message (it rides as the user prompt).
fn chat_history(recent: &[StoredMessage], current_content: &str) -> Vec<ChatMessage> {
    let mut history: Vec<ChatMessage> = recent
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| ChatMessage {
            role: match m.role {
                MessageRole::Interviewer => ChatRole::Assistant,
                _ => ChatRole::User,
            },
            content: m.content.clone(),
        })
        .collect();
    if history
        .last()
        .is_some_and(|m| m.role == ChatRole::User && m.content == current_content)
    {
        history.pop();
    }
    history
}

/// Parse the quick-rubric JSON into a clamped rubric. Missing or
/// malformed dimensions read as zero.
pub(crate) fn rubric_from_json(obj: &serde_json::Map<String, serde_json::Value>) -> Rubric {
    let rubric_obj = obj.get("rubric").and_then(|v| v.as_object()).unwrap_or(obj);
    let mut rubric = Rubric::default();
    for dim in RubricDim::ALL {
        let v = rubric_obj
            .get(dim.key())
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            .clamp(0, 10) as u8;
        *rubric.get_mut(dim) = v;
    }
    rubric
}

/// Whether the single wrapup acknowledgement has been consumed: any
/// student message after the wrap-up advisory (the first
/// interviewer message with no question attached other than the
/// greeting).
fn wrapup_ack_used(messages: &[StoredMessage]) -> bool {
    let first_id = messages.first().map(|m| m.id);
    let advisory = messages.iter().find(|m| {
        m.role == MessageRole::Interviewer
            && m.current_question_id.is_none()
            && Some(m.id) != first_id
    });
    match advisory {
        Some(a) => messages
            .iter()
            .any(|m| m.id > a.id && m.role == MessageRole::Student),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_nulls_and_trims() {
        let out = sanitize_student_message("  hi\0 there  ", 100).unwrap();
        assert_eq!(out, "hi there");
    }

    #[test]
    fn sanitize_rejects_empty() {
        assert!(matches!(
            sanitize_student_message("   \0  ", 100),
            Err(PrepwireError::Validation(_))
        ));
    }

    #[test]
    fn sanitize_truncates_with_note() {
        let out = sanitize_student_message(&"x".repeat(120), 100).unwrap();
        assert!(out.ends_with("\n[truncated]"));
        assert_eq!(out.chars().count(), 100 + "\n[truncated]".chars().count());
    }

    #[test]
    fn rubric_from_json_clamps_and_defaults() {
        let obj = serde_json::json!({
            "communication": 14,
            "problem_solving": -3,
            "correctness_reasoning": 7,
            "complexity": "not a number",
        });
        let rubric = rubric_from_json(obj.as_object().unwrap());
        assert_eq!(rubric.communication, 10);
        assert_eq!(rubric.problem_solving, 0);
        assert_eq!(rubric.correctness_reasoning, 7);
        assert_eq!(rubric.complexity, 0);
        assert_eq!(rubric.edge_cases, 0);
    }

    #[test]
    fn rubric_from_json_accepts_nested_shape() {
        let obj = serde_json::json!({ "rubric": { "communication": 6, "edge_cases": 4 } });
        let rubric = rubric_from_json(obj.as_object().unwrap());
        assert_eq!(rubric.communication, 6);
        assert_eq!(rubric.edge_cases, 4);
    }

    #[test]
    fn duplicate_detection_requires_same_hash_and_recency() {
        let msg = StoredMessage {
            id: 1,
            session_id: "s".into(),
            role: MessageRole::Student,
            content: "same".into(),
            current_question_id: None,
            content_hash: prepwire_store::messages::content_hash("same"),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        assert!(duplicate_of(Some(&msg), "same").is_some());
        assert!(duplicate_of(Some(&msg), "different").is_none());

        let stale = StoredMessage {
            created_at: (chrono::Utc::now() - chrono::Duration::seconds(30)).to_rfc3339(),
            ..msg.clone()
        };
        assert!(duplicate_of(Some(&stale), "same").is_none());

        let interviewer = StoredMessage {
            role: MessageRole::Interviewer,
            ..msg
        };
        assert!(duplicate_of(Some(&interviewer), "same").is_none());
    }

    #[test]
    fn wrapup_ack_detection() {
        let mk = |id: i64, role: MessageRole, qid: Option<&str>| StoredMessage {
            id,
            session_id: "s".into(),
            role,
            content: "m".into(),
            current_question_id: qid.map(String::from),
            content_hash: String::new(),
            created_at: String::new(),
        };
        // greeting, student, question, answer, advisory
        let mut msgs = vec![
            mk(1, MessageRole::Interviewer, None),
            mk(2, MessageRole::Student, None),
            mk(3, MessageRole::Interviewer, Some("q1")),
            mk(4, MessageRole::Student, Some("q1")),
            mk(5, MessageRole::Interviewer, None),
        ];
        assert!(!wrapup_ack_used(&msgs));

        msgs.push(mk(6, MessageRole::Student, None));
        msgs.push(mk(7, MessageRole::Interviewer, None));
        assert!(wrapup_ack_used(&msgs));
    }
}
