use std::sync::Arc;

use tracing::{info, instrument, warn};

use prepwire_core::types::MessageRole;
use prepwire_store::types::StoredMessage;
use prepwire_store::Store;

use crate::embedder::Embedder;
use crate::Result;

/// Character cap on the rendered transcript fed to the embedder.
const MAX_TRANSCRIPT_CHARS: usize = 8_000;

/// Post-finalization indexing: embeds the finished transcript and
/// extracts high-quality student turns as exemplars. Runs detached
/// from the finalizer — a failure here never fails a finalize.
pub struct Indexer {
    store: Arc<Store>,
    embedder: Arc<Embedder>,
    /// Quick-rubric mean a student turn must reach to become an example.
    quality_floor: f64,
}

impl Indexer {
    pub fn new(store: Arc<Store>, embedder: Arc<Embedder>, quality_floor: f64) -> Self {
        Self {
            store,
            embedder,
            quality_floor,
        }
    }

    /// Embed a completed session and refresh its exemplars. Keyed on
    /// session id throughout, so re-indexing replaces prior rows.
    #[instrument(skip(self))]
    pub async fn index_session(&self, session_id: &str) -> Result<()> {
        let messages = self.store.all_messages(session_id)?;
        if messages.is_empty() {
            warn!(session_id, "nothing to index: empty transcript");
            return Ok(());
        }

        let transcript = render_transcript(&messages, MAX_TRANSCRIPT_CHARS);
        let embedding = self.embedder.embed(&transcript).await;
        let digest = self.build_digest(session_id)?;
        self.store
            .upsert_session_embedding(session_id, &embedding.vector, &digest)?;

        let examples = self.extract_examples(session_id, &messages)?;
        info!(
            session_id,
            fallback = embedding.fallback,
            examples,
            "session indexed"
        );
        Ok(())
    }

    /// Small structured summary stored next to the vector: overall
    /// score, a coarse band, and the leading strengths/weaknesses.
    fn build_digest(&self, session_id: &str) -> Result<serde_json::Value> {
        let digest = match self.store.get_evaluation(session_id)? {
            Some(eval) => {
                let band_lo = (eval.overall_score / 10) * 10;
                serde_json::json!({
                    "overall": eval.overall_score,
                    "band": format!("{}-{}", band_lo, band_lo + 9),
                    "strengths": eval.summary.strengths.iter().take(3).collect::<Vec<_>>(),
                    "weaknesses": eval.summary.weaknesses.iter().take(3).collect::<Vec<_>>(),
                })
            }
            None => serde_json::json!({}),
        };
        Ok(digest)
    }

    fn extract_examples(&self, session_id: &str, messages: &[StoredMessage]) -> Result<usize> {
        self.store.clear_response_examples(session_id)?;

        let mut extracted = 0;
        for score in self.store.turn_scores(session_id)? {
            let mean = score.rubric.mean();
            if mean < self.quality_floor {
                continue;
            }
            let Some(question_id) = score.question_id.as_deref() else {
                continue;
            };
            let Some(message) = messages.iter().find(|m| m.id == score.message_id) else {
                continue;
            };

            let tags = match self.store.get_question(question_id) {
                Ok(q) => q.tags,
                Err(_) => Vec::new(),
            };
            self.store.insert_response_example(
                session_id,
                question_id,
                &message.content,
                mean,
                &tags,
            )?;
            extracted += 1;
        }
        Ok(extracted)
    }
}

/// Flatten a transcript into "Role: content" lines, capped at
/// `max_chars`. The cap drops the tail — openings carry the question
/// framing that makes sessions comparable.
pub fn render_transcript(messages: &[StoredMessage], max_chars: usize) -> String {
    let mut out = String::new();
    for m in messages {
        let label = match m.role {
            MessageRole::Interviewer => "Interviewer",
            MessageRole::Student => "Student",
            MessageRole::System => "System",
        };
        let line = format!("{label}: {}\n", m.content);
        if out.len() + line.len() > max_chars {
            break;
        }
        out.push_str(&line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepwire_core::types::{CompanyStyle, Difficulty, QuestionType, Rubric, Track};
    use prepwire_store::questions::NewQuestion;

    fn seeded() -> (Arc<Store>, Indexer) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let embedder = Arc::new(Embedder::new(&Default::default(), 384));
        let indexer = Indexer::new(Arc::clone(&store), embedder, 7.0);
        (store, indexer)
    }

    #[tokio::test]
    async fn indexing_twice_replaces_embedding_and_examples() {
        let (store, indexer) = seeded();
        store
            .insert_question(&NewQuestion {
                id: Some("q1".into()),
                track: Track::SweIntern,
                company: CompanyStyle::General,
                difficulty: Difficulty::Easy,
                title: "Two sum".into(),
                prompt: "Find two numbers adding to a target.".into(),
                tags: vec!["arrays".into(), "hashing".into()],
                question_type: QuestionType::Coding,
                followups: vec![],
                meta: serde_json::json!({}),
            })
            .unwrap();

        let msg = store
            .append_message("s1", MessageRole::Student, "use a hash map, O(n)", Some("q1"))
            .unwrap();
        store
            .insert_turn_score("s1", msg.id, Some("q1"), &Rubric::uniform(8), None)
            .unwrap();

        indexer.index_session("s1").await.unwrap();
        indexer.index_session("s1").await.unwrap();

        assert!(store.get_session_embedding("s1").unwrap().is_some());
        let examples = store.examples_for_question("q1", 10).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].tags, vec!["arrays", "hashing"]);
        assert!((examples[0].quality - 8.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn weak_turns_are_not_extracted() {
        let (store, indexer) = seeded();
        let msg = store
            .append_message("s1", MessageRole::Student, "not sure, maybe loops?", Some("q1"))
            .unwrap();
        store
            .insert_turn_score("s1", msg.id, Some("q1"), &Rubric::uniform(4), None)
            .unwrap();

        indexer.index_session("s1").await.unwrap();
        assert!(store.examples_for_question("q1", 10).unwrap().is_empty());
    }

    #[test]
    fn transcript_rendering_caps_length() {
        let messages: Vec<StoredMessage> = (0..100)
            .map(|i| StoredMessage {
                id: i,
                session_id: "s1".into(),
                role: MessageRole::Student,
                content: "x".repeat(100),
                current_question_id: None,
                content_hash: String::new(),
                created_at: String::new(),
            })
            .collect();
        let rendered = render_transcript(&messages, 1000);
        assert!(rendered.len() <= 1000);
        assert!(rendered.starts_with("Student: "));
    }
}
