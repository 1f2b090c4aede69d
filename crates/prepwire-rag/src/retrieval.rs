use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use prepwire_core::config::RagConfig;
use prepwire_store::types::{Question, ResponseExample, SessionEmbedding};
use prepwire_store::Store;

use crate::embedder::{cosine, Embedder};

/// Character cap on the rendered context paragraph.
const MAX_CONTEXT_CHARS: usize = 1_200;
/// Excerpt cap for an exemplar answer.
const MAX_EXCERPT_CHARS: usize = 300;
/// How many stored exemplars the tag-match path scans.
const TAG_SCAN_LIMIT: usize = 50;

/// Builds the optional retrieval paragraph injected into prompts.
/// Every failure path degrades to "no context" — retrieval is never
/// allowed to fail a turn.
pub struct Retriever {
    store: Arc<Store>,
    embedder: Arc<Embedder>,
    cfg: RagConfig,
}

impl Retriever {
    pub fn new(store: Arc<Store>, embedder: Arc<Embedder>, cfg: RagConfig) -> Self {
        Self {
            store,
            embedder,
            cfg,
        }
    }

    /// Retrieve similar-session summaries and exemplar answers for the
    /// session in play. Returns `None` when the corpus is too thin
    /// (the readiness gate) or when anything goes wrong.
    #[instrument(skip(self, transcript_so_far, current_question))]
    pub async fn build_context(
        &self,
        session_id: &str,
        transcript_so_far: &str,
        current_question: Option<&Question>,
    ) -> Option<String> {
        let query = self.embedder.embed(transcript_so_far).await;

        let stored = match self.store.all_session_embeddings(session_id) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "embedding scan failed, omitting context");
                return None;
            }
        };

        let mut neighbors: Vec<(f64, &SessionEmbedding)> = stored
            .iter()
            .map(|e| (cosine(&query.vector, &e.vector), e))
            .filter(|(sim, _)| *sim >= self.cfg.similarity_floor)
            .collect();
        neighbors.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let examples = self.find_examples(current_question);

        // Readiness gate: too few neighbors or no exemplar means the
        // corpus can't say anything useful yet.
        if neighbors.len() < self.cfg.min_neighbors || examples.len() < self.cfg.min_examples {
            debug!(
                neighbors = neighbors.len(),
                examples = examples.len(),
                "retrieval gate not met"
            );
            return None;
        }

        neighbors.truncate(self.cfg.max_neighbors);
        Some(render_context(&neighbors, &examples))
    }

    /// Exemplars matching the current question by id, topped up by tag
    /// overlap, best quality first.
    fn find_examples(&self, current_question: Option<&Question>) -> Vec<ResponseExample> {
        let Some(question) = current_question else {
            return Vec::new();
        };

        let mut examples = self
            .store
            .examples_for_question(&question.id, self.cfg.max_examples)
            .unwrap_or_default();

        if examples.len() < self.cfg.max_examples {
            let scanned = self
                .store
                .all_response_examples(TAG_SCAN_LIMIT)
                .unwrap_or_default();
            for ex in scanned {
                if examples.len() >= self.cfg.max_examples {
                    break;
                }
                if ex.question_id == question.id {
                    continue;
                }
                if ex.tags.iter().any(|t| question.tags.contains(t)) {
                    examples.push(ex);
                }
            }
        }
        examples
    }
}

/// Render neighbors and exemplars into one short paragraph. The text
/// is phrased as coaching input for the interviewer, never shown to
/// the candidate verbatim.
fn render_context(neighbors: &[(f64, &SessionEmbedding)], examples: &[ResponseExample]) -> String {
    let mut out = String::with_capacity(MAX_CONTEXT_CHARS);

    let overalls: Vec<u64> = neighbors
        .iter()
        .filter_map(|(_, e)| e.digest.get("overall").and_then(|v| v.as_u64()))
        .collect();
    if overalls.is_empty() {
        out.push_str(&format!(
            "{} comparable practice sessions are on record.",
            neighbors.len()
        ));
    } else {
        let lo = overalls.iter().min().copied().unwrap_or(0);
        let hi = overalls.iter().max().copied().unwrap_or(0);
        out.push_str(&format!(
            "{} comparable practice sessions scored {}-{} overall.",
            neighbors.len(),
            lo,
            hi
        ));
    }

    let strengths = top_digest_items(neighbors, "strengths");
    if !strengths.is_empty() {
        out.push_str(&format!(" Common strengths: {}.", strengths.join("; ")));
    }
    let weaknesses = top_digest_items(neighbors, "weaknesses");
    if !weaknesses.is_empty() {
        out.push_str(&format!(" Common gaps: {}.", weaknesses.join("; ")));
    }

    for ex in examples {
        let mut excerpt = ex.content.replace('\n', " ");
        if excerpt.len() > MAX_EXCERPT_CHARS {
            let cut = excerpt
                .char_indices()
                .take_while(|(i, _)| *i < MAX_EXCERPT_CHARS)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            excerpt.truncate(cut);
            excerpt.push('…');
        }
        let line = format!(" A strong answer to a similar question: \"{excerpt}\"");
        if out.len() + line.len() > MAX_CONTEXT_CHARS {
            break;
        }
        out.push_str(&line);
    }

    out
}

/// Most frequent digest strings across neighbors, up to three.
fn top_digest_items(neighbors: &[(f64, &SessionEmbedding)], key: &str) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for (_, e) in neighbors {
        if let Some(items) = e.digest.get(key).and_then(|v| v.as_array()) {
            for item in items.iter().filter_map(|v| v.as_str()) {
                *counts.entry(item.to_string()).or_default() += 1;
            }
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(3).map(|(s, _)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepwire_core::types::{CompanyStyle, Difficulty, QuestionType, Track};

    fn question(id: &str, tags: &[&str]) -> Question {
        Question {
            id: id.into(),
            track: Track::SweIntern,
            company: CompanyStyle::General,
            difficulty: Difficulty::Medium,
            title: "t".into(),
            prompt: "p".into(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            question_type: QuestionType::Coding,
            followups: vec![],
            meta: serde_json::json!({}),
            created_at: String::new(),
        }
    }

    fn retriever_with(store: Arc<Store>) -> Retriever {
        let embedder = Arc::new(Embedder::new(&Default::default(), 8));
        Retriever::new(store, embedder, RagConfig::default())
    }

    fn seed_neighbor(store: &Store, session_id: &str, overall: u64) {
        // Same text as the query embeds to an identical vector, which
        // guarantees similarity 1.0 through the hash fallback.
        let v = crate::embedder::hash_embed("reverse a linked list", 8);
        store
            .upsert_session_embedding(
                session_id,
                &v,
                &serde_json::json!({
                    "overall": overall,
                    "strengths": ["clear communication"],
                    "weaknesses": ["edge cases"],
                }),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn gate_blocks_thin_corpus() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_neighbor(&store, "other1", 70);
        seed_neighbor(&store, "other2", 75);
        // Only 2 neighbors and no examples: below both gate thresholds.
        let retriever = retriever_with(Arc::clone(&store));
        let ctx = retriever
            .build_context("current", "reverse a linked list", Some(&question("q1", &["lists"])))
            .await;
        assert!(ctx.is_none());
    }

    #[tokio::test]
    async fn context_renders_when_gate_passes() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        for (i, overall) in [62u64, 70, 78].iter().enumerate() {
            seed_neighbor(&store, &format!("other{i}"), *overall);
        }
        store
            .insert_response_example("other0", "q1", "I'd reverse pointers iteratively", 8.4, &["lists".into()])
            .unwrap();

        let retriever = retriever_with(Arc::clone(&store));
        let ctx = retriever
            .build_context("current", "reverse a linked list", Some(&question("q1", &["lists"])))
            .await
            .expect("gate should pass");
        assert!(ctx.contains("62-78"));
        assert!(ctx.contains("clear communication"));
        assert!(ctx.contains("reverse pointers"));
        assert!(ctx.len() <= MAX_CONTEXT_CHARS);
    }

    #[tokio::test]
    async fn tag_overlap_tops_up_examples() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        for i in 0..3 {
            seed_neighbor(&store, &format!("other{i}"), 70);
        }
        // No example for q2 itself, but one sharing a tag.
        store
            .insert_response_example("other0", "q9", "use fast and slow pointers", 9.0, &["lists".into()])
            .unwrap();

        let retriever = retriever_with(Arc::clone(&store));
        let ctx = retriever
            .build_context("current", "reverse a linked list", Some(&question("q2", &["lists"])))
            .await
            .expect("tag match should satisfy the gate");
        assert!(ctx.contains("fast and slow pointers"));
    }
}
