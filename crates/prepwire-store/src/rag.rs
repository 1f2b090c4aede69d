use tracing::instrument;

use crate::error::Result;
use crate::types::{ResponseExample, SessionEmbedding, SessionFeedback};
use crate::Store;

impl Store {
    /// Insert or replace the embedding for a completed session. Keyed
    /// on session id, so re-indexing replaces rather than duplicates.
    #[instrument(skip(self, vector, digest), fields(dims = vector.len()))]
    pub fn upsert_session_embedding(
        &self,
        session_id: &str,
        vector: &[f32],
        digest: &serde_json::Value,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO session_embeddings (session_id, vector, digest, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                vector = excluded.vector,
                digest = excluded.digest,
                created_at = excluded.created_at",
            rusqlite::params![
                session_id,
                serde_json::to_string(vector)?,
                serde_json::to_string(digest)?,
                now
            ],
        )?;
        Ok(())
    }

    pub fn get_session_embedding(&self, session_id: &str) -> Result<Option<SessionEmbedding>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT session_id, vector, digest, created_at
             FROM session_embeddings WHERE session_id = ?1",
            rusqlite::params![session_id],
            row_to_embedding,
        ) {
            Ok(e) => Ok(Some(e)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every stored session embedding except the one being queried for.
    /// The corpus stays small (one row per finished session) so the
    /// similarity scan happens in memory.
    pub fn all_session_embeddings(&self, exclude_session: &str) -> Result<Vec<SessionEmbedding>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT session_id, vector, digest, created_at
             FROM session_embeddings WHERE session_id != ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![exclude_session], row_to_embedding)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    #[instrument(skip(self, content, tags))]
    pub fn insert_response_example(
        &self,
        session_id: &str,
        question_id: &str,
        content: &str,
        quality: f64,
        tags: &[String],
    ) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO response_examples (session_id, question_id, content, quality, tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                session_id,
                question_id,
                content,
                quality,
                serde_json::to_string(tags)?,
                now
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Drop a session's extracted exemplars so re-indexing replaces
    /// them instead of stacking duplicates.
    pub fn clear_response_examples(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM response_examples WHERE session_id = ?1",
            rusqlite::params![session_id],
        )?;
        Ok(())
    }

    /// Exemplars for a question, best first. Tag matching happens in
    /// the retriever; this returns the per-question slice.
    pub fn examples_for_question(
        &self,
        question_id: &str,
        limit: usize,
    ) -> Result<Vec<ResponseExample>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, question_id, content, quality, tags, created_at
             FROM response_examples WHERE question_id = ?1
             ORDER BY quality DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![question_id, limit as i64], row_to_example)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// All stored exemplars, best first — the tag-match path scans these.
    pub fn all_response_examples(&self, limit: usize) -> Result<Vec<ResponseExample>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, question_id, content, quality, tags, created_at
             FROM response_examples ORDER BY quality DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_example)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    #[instrument(skip(self, feedback), fields(session_id = %feedback.session_id))]
    pub fn insert_session_feedback(&self, feedback: &NewSessionFeedback) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO session_feedback (session_id, stars, thumb, rubric_ratings, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                feedback.session_id,
                feedback.stars,
                feedback.thumb,
                feedback
                    .rubric_ratings
                    .as_ref()
                    .map(|v| v.to_string()),
                feedback.comment,
                now
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub fn session_feedback(&self, session_id: &str) -> Result<Vec<SessionFeedback>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, stars, thumb, rubric_ratings, comment, created_at
             FROM session_feedback WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_id], row_to_feedback)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

/// User rating payload for a finished session.
#[derive(Debug, Clone)]
pub struct NewSessionFeedback {
    pub session_id: String,
    pub stars: Option<u8>,
    pub thumb: Option<String>,
    pub rubric_ratings: Option<serde_json::Value>,
    pub comment: Option<String>,
}

fn row_to_embedding(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionEmbedding> {
    let vector: Vec<f32> = serde_json::from_str(&row.get::<_, String>(1)?).unwrap_or_default();
    let digest: serde_json::Value =
        serde_json::from_str(&row.get::<_, String>(2)?).unwrap_or_default();
    Ok(SessionEmbedding {
        session_id: row.get(0)?,
        vector,
        digest,
        created_at: row.get(3)?,
    })
}

fn row_to_example(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResponseExample> {
    let tags: Vec<String> = serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default();
    Ok(ResponseExample {
        id: row.get(0)?,
        session_id: row.get(1)?,
        question_id: row.get(2)?,
        content: row.get(3)?,
        quality: row.get(4)?,
        tags,
        created_at: row.get(6)?,
    })
}

fn row_to_feedback(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionFeedback> {
    let ratings = row
        .get::<_, Option<String>>(4)?
        .and_then(|s| serde_json::from_str(&s).ok());
    Ok(SessionFeedback {
        id: row.get(0)?,
        session_id: row.get(1)?,
        stars: row.get::<_, Option<i64>>(2)?.map(|v| v.clamp(0, 5) as u8),
        thumb: row.get(3)?,
        rubric_ratings: ratings,
        comment: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_upsert_replaces() {
        let store = Store::open_in_memory().unwrap();
        let v1 = vec![1.0_f32; 4];
        let v2 = vec![2.0_f32; 4];
        store
            .upsert_session_embedding("s1", &v1, &serde_json::json!({"band": "60-70"}))
            .unwrap();
        store
            .upsert_session_embedding("s1", &v2, &serde_json::json!({"band": "70-80"}))
            .unwrap();

        let got = store.get_session_embedding("s1").unwrap().unwrap();
        assert_eq!(got.vector, v2);
        assert_eq!(got.digest["band"], "70-80");
        assert_eq!(store.all_session_embeddings("other").unwrap().len(), 1);
        assert!(store.all_session_embeddings("s1").unwrap().is_empty());
    }

    #[test]
    fn examples_order_by_quality() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_response_example("s1", "q1", "ok answer", 7.2, &["arrays".into()])
            .unwrap();
        store
            .insert_response_example("s2", "q1", "great answer", 9.4, &["arrays".into()])
            .unwrap();
        let examples = store.examples_for_question("q1", 2).unwrap();
        assert_eq!(examples[0].content, "great answer");
        assert_eq!(examples.len(), 2);
    }

    #[test]
    fn feedback_roundtrips() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_session_feedback(&NewSessionFeedback {
                session_id: "s1".into(),
                stars: Some(4),
                thumb: Some("up".into()),
                rubric_ratings: Some(serde_json::json!({"communication": 5})),
                comment: Some("helpful".into()),
            })
            .unwrap();
        let rows = store.session_feedback("s1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stars, Some(4));
        assert_eq!(rows[0].rubric_ratings.as_ref().unwrap()["communication"], 5);
    }
}
