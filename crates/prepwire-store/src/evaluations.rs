use tracing::{debug, instrument};
use uuid::Uuid;

use prepwire_core::types::{EvaluationSummary, HireSignal, Rubric};

use crate::error::{Result, StoreError};
use crate::types::{Evaluation, TurnScore};
use crate::Store;

const EVALUATION_SELECT: &str = "SELECT id, session_id, overall_score, rubric, summary,
        hire_signal, was_fallback, created_at
 FROM evaluations";

/// Evaluation payload produced by the finalizer, before persistence
/// assigns an id and timestamp.
#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub session_id: String,
    pub overall_score: u8,
    pub rubric: Rubric,
    pub summary: EvaluationSummary,
    pub hire_signal: Option<HireSignal>,
    pub was_fallback: bool,
}

impl Store {
    /// Insert the evaluation for a session, or return the one already
    /// there. The UNIQUE constraint on `session_id` makes a concurrent
    /// double-finalize a benign conflict: the loser reads the winner's
    /// row back.
    #[instrument(skip(self, new), fields(session_id = %new.session_id, fallback = new.was_fallback))]
    pub fn insert_or_get_evaluation(&self, new: &NewEvaluation) -> Result<Evaluation> {
        let id = Uuid::now_v7().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let db = self.db.lock().unwrap();
        let inserted = db.execute(
            "INSERT OR IGNORE INTO evaluations
             (id, session_id, overall_score, rubric, summary, hire_signal,
              was_fallback, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                id,
                new.session_id,
                new.overall_score,
                serde_json::to_string(&new.rubric)?,
                serde_json::to_string(&new.summary)?,
                new.hire_signal.map(|h| h.to_string()),
                new.was_fallback as i64,
                now,
            ],
        )?;
        if inserted == 0 {
            debug!(session_id = %new.session_id, "evaluation already exists, returning it");
        }

        let sql = format!("{EVALUATION_SELECT} WHERE session_id = ?1");
        let eval = db.query_row(&sql, rusqlite::params![new.session_id], row_to_evaluation)?;
        Ok(eval)
    }

    pub fn get_evaluation(&self, session_id: &str) -> Result<Option<Evaluation>> {
        let db = self.db.lock().unwrap();
        let sql = format!("{EVALUATION_SELECT} WHERE session_id = ?1");
        match db.query_row(&sql, rusqlite::params![session_id], row_to_evaluation) {
            Ok(e) => Ok(Some(e)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Append one quick-rubric row for a scored student turn.
    #[instrument(skip(self, rubric, note))]
    pub fn insert_turn_score(
        &self,
        session_id: &str,
        message_id: i64,
        question_id: Option<&str>,
        rubric: &Rubric,
        note: Option<&str>,
    ) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO turn_scores (session_id, message_id, question_id, rubric, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                session_id,
                message_id,
                question_id,
                serde_json::to_string(rubric)?,
                note,
                now
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// All quick-rubric rows for a session, oldest first.
    pub fn turn_scores(&self, session_id: &str) -> Result<Vec<TurnScore>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, message_id, question_id, rubric, note, created_at
             FROM turn_scores WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_id], row_to_turn_score)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_turn_scores(&self, session_id: &str) -> Result<u32> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM turn_scores WHERE session_id = ?1",
            rusqlite::params![session_id],
            |row| row.get(0),
        )?;
        Ok(n as u32)
    }
}

fn row_to_evaluation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Evaluation> {
    let rubric: Rubric = serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or_default();
    let summary: EvaluationSummary =
        serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    let hire_signal = row
        .get::<_, Option<String>>(5)?
        .and_then(|s| s.parse().ok());

    Ok(Evaluation {
        id: row.get(0)?,
        session_id: row.get(1)?,
        overall_score: row.get::<_, i64>(2)?.clamp(0, 100) as u8,
        rubric,
        summary,
        hire_signal,
        was_fallback: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

fn row_to_turn_score(row: &rusqlite::Row<'_>) -> rusqlite::Result<TurnScore> {
    let rubric: Rubric = serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    Ok(TurnScore {
        id: row.get(0)?,
        session_id: row.get(1)?,
        message_id: row.get(2)?,
        question_id: row.get(3)?,
        rubric,
        note: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(session_id: &str, score: u8) -> NewEvaluation {
        NewEvaluation {
            session_id: session_id.to_string(),
            overall_score: score,
            rubric: Rubric::uniform(7),
            summary: EvaluationSummary {
                strengths: vec!["clear thinking".into()],
                weaknesses: vec![],
                next_steps: vec!["practice graphs".into()],
            },
            hire_signal: Some(HireSignal::LeanYes),
            was_fallback: false,
        }
    }

    #[test]
    fn second_insert_returns_first_evaluation() {
        let store = Store::open_in_memory().unwrap();
        let first = store.insert_or_get_evaluation(&sample("s1", 82)).unwrap();
        let second = store.insert_or_get_evaluation(&sample("s1", 30)).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.overall_score, 82);

        let db = store.db.lock().unwrap();
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM evaluations WHERE session_id = 's1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn evaluation_roundtrips() {
        let store = Store::open_in_memory().unwrap();
        store.insert_or_get_evaluation(&sample("s1", 82)).unwrap();
        let got = store.get_evaluation("s1").unwrap().unwrap();
        assert_eq!(got.overall_score, 82);
        assert_eq!(got.hire_signal, Some(HireSignal::LeanYes));
        assert_eq!(got.summary.strengths, vec!["clear thinking"]);
        assert!(!got.was_fallback);
        assert!(store.get_evaluation("missing").unwrap().is_none());
    }

    #[test]
    fn turn_scores_accumulate_in_order() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_turn_score("s1", 1, Some("q1"), &Rubric::uniform(8), None)
            .unwrap();
        store
            .insert_turn_score("s1", 3, Some("q1"), &Rubric::uniform(5), Some("thin on edge cases"))
            .unwrap();
        let scores = store.turn_scores("s1").unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].message_id, 1);
        assert_eq!(scores[1].note.as_deref(), Some("thin on edge cases"));
        assert_eq!(store.count_turn_scores("s1").unwrap(), 2);
    }
}
