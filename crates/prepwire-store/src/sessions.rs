use rusqlite::params_from_iter;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use prepwire_core::types::{CompanyStyle, Difficulty, SkillState, Stage, Track};

use crate::error::{Result, StoreError};
use crate::types::InterviewSession;
use crate::Store;

const SESSION_SELECT: &str = "SELECT id, user_id, role, track, company, difficulty_ceiling,
        difficulty_current, stage, questions_asked_count, followups_used,
        max_questions, max_followups, behavioral_target, current_question_id,
        skill_state, created_at, updated_at
 FROM sessions";

/// Parameters for a new interview session. Caps (behavioral target vs.
/// max questions) are applied by the engine before this reaches the
/// store.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub role: String,
    pub track: Track,
    pub company: CompanyStyle,
    pub difficulty: Difficulty,
    pub max_questions: u32,
    pub max_followups_per_question: u32,
    pub behavioral_target: u32,
    pub skill_state: SkillState,
}

impl Store {
    /// Insert a fresh session in stage `intro` and return it.
    #[instrument(skip(self, new), fields(user_id = %new.user_id, track = %new.track))]
    pub fn create_session(&self, new: &NewSession) -> Result<InterviewSession> {
        let id = Uuid::now_v7().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let skill_state = serde_json::to_string(&new.skill_state)?;

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO sessions
             (id, user_id, role, track, company, difficulty_ceiling, difficulty_current,
              stage, questions_asked_count, followups_used, max_questions, max_followups,
              behavioral_target, current_question_id, skill_state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 'intro', 0, 0, ?7, ?8, ?9, NULL, ?10, ?11, ?11)",
            rusqlite::params![
                id,
                new.user_id,
                new.role,
                new.track.to_string(),
                new.company.to_string(),
                new.difficulty.to_string(),
                new.max_questions,
                new.max_followups_per_question,
                new.behavioral_target,
                skill_state,
                now,
            ],
        )?;

        drop(db);
        self.get_session(&new.user_id, &id)
    }

    /// Fetch a session, enforcing ownership. A session owned by a
    /// different user reads as not-found.
    #[instrument(skip(self))]
    pub fn get_session(&self, user_id: &str, session_id: &str) -> Result<InterviewSession> {
        let db = self.db.lock().unwrap();
        let sql = format!("{SESSION_SELECT} WHERE id = ?1 AND user_id = ?2");
        match db.query_row(&sql, rusqlite::params![session_id, user_id], row_to_session) {
            Ok(s) => Ok(s),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::NotFound(format!("session {session_id}")))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// List a user's sessions, most recently updated first.
    pub fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<InterviewSession>> {
        let db = self.db.lock().unwrap();
        let sql = format!("{SESSION_SELECT} WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT ?2");
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![user_id, limit as i64], row_to_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Replace `skill_state` wholesale. Partial writes are never issued
    /// so a crash can't leave a half-updated record.
    #[instrument(skip(self, state))]
    pub fn replace_skill_state(&self, session_id: &str, state: &SkillState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.touch_update(
            session_id,
            "UPDATE sessions SET skill_state = ?1, updated_at = ?2 WHERE id = ?3",
            json,
        )
    }

    pub fn set_followups_used(&self, session_id: &str, n: u32) -> Result<()> {
        self.touch_update(
            session_id,
            "UPDATE sessions SET followups_used = ?1, updated_at = ?2 WHERE id = ?3",
            n,
        )
    }

    pub fn set_current_question(&self, session_id: &str, question_id: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE sessions SET current_question_id = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![question_id, now, session_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    pub fn set_difficulty_current(&self, session_id: &str, difficulty: Difficulty) -> Result<()> {
        self.touch_update(
            session_id,
            "UPDATE sessions SET difficulty_current = ?1, updated_at = ?2 WHERE id = ?3",
            difficulty.to_string(),
        )
    }

    /// Conditional advance of `questions_asked_count`: succeeds only if
    /// the stored value still equals `expected`. Returns false when a
    /// concurrent handler got there first — the caller re-reads and
    /// re-evaluates instead of advancing twice.
    #[instrument(skip(self))]
    pub fn advance_question_count(&self, session_id: &str, expected: u32) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE sessions
             SET questions_asked_count = ?1, followups_used = 0, updated_at = ?2
             WHERE id = ?3 AND questions_asked_count = ?4",
            rusqlite::params![expected + 1, now, session_id, expected],
        )?;
        Ok(changed == 1)
    }

    /// Compare-and-set on `stage`: moves to `to` only when the current
    /// stage is one of `from`. Returns whether the transition happened.
    /// This is the only mutation path for `stage`.
    #[instrument(skip(self))]
    pub fn cas_stage(&self, session_id: &str, from: &[Stage], to: Stage) -> Result<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let now = chrono::Utc::now().to_rfc3339();
        let placeholders = (0..from.len())
            .map(|i| format!("?{}", i + 4))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE sessions SET stage = ?1, updated_at = ?2
             WHERE id = ?3 AND stage IN ({placeholders})"
        );

        let mut params: Vec<String> = vec![to.to_string(), now, session_id.to_string()];
        params.extend(from.iter().map(|s| s.to_string()));

        let db = self.db.lock().unwrap();
        let changed = db.execute(&sql, params_from_iter(params.iter()))?;
        debug!(session_id, %to, changed, "stage cas");
        Ok(changed == 1)
    }

    /// Delete a session and everything hanging off it, after the
    /// ownership check. Messages, scores, linkage rows, the evaluation,
    /// the embedding, extracted examples and feedback all go in one
    /// transaction.
    #[instrument(skip(self))]
    pub fn delete_session(&self, user_id: &str, session_id: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let owned: i64 = tx.query_row(
            "SELECT COUNT(*) FROM sessions WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![session_id, user_id],
            |row| row.get(0),
        )?;
        if owned == 0 {
            return Err(StoreError::NotFound(format!("session {session_id}")));
        }

        for sql in [
            "DELETE FROM messages WHERE session_id = ?1",
            "DELETE FROM turn_scores WHERE session_id = ?1",
            "DELETE FROM session_questions WHERE session_id = ?1",
            "DELETE FROM evaluations WHERE session_id = ?1",
            "DELETE FROM session_embeddings WHERE session_id = ?1",
            "DELETE FROM response_examples WHERE session_id = ?1",
            "DELETE FROM session_feedback WHERE session_id = ?1",
            "DELETE FROM sessions WHERE id = ?1",
        ] {
            tx.execute(sql, rusqlite::params![session_id])?;
        }

        tx.commit()?;
        Ok(())
    }

    fn touch_update<V: rusqlite::ToSql>(&self, session_id: &str, sql: &str, value: V) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(sql, rusqlite::params![value, now, session_id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }
}

/// Map a SELECT row (column order from SESSION_SELECT) to a session.
fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<InterviewSession> {
    let skill_json: String = row.get(14)?;
    // A malformed skill_state is rebuilt from zero rather than bricking
    // the session; the transcript is untouched either way.
    let skill_state: SkillState = serde_json::from_str(&skill_json).unwrap_or_else(|e| {
        warn!(error = %e, "malformed skill_state, rebuilding from zero");
        SkillState::default()
    });

    Ok(InterviewSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        track: parse_enum(row, 3)?,
        company: parse_enum(row, 4)?,
        difficulty_ceiling: parse_enum(row, 5)?,
        difficulty_current: parse_enum(row, 6)?,
        stage: parse_enum(row, 7)?,
        questions_asked_count: row.get::<_, i64>(8)? as u32,
        followups_used: row.get::<_, i64>(9)? as u32,
        max_questions: row.get::<_, i64>(10)? as u32,
        max_followups_per_question: row.get::<_, i64>(11)? as u32,
        behavioral_target: row.get::<_, i64>(12)? as u32,
        current_question_id: row.get(13)?,
        skill_state,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// Parse a TEXT column through FromStr, surfacing failures as column
/// conversion errors instead of panicking.
pub(crate) fn parse_enum<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            )),
        )
    })
}
