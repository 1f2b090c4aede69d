use std::collections::HashSet;

use tracing::instrument;
use uuid::Uuid;

use prepwire_core::types::{CompanyStyle, Difficulty, QuestionType, Track};

use crate::error::{Result, StoreError};
use crate::sessions::parse_enum;
use crate::types::{Question, QuestionFilter};
use crate::Store;

const QUESTION_SELECT: &str = "SELECT id, track, company, difficulty, title, prompt, tags,
        question_type, followups, meta, created_at
 FROM questions";

/// Catalog entry to insert. An explicit id keeps seed data stable
/// across environments; omit it to get a fresh UUID.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub id: Option<String>,
    pub track: Track,
    pub company: CompanyStyle,
    pub difficulty: Difficulty,
    pub title: String,
    pub prompt: String,
    pub tags: Vec<String>,
    pub question_type: QuestionType,
    pub followups: Vec<String>,
    pub meta: serde_json::Value,
}

impl Store {
    #[instrument(skip(self, new), fields(title = %new.title))]
    pub fn insert_question(&self, new: &NewQuestion) -> Result<String> {
        let id = new
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = chrono::Utc::now().to_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO questions
             (id, track, company, difficulty, title, prompt, tags, question_type,
              followups, meta, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                id,
                new.track.to_string(),
                new.company.to_string(),
                new.difficulty.to_string(),
                new.title,
                new.prompt,
                serde_json::to_string(&new.tags)?,
                new.question_type.to_string(),
                serde_json::to_string(&new.followups)?,
                serde_json::to_string(&new.meta)?,
                now,
            ],
        )?;
        Ok(id)
    }

    pub fn get_question(&self, id: &str) -> Result<Question> {
        let db = self.db.lock().unwrap();
        let sql = format!("{QUESTION_SELECT} WHERE id = ?1");
        match db.query_row(&sql, rusqlite::params![id], row_to_question) {
            Ok(q) => Ok(q),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::NotFound(format!("question {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Count catalog entries matching the filter. `None` filter fields
    /// match everything.
    pub fn count_pool(&self, filter: &QuestionFilter) -> Result<u32> {
        let (clause, params) = filter_clause(filter);
        let db = self.db.lock().unwrap();
        let sql = format!("SELECT COUNT(*) FROM questions WHERE {clause}");
        let n: i64 = db.query_row(
            &sql,
            rusqlite::params_from_iter(params.iter()),
            |row| row.get(0),
        )?;
        Ok(n as u32)
    }

    /// Fetch the candidate pool for the selector. Exclusion of seen /
    /// already-asked questions happens in the selector, which owns the
    /// combined excluded set.
    pub fn fetch_pool(&self, filter: &QuestionFilter) -> Result<Vec<Question>> {
        let (clause, params) = filter_clause(filter);
        let db = self.db.lock().unwrap();
        let sql = format!("{QUESTION_SELECT} WHERE {clause} ORDER BY id");
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), row_to_question)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Record that a user has been shown a question. Idempotent.
    #[instrument(skip(self))]
    pub fn mark_question_seen(&self, user_id: &str, question_id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO user_question_seen (user_id, question_id, seen_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, question_id, now],
        )?;
        Ok(())
    }

    /// Every question id this user has ever been shown, across sessions.
    pub fn seen_questions(&self, user_id: &str) -> Result<HashSet<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT question_id FROM user_question_seen WHERE user_id = ?1")?;
        let rows = stmt.query_map(rusqlite::params![user_id], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Link a question into a session's ordered ask list. Idempotent on
    /// (session, question).
    #[instrument(skip(self))]
    pub fn add_session_question(
        &self,
        session_id: &str,
        question_id: &str,
        position: u32,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO session_questions (session_id, question_id, position, asked_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![session_id, question_id, position, now],
        )?;
        Ok(())
    }

    /// Question ids asked in this session, in ask order.
    pub fn session_questions(&self, session_id: &str) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT question_id FROM session_questions WHERE session_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_id], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_session_questions(&self, session_id: &str) -> Result<u32> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM session_questions WHERE session_id = ?1",
            rusqlite::params![session_id],
            |row| row.get(0),
        )?;
        Ok(n as u32)
    }
}

/// Build the WHERE clause + params for a pool filter.
fn filter_clause(filter: &QuestionFilter) -> (String, Vec<String>) {
    let mut clauses = vec!["track = ?1".to_string()];
    let mut params = vec![filter.track.to_string()];

    if let Some(company) = filter.company {
        params.push(company.to_string());
        clauses.push(format!("company = ?{}", params.len()));
    }
    if let Some(difficulty) = filter.difficulty {
        params.push(difficulty.to_string());
        clauses.push(format!("difficulty = ?{}", params.len()));
    }
    if let Some(qtype) = filter.question_type {
        params.push(qtype.to_string());
        clauses.push(format!("question_type = ?{}", params.len()));
    }

    (clauses.join(" AND "), params)
}

fn row_to_question(row: &rusqlite::Row<'_>) -> rusqlite::Result<Question> {
    let tags: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default();
    let followups: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(8)?).unwrap_or_default();
    let meta: serde_json::Value =
        serde_json::from_str(&row.get::<_, String>(9)?).unwrap_or_default();

    Ok(Question {
        id: row.get(0)?,
        track: parse_enum(row, 1)?,
        company: parse_enum(row, 2)?,
        difficulty: parse_enum(row, 3)?,
        title: row.get(4)?,
        prompt: row.get(5)?,
        tags,
        question_type: parse_enum(row, 7)?,
        followups,
        meta,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(store: &Store, id: &str, company: CompanyStyle, difficulty: Difficulty) {
        store
            .insert_question(&NewQuestion {
                id: Some(id.to_string()),
                track: Track::SweIntern,
                company,
                difficulty,
                title: format!("Question {id}"),
                prompt: "Describe your approach.".into(),
                tags: vec!["arrays".into()],
                question_type: QuestionType::Coding,
                followups: vec![],
                meta: serde_json::json!({}),
            })
            .unwrap();
    }

    #[test]
    fn pool_filters_compose() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "q1", CompanyStyle::Google, Difficulty::Medium);
        seed(&store, "q2", CompanyStyle::Google, Difficulty::Easy);
        seed(&store, "q3", CompanyStyle::General, Difficulty::Medium);

        let filter = QuestionFilter {
            track: Track::SweIntern,
            company: Some(CompanyStyle::Google),
            difficulty: Some(Difficulty::Medium),
            question_type: None,
        };
        assert_eq!(store.count_pool(&filter).unwrap(), 1);
        let pool = store.fetch_pool(&filter).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, "q1");

        let broad = QuestionFilter {
            track: Track::SweIntern,
            company: None,
            difficulty: None,
            question_type: None,
        };
        assert_eq!(store.count_pool(&broad).unwrap(), 3);
    }

    #[test]
    fn seen_set_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.mark_question_seen("u1", "q1").unwrap();
        store.mark_question_seen("u1", "q1").unwrap();
        store.mark_question_seen("u1", "q2").unwrap();
        let seen = store.seen_questions("u1").unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("q1"));
    }

    #[test]
    fn session_questions_keep_order() {
        let store = Store::open_in_memory().unwrap();
        store.add_session_question("s1", "q2", 0).unwrap();
        store.add_session_question("s1", "q1", 1).unwrap();
        store.add_session_question("s1", "q1", 2).unwrap(); // duplicate ignored
        assert_eq!(store.session_questions("s1").unwrap(), vec!["q2", "q1"]);
        assert_eq!(store.count_session_questions("s1").unwrap(), 2);
    }
}
