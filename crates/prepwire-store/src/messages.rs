use sha2::{Digest, Sha256};
use tracing::instrument;

use prepwire_core::types::MessageRole;

use crate::error::Result;
use crate::sessions::parse_enum;
use crate::types::StoredMessage;
use crate::Store;

const MESSAGE_SELECT: &str = "SELECT id, session_id, role, content, current_question_id,
        content_hash, created_at
 FROM messages";

/// SHA-256 of a message body, hex-encoded. Used to spot duplicate
/// consecutive student turns.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

impl Store {
    /// Append one transcript row. Messages are never mutated afterwards.
    #[instrument(skip(self, content))]
    pub fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        current_question_id: Option<&str>,
    ) -> Result<StoredMessage> {
        let now = chrono::Utc::now().to_rfc3339();
        let hash = content_hash(content);

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO messages (session_id, role, content, current_question_id,
                                   content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                session_id,
                role.to_string(),
                content,
                current_question_id,
                hash,
                now
            ],
        )?;
        let id = db.last_insert_rowid();

        Ok(StoredMessage {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            current_question_id: current_question_id.map(String::from),
            content_hash: hash,
            created_at: now,
        })
    }

    /// The most recent `limit` messages, returned oldest-first so they
    /// can feed prompt assembly directly.
    pub fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let db = self.db.lock().unwrap();
        let sql = format!("{MESSAGE_SELECT} WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2");
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![session_id, limit as i64], row_to_message)?;
        let mut msgs: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        msgs.reverse();
        Ok(msgs)
    }

    /// Full transcript in insertion order.
    pub fn all_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let db = self.db.lock().unwrap();
        let sql = format!("{MESSAGE_SELECT} WHERE session_id = ?1 ORDER BY id");
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![session_id], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// The newest message regardless of role, if any.
    pub fn last_message(&self, session_id: &str) -> Result<Option<StoredMessage>> {
        let db = self.db.lock().unwrap();
        let sql = format!("{MESSAGE_SELECT} WHERE session_id = ?1 ORDER BY id DESC LIMIT 1");
        match db.query_row(&sql, rusqlite::params![session_id], row_to_message) {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The newest message authored by `role`, if any.
    pub fn last_message_by_role(
        &self,
        session_id: &str,
        role: MessageRole,
    ) -> Result<Option<StoredMessage>> {
        let db = self.db.lock().unwrap();
        let sql =
            format!("{MESSAGE_SELECT} WHERE session_id = ?1 AND role = ?2 ORDER BY id DESC LIMIT 1");
        match db.query_row(
            &sql,
            rusqlite::params![session_id, role.to_string()],
            row_to_message,
        ) {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count_messages(&self, session_id: &str) -> Result<u32> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            rusqlite::params![session_id],
            |row| row.get(0),
        )?;
        Ok(n as u32)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: parse_enum(row, 2)?,
        content: row.get(3)?,
        current_question_id: row.get(4)?,
        content_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order_and_returns_oldest_first() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .append_message("s1", MessageRole::Student, &format!("msg {i}"), None)
                .unwrap();
        }
        let recent = store.recent_messages("s1", 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "msg 2");
        assert_eq!(recent[2].content, "msg 4");

        let all = store.all_messages("s1").unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].content, "msg 0");
    }

    #[test]
    fn last_message_by_role_skips_other_roles() {
        let store = Store::open_in_memory().unwrap();
        store
            .append_message("s1", MessageRole::Student, "answer", None)
            .unwrap();
        store
            .append_message("s1", MessageRole::Interviewer, "next question", Some("q1"))
            .unwrap();

        let last_student = store
            .last_message_by_role("s1", MessageRole::Student)
            .unwrap()
            .unwrap();
        assert_eq!(last_student.content, "answer");

        let last = store.last_message("s1").unwrap().unwrap();
        assert_eq!(last.role, MessageRole::Interviewer);
        assert_eq!(last.current_question_id.as_deref(), Some("q1"));
    }

    #[test]
    fn identical_content_hashes_match() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
