pub mod db;
pub mod error;
pub mod evaluations;
pub mod messages;
pub mod questions;
pub mod rag;
pub mod sessions;
pub mod types;
pub mod users;

pub use error::{Result, StoreError};

use std::sync::Mutex;

use rusqlite::Connection;

/// Typed storage for the interview platform.
///
/// Wraps a single SQLite connection in a `Mutex`. For high-concurrency
/// deployments consider a connection pool, but a Mutex is sufficient
/// for the single-node target; the hot path is LLM-bound, not DB-bound.
pub struct Store {
    pub(crate) db: Mutex<Connection>,
}

impl Store {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Open (or create) the database at `path` and initialise the schema.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(dir) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let conn = Connection::open(path)?;
        db::init_db(&conn)?;
        Ok(Self::new(conn))
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_db(&conn)?;
        Ok(Self::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_directories_and_is_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join("nested/prepwire.db")
            .to_string_lossy()
            .into_owned();

        let store = Store::open(&path).unwrap();
        drop(store);
        // Re-opening runs init_db again; the schema init is idempotent.
        Store::open(&path).unwrap();
    }
}
