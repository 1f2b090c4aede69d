use rusqlite::{Connection, Result};

/// Initialise all tables. Safe to call on every startup — CREATE IF
/// NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_questions_table(conn)?;
    create_sessions_table(conn)?;
    create_messages_table(conn)?;
    create_turn_scores_table(conn)?;
    create_session_questions_table(conn)?;
    create_user_question_seen_table(conn)?;
    create_evaluations_table(conn)?;
    create_session_embeddings_table(conn)?;
    create_response_examples_table(conn)?;
    create_session_feedback_table(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY NOT NULL,
            email           TEXT NOT NULL UNIQUE,
            credential_hash TEXT NOT NULL,
            verified        INTEGER NOT NULL DEFAULT 0,
            prefs           TEXT NOT NULL DEFAULT '{}',  -- JSON object
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );",
    )
}

fn create_questions_table(conn: &Connection) -> Result<()> {
    // The covering index serves the selector's hot path:
    // pool by (track, company, difficulty, question_type).
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS questions (
            id            TEXT PRIMARY KEY NOT NULL,
            track         TEXT NOT NULL,
            company       TEXT NOT NULL,
            difficulty    TEXT NOT NULL,
            title         TEXT NOT NULL,
            prompt        TEXT NOT NULL,
            tags          TEXT NOT NULL DEFAULT '[]',  -- JSON array, ordered
            question_type TEXT NOT NULL,
            followups     TEXT NOT NULL DEFAULT '[]',  -- JSON array of scripted follow-ups
            meta          TEXT NOT NULL DEFAULT '{}',  -- JSON object
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_questions_pool
            ON questions(track, company, difficulty, question_type);",
    )
}

fn create_sessions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id                    TEXT PRIMARY KEY NOT NULL,
            user_id               TEXT NOT NULL REFERENCES users(id),
            role                  TEXT NOT NULL,
            track                 TEXT NOT NULL,
            company               TEXT NOT NULL,
            difficulty_ceiling    TEXT NOT NULL,
            difficulty_current    TEXT NOT NULL,
            stage                 TEXT NOT NULL DEFAULT 'intro',
            questions_asked_count INTEGER NOT NULL DEFAULT 0,
            followups_used        INTEGER NOT NULL DEFAULT 0,
            max_questions         INTEGER NOT NULL,
            max_followups         INTEGER NOT NULL,
            behavioral_target     INTEGER NOT NULL DEFAULT 0,
            current_question_id   TEXT,
            skill_state           TEXT NOT NULL DEFAULT '{}',  -- JSON, full-replacement writes
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions(user_id, updated_at DESC);",
    )
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    // Append-only. The AUTOINCREMENT rowid plus created_at gives the
    // transcript its total order.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id          TEXT NOT NULL,
            role                TEXT NOT NULL,
            content             TEXT NOT NULL,
            current_question_id TEXT,
            content_hash        TEXT NOT NULL,
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages(session_id, id);",
    )
}

fn create_turn_scores_table(conn: &Connection) -> Result<()> {
    // One row per scored student turn — the quick-rubric stream.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS turn_scores (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            message_id  INTEGER NOT NULL,
            question_id TEXT,
            rubric      TEXT NOT NULL,  -- JSON rubric record
            note        TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turn_scores_session
            ON turn_scores(session_id, id);",
    )
}

fn create_session_questions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session_questions (
            session_id  TEXT NOT NULL,
            question_id TEXT NOT NULL,
            position    INTEGER NOT NULL,
            asked_at    TEXT NOT NULL,
            PRIMARY KEY (session_id, question_id)
        );
        CREATE INDEX IF NOT EXISTS idx_session_questions_order
            ON session_questions(session_id, position);",
    )
}

fn create_user_question_seen_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_question_seen (
            user_id     TEXT NOT NULL,
            question_id TEXT NOT NULL,
            seen_at     TEXT NOT NULL,
            PRIMARY KEY (user_id, question_id)
        );",
    )
}

fn create_evaluations_table(conn: &Connection) -> Result<()> {
    // UNIQUE(session_id) is the at-most-one-evaluation guarantee;
    // concurrent finalizers resolve the conflict by reading back.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS evaluations (
            id            TEXT PRIMARY KEY NOT NULL,
            session_id    TEXT NOT NULL UNIQUE,
            overall_score INTEGER NOT NULL,
            rubric        TEXT NOT NULL,  -- JSON rubric record
            summary       TEXT NOT NULL,  -- JSON {strengths, weaknesses, next_steps}
            hire_signal   TEXT,
            was_fallback  INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );",
    )
}

fn create_session_embeddings_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session_embeddings (
            session_id TEXT PRIMARY KEY NOT NULL,
            vector     TEXT NOT NULL,  -- JSON array of 384 floats
            digest     TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );",
    )
}

fn create_response_examples_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS response_examples (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            question_id TEXT NOT NULL,
            content     TEXT NOT NULL,
            quality     REAL NOT NULL,
            tags        TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_examples_question
            ON response_examples(question_id);",
    )
}

fn create_session_feedback_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session_feedback (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id     TEXT NOT NULL,
            stars          INTEGER,
            thumb          TEXT,
            rubric_ratings TEXT,  -- JSON, optional per-dimension ratings
            comment        TEXT,
            created_at     TEXT NOT NULL
        );",
    )
}
