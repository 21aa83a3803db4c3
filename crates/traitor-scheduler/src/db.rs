use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

/// Open (or create) the database at `path` in WAL mode and initialise the
/// scheduler schema.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    init_db(&conn)?;
    Ok(conn)
}

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` table (idempotent) plus an index on `state`, which is
/// what every tick filters on.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id              TEXT NOT NULL PRIMARY KEY,
            name            TEXT NOT NULL,
            description     TEXT NOT NULL DEFAULT '',
            exec_type       TEXT NOT NULL,          -- 'timing' | 'delay'
            cron            TEXT,                   -- 6-field expression, timing only
            exec_at         TEXT,                   -- RFC 3339, delay only
            script          TEXT NOT NULL DEFAULT '',
            state           TEXT NOT NULL DEFAULT 'disabled',
            last_exec_time  TEXT,                   -- RFC 3339 or NULL
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs (state);
        ",
    )?;
    Ok(())
}
