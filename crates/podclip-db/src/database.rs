//! Connection management and schema.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::error::{DbError, DbResult};

/// SQLite database holding the `jobs` and `clips` tables.
///
/// The connection is shared behind a mutex; WAL mode keeps readers from
/// blocking the writer when a second process (e.g. a CLI) opens the file.
#[derive(Debug)]
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::migrate(&conn)?;
        info!("Opened database at {}", path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> DbResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                job_type      TEXT    NOT NULL,
                status        TEXT    NOT NULL DEFAULT 'pending',
                progress      INTEGER NOT NULL DEFAULT 0,
                payload       TEXT    NOT NULL DEFAULT '{}',
                unique_key    TEXT,
                attempts      INTEGER NOT NULL DEFAULT 0,
                max_attempts  INTEGER NOT NULL DEFAULT 3,
                error         TEXT,
                run_after     TEXT,
                claimed_by    TEXT,
                created_at    TEXT    NOT NULL,
                updated_at    TEXT    NOT NULL,
                started_at    TEXT,
                completed_at  TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS jobs_unique_active
                ON jobs (unique_key)
                WHERE unique_key IS NOT NULL
                  AND status IN ('pending', 'processing');

            CREATE INDEX IF NOT EXISTS jobs_claim
                ON jobs (status, created_at, id);

            CREATE TABLE IF NOT EXISTS clips (
                id                        INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid                      TEXT    NOT NULL UNIQUE,
                podcast_index_episode_id  INTEGER NOT NULL,
                source_episode_url        TEXT    NOT NULL,
                original_start_time      REAL    NOT NULL,
                original_end_time        REAL    NOT NULL,
                label                     TEXT    NOT NULL,
                status                    TEXT    NOT NULL DEFAULT 'detected',
                approved                  INTEGER NOT NULL DEFAULT 0,
                extracted                 INTEGER NOT NULL DEFAULT 0,
                clip_filename             TEXT,
                clip_duration             REAL,
                clip_size_bytes           INTEGER,
                auto_labeled              INTEGER NOT NULL DEFAULT 0,
                label_confidence          REAL,
                label_method              TEXT    NOT NULL DEFAULT 'manual',
                error_message             TEXT,
                created_at                TEXT    NOT NULL,
                updated_at                TEXT    NOT NULL
            );

            CREATE INDEX IF NOT EXISTS clips_episode
                ON clips (podcast_index_episode_id);

            CREATE INDEX IF NOT EXISTS clips_status
                ON clips (status);",
        )?;
        Ok(())
    }
}

/// Current time in the canonical stored form (RFC 3339, microseconds, UTC).
pub(crate) fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Render a timestamp in the canonical stored form.
pub(crate) fn ts_str(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub(crate) fn parse_ts(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::corrupt(format!("bad timestamp {s:?}: {e}")))
}

/// Parse an optional stored timestamp.
pub(crate) fn parse_opt_ts(s: Option<String>) -> DbResult<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(&s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        Database::migrate(&conn).unwrap();
        Database::migrate(&conn).unwrap();
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let parsed = parse_ts(&ts_str(&now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }
}
