//! Storage layer for the oil interval tracker.
//!
//! Provides persistence for per-user oil records using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! [`SqliteRepository`] puts it behind a `Mutex` so it can back the async tracker.
//! Separate processes opening the same file are kept consistent by the
//! `version` column (see [`Database::save_user`]).
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in ISO 8601 format with nanoseconds
//! (e.g., `2024-01-15T10:30:00.123456789Z`), so a record reads back exactly as
//! it was written and lexicographic ordering matches chronological ordering.
//!
//! ## Interval Columns
//!
//! `oil_start_km`/`oil_start_at` and `last_reading_km`/`last_reading_at` are
//! nullable pairs. CHECK constraints keep each pair all-or-nothing; a row with
//! a last reading but no oil start is rejected when it is read back.

mod repository;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use ot_core::{IntervalState, OilRecord, Reading, UserId};

pub use repository::SqliteRepository;

/// How long a write waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for user {user_id}: {timestamp}")]
    TimestampParse {
        user_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row does not describe a valid record.
    #[error("invalid record for user {user_id}: {message}")]
    InvalidRecord { user_id: String, message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A user row as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user_id: String,
    pub oil_start_km: Option<i64>,
    pub oil_start_at: Option<String>,
    pub last_reading_km: Option<i64>,
    pub last_reading_at: Option<String>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Result of a versioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// The row was written and its version bumped.
    Saved,
    /// The stored version no longer matches.
    Stale,
    /// No row exists for the user.
    Missing,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- One row per end user, created lazily on first contact.
            -- *_at columns: ISO 8601 (e.g., '2024-01-15T10:30:00.000000000Z')
            -- version: bumped on every write, used for compare-and-swap saves
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                oil_start_km INTEGER,
                oil_start_at TEXT,
                last_reading_km INTEGER,
                last_reading_at TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK ((oil_start_km IS NULL) = (oil_start_at IS NULL)),
                CHECK ((last_reading_km IS NULL) = (last_reading_at IS NULL)),
                CHECK (oil_start_km BETWEEN 0 AND 300000),
                CHECK (last_reading_km BETWEEN 0 AND 300000)
            );

            CREATE INDEX IF NOT EXISTS idx_users_updated ON users(updated_at);
            ",
        )?;
        Ok(())
    }

    /// Loads a user row.
    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT user_id, oil_start_km, oil_start_at, last_reading_km, last_reading_at,
                       version, created_at, updated_at
                FROM users
                WHERE user_id = ?
                ",
                [user_id],
                user_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Inserts an empty row for the user unless one exists, then returns the stored row.
    pub fn create_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<UserRow, DbError> {
        let now = format_timestamp(now);
        let inserted = self.conn.execute(
            "
            INSERT OR IGNORE INTO users (user_id, version, created_at, updated_at)
            VALUES (?, 0, ?, ?)
            ",
            params![user_id, now, now],
        )?;
        if inserted > 0 {
            tracing::debug!(user_id, "created user");
        }
        let row = self.conn.query_row(
            "
            SELECT user_id, oil_start_km, oil_start_at, last_reading_km, last_reading_at,
                   version, created_at, updated_at
            FROM users
            WHERE user_id = ?
            ",
            [user_id],
            user_row,
        )?;
        Ok(row)
    }

    /// Writes every interval column of `row` in one statement, provided the
    /// stored version still equals `row.version`.
    pub fn save_user(&self, row: &UserRow) -> Result<SaveStatus, DbError> {
        let updated = self.conn.execute(
            "
            UPDATE users
            SET oil_start_km = ?, oil_start_at = ?, last_reading_km = ?, last_reading_at = ?,
                updated_at = ?, version = version + 1
            WHERE user_id = ? AND version = ?
            ",
            params![
                row.oil_start_km,
                row.oil_start_at,
                row.last_reading_km,
                row.last_reading_at,
                row.updated_at,
                row.user_id,
                row.version,
            ],
        )?;
        if updated > 0 {
            return Ok(SaveStatus::Saved);
        }

        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?)",
            [&row.user_id],
            |r| r.get(0),
        )?;
        Ok(if exists {
            SaveStatus::Stale
        } else {
            SaveStatus::Missing
        })
    }

    /// Number of stored users.
    pub fn count_users(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user_id: row.get(0)?,
        oil_start_km: row.get(1)?,
        oil_start_at: row.get(2)?,
        last_reading_km: row.get(3)?,
        last_reading_at: row.get(4)?,
        version: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl UserRow {
    /// Flattens a record into nullable columns.
    pub fn from_record(record: &OilRecord) -> Self {
        let (start, last) = match record.interval {
            IntervalState::Uninitialized => (None, None),
            IntervalState::Tracking { start, last } => (Some(start), Some(last)),
        };
        Self {
            user_id: record.user_id.to_string(),
            oil_start_km: start.map(|r| r.km),
            oil_start_at: start.map(|r| format_timestamp(r.at)),
            last_reading_km: last.map(|r| r.km),
            last_reading_at: last.map(|r| format_timestamp(r.at)),
            version: record.version,
            created_at: format_timestamp(record.created_at),
            updated_at: format_timestamp(record.updated_at),
        }
    }

    /// Rebuilds the record, rejecting rows that break the pairing invariants.
    pub fn into_record(self) -> Result<OilRecord, DbError> {
        let user_id = UserId::new(self.user_id.clone()).map_err(|err| DbError::InvalidRecord {
            user_id: self.user_id.clone(),
            message: err.to_string(),
        })?;
        let start = self.reading(self.oil_start_km, self.oil_start_at.as_deref(), "oil start")?;
        let last = self.reading(
            self.last_reading_km,
            self.last_reading_at.as_deref(),
            "last reading",
        )?;

        let interval = match (start, last) {
            (None, None) => IntervalState::Uninitialized,
            (Some(start), Some(last)) => IntervalState::Tracking { start, last },
            (None, Some(_)) => return Err(self.invalid("last reading without oil start")),
            (Some(_), None) => return Err(self.invalid("oil start without last reading")),
        };

        Ok(OilRecord {
            user_id,
            interval,
            version: self.version,
            created_at: parse_timestamp(&self.created_at, &self.user_id)?,
            updated_at: parse_timestamp(&self.updated_at, &self.user_id)?,
        })
    }

    fn reading(
        &self,
        km: Option<i64>,
        at: Option<&str>,
        what: &str,
    ) -> Result<Option<Reading>, DbError> {
        match (km, at) {
            (None, None) => Ok(None),
            (Some(km), Some(at)) => Ok(Some(Reading::new(
                km,
                parse_timestamp(at, &self.user_id)?,
            ))),
            _ => Err(self.invalid(&format!("{what} km and timestamp must be set together"))),
        }
    }

    fn invalid(&self, message: &str) -> DbError {
        DbError::InvalidRecord {
            user_id: self.user_id.clone(),
            message: message.to_string(),
        }
    }
}

fn parse_timestamp(timestamp: &str, user_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            user_id: user_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
