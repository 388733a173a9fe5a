//! Storage contract for user records.
//!
//! # Versioning
//!
//! Every [`OilRecord`] carries a `version`. [`UserRepository::save`] only
//! succeeds when the stored version still equals the record's version, and
//! bumps it on write. A mismatch means another writer got there first and is
//! reported as [`RepositoryError::Conflict`].

use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::{self, Future};
use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;

use crate::record::OilRecord;
use crate::types::UserId;

/// Repository failures. None of these leave a partially written record.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backing store could not be reached or failed the operation.
    #[error("repository unavailable: {0}")]
    Unavailable(#[source] Box<dyn StdError + Send + Sync>),
    /// The record changed since it was read.
    #[error("stale write for user {user_id}: expected version {expected}")]
    Conflict { user_id: UserId, expected: i64 },
    /// `save` was called for a user that was never created.
    #[error("user {user_id} not found")]
    NotFound { user_id: UserId },
    /// A stored row violates the record invariants.
    #[error("corrupt record for user {user_id}: {message}")]
    Corrupt { user_id: String, message: String },
}

impl RepositoryError {
    /// Wraps a backend error as [`RepositoryError::Unavailable`].
    pub fn unavailable(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Unavailable(err.into())
    }
}

/// Persistence for per-user oil records.
///
/// Implementations must keep `user_id` unique and write every field of a
/// record in one atomic step.
pub trait UserRepository: Send + Sync {
    /// Loads a record, `None` if the user was never seen.
    fn get(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<OilRecord>, RepositoryError>> + Send;

    /// Creates an empty record, or returns the existing one if a concurrent
    /// caller created it first.
    fn create(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<OilRecord, RepositoryError>> + Send;

    /// Writes `record` if its version is current and returns the stored copy
    /// with the bumped version.
    fn save(
        &self,
        record: &OilRecord,
    ) -> impl Future<Output = Result<OilRecord, RepositoryError>> + Send;
}

/// In-memory repository, used by tests and as a scratch backend.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: Mutex<HashMap<UserId, OilRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut HashMap<UserId, OilRecord>) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| RepositoryError::unavailable("memory repository lock poisoned"))?;
        f(&mut records)
    }
}

impl UserRepository for MemoryRepository {
    fn get(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<OilRecord>, RepositoryError>> + Send {
        future::ready(self.with_records(|records| Ok(records.get(user_id).cloned())))
    }

    fn create(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<OilRecord, RepositoryError>> + Send {
        future::ready(self.with_records(|records| {
            let record = records
                .entry(user_id.clone())
                .or_insert_with(|| OilRecord::new(user_id.clone(), Utc::now()));
            Ok(record.clone())
        }))
    }

    fn save(
        &self,
        record: &OilRecord,
    ) -> impl Future<Output = Result<OilRecord, RepositoryError>> + Send {
        future::ready(self.with_records(|records| {
            let Some(stored) = records.get_mut(&record.user_id) else {
                return Err(RepositoryError::NotFound {
                    user_id: record.user_id.clone(),
                });
            };
            if stored.version != record.version {
                return Err(RepositoryError::Conflict {
                    user_id: record.user_id.clone(),
                    expected: record.version,
                });
            }
            let mut saved = record.clone();
            saved.version += 1;
            *stored = saved.clone();
            Ok(saved)
        }))
    }
}
