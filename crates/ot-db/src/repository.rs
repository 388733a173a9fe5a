//! [`UserRepository`] backed by [`Database`].

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use ot_core::{OilRecord, RepositoryError, UserId, UserRepository};

use crate::{Database, DbError, SaveStatus, UserRow};

impl From<DbError> for RepositoryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Sqlite(err) => Self::unavailable(err),
            DbError::TimestampParse {
                user_id, timestamp, ..
            } => Self::Corrupt {
                user_id,
                message: format!("unparseable timestamp {timestamp}"),
            },
            DbError::InvalidRecord { user_id, message } => Self::Corrupt { user_id, message },
        }
    }
}

/// SQLite-backed repository shared across tasks.
///
/// Queries run on tokio's blocking pool so a slow or busy database never
/// stalls the async workers.
#[derive(Clone)]
pub struct SqliteRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        Database::open(path).map(Self::new)
    }

    /// Runs `f` against the database on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, RepositoryError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let db = db
                .lock()
                .map_err(|_| RepositoryError::unavailable("database lock poisoned"))?;
            f(&db)
        })
        .await
        .map_err(|err| RepositoryError::unavailable(format!("database task failed: {err}")))?
    }
}

fn get_user(db: &Database, user_id: &UserId) -> Result<Option<OilRecord>, RepositoryError> {
    db.get_user(user_id.as_str())?
        .map(UserRow::into_record)
        .transpose()
        .map_err(RepositoryError::from)
}

fn create_user(db: &Database, user_id: &UserId) -> Result<OilRecord, RepositoryError> {
    Ok(db.create_user(user_id.as_str(), Utc::now())?.into_record()?)
}

fn save_user(db: &Database, record: OilRecord) -> Result<OilRecord, RepositoryError> {
    match db.save_user(&UserRow::from_record(&record))? {
        SaveStatus::Saved => {
            let mut saved = record;
            saved.version += 1;
            Ok(saved)
        }
        SaveStatus::Stale => Err(RepositoryError::Conflict {
            expected: record.version,
            user_id: record.user_id,
        }),
        SaveStatus::Missing => Err(RepositoryError::NotFound {
            user_id: record.user_id,
        }),
    }
}

impl UserRepository for SqliteRepository {
    fn get(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<OilRecord>, RepositoryError>> + Send {
        let user_id = user_id.clone();
        self.with_db(move |db| get_user(db, &user_id))
    }

    fn create(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<OilRecord, RepositoryError>> + Send {
        let user_id = user_id.clone();
        self.with_db(move |db| create_user(db, &user_id))
    }

    fn save(
        &self,
        record: &OilRecord,
    ) -> impl Future<Output = Result<OilRecord, RepositoryError>> + Send {
        let record = record.clone();
        self.with_db(move |db| save_user(db, record))
    }
}
