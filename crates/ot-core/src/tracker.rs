//! Oil interval state machine.
//!
//! A user moves between two persisted states:
//! - **Uninitialized**: no oil change recorded.
//! - **Tracking**: an oil change at some odometer value, plus the latest reading.
//!
//! Whether the next reading starts a new interval is decided by the caller
//! (the `awaiting_start` flag of the user's session), not stored here.
//!
//! # Concurrency
//!
//! Each operation is a read-modify-write. Operations for the same user are
//! serialized by a per-user async mutex, so two readings sent back to back are
//! validated in submission order. Callers that keep their own per-user state
//! take the lock with [`OilTracker::lock_user`] and use the `*_locked`
//! operations so that state changes in the same critical section. Idle locks
//! are dropped from the map. Writers in other processes are caught by the
//! repository's version check; the tracker then re-reads, re-validates and
//! tries again, up to [`MAX_SAVE_ATTEMPTS`] times.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use crate::record::{OilRecord, Reading};
use crate::repository::{RepositoryError, UserRepository};
use crate::types::UserId;
use crate::validate::{Implausibility, check_plausibility};

/// How many times a conflicting save is retried before giving up.
pub const MAX_SAVE_ATTEMPTS: u32 = 3;

/// Result of submitting a reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadingOutcome {
    /// A new interval was started at `start`.
    Started { start: Reading, record: OilRecord },
    /// The last reading of the interval begun at `start` was advanced to `last`.
    Updated {
        start: Reading,
        last: Reading,
        record: OilRecord,
    },
    /// The reading failed validation. Nothing was written.
    Implausible(Implausibility),
    /// No interval is tracked and no start was requested. Nothing was written.
    NoActiveInterval,
}

/// Exclusive access to one user's record.
///
/// Obtained from [`OilTracker::lock_user`]; the `*_locked` operations take it
/// so callers can keep their own per-user state (like the session flag) in
/// step with the record.
pub struct UserGuard {
    user_id: UserId,
    _guard: OwnedMutexGuard<()>,
}

impl UserGuard {
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

/// Applies readings and resets to user records.
pub struct OilTracker<R> {
    repo: R,
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<R: UserRepository> OilTracker<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub const fn repository(&self) -> &R {
        &self.repo
    }

    /// Waits for exclusive access to the user's record.
    ///
    /// Waiters are served in the order they arrived.
    pub async fn lock_user(&self, user_id: &UserId) -> UserGuard {
        let lock = self.user_lock(user_id);
        UserGuard {
            user_id: user_id.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Validates `candidate_km` and commits it as a start or an update.
    pub async fn submit_reading(
        &self,
        user_id: &UserId,
        candidate_km: i64,
        awaiting_start: bool,
    ) -> Result<ReadingOutcome, RepositoryError> {
        let guard = self.lock_user(user_id).await;
        self.submit_reading_locked(&guard, candidate_km, awaiting_start)
            .await
    }

    /// [`submit_reading`](Self::submit_reading) for a caller already holding the user's lock.
    pub async fn submit_reading_locked(
        &self,
        guard: &UserGuard,
        candidate_km: i64,
        awaiting_start: bool,
    ) -> Result<ReadingOutcome, RepositoryError> {
        let user_id = guard.user_id();
        retry_on_conflict(user_id, || {
            self.try_submit(user_id, candidate_km, awaiting_start)
        })
        .await
    }

    /// Clears all interval data for the user.
    pub async fn reset(&self, user_id: &UserId) -> Result<OilRecord, RepositoryError> {
        let guard = self.lock_user(user_id).await;
        self.reset_locked(&guard).await
    }

    /// [`reset`](Self::reset) for a caller already holding the user's lock.
    pub async fn reset_locked(&self, guard: &UserGuard) -> Result<OilRecord, RepositoryError> {
        let user_id = guard.user_id();
        retry_on_conflict(user_id, || self.try_reset(user_id)).await
    }

    /// Returns the user's record, creating an empty one on first contact.
    pub async fn record(&self, user_id: &UserId) -> Result<OilRecord, RepositoryError> {
        self.fetch_or_create(user_id).await
    }

    async fn try_submit(
        &self,
        user_id: &UserId,
        candidate_km: i64,
        awaiting_start: bool,
    ) -> Result<ReadingOutcome, RepositoryError> {
        let mut record = self.fetch_or_create(user_id).await?;

        if let Err(reason) = check_plausibility(Some(&record), candidate_km) {
            tracing::debug!(user_id = %user_id, km = candidate_km, %reason, "rejected reading");
            return Ok(ReadingOutcome::Implausible(reason));
        }

        let reading = Reading::new(candidate_km, Utc::now());
        if awaiting_start {
            record.start_interval(reading);
            let saved = self.repo.save(&record).await?;
            tracing::debug!(user_id = %user_id, km = candidate_km, "started oil interval");
            return Ok(ReadingOutcome::Started {
                start: reading,
                record: saved,
            });
        }

        let Some(start) = record.oil_start().copied() else {
            return Ok(ReadingOutcome::NoActiveInterval);
        };
        record.advance(reading);
        let saved = self.repo.save(&record).await?;
        tracing::debug!(
            user_id = %user_id,
            km = candidate_km,
            distance = candidate_km.saturating_sub(start.km),
            "recorded reading"
        );
        Ok(ReadingOutcome::Updated {
            start,
            last: reading,
            record: saved,
        })
    }

    async fn try_reset(&self, user_id: &UserId) -> Result<OilRecord, RepositoryError> {
        let mut record = self.fetch_or_create(user_id).await?;
        record.clear(Utc::now());
        let saved = self.repo.save(&record).await?;
        tracing::debug!(user_id = %user_id, "reset oil data");
        Ok(saved)
    }

    async fn fetch_or_create(&self, user_id: &UserId) -> Result<OilRecord, RepositoryError> {
        if let Some(record) = self.repo.get(user_id).await? {
            return Ok(record);
        }
        self.repo.create(user_id).await
    }

    fn user_lock(&self, user_id: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        // Entries are whole Arcs, so a poisoned lock still holds valid data.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map refers to an idle lock; a fresh one behaves the same.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(user_id.clone()).or_default())
    }
}

async fn retry_on_conflict<T, F, Fut>(user_id: &UserId, mut op: F) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(RepositoryError::Conflict { expected, .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                tracing::warn!(user_id = %user_id, expected, attempt, "record changed concurrently, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::repository::MemoryRepository;
    use crate::repository::testing::YieldingRepository;
    use crate::status::{Tier, classify};

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn tracker() -> OilTracker<MemoryRepository> {
        OilTracker::new(MemoryRepository::new())
    }

    #[tokio::test]
    async fn update_without_start_is_refused_and_not_written() {
        let tracker = tracker();
        let rider = user("rider");

        let outcome = tracker.submit_reading(&rider, 5_000, false).await.unwrap();
        assert_eq!(outcome, ReadingOutcome::NoActiveInterval);

        let stored = tracker.repository().get(&rider).await.unwrap().unwrap();
        assert!(!stored.is_tracking());
        assert_eq!(stored.version, 0);
    }

    #[tokio::test]
    async fn start_resets_baseline() {
        let tracker = tracker();
        let rider = user("rider");

        tracker.submit_reading(&rider, 1_000, true).await.unwrap();
        tracker.submit_reading(&rider, 1_600, false).await.unwrap();
        let ReadingOutcome::Started { record, .. } =
            tracker.submit_reading(&rider, 2_000, true).await.unwrap()
        else {
            panic!("expected a start");
        };

        assert_eq!(record.distance_since_start(), Some(0));
        assert_eq!(record.oil_start().map(|r| r.km), Some(2_000));
        assert_eq!(record.oil_start(), record.last_reading());
    }

    #[tokio::test]
    async fn start_is_still_validated_against_history() {
        let tracker = tracker();
        let rider = user("rider");

        tracker.submit_reading(&rider, 8_000, true).await.unwrap();
        let outcome = tracker.submit_reading(&rider, 7_000, true).await.unwrap();
        assert!(matches!(
            outcome,
            ReadingOutcome::Implausible(Implausibility::Decreased { .. })
        ));
    }

    #[tokio::test]
    async fn implausible_reading_leaves_record_untouched() {
        let tracker = tracker();
        let rider = user("rider");

        tracker.submit_reading(&rider, 10_000, true).await.unwrap();
        let before = tracker.record(&rider).await.unwrap();

        for km in [9_999, 15_001, -1, 300_001] {
            let outcome = tracker.submit_reading(&rider, km, false).await.unwrap();
            assert!(matches!(outcome, ReadingOutcome::Implausible(_)), "{km}");
        }

        assert_eq!(tracker.record(&rider).await.unwrap(), before);
    }

    #[tokio::test]
    async fn readings_are_monotonic() {
        let tracker = tracker();
        let rider = user("rider");
        tracker.submit_reading(&rider, 100, true).await.unwrap();

        let mut last = 100;
        for km in [100, 900, 850, 5_900, 10_901, 10_900, 10_950] {
            let outcome = tracker.submit_reading(&rider, km, false).await.unwrap();
            if let ReadingOutcome::Updated { last: reading, .. } = outcome {
                assert!(reading.km >= last);
                last = reading.km;
            }
        }
        assert_eq!(last, 10_950);
    }

    #[tokio::test]
    async fn reset_twice_yields_empty_record() {
        let tracker = tracker();
        let rider = user("rider");
        tracker.submit_reading(&rider, 4_000, true).await.unwrap();

        let first = tracker.reset(&rider).await.unwrap();
        let second = tracker.reset(&rider).await.unwrap();

        assert!(!first.is_tracking());
        assert_eq!(first.interval, second.interval);
        assert_eq!(
            tracker.submit_reading(&rider, 4_100, false).await.unwrap(),
            ReadingOutcome::NoActiveInterval
        );
    }

    #[tokio::test]
    async fn reset_on_unknown_user_creates_record() {
        let tracker = tracker();
        let record = tracker.reset(&user("new")).await.unwrap();
        assert!(!record.is_tracking());
        assert_eq!(tracker.repository().len(), 1);
    }

    #[tokio::test]
    async fn users_are_independent() {
        let tracker = tracker();
        tracker.submit_reading(&user("a"), 50_000, true).await.unwrap();

        let outcome = tracker.submit_reading(&user("b"), 100, false).await.unwrap();
        assert_eq!(outcome, ReadingOutcome::NoActiveInterval);
        let outcome = tracker.submit_reading(&user("b"), 100, true).await.unwrap();
        assert!(matches!(outcome, ReadingOutcome::Started { .. }));
    }

    #[tokio::test]
    async fn oil_change_scenario() {
        let tracker = tracker();
        let rider = user("rider");

        let ReadingOutcome::Started { record: started, .. } =
            tracker.submit_reading(&rider, 10_000, true).await.unwrap()
        else {
            panic!("expected a start");
        };
        assert_eq!(started.oil_start().map(|r| r.km), Some(10_000));
        assert_eq!(started.last_reading().map(|r| r.km), Some(10_000));

        let ReadingOutcome::Updated {
            record: updated, ..
        } = tracker.submit_reading(&rider, 10_850, false).await.unwrap()
        else {
            panic!("expected an update");
        };
        let distance = updated.distance_since_start().unwrap();
        assert_eq!(distance, 850);
        let status = classify(distance);
        assert_eq!(status.tier, Tier::Warning);
        assert_eq!(status.remaining_km, 150);
    }

    fn saved_last_km(repo: &YieldingRepository) -> Vec<i64> {
        repo.saved
            .lock()
            .unwrap()
            .iter()
            .filter_map(|record| record.last_reading().map(|r| r.km))
            .collect()
    }

    #[tokio::test]
    async fn interleaved_submissions_commit_in_submission_order() {
        let tracker = OilTracker::new(YieldingRepository::default());
        let rider = user("rider");
        tracker.submit_reading(&rider, 1_000, true).await.unwrap();

        let (a, b, c, d) = tokio::join!(
            tracker.submit_reading(&rider, 1_010, false),
            tracker.submit_reading(&rider, 1_020, false),
            tracker.submit_reading(&rider, 1_030, false),
            tracker.submit_reading(&rider, 1_040, false),
        );
        for (outcome, km) in [(a, 1_010), (b, 1_020), (c, 1_030), (d, 1_040)] {
            let ReadingOutcome::Updated { start, last, .. } = outcome.unwrap() else {
                panic!("expected an update for {km}");
            };
            assert_eq!(start.km, 1_000);
            assert_eq!(last.km, km);
        }

        let repo = tracker.repository();
        assert_eq!(repo.conflicts.load(Ordering::SeqCst), 0);
        assert_eq!(
            saved_last_km(repo),
            vec![1_000, 1_010, 1_020, 1_030, 1_040]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_never_move_backwards() {
        let tracker = Arc::new(OilTracker::new(YieldingRepository::default()));
        let rider = user("rider");
        tracker.submit_reading(&rider, 1_000, true).await.unwrap();

        let mut handles = Vec::new();
        for step in 1..=20 {
            let tracker = Arc::clone(&tracker);
            let rider = rider.clone();
            handles.push(tokio::spawn(async move {
                tracker.submit_reading(&rider, 1_000 + step * 10, false).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let repo = tracker.repository();
        assert_eq!(repo.conflicts.load(Ordering::SeqCst), 0);
        let saved = saved_last_km(repo);
        assert!(saved.len() >= 2);
        assert!(saved.windows(2).all(|pair| pair[0] <= pair[1]), "{saved:?}");
    }

    #[tokio::test]
    async fn idle_user_locks_are_dropped() {
        let tracker = tracker();
        for id in ["a", "b", "c"] {
            tracker.submit_reading(&user(id), 100, true).await.unwrap();
        }
        assert_eq!(tracker.locks.lock().unwrap().len(), 1);

        let held = tracker.lock_user(&user("a")).await;
        tracker.submit_reading(&user("b"), 200, false).await.unwrap();
        assert_eq!(tracker.locks.lock().unwrap().len(), 2);
        drop(held);

        tracker.submit_reading(&user("c"), 300, false).await.unwrap();
        assert_eq!(tracker.locks.lock().unwrap().len(), 1);
    }

    /// Bumps the stored version behind the tracker's back a set number of times.
    struct RacingRepository {
        inner: MemoryRepository,
        races_left: AtomicU32,
    }

    impl UserRepository for RacingRepository {
        fn get(
            &self,
            user_id: &UserId,
        ) -> impl Future<Output = Result<Option<OilRecord>, RepositoryError>> + Send {
            self.inner.get(user_id)
        }

        fn create(
            &self,
            user_id: &UserId,
        ) -> impl Future<Output = Result<OilRecord, RepositoryError>> + Send {
            self.inner.create(user_id)
        }

        async fn save(&self, record: &OilRecord) -> Result<OilRecord, RepositoryError> {
            let race = self
                .races_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if race {
                let current = self.inner.get(&record.user_id).await?.unwrap();
                self.inner.save(&current).await?;
            }
            self.inner.save(record).await
        }
    }

    #[tokio::test]
    async fn conflicting_write_is_retried() {
        let tracker = OilTracker::new(RacingRepository {
            inner: MemoryRepository::new(),
            races_left: AtomicU32::new(1),
        });
        let rider = user("rider");

        let outcome = tracker.submit_reading(&rider, 3_000, true).await.unwrap();
        assert!(matches!(outcome, ReadingOutcome::Started { .. }));
    }

    #[tokio::test]
    async fn persistent_conflict_is_propagated() {
        let tracker = OilTracker::new(RacingRepository {
            inner: MemoryRepository::new(),
            races_left: AtomicU32::new(MAX_SAVE_ATTEMPTS),
        });
        let rider = user("rider");

        let err = tracker.submit_reading(&rider, 3_000, true).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
    }

    struct DownRepository;

    impl UserRepository for DownRepository {
        async fn get(&self, _: &UserId) -> Result<Option<OilRecord>, RepositoryError> {
            Err(RepositoryError::unavailable("connection refused"))
        }

        async fn create(&self, _: &UserId) -> Result<OilRecord, RepositoryError> {
            Err(RepositoryError::unavailable("connection refused"))
        }

        async fn save(&self, _: &OilRecord) -> Result<OilRecord, RepositoryError> {
            Err(RepositoryError::unavailable("connection refused"))
        }
    }

    #[tokio::test]
    async fn unavailable_repository_is_a_hard_failure() {
        let tracker = OilTracker::new(DownRepository);
        let err = tracker
            .submit_reading(&user("rider"), 1_000, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Unavailable(_)));
        assert!(tracker.reset(&user("rider")).await.is_err());
    }
}
