//! Per-user oil interval records.

use chrono::{DateTime, Utc};

use crate::types::UserId;

/// An accepted odometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Odometer value in kilometers.
    pub km: i64,
    /// When the reading was accepted.
    pub at: DateTime<Utc>,
}

impl Reading {
    pub const fn new(km: i64, at: DateTime<Utc>) -> Self {
        Self { km, at }
    }
}

/// Where a user is in the oil interval lifecycle.
///
/// A start always sets both readings, so a last reading without a start cannot
/// be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntervalState {
    /// No interval is being tracked.
    #[default]
    Uninitialized,
    /// An oil change was recorded at `start`; `last` is the newest accepted reading.
    Tracking { start: Reading, last: Reading },
}

/// The stored state for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OilRecord {
    pub user_id: UserId,
    pub interval: IntervalState,
    /// Bumped by the repository on every successful save.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OilRecord {
    /// Creates an empty record for a user seen for the first time.
    pub const fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            interval: IntervalState::Uninitialized,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub const fn is_tracking(&self) -> bool {
        matches!(self.interval, IntervalState::Tracking { .. })
    }

    /// The reading recorded when the current oil was installed.
    pub const fn oil_start(&self) -> Option<&Reading> {
        match &self.interval {
            IntervalState::Uninitialized => None,
            IntervalState::Tracking { start, .. } => Some(start),
        }
    }

    /// The most recent accepted reading.
    pub const fn last_reading(&self) -> Option<&Reading> {
        match &self.interval {
            IntervalState::Uninitialized => None,
            IntervalState::Tracking { last, .. } => Some(last),
        }
    }

    /// Kilometers ridden since the oil change, `None` when nothing is tracked.
    pub const fn distance_since_start(&self) -> Option<i64> {
        match &self.interval {
            IntervalState::Uninitialized => None,
            IntervalState::Tracking { start, last } => Some(last.km.saturating_sub(start.km)),
        }
    }

    /// Begins a new interval at `reading`, replacing any previous one.
    pub fn start_interval(&mut self, reading: Reading) {
        self.interval = IntervalState::Tracking {
            start: reading,
            last: reading,
        };
        self.updated_at = reading.at;
    }

    /// Moves the last reading forward. Returns `false` if no interval is tracked.
    pub fn advance(&mut self, reading: Reading) -> bool {
        match &mut self.interval {
            IntervalState::Uninitialized => false,
            IntervalState::Tracking { last, .. } => {
                *last = reading;
                self.updated_at = reading.at;
                true
            }
        }
    }

    /// Drops all interval data.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.interval = IntervalState::Uninitialized;
        self.updated_at = now;
    }
}
