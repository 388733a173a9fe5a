//! Entry points for chat events.
//!
//! Transports hand events to [`Ingress::handle`] and render the returned
//! [`Outcome`]. The "awaiting oil start" flag for each user lives here in a
//! [`SessionStore`]; it is never persisted and is passed to the tracker as a
//! plain argument. The flag is read and changed only while the user's tracker
//! lock is held, so two readings racing after `/new_oil` start one interval.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::digits::to_ascii_digits;
use crate::extract::DigitExtractor;
use crate::record::OilRecord;
use crate::repository::{RepositoryError, UserRepository};
use crate::selector::{CandidateSelector, LargestPlausible};
use crate::status::{Tier, classify};
use crate::tracker::{OilTracker, ReadingOutcome};
use crate::types::UserId;
use crate::validate::Implausibility;

/// Default upper bound on a single digit extraction call.
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// ASCII integer with an optional fractional part, e.g. `12345` or `-3` or `12345.6`.
static KM_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?[0-9]+)(?:\.[0-9]+)?$").unwrap());

/// Something a user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressEvent {
    /// The user is about to report the odometer at an oil change.
    NewIntervalRequested,
    /// A typed reading; `raw_text` is everything after the command word.
    TextReading { raw_text: String },
    /// A photo of the odometer.
    PhotoReading { image: Vec<u8> },
    ResetRequested,
    StatusRequested,
}

/// Which path a reading came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSource {
    Text,
    Photo,
}

/// What happened, for the transport to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The next reading will start a new interval.
    AwaitingStart,
    /// The reading was not accepted.
    Rejected {
        source: ReadingSource,
        reason: Implausibility,
    },
    IntervalStarted {
        km: i64,
        started_at: DateTime<Utc>,
    },
    ReadingRecorded {
        km: i64,
        distance_since_start: i64,
        tier: Tier,
        remaining_km: i64,
        started_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    },
    /// A reading arrived before any oil change was recorded.
    NoActiveInterval { source: ReadingSource },
    /// No odometer value could be read from the photo.
    Unreadable,
    /// The typed text held no number.
    InvalidInput,
    Reset,
    Status {
        record: OilRecord,
        awaiting_start: bool,
    },
}

/// Per-user transient session flags.
#[derive(Debug, Default)]
pub struct SessionStore {
    awaiting: Mutex<HashMap<UserId, bool>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn awaiting_start(&self, user_id: &UserId) -> bool {
        self.sessions().get(user_id).copied().unwrap_or(false)
    }

    pub fn set_awaiting_start(&self, user_id: &UserId, awaiting: bool) {
        let mut sessions = self.sessions();
        if awaiting {
            sessions.insert(user_id.clone(), true);
        } else {
            sessions.remove(user_id);
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, bool>> {
        // Plain flags; a panic elsewhere cannot leave them half-written.
        self.awaiting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Routes chat events to the tracker.
pub struct Ingress<R, E> {
    tracker: OilTracker<R>,
    extractor: E,
    selector: Box<dyn CandidateSelector>,
    sessions: SessionStore,
    extraction_timeout: Duration,
}

impl<R: UserRepository, E: DigitExtractor> Ingress<R, E> {
    pub fn new(tracker: OilTracker<R>, extractor: E) -> Self {
        Self {
            tracker,
            extractor,
            selector: Box::new(LargestPlausible),
            sessions: SessionStore::new(),
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
        }
    }

    /// Replaces the odometer candidate heuristic.
    #[must_use]
    pub fn with_selector(mut self, selector: impl CandidateSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    #[must_use]
    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    pub const fn tracker(&self) -> &OilTracker<R> {
        &self.tracker
    }

    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handles one event for one user.
    ///
    /// Expected rejections come back as [`Outcome`] variants; only storage
    /// failures are errors.
    pub async fn handle(
        &self,
        user_id: &UserId,
        event: IngressEvent,
    ) -> Result<Outcome, RepositoryError> {
        match event {
            IngressEvent::NewIntervalRequested => {
                let _guard = self.tracker.lock_user(user_id).await;
                self.sessions.set_awaiting_start(user_id, true);
                Ok(Outcome::AwaitingStart)
            }
            IngressEvent::TextReading { raw_text } => {
                let Some(km) = parse_km_argument(&raw_text) else {
                    return Ok(Outcome::InvalidInput);
                };
                self.submit(user_id, km, ReadingSource::Text).await
            }
            IngressEvent::PhotoReading { image } => {
                let Some(km) = self.read_photo(user_id, &image).await else {
                    return Ok(Outcome::Unreadable);
                };
                self.submit(user_id, km, ReadingSource::Photo).await
            }
            IngressEvent::ResetRequested => {
                let guard = self.tracker.lock_user(user_id).await;
                self.tracker.reset_locked(&guard).await?;
                self.sessions.set_awaiting_start(user_id, false);
                Ok(Outcome::Reset)
            }
            IngressEvent::StatusRequested => {
                let record = self.tracker.record(user_id).await?;
                Ok(Outcome::Status {
                    record,
                    awaiting_start: self.sessions.awaiting_start(user_id),
                })
            }
        }
    }

    async fn submit(
        &self,
        user_id: &UserId,
        km: i64,
        source: ReadingSource,
    ) -> Result<Outcome, RepositoryError> {
        let guard = self.tracker.lock_user(user_id).await;
        let awaiting_start = self.sessions.awaiting_start(user_id);
        let outcome = self
            .tracker
            .submit_reading_locked(&guard, km, awaiting_start)
            .await?;

        Ok(match outcome {
            ReadingOutcome::Started { start, .. } => {
                self.sessions.set_awaiting_start(user_id, false);
                Outcome::IntervalStarted {
                    km: start.km,
                    started_at: start.at,
                }
            }
            ReadingOutcome::Updated { start, last, .. } => {
                let distance_since_start = last.km.saturating_sub(start.km);
                let status = classify(distance_since_start);
                Outcome::ReadingRecorded {
                    km: last.km,
                    distance_since_start,
                    tier: status.tier,
                    remaining_km: status.remaining_km,
                    started_at: start.at,
                    updated_at: last.at,
                }
            }
            ReadingOutcome::Implausible(reason) => Outcome::Rejected { source, reason },
            ReadingOutcome::NoActiveInterval => Outcome::NoActiveInterval { source },
        })
    }

    /// Runs digit extraction and candidate selection. Any failure reads as "no value".
    async fn read_photo(&self, user_id: &UserId, image: &[u8]) -> Option<i64> {
        if image.is_empty() {
            tracing::debug!(user_id = %user_id, "empty photo");
            return None;
        }

        let tokens =
            match tokio::time::timeout(self.extraction_timeout, self.extractor.extract(image))
                .await
            {
                Ok(Ok(tokens)) => tokens,
                Ok(Err(err)) => {
                    tracing::warn!(user_id = %user_id, error = %err, "digit extraction failed");
                    return None;
                }
                Err(_) => {
                    tracing::warn!(
                        user_id = %user_id,
                        timeout_secs = self.extraction_timeout.as_secs(),
                        "digit extraction timed out"
                    );
                    return None;
                }
            };

        let km = self.selector.select(&tokens);
        tracing::debug!(user_id = %user_id, ?tokens, ?km, "read odometer photo");
        km
    }
}

/// Parses the first numeric token of a typed reading.
///
/// Bengali digits count as digits; other scripts do not. A fractional part is
/// dropped. Values too large for `i64` saturate so they
/// are rejected as out of range rather than as unparseable.
pub fn parse_km_argument(text: &str) -> Option<i64> {
    let text = to_ascii_digits(text);
    let caps = text
        .split_whitespace()
        .find_map(|token| KM_TOKEN_RE.captures(token))?;
    let digits = caps.get(1)?.as_str();
    Some(digits.parse::<i64>().unwrap_or_else(|_| {
        if digits.starts_with('-') {
            i64::MIN
        } else {
            i64::MAX
        }
    }))
}
