//! Plausibility checks for incoming odometer readings.
//!
//! A candidate is judged against the user's stored record:
//! 1. It must lie within the absolute odometer range.
//! 2. It must not be lower than the last accepted reading.
//! 3. It must not jump more than [`MAX_READING_DELTA_KM`] past the last reading.
//! 4. It must not be lower than the start of the current oil interval.
//!
//! The checks never panic, whatever `i64` they are handed.

use serde::Serialize;
use thiserror::Error;

use crate::record::OilRecord;

/// Largest odometer value accepted from any source.
pub const MAX_ODOMETER_KM: i64 = 300_000;

/// Largest distance a single update may add to the last reading.
///
/// Catches OCR misreads where one digit comes out wildly wrong.
pub const MAX_READING_DELTA_KM: i64 = 5_000;

/// Why a candidate reading was rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Implausibility {
    /// Outside `0..=MAX_ODOMETER_KM`.
    #[error("reading {km} km is outside the odometer range")]
    OutOfRange { km: i64 },
    /// Lower than the last accepted reading.
    #[error("reading {km} km is below the last reading of {last_km} km")]
    Decreased { km: i64, last_km: i64 },
    /// More than `MAX_READING_DELTA_KM` above the last accepted reading.
    #[error("reading {km} km is {delta} km past the last reading")]
    JumpTooLarge { km: i64, delta: i64 },
    /// Lower than the odometer value at the oil change.
    #[error("reading {km} km is below the oil change at {start_km} km")]
    BeforeIntervalStart { km: i64, start_km: i64 },
}

/// Checks `candidate_km` against the prior record, naming the first failed rule.
pub fn check_plausibility(
    prior: Option<&OilRecord>,
    candidate_km: i64,
) -> Result<(), Implausibility> {
    if !(0..=MAX_ODOMETER_KM).contains(&candidate_km) {
        return Err(Implausibility::OutOfRange { km: candidate_km });
    }

    let Some(prior) = prior else {
        return Ok(());
    };

    if let Some(last) = prior.last_reading() {
        let delta = candidate_km.saturating_sub(last.km);
        if delta < 0 {
            return Err(Implausibility::Decreased {
                km: candidate_km,
                last_km: last.km,
            });
        }
        if delta > MAX_READING_DELTA_KM {
            return Err(Implausibility::JumpTooLarge {
                km: candidate_km,
                delta,
            });
        }
    }

    if let Some(start) = prior.oil_start() {
        if candidate_km < start.km {
            return Err(Implausibility::BeforeIntervalStart {
                km: candidate_km,
                start_km: start.km,
            });
        }
    }

    Ok(())
}

/// Returns `true` if `candidate_km` is an acceptable next reading.
pub fn is_plausible(prior: Option<&OilRecord>, candidate_km: i64) -> bool {
    check_plausibility(prior, candidate_km).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::record::Reading;
    use crate::types::UserId;

    fn empty() -> OilRecord {
        OilRecord::new(UserId::new("rider").unwrap(), Utc::now())
    }

    fn tracking(start_km: i64, last_km: i64) -> OilRecord {
        let mut record = empty();
        record.start_interval(Reading::new(start_km, Utc::now()));
        record.advance(Reading::new(last_km, Utc::now()));
        record
    }

    #[test]
    fn absolute_bounds_apply_without_history() {
        assert!(is_plausible(None, 0));
        assert!(is_plausible(None, MAX_ODOMETER_KM));
        assert_eq!(
            check_plausibility(None, -1),
            Err(Implausibility::OutOfRange { km: -1 })
        );
        assert_eq!(
            check_plausibility(None, 300_001),
            Err(Implausibility::OutOfRange { km: 300_001 })
        );
    }

    #[test]
    fn absolute_bounds_apply_with_history() {
        let record = tracking(299_000, 299_500);
        assert!(!is_plausible(Some(&record), 300_001));
        assert!(is_plausible(Some(&record), 300_000));
    }

    #[test]
    fn empty_record_accepts_any_in_range_value() {
        let record = empty();
        assert!(is_plausible(Some(&record), 0));
        assert!(is_plausible(Some(&record), 250_000));
    }

    #[test]
    fn delta_boundaries() {
        let record = tracking(10_000, 10_000);
        assert!(is_plausible(Some(&record), 10_000));
        assert!(is_plausible(Some(&record), 15_000));
        assert_eq!(
            check_plausibility(Some(&record), 9_999),
            Err(Implausibility::Decreased {
                km: 9_999,
                last_km: 10_000
            })
        );
        assert_eq!(
            check_plausibility(Some(&record), 15_001),
            Err(Implausibility::JumpTooLarge {
                km: 15_001,
                delta: 5_001
            })
        );
    }

    #[test]
    fn reading_below_interval_start_is_rejected() {
        let mut record = tracking(20_000, 20_000);
        // A last reading below the start can only come from storage written by
        // an older build; the start check still holds.
        record.interval = crate::record::IntervalState::Tracking {
            start: Reading::new(20_000, Utc::now()),
            last: Reading::new(18_000, Utc::now()),
        };
        assert_eq!(
            check_plausibility(Some(&record), 19_000),
            Err(Implausibility::BeforeIntervalStart {
                km: 19_000,
                start_km: 20_000
            })
        );
    }

    #[test]
    fn extreme_inputs_do_not_panic() {
        let record = tracking(0, 0);
        assert!(!is_plausible(Some(&record), i64::MIN));
        assert!(!is_plausible(Some(&record), i64::MAX));

        let mut odd = empty();
        odd.start_interval(Reading::new(i64::MIN, Utc::now()));
        assert!(!is_plausible(Some(&odd), 100));
    }
}
