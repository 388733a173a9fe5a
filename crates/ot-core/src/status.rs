//! Oil status tiers derived from distance since the last oil change.

use std::fmt;

use serde::Serialize;

/// Distance at which the rider is nudged to plan an oil change.
pub const WARNING_THRESHOLD_KM: i64 = 800;

/// Distance at which the oil is due.
pub const CRITICAL_THRESHOLD_KM: i64 = 1_000;

/// How urgent an oil change is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Ok,
    Warning,
    Critical,
}

impl Tier {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a distance since oil start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OilStatus {
    pub tier: Tier,
    /// Kilometers left until the critical threshold. Negative once overdue.
    pub remaining_km: i64,
}

/// Classifies `distance_km` ridden since the oil change.
pub const fn classify(distance_km: i64) -> OilStatus {
    let tier = if distance_km >= CRITICAL_THRESHOLD_KM {
        Tier::Critical
    } else if distance_km >= WARNING_THRESHOLD_KM {
        Tier::Warning
    } else {
        Tier::Ok
    };
    OilStatus {
        tier,
        remaining_km: CRITICAL_THRESHOLD_KM.saturating_sub(distance_km),
    }
}
