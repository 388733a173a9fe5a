//! User-facing messages for tracker outcomes.

use chrono::{DateTime, FixedOffset, Utc};

use ot_core::{Outcome, ReadingSource, Tier, classify};

/// Shown when a storage error stops a command.
pub const GENERIC_ERROR: &str = "Sorry, something went wrong. Please try again later.";

pub const GREETING: &str = "Hello! I keep track of your bike's engine oil.\n\
Send /new_oil when you change the oil, then send the meter kilometers.\n\
Type them like /km 12345, or send a clear photo of the meter with /photo <file>.\n\
Send /status to see where you are, or /reset to start over.";

const ASK_FOR_START: &str = "Okay! To record the start of the new engine oil, \
send a clear photo of the meter or type the kilometers like /km 12345.";

const INVALID_KM: &str = "Please type the kilometers like /km 12345.";

const UNREADABLE: &str = "Sorry, I couldn't read the meter. \
Could you send it again with more light or a sharper focus?";

const RESET: &str = "Your engine oil and meter data has been reset. \
To start again, send /new_oil and then the kilometers.";

/// Formats outcomes for one display offset.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    offset: FixedOffset,
}

impl Renderer {
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// The message a user sees for `outcome`.
    pub fn render(&self, outcome: &Outcome) -> String {
        match outcome {
            Outcome::AwaitingStart => ASK_FOR_START.to_string(),
            Outcome::Rejected { source, reason } => {
                tracing::debug!(%reason, "rendering rejected reading");
                match source {
                    ReadingSource::Text => "This reading doesn't match the previous one. \
                        Please check and send the correct kilometers."
                        .to_string(),
                    ReadingSource::Photo => "This reading doesn't match the previous one. \
                        Could you send a closer or clearer photo?"
                        .to_string(),
                }
            }
            Outcome::IntervalStarted { km, started_at } => format!(
                "Recorded {km} km as the start of the new engine oil.\n\
                 Time: {}\n\
                 Send a new photo or /km any time for an update.",
                self.time(*started_at)
            ),
            Outcome::ReadingRecorded {
                km,
                distance_since_start,
                tier,
                remaining_km,
                started_at,
                updated_at,
            } => self.status_block(
                *km,
                *started_at,
                *distance_since_start,
                *tier,
                *remaining_km,
                *updated_at,
            ),
            Outcome::NoActiveInterval { source } => match source {
                ReadingSource::Text => {
                    "First set the oil start with /new_oil, then send /km or a photo.".to_string()
                }
                ReadingSource::Photo => {
                    "First set the oil start with /new_oil, then send a photo.".to_string()
                }
            },
            Outcome::Unreadable => UNREADABLE.to_string(),
            Outcome::InvalidInput => INVALID_KM.to_string(),
            Outcome::Reset => RESET.to_string(),
            Outcome::Status {
                record,
                awaiting_start,
            } => {
                let mut message = match (record.oil_start(), record.last_reading()) {
                    (Some(start), Some(last)) => {
                        let distance = last.km.saturating_sub(start.km);
                        let status = classify(distance);
                        self.status_block(
                            last.km,
                            start.at,
                            distance,
                            status.tier,
                            status.remaining_km,
                            last.at,
                        )
                    }
                    _ => "No engine oil is being tracked yet. Send /new_oil to start.".to_string(),
                };
                if *awaiting_start {
                    message.push_str("\nWaiting for the starting kilometers of the new oil.");
                }
                message
            }
        }
    }

    fn status_block(
        &self,
        km: i64,
        started_at: DateTime<Utc>,
        distance: i64,
        tier: Tier,
        remaining_km: i64,
        updated_at: DateTime<Utc>,
    ) -> String {
        format!(
            "{} Engine oil status\n\
             \u{1F3CD}\u{FE0F} Current meter: {km} km\n\
             \u{1F6E2}\u{FE0F} Oil started: {}\n\
             \u{1F4CF} Ridden since oil change: {distance} km\n\
             \u{1F697} Good to ride for another: {remaining_km} km\n\
             \u{23F1}\u{FE0F} Last update: {}\n\
             {}",
            tier_marker(tier),
            self.time(started_at),
            self.time(updated_at),
            advice(tier),
        )
    }

    /// `dd/mm/yyyy, HH:MM` in the display offset.
    pub fn time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset)
            .format("%d/%m/%Y, %H:%M")
            .to_string()
    }
}

const fn tier_marker(tier: Tier) -> &'static str {
    match tier {
        Tier::Ok => "\u{2705}",
        Tier::Warning => "\u{26A0}\u{FE0F}",
        Tier::Critical => "\u{1F6A8}",
    }
}

const fn advice(tier: Tier) -> &'static str {
    match tier {
        Tier::Ok => "All good, no need to worry about the engine oil.",
        Tier::Warning => "Getting close to 1000 km. Change the engine oil when convenient.",
        Tier::Critical => "The engine oil needs changing now. Don't delay.",
    }
}
