//! Core domain logic for the oil interval tracker.
//!
//! This crate contains:
//! - Validation: deciding whether an odometer reading can be trusted
//! - Candidate selection: picking the odometer value out of OCR tokens
//! - The oil interval state machine over a [`UserRepository`]
//! - Status classification by distance since the last oil change
//! - Digit script normalization shared by typed and photographed readings
//! - Ingress: routing chat events and holding per-user session flags

pub mod digits;
pub mod extract;
pub mod ingress;
pub mod record;
pub mod repository;
pub mod selector;
pub mod status;
pub mod tracker;
pub mod types;
pub mod validate;

pub use digits::{ascii_digit, to_ascii_digits};
pub use extract::{DigitExtractor, ExtractionFailed};
pub use ingress::{Ingress, IngressEvent, Outcome, ReadingSource, SessionStore, parse_km_argument};
pub use record::{IntervalState, OilRecord, Reading};
pub use repository::{MemoryRepository, RepositoryError, UserRepository};
pub use selector::{CandidateSelector, LargestPlausible, select_odometer};
pub use status::{CRITICAL_THRESHOLD_KM, OilStatus, Tier, WARNING_THRESHOLD_KM, classify};
pub use tracker::{OilTracker, ReadingOutcome, UserGuard};
pub use types::{UserId, ValidationError};
pub use validate::{
    Implausibility, MAX_ODOMETER_KM, MAX_READING_DELTA_KM, check_plausibility, is_plausible,
};
