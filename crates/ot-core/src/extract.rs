//! Contract for the service that turns an odometer photo into integers.

use std::error::Error as StdError;
use std::future::Future;

use thiserror::Error;

/// The digit extraction service failed. Callers treat this like a photo with
/// no readable odometer.
#[derive(Debug, Error)]
#[error("digit extraction failed: {0}")]
pub struct ExtractionFailed(#[source] pub Box<dyn StdError + Send + Sync>);

impl ExtractionFailed {
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

/// Extracts every integer visible in an image.
pub trait DigitExtractor: Send + Sync {
    /// Returns the integer tokens found in `image`, in reading order.
    fn extract(
        &self,
        image: &[u8],
    ) -> impl Future<Output = Result<Vec<i64>, ExtractionFailed>> + Send;
}
