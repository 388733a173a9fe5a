//! Odometer digit extraction for the oil interval tracker.
//!
//! Two backends turn a photo into integer tokens:
//! - [`TesseractExtractor`]: pipes the image through a local `tesseract` binary
//! - [`HttpExtractor`]: posts the image to an OCR endpoint
//!
//! Both produce text that [`digit_tokens`] splits into integers. [`Extractor`]
//! picks one at runtime and implements [`DigitExtractor`].

mod http;
mod tesseract;
mod tokens;

use std::future::Future;
use std::io;

use thiserror::Error;

use ot_core::{DigitExtractor, ExtractionFailed};

pub use http::HttpExtractor;
pub use tesseract::{DEFAULT_LANG, TesseractExtractor};
pub use tokens::{digit_tokens, normalize_digits};

/// OCR errors.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The endpoint URL is unusable.
    #[error("invalid OCR endpoint: {reason}")]
    InvalidEndpoint { reason: &'static str },
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The endpoint returned an error response.
    #[error("OCR API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The OCR command could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    /// Piping data to or from the OCR command failed.
    #[error("i/o error with {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    /// The OCR command exited unsuccessfully.
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

impl From<OcrError> for ExtractionFailed {
    fn from(err: OcrError) -> Self {
        Self::new(err)
    }
}

/// The configured extraction backend.
#[derive(Debug, Clone)]
pub enum Extractor {
    Tesseract(TesseractExtractor),
    Http(HttpExtractor),
}

impl Extractor {
    pub async fn extract_tokens(&self, image: &[u8]) -> Result<Vec<i64>, OcrError> {
        match self {
            Self::Tesseract(tesseract) => tesseract.extract_tokens(image).await,
            Self::Http(http) => http.extract_tokens(image).await,
        }
    }
}

impl DigitExtractor for Extractor {
    fn extract(
        &self,
        image: &[u8],
    ) -> impl Future<Output = Result<Vec<i64>, ExtractionFailed>> + Send {
        async move { Ok(self.extract_tokens(image).await?) }
    }
}
