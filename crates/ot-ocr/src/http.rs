//! Remote extraction through an HTTP OCR endpoint.
//!
//! The endpoint receives the raw image as the request body and answers with
//! `{"text": "..."}`. Errors are expected as `{"error": {"message": "..."}}`.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::OcrError;
use crate::tokens::digit_tokens;

/// Default request timeout for OCR calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP OCR client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct HttpExtractor {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl fmt::Debug for HttpExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpExtractor")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpExtractor {
    /// Creates a client for `url`, optionally authenticating with a bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s), if the API key is blank,
    /// or if the HTTP client fails to build.
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, OcrError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(OcrError::InvalidEndpoint {
                reason: "URL must start with http:// or https://",
            });
        }
        if api_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
            return Err(OcrError::InvalidApiKey {
                reason: "API key cannot be empty or whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(OcrError::ClientBuild)?;

        Ok(Self { http, url, api_key })
    }

    /// Sends `image` to the endpoint and returns the integer tokens.
    pub async fn extract_tokens(&self, image: &[u8]) -> Result<Vec<i64>, OcrError> {
        let text = self.recognize(image).await?;
        Ok(digit_tokens(&text))
    }

    /// Returns the raw recognized text.
    pub async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| OcrError::Api {
                message: format!("status {status}: {body}"),
            }));
        }

        let text = parse_text(&body)?;
        tracing::debug!(url = %self.url, chars = text.len(), "OCR endpoint answered");
        Ok(text)
    }
}

fn parse_text(body: &str) -> Result<String, OcrError> {
    #[derive(Deserialize)]
    struct Payload {
        text: String,
    }

    serde_json::from_str::<Payload>(body)
        .map(|payload| payload.text)
        .map_err(|err| OcrError::InvalidResponse(err.to_string()))
}

fn parse_api_error(body: &str) -> Option<OcrError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| OcrError::Api {
            message: payload.error.message,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_url() {
        assert!(matches!(
            HttpExtractor::new("ftp://ocr.local", None),
            Err(OcrError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            HttpExtractor::new("", None),
            Err(OcrError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn rejects_blank_api_key() {
        assert!(matches!(
            HttpExtractor::new("https://ocr.local/v1", Some("  ".to_string())),
            Err(OcrError::InvalidApiKey { .. })
        ));
    }

    #[test]
    fn accepts_valid_configuration() {
        assert!(HttpExtractor::new("https://ocr.local/v1", None).is_ok());
        assert!(HttpExtractor::new("http://127.0.0.1:9000", Some("token".to_string())).is_ok());
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = HttpExtractor::new("https://ocr.local", Some("secret-key".to_string())).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("https://ocr.local"));
    }

    #[test]
    fn parse_text_reads_payload() {
        let text = parse_text(r#"{"text":"ODO 12345","confidence":0.8}"#).unwrap();
        assert_eq!(text, "ODO 12345");
    }

    #[test]
    fn parse_text_rejects_invalid_json() {
        let err = parse_text("<html>").unwrap_err();
        assert!(matches!(err, OcrError::InvalidResponse(_)));
    }

    #[test]
    fn parse_api_error_reads_message() {
        let err = parse_api_error(r#"{"error":{"message":"image too large"}}"#).unwrap();
        assert!(matches!(err, OcrError::Api { message } if message == "image too large"));
        assert!(parse_api_error("oops").is_none());
    }
}
