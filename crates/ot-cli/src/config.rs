//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{FixedOffset, Offset, Utc};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use ot_ocr::{DEFAULT_LANG, Extractor, HttpExtractor, TesseractExtractor};

/// Which digit extraction backend reads odometer photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    Tesseract,
    Http,
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// User id used when `--user` is not given.
    pub default_user: String,
    pub ocr_backend: OcrBackend,
    /// Program run by the tesseract backend.
    pub tesseract_command: PathBuf,
    pub tesseract_lang: String,
    /// Endpoint for the http backend.
    pub ocr_url: Option<String>,
    pub ocr_api_key: Option<String>,
    /// Upper bound on one extraction call.
    pub ocr_timeout_secs: u64,
    /// Offset applied when showing times, east of UTC.
    pub utc_offset_minutes: i32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("default_user", &self.default_user)
            .field("ocr_backend", &self.ocr_backend)
            .field("tesseract_command", &self.tesseract_command)
            .field("tesseract_lang", &self.tesseract_lang)
            .field("ocr_url", &self.ocr_url)
            .field("ocr_api_key", &self.ocr_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("ot.db"),
            default_user: "local".to_string(),
            ocr_backend: OcrBackend::Tesseract,
            tesseract_command: PathBuf::from("tesseract"),
            tesseract_lang: DEFAULT_LANG.to_string(),
            ocr_url: None,
            ocr_api_key: None,
            ocr_timeout_secs: 30,
            // Bangladesh Standard Time
            utc_offset_minutes: 6 * 60,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (OT_*)
        figment = figment.merge(Env::prefixed("OT_"));

        figment.extract()
    }

    /// Builds the configured digit extractor.
    pub fn extractor(&self) -> Result<Extractor> {
        match self.ocr_backend {
            OcrBackend::Tesseract => Ok(Extractor::Tesseract(TesseractExtractor::new(
                &self.tesseract_command,
                &self.tesseract_lang,
            ))),
            OcrBackend::Http => {
                let Some(url) = &self.ocr_url else {
                    bail!("ocr_url must be set when ocr_backend is \"http\"");
                };
                let client = HttpExtractor::new(url, self.ocr_api_key.clone())
                    .context("failed to configure OCR endpoint")?;
                Ok(Extractor::Http(client))
            }
        }
    }

    pub const fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    /// The display offset, falling back to UTC when out of range.
    pub fn display_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                tracing::warn!(
                    utc_offset_minutes = self.utc_offset_minutes,
                    "invalid UTC offset, showing times in UTC"
                );
                Utc.fix()
            })
    }
}

/// Returns the platform-specific config directory for ot.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ot"))
}

/// Returns the platform-specific data directory for ot.
///
/// On Linux: `~/.local/share/ot`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ot"))
}
