//! Local extraction through the `tesseract` command-line tool.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::OcrError;
use crate::tokens::digit_tokens;

/// Default OCR language. Odometers print Latin digits.
pub const DEFAULT_LANG: &str = "eng";

/// Runs `tesseract stdin stdout -l <lang>` and tokenizes what it prints.
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    command: PathBuf,
    lang: String,
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self::new("tesseract", DEFAULT_LANG)
    }
}

impl TesseractExtractor {
    pub fn new(command: impl Into<PathBuf>, lang: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            lang: lang.into(),
        }
    }

    /// Recognizes text in `image` and returns the integer tokens.
    pub async fn extract_tokens(&self, image: &[u8]) -> Result<Vec<i64>, OcrError> {
        let text = self.recognize(image).await?;
        Ok(digit_tokens(&text))
    }

    /// Returns the raw recognized text.
    pub async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        let command = self.command.display().to_string();
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.lang])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OcrError::Spawn {
                command: command.clone(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| OcrError::Io {
            command: command.clone(),
            source: std::io::Error::other("stdin was not captured"),
        })?;
        let image = image.to_vec();
        let write = async move {
            stdin.write_all(&image).await?;
            stdin.shutdown().await
        };

        // Feed stdin while draining stdout so neither pipe fills up.
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.map_err(|source| OcrError::Io {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(OcrError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written.map_err(|source| OcrError::Io {
            command: command.clone(),
            source,
        })?;

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(command = %command, chars = text.len(), "tesseract finished");
        Ok(text)
    }
}
