//! CLI command implementations.

pub mod chat;
pub mod reading;
pub mod reset;
pub mod status;

use anyhow::{Context, Result};

use ot_core::{Ingress, OilTracker, UserId};
use ot_db::SqliteRepository;
use ot_ocr::Extractor;

use crate::Config;
use crate::render::Renderer;

/// The tracker wired to its SQLite store and configured OCR backend.
pub type App = Ingress<SqliteRepository, Extractor>;

/// Opens the database, ensuring the parent directory exists, and builds the app.
pub fn open_app(config: &Config) -> Result<App> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let repo = SqliteRepository::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let extractor = config.extractor()?;

    Ok(Ingress::new(OilTracker::new(repo), extractor)
        .with_extraction_timeout(config.extraction_timeout()))
}

/// Resolves `--user`, falling back to the configured default.
pub fn resolve_user(user: Option<&str>, config: &Config) -> Result<UserId> {
    let raw = user.unwrap_or(&config.default_user);
    UserId::new(raw).with_context(|| format!("invalid user id {raw:?}"))
}

pub fn renderer(config: &Config) -> Renderer {
    Renderer::new(config.display_offset())
}
