//! Status command for showing the current oil interval.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use ot_core::{
    DigitExtractor, Ingress, IngressEvent, OilRecord, Outcome, Tier, UserId, UserRepository, classify,
};

use crate::render::Renderer;

/// JSON shape of `ot status --json`.
#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    user_id: &'a str,
    tracking: bool,
    oil_start_km: Option<i64>,
    oil_start_at: Option<DateTime<Utc>>,
    last_reading_km: Option<i64>,
    last_reading_at: Option<DateTime<Utc>>,
    distance_since_start: Option<i64>,
    tier: Option<Tier>,
    remaining_km: Option<i64>,
}

impl<'a> StatusOutput<'a> {
    fn from_record(record: &'a OilRecord) -> Self {
        let status = record.distance_since_start().map(classify);
        Self {
            user_id: record.user_id.as_str(),
            tracking: record.is_tracking(),
            oil_start_km: record.oil_start().map(|r| r.km),
            oil_start_at: record.oil_start().map(|r| r.at),
            last_reading_km: record.last_reading().map(|r| r.km),
            last_reading_at: record.last_reading().map(|r| r.at),
            distance_since_start: record.distance_since_start(),
            tier: status.map(|s| s.tier),
            remaining_km: status.map(|s| s.remaining_km),
        }
    }
}

pub async fn run<W, R, E>(
    writer: &mut W,
    app: &Ingress<R, E>,
    renderer: &Renderer,
    user_id: &UserId,
    json: bool,
) -> Result<()>
where
    W: Write,
    R: UserRepository,
    E: DigitExtractor,
{
    let outcome = app
        .handle(user_id, IngressEvent::StatusRequested)
        .await
        .context("failed to load status")?;

    if json {
        if let Outcome::Status { record, .. } = &outcome {
            serde_json::to_writer_pretty(&mut *writer, &StatusOutput::from_record(record))?;
            writeln!(writer)?;
            return Ok(());
        }
    }

    writeln!(writer, "{}", renderer.render(&outcome))?;
    Ok(())
}
