//! Reset command: forget the oil interval and all readings.

use std::io::Write;

use anyhow::{Context, Result};

use ot_core::{DigitExtractor, Ingress, IngressEvent, UserId, UserRepository};

use crate::render::Renderer;

pub async fn run<W, R, E>(
    writer: &mut W,
    app: &Ingress<R, E>,
    renderer: &Renderer,
    user_id: &UserId,
) -> Result<()>
where
    W: Write,
    R: UserRepository,
    E: DigitExtractor,
{
    let outcome = app
        .handle(user_id, IngressEvent::ResetRequested)
        .await
        .context("failed to reset")?;
    tracing::info!(user_id = %user_id, "oil interval reset");
    writeln!(writer, "{}", renderer.render(&outcome))?;
    Ok(())
}
