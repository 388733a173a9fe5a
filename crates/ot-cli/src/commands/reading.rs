//! One-shot reading commands: `ot km` and `ot photo`.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use ot_core::{DigitExtractor, Ingress, IngressEvent, Outcome, UserId, UserRepository};

use crate::render::Renderer;

/// Records a typed reading, first marking an oil change when `new_oil` is set.
pub async fn km<W, R, E>(
    writer: &mut W,
    app: &Ingress<R, E>,
    renderer: &Renderer,
    user_id: &UserId,
    raw_text: &str,
    new_oil: bool,
) -> Result<Outcome>
where
    W: Write,
    R: UserRepository,
    E: DigitExtractor,
{
    let event = IngressEvent::TextReading {
        raw_text: raw_text.to_string(),
    };
    submit(writer, app, renderer, user_id, event, new_oil).await
}

/// Records a reading read off an odometer photo.
pub async fn photo<W, R, E>(
    writer: &mut W,
    app: &Ingress<R, E>,
    renderer: &Renderer,
    user_id: &UserId,
    path: &Path,
    new_oil: bool,
) -> Result<Outcome>
where
    W: Write,
    R: UserRepository,
    E: DigitExtractor,
{
    let image = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    submit(
        writer,
        app,
        renderer,
        user_id,
        IngressEvent::PhotoReading { image },
        new_oil,
    )
    .await
}

async fn submit<W, R, E>(
    writer: &mut W,
    app: &Ingress<R, E>,
    renderer: &Renderer,
    user_id: &UserId,
    event: IngressEvent,
    new_oil: bool,
) -> Result<Outcome>
where
    W: Write,
    R: UserRepository,
    E: DigitExtractor,
{
    if new_oil {
        app.handle(user_id, IngressEvent::NewIntervalRequested)
            .await
            .context("failed to start a new oil interval")?;
    }

    let outcome = app
        .handle(user_id, event)
        .await
        .context("failed to record reading")?;
    tracing::debug!(user_id = %user_id, ?outcome, "reading handled");

    writeln!(writer, "{}", renderer.render(&outcome))?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::{self, Future};

    use chrono::FixedOffset;
    use insta::assert_snapshot;

    use ot_core::{ExtractionFailed, MemoryRepository, OilTracker, ReadingSource, Tier};

    struct CannedExtractor(Vec<i64>);

    impl DigitExtractor for CannedExtractor {
        fn extract(
            &self,
            _image: &[u8],
        ) -> impl Future<Output = Result<Vec<i64>, ExtractionFailed>> + Send {
            future::ready(Ok(self.0.clone()))
        }
    }

    fn app(tokens: &[i64]) -> Ingress<MemoryRepository, CannedExtractor> {
        Ingress::new(
            OilTracker::new(MemoryRepository::new()),
            CannedExtractor(tokens.to_vec()),
        )
    }

    fn utc() -> Renderer {
        Renderer::new(FixedOffset::east_opt(0).unwrap())
    }

    fn user() -> UserId {
        UserId::new("rider").unwrap()
    }

    #[tokio::test]
    async fn km_without_new_oil_needs_an_interval() {
        let app = app(&[]);
        let mut output = Vec::new();

        let outcome = km(&mut output, &app, &utc(), &user(), "12345", false)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::NoActiveInterval {
                source: ReadingSource::Text
            }
        );
        assert_snapshot!(String::from_utf8(output).unwrap().trim_end(), @"First set the oil start with /new_oil, then send /km or a photo.");
    }

    #[tokio::test]
    async fn new_oil_then_reading_reports_distance() {
        let app = app(&[]);
        let mut output = Vec::new();

        km(&mut output, &app, &utc(), &user(), "10000", true)
            .await
            .unwrap();
        let outcome = km(&mut output, &app, &utc(), &user(), "10850", false)
            .await
            .unwrap();

        let Outcome::ReadingRecorded {
            distance_since_start,
            tier,
            remaining_km,
            ..
        } = outcome
        else {
            panic!("expected a recorded reading, got {outcome:?}");
        };
        assert_eq!(distance_since_start, 850);
        assert_eq!(tier, Tier::Warning);
        assert_eq!(remaining_km, 150);

        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("Recorded 10000 km as the start"));
        assert!(output.contains("Good to ride for another: 150 km"));
    }

    #[tokio::test]
    async fn km_rejects_text_without_number() {
        let app = app(&[]);
        let mut output = Vec::new();

        let outcome = km(&mut output, &app, &utc(), &user(), "lots", true)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::InvalidInput);
        assert!(app.sessions().awaiting_start(&user()));
    }

    #[tokio::test]
    async fn photo_reads_largest_plausible_token() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("meter.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let app = app(&[12_345, 99, 2_024]);
        let mut output = Vec::new();
        let outcome = photo(&mut output, &app, &utc(), &user(), &path, true)
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::IntervalStarted { km: 12_345, .. }));
    }

    #[tokio::test]
    async fn missing_photo_file_is_an_error() {
        let app = app(&[]);
        let mut output = Vec::new();
        let err = photo(
            &mut output,
            &app,
            &utc(),
            &user(),
            Path::new("/nonexistent/meter.jpg"),
            false,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("/nonexistent/meter.jpg"));
        assert!(output.is_empty());
    }
}
