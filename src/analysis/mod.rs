use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AnalysisConfig;
use crate::db;
use crate::types::AnalysisEvent;

pub mod catalog;

use catalog::OutcomeBundle;

fn make_rng(cfg: &AnalysisConfig) -> StdRng {
    match cfg.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Drives the mocked analysis of one scan: claims the row (`pending` ->
/// `analyzing`), ticks progress events until the randomized deadline, then
/// returns the drawn outcome. The caller persists the result and tears the
/// job handle down.
pub async fn run_analysis(
    pool: sqlx::SqlitePool,
    id: Uuid,
    scan_type: String,
    tx: tokio::sync::broadcast::Sender<AnalysisEvent>,
    cancel: CancellationToken,
    cfg: AnalysisConfig,
) -> anyhow::Result<&'static OutcomeBundle> {
    if cancel.is_cancelled() {
        anyhow::bail!("cancelled");
    }

    let claimed = sqlx::query(
        r#"UPDATE scans SET status='analyzing', updated_at=?1 WHERE id=?2 AND status='pending'"#,
    )
    .bind(db::now_rfc3339())
    .bind(id.to_string())
    .execute(&pool)
    .await?;
    if claimed.rows_affected() == 0 {
        anyhow::bail!("scan {} is no longer pending", id);
    }

    let _ = tx.send(AnalysisEvent::Started { scan_id: id, scan_type: scan_type.clone() });

    let mut rng = make_rng(&cfg);
    let total_ms = rng.gen_range(cfg.min_duration_ms..=cfg.max_duration_ms.max(cfg.min_duration_ms));
    // Ergebnis vor der Tick-Schleife ziehen, damit ein fester Seed es
    // unabhängig vom Timing festlegt.
    let bundle = catalog::resolve(&scan_type).pick(&mut rng)?;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(total_ms);
    let mut ticker = interval(Duration::from_millis(cfg.progress_interval_ms.max(1)));
    let mut progress: f64 = 0.0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("cancelled"),
            _ = tokio::time::sleep_until(deadline) => break,
            _ = ticker.tick() => {
                progress = (progress + rng.gen_range(5.0..20.0)).min(100.0);
                let _ = tx.send(AnalysisEvent::Progress { percent: progress.round() as u8 });
            }
        }
    }

    let _ = tx.send(AnalysisEvent::Progress { percent: 100 });

    Ok(bundle)
}

/// Writes the chosen outcome onto a row still in `analyzing`. Returns false
/// when the row was cancelled or deleted in the meantime.
pub async fn finalize_scan(
    pool: &sqlx::SqlitePool,
    id: Uuid,
    bundle: &OutcomeBundle,
) -> anyhow::Result<bool> {
    let findings = serde_json::to_string(&bundle.findings)?;
    let recommendations = serde_json::to_string(&bundle.recommendations)?;
    let prescription = serde_json::to_string(&bundle.prescription)?;
    let res = sqlx::query(
        r#"UPDATE scans SET status='analyzed', diagnosis=?1, confidence=?2, severity=?3,
            findings=?4, recommendations=?5, prescription=?6, updated_at=?7
           WHERE id=?8 AND status='analyzing'"#,
    )
    .bind(&bundle.diagnosis)
    .bind(bundle.confidence)
    .bind(&bundle.severity)
    .bind(findings)
    .bind(recommendations)
    .bind(prescription)
    .bind(db::now_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Guarded downgrade used by the cancellation and failure paths. Rows that
/// already reached a terminal status stay untouched.
pub async fn mark_scan_error(pool: &sqlx::SqlitePool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"UPDATE scans SET status='error', updated_at=?1
           WHERE id=?2 AND status IN ('pending','analyzing')"#,
    )
    .bind(db::now_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}
