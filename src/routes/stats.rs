//! Dashboard statistics aggregated over the caller's scans.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::{Extension, Json};

use crate::db;
use crate::error::AppResult;
use crate::state::AppState;
use crate::types::{ActivityEntry, AuthUser, Scan, ScanStatus, UserStats};

// ---------------------- STATS ENDPOINT ----------------------

/// GET /dashboard/stats - aggregate counters for the dashboard cards.
pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<UserStats>> {
    let scans = db::list_scans(&state.db, user.id).await?;
    Ok(Json(compute_user_stats(&scans)))
}

/// Aggregates the dashboard numbers from a scan list already sorted by
/// upload date, newest first. An empty list yields all-zero stats.
pub fn compute_user_stats(scans: &[Scan]) -> UserStats {
    let total_scans = scans.len() as i64;
    let analyzed_scans = scans
        .iter()
        .filter(|s| s.status == ScanStatus::Analyzed)
        .count() as i64;
    let pending_scans = scans
        .iter()
        .filter(|s| matches!(s.status, ScanStatus::Pending | ScanStatus::Analyzing))
        .count() as i64;

    let confidences: Vec<f64> = scans
        .iter()
        .filter(|s| s.status == ScanStatus::Analyzed)
        .filter_map(|s| s.confidence)
        .collect();
    let average_confidence = if confidences.is_empty() {
        0.0
    } else {
        let avg = confidences.iter().sum::<f64>() / confidences.len() as f64;
        // Auf eine Nachkommastelle gerundet.
        (avg * 10.0).round() / 10.0
    };

    let last_scan_date = scans.first().map(|s| s.upload_date.clone());

    let mut scans_by_type: BTreeMap<String, i64> = BTreeMap::new();
    for scan in scans {
        *scans_by_type.entry(scan.scan_type.clone()).or_insert(0) += 1;
    }

    let recent_activity = scans
        .iter()
        .take(5)
        .map(|s| ActivityEntry {
            date: s.upload_date.clone(),
            action: s.status.activity_label().to_string(),
            scan_name: s.name.clone(),
        })
        .collect();

    UserStats {
        total_scans,
        analyzed_scans,
        pending_scans,
        average_confidence,
        last_scan_date,
        scans_by_type,
        recent_activity,
    }
}
