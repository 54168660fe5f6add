use std::time::Duration;

use axum::response::sse::{Event, Sse};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::Stream;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    analysis,
    db,
    error::{AppError, AppResult, OptionExt},
    middleware::ip::{extract_ip_from_headers, MaybeRemoteAddr},
    state::{AppState, JobHandle},
    types::{AnalysisEvent, AuthUser, CreateScanResponse, Scan, ScanStatus},
};

/// MIME types accepted for upload; `.dcm` files pass regardless because
/// DICOM exports frequently arrive without a usable content type.
const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/dicom"];

struct UploadedFile {
    bytes: axum::body::Bytes,
    file_name: String,
    content_type: String,
}

// ---------------------- UPLOAD ENDPOINT ----------------------

pub async fn create_scan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    maybe_remote: MaybeRemoteAddr,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Response> {
    // Per-endpoint rate limit: "/scans"
    let fallback_ip = maybe_remote.0.map(|addr| addr.ip());
    let ip = extract_ip_from_headers(&headers, fallback_ip);
    state.rate_limiter.check_endpoint_limit("/scans", ip).await?;

    let mut file: Option<UploadedFile> = None;
    let mut name: Option<String> = None;
    let mut scan_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("scan").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file part: {}", e)))?;
                file = Some(UploadedFile { bytes, file_name, content_type });
            }
            Some("name") => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Failed to read name part: {}", e)))?,
                );
            }
            Some("scan_type") | Some("type") => {
                scan_type = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Failed to read scan_type part: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let scan_type = scan_type.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    let (Some(file), Some(scan_type)) = (file, scan_type) else {
        return Err(AppError::InvalidInput(
            "Please select a file and scan type before analyzing.".to_string(),
        ));
    };

    let lower_name = file.file_name.to_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&file.content_type.as_str()) && !lower_name.ends_with(".dcm") {
        return Err(AppError::InvalidInput(
            "Please upload a valid medical image (JPEG, PNG, WebP, or DICOM).".to_string(),
        ));
    }
    if file.bytes.len() as u64 > state.config.storage.max_file_bytes {
        return Err(AppError::InvalidInput("Please upload a file smaller than 50MB.".to_string()));
    }
    if file.bytes.is_empty() {
        return Err(AppError::InvalidInput("Uploaded file is empty".to_string()));
    }

    // Display name falls back to the uploaded file's name
    let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()).unwrap_or_else(|| {
        file.file_name.clone()
    });

    // Persist original and thumbnail concurrently. Each degrades to an
    // inline data URL on disk failure; an undecodable source simply
    // yields no thumbnail.
    let file_size = file.bytes.len() as i64;
    let (original, thumbnail) = tokio::join!(
        state.media.store_original(file.bytes.clone(), &file.file_name, &file.content_type),
        state.media.store_thumbnail(file.bytes.clone(), &file.file_name),
    );
    let original = original?;
    let thumbnail = thumbnail?;

    state.metrics.inc_scans_uploaded();
    state.metrics.add_bytes_stored(file_size as u64);

    // Persist initial scan row
    let id = Uuid::new_v4();
    let now = db::now_rfc3339();
    sqlx::query(
        r#"INSERT INTO scans (id, user_id, name, scan_type, file_name, file_size, upload_date,
            status, image_url, thumbnail_url, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?10, ?11)"#,
    )
    .bind(id.to_string())
    .bind(user.id.to_string())
    .bind(&name)
    .bind(&scan_type)
    .bind(&file.file_name)
    .bind(file_size)
    .bind(&now)
    .bind(&original.url)
    .bind(thumbnail.as_ref().map(|t| t.url.clone()))
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let (tx, _rx) = broadcast::channel::<AnalysisEvent>(256);
    let cancel = CancellationToken::new();

    // Register the handle before spawning: the task removes it on exit,
    // and a task that finishes first must still find it.
    {
        let mut jobs = state.jobs.write().await;
        jobs.insert(id, JobHandle { cancel: cancel.clone(), sender: tx.clone() });
    }

    state.metrics.inc_analyses_started();

    // Spawn background analysis task
    let db_pool = state.db.clone();
    let tx_clone = tx.clone();
    let cancel_child = cancel.clone();
    let jobs_map = state.jobs.clone();
    let metrics = state.metrics.clone();
    let analysis_cfg = state.config.analysis.clone();
    let task_scan_type = scan_type.clone();

    tokio::spawn(async move {
        let res = analysis::run_analysis(
            db_pool.clone(),
            id,
            task_scan_type,
            tx_clone.clone(),
            cancel_child.clone(),
            analysis_cfg,
        )
        .await;
        match res {
            Ok(bundle) => match analysis::finalize_scan(&db_pool, id, bundle).await {
                Ok(true) => {
                    metrics.inc_analyses_completed();
                    let _ = tx_clone.send(AnalysisEvent::Completed {
                        diagnosis: bundle.diagnosis.clone(),
                        severity: bundle.severity.clone(),
                        confidence: bundle.confidence,
                    });
                }
                Ok(false) => {
                    // Row left 'analyzing' behind our back: cancelled or deleted
                    metrics.inc_analyses_cancelled();
                    let _ = tx_clone.send(AnalysisEvent::Cancelled);
                }
                Err(e) => {
                    metrics.inc_analyses_failed();
                    let _ = analysis::mark_scan_error(&db_pool, id).await;
                    let _ = tx_clone.send(AnalysisEvent::Failed { message: format!("{}", e) });
                }
            },
            Err(e) => {
                if cancel_child.is_cancelled() {
                    metrics.inc_analyses_cancelled();
                    let _ = analysis::mark_scan_error(&db_pool, id).await;
                    let _ = tx_clone.send(AnalysisEvent::Cancelled);
                } else {
                    metrics.inc_analyses_failed();
                    let _ = analysis::mark_scan_error(&db_pool, id).await;
                    let _ = tx_clone.send(AnalysisEvent::Failed { message: format!("{}", e) });
                }
            }
        }
        // Always remove job handle after completion
        {
            let mut jobs = jobs_map.write().await;
            jobs.remove(&id);
        }
    });

    let resp = CreateScanResponse { id, status: ScanStatus::Pending, upload_date: now };
    Ok((StatusCode::ACCEPTED, Json(resp)).into_response())
}

// ---------------------- LIST ENDPOINT ----------------------

#[derive(Debug, Default, serde::Deserialize)]
pub struct ScanListQuery {
    pub search: Option<String>,
    #[serde(alias = "type")]
    pub scan_type: Option<String>,
    pub status: Option<String>,
}

pub async fn list_scans(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<ScanListQuery>,
) -> AppResult<impl IntoResponse> {
    let scans = db::list_scans(&state.db, user.id).await?;
    Ok(Json(filter_scans(scans, &q)))
}

/// Applies the list filters, all conjunctive: case-insensitive substring
/// search over name and diagnosis, exact modality match, case-insensitive
/// status match.
pub fn filter_scans(scans: Vec<Scan>, q: &ScanListQuery) -> Vec<Scan> {
    let needle = q.search.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty());
    let status = q.status.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty());
    let scan_type = q.scan_type.as_deref().filter(|t| !t.is_empty());

    scans
        .into_iter()
        .filter(|s| match needle.as_deref() {
            Some(n) => {
                s.name.to_lowercase().contains(n)
                    || s.diagnosis.as_deref().map(|d| d.to_lowercase().contains(n)).unwrap_or(false)
            }
            None => true,
        })
        .filter(|s| scan_type.map(|t| s.scan_type == t).unwrap_or(true))
        .filter(|s| status.as_deref().map(|st| s.status.as_str() == st).unwrap_or(true))
        .collect()
}

// ---------------------- DETAIL ENDPOINT ----------------------

pub async fn get_scan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let scan = db::fetch_scan(&state.db, id, user.id).await?.ok_or_not_found("Scan")?;
    Ok(Json(scan))
}

// ---------------------- DELETE ENDPOINT ----------------------

pub async fn delete_scan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let scan = db::fetch_scan(&state.db, id, user.id).await?.ok_or_not_found("Scan")?;

    // Stop a running analysis before the row disappears
    {
        let mut jobs = state.jobs.write().await;
        if let Some(handle) = jobs.remove(&id) {
            handle.cancel.cancel();
        }
    }

    sqlx::query("DELETE FROM scans WHERE id = ?1 AND user_id = ?2")
        .bind(id.to_string())
        .bind(user.id.to_string())
        .execute(&state.db)
        .await?;

    // Stored media goes best-effort; inline data URLs are skipped
    if let Some(url) = scan.image_url.as_deref() {
        state.media.remove_asset(url).await;
    }
    if let Some(url) = scan.thumbnail_url.as_deref() {
        state.media.remove_asset(url).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------- CANCEL ENDPOINT ----------------------

pub async fn cancel_analysis(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let scan = db::fetch_scan(&state.db, id, user.id).await?.ok_or_not_found("Scan")?;

    // Cancel if running; act idempotently otherwise
    {
        let mut jobs = state.jobs.write().await;
        if let Some(handle) = jobs.remove(&id) {
            handle.cancel.cancel();
        }
    }

    // Guarded downgrade; a row already analyzed or errored stays untouched
    if !scan.status.is_terminal() {
        let _ = analysis::mark_scan_error(&state.db, id).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------- EVENTS ENDPOINT ----------------------

pub async fn scan_events(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    // Ownership check before exposing the stream
    db::fetch_scan(&state.db, id, user.id).await?.ok_or_not_found("Scan")?;

    let rx = {
        let jobs = state.jobs.read().await;
        if let Some(handle) = jobs.get(&id) {
            handle.sender.subscribe()
        } else {
            return Err(AppError::NotFound("analysis not running".into()));
        }
    };

    let stream = BroadcastStream::new(rx).filter_map(|res| res.ok()).map(|ev| {
        let data = serde_json::to_string(&ev)
            .unwrap_or_else(|_| json!({"type":"failed","message":"serialization error"}).to_string());
        Ok::<Event, std::convert::Infallible>(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new().interval(Duration::from_secs(10)).text("keep-alive"),
    ))
}

// ---------------------- REPORT ENDPOINT ----------------------

pub async fn scan_report(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let scan = db::fetch_scan(&state.db, id, user.id).await?.ok_or_not_found("Scan")?;
    let report = build_report(&scan, &user.name);

    let mut response = report.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    let filename = format!("attachment; filename=\"scan_report_{}.txt\"", scan.id);
    if let Ok(header_val) = HeaderValue::from_str(&filename) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, header_val);
    }
    Ok(response)
}

/// Assembles the plain-text report for one scan.
pub fn build_report(scan: &Scan, patient_name: &str) -> String {
    let mut out = String::new();
    out.push_str("MediScan AI - Scan Analysis Report\n");
    out.push_str("==================================\n\n");
    out.push_str(&format!("Patient: {}\n", patient_name));
    out.push_str(&format!("Scan: {}\n", scan.name));
    out.push_str(&format!("Type: {}\n", scan.scan_type));
    out.push_str(&format!("File: {} ({} bytes)\n", scan.file_name, scan.file_size));
    out.push_str(&format!("Uploaded: {}\n", scan.upload_date));
    out.push_str(&format!("Status: {}\n", scan.status));

    if let Some(diagnosis) = scan.diagnosis.as_deref() {
        out.push_str(&format!("\nDiagnosis: {}\n", diagnosis));
    }
    if let Some(confidence) = scan.confidence {
        out.push_str(&format!("Confidence: {}%\n", confidence));
    }
    if let Some(severity) = scan.severity.as_deref() {
        out.push_str(&format!("Severity: {}\n", severity));
    }

    if let Some(findings) = scan.findings.as_ref().filter(|f| !f.is_empty()) {
        out.push_str("\nFindings:\n");
        for finding in findings {
            out.push_str(&format!("- {}\n", finding));
        }
    }
    if let Some(recommendations) = scan.recommendations.as_ref().filter(|r| !r.is_empty()) {
        out.push_str("\nRecommendations:\n");
        for rec in recommendations {
            out.push_str(&format!("- {}\n", rec));
        }
    }

    if let Some(prescription) = scan.prescription.as_ref() {
        if !prescription.medications.is_empty() {
            out.push_str("\nPrescribed Medications:\n");
            for med in &prescription.medications {
                out.push_str(&format!("- {} - {} - {}\n", med.name, med.dosage, med.frequency));
            }
        }
        if !prescription.lifestyle.is_empty() {
            out.push_str("\nLifestyle Recommendations:\n");
            for item in &prescription.lifestyle {
                out.push_str(&format!("- {}\n", item));
            }
        }
        if !prescription.follow_up.is_empty() {
            out.push_str(&format!("\nFollow-up: {}\n", prescription.follow_up));
        }
        if !prescription.warnings.is_empty() {
            out.push_str("\nWarnings:\n");
            for warning in &prescription.warnings {
                out.push_str(&format!("- {}\n", warning));
            }
        }
    }

    out.push_str("\n---\n");
    out.push_str(
        "This report is generated by AI analysis and should not replace professional medical \
         consultation. Always consult with a qualified healthcare provider before making any \
         medical decisions.\n",
    );
    out
}
