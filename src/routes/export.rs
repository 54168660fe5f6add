use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::{
    db,
    error::{AppResult, OptionExt},
    state::AppState,
    types::{AuthUser, ExportDocument, ExportScan},
};

// ---------------------- ACCOUNT EXPORT ENDPOINT ----------------------

/// GET /account/export - the caller's profile and scan records as a JSON
/// download. Binary payloads stay on the server; the export carries the
/// record data only.
pub async fn export_account(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Response> {
    let profile = db::fetch_profile(&state.db, user.id)
        .await?
        .ok_or_not_found("Profile")?;
    let scans = db::list_scans(&state.db, user.id)
        .await?
        .into_iter()
        .map(ExportScan::from)
        .collect();

    let document = ExportDocument {
        user: profile,
        scans,
    };

    let mut response = Json(document).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    let filename = format!("attachment; filename=\"mediscan_export_{}.json\"", user.id);
    if let Ok(header_val) = HeaderValue::from_str(&filename) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, header_val);
    }
    Ok(response)
}
