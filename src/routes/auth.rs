//! Account lifecycle endpoints: signup with email confirmation, signin,
//! confirmation-link handling and profile management.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use crate::auth::{confirmation_token, hash_password, issue_token, verify_password};
use crate::db;
use crate::error::validation::{validate_email, validate_required};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::ip::{extract_ip_from_headers, MaybeRemoteAddr};
use crate::middleware::validation::sanitize_for_logging;
use crate::state::AppState;
use crate::types::{
    AuthUser, ResendConfirmationRequest, SigninRequest, SigninResponse, SignupRequest,
    SignupResponse, UpdateProfileRequest, UserProfile,
};

// ---------------------- SIGNUP ENDPOINT ----------------------

/// POST /auth/signup - register a new account together with its profile row.
pub async fn signup(
    State(state): State<AppState>,
    maybe_remote: MaybeRemoteAddr,
    headers: HeaderMap,
    Json(req): Json<SignupRequest>,
) -> AppResult<Response> {
    let fallback_ip = maybe_remote.0.map(|addr| addr.ip());
    let ip = extract_ip_from_headers(&headers, fallback_ip);
    state.rate_limiter.check_endpoint_limit("/auth/signup", ip).await?;

    validate_required(&req.first_name, "first_name")?;
    validate_required(&req.last_name, "last_name")?;
    validate_email(&req.email)?;
    if req.password != req.confirm_password {
        return Err(AppError::ValidationError {
            field: "confirm_password".to_string(),
            message: "Passwords do not match.".to_string(),
        });
    }
    let min_len = state.config.auth.min_password_length;
    if req.password.chars().count() < min_len {
        return Err(AppError::ValidationError {
            field: "password".to_string(),
            message: format!("Password must be at least {} characters long.", min_len),
        });
    }

    let email = req.email.trim().to_lowercase();
    let existing = sqlx::query("SELECT id FROM users WHERE email = ?1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let password = req.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing task failed: {}", e)))??;

    let user_id = Uuid::new_v4();
    let now = db::now_rfc3339();
    let first_name = req.first_name.trim().to_string();
    let last_name = req.last_name.trim().to_string();
    let full_name = format!("{} {}", first_name, last_name);

    let require_confirmation = state.config.auth.require_email_confirmation;
    let confirm_token = require_confirmation.then(confirmation_token);
    let confirmed_at = (!require_confirmation).then(|| now.clone());

    let mut tx = state.db.begin().await?;
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, email_confirmed_at, confirmation_token, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(user_id.to_string())
    .bind(&email)
    .bind(&password_hash)
    .bind(&confirmed_at)
    .bind(&confirm_token)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO user_profiles (id, email, first_name, last_name, full_name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(user_id.to_string())
    .bind(&email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&full_name)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    if let Some(token) = confirm_token {
        // Kein Mailer angebunden: der Bestaetigungslink landet im Log.
        tracing::info!("confirmation link for {}: /auth/confirm?token={}", email, token);
        let resp = SignupResponse {
            user_id,
            needs_confirmation: true,
            token: None,
            user: None,
            message: Some(
                "Please check your email and click the confirmation link to complete registration."
                    .to_string(),
            ),
        };
        return Ok((StatusCode::CREATED, Json(resp)).into_response());
    }

    let token = issue_token(
        user_id,
        &email,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_hours,
    )?;
    let resp = SignupResponse {
        user_id,
        needs_confirmation: false,
        token: Some(token),
        user: Some(AuthUser {
            id: user_id,
            email,
            name: full_name,
        }),
        message: None,
    };
    Ok((StatusCode::CREATED, Json(resp)).into_response())
}

// ---------------------- SIGNIN ENDPOINT ----------------------

/// POST /auth/signin - exchange credentials for a bearer token.
pub async fn signin(
    State(state): State<AppState>,
    maybe_remote: MaybeRemoteAddr,
    headers: HeaderMap,
    Json(req): Json<SigninRequest>,
) -> AppResult<Json<SigninResponse>> {
    let fallback_ip = maybe_remote.0.map(|addr| addr.ip());
    let ip = extract_ip_from_headers(&headers, fallback_ip);
    state.rate_limiter.check_endpoint_limit("/auth/signin", ip).await?;

    let email = req.email.trim().to_lowercase();
    let row = sqlx::query("SELECT id, password_hash, email_confirmed_at FROM users WHERE email = ?1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    let Some(row) = row else {
        tracing::warn!("failed signin attempt for {}", sanitize_for_logging(&req.email));
        return Err(invalid_credentials());
    };
    let id_str: String = row.get("id");
    let password_hash: String = row.get("password_hash");
    let confirmed_at: Option<String> = row.get("email_confirmed_at");

    let password = req.password.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password verify task failed: {}", e)))??;
    if !valid {
        tracing::warn!("failed signin attempt for {}", sanitize_for_logging(&req.email));
        return Err(invalid_credentials());
    }
    if state.config.auth.require_email_confirmation && confirmed_at.is_none() {
        return Err(AppError::Unauthorized(
            "Please check your email and click the confirmation link before signing in. Check your spam folder if you don't see the email."
                .to_string(),
        ));
    }

    let user_id = Uuid::parse_str(&id_str)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("stored user id is not a uuid: {}", e)))?;
    let name = db::fetch_profile(&state.db, user_id)
        .await?
        .and_then(|p| p.full_name)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.clone());
    let token = issue_token(
        user_id,
        &email,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_hours,
    )?;
    Ok(Json(SigninResponse {
        token,
        user: AuthUser {
            id: user_id,
            email,
            name,
        },
    }))
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized(
        "Invalid email or password. Please check your credentials and try again.".to_string(),
    )
}

// ---------------------- CONFIRMATION ENDPOINTS ----------------------

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub token: String,
}

/// GET /auth/confirm - one-shot confirmation via the tokenized link.
pub async fn confirm_email(
    State(state): State<AppState>,
    Query(q): Query<ConfirmQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let now = db::now_rfc3339();
    let result = sqlx::query(
        "UPDATE users SET email_confirmed_at = ?1, confirmation_token = NULL
         WHERE confirmation_token = ?2 AND email_confirmed_at IS NULL",
    )
    .bind(&now)
    .bind(q.token.trim())
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest(
            "Invalid or expired confirmation token".to_string(),
        ));
    }
    Ok(Json(json!({ "confirmed": true })))
}

/// POST /auth/resend-confirmation - reissue the confirmation link.
///
/// Responds identically whether or not the address exists, so the endpoint
/// cannot be used to probe for accounts.
pub async fn resend_confirmation(
    State(state): State<AppState>,
    maybe_remote: MaybeRemoteAddr,
    headers: HeaderMap,
    Json(req): Json<ResendConfirmationRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let fallback_ip = maybe_remote.0.map(|addr| addr.ip());
    let ip = extract_ip_from_headers(&headers, fallback_ip);
    state
        .rate_limiter
        .check_endpoint_limit("/auth/resend-confirmation", ip)
        .await?;

    let email = req.email.trim().to_lowercase();
    let token = confirmation_token();
    let result = sqlx::query(
        "UPDATE users SET confirmation_token = ?1 WHERE email = ?2 AND email_confirmed_at IS NULL",
    )
    .bind(&token)
    .bind(&email)
    .execute(&state.db)
    .await?;
    if result.rows_affected() > 0 {
        tracing::info!("confirmation link for {}: /auth/confirm?token={}", email, token);
    }
    Ok(Json(json!({
        "message": "If an unconfirmed account exists for this address, a new confirmation link has been sent."
    })))
}

// ---------------------- SESSION ENDPOINTS ----------------------

/// POST /auth/signout - tokens are stateless, nothing to revoke server-side.
pub async fn signout() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /auth/me - identity attached by the auth middleware.
pub async fn me(Extension(user): Extension<AuthUser>) -> Json<AuthUser> {
    Json(user)
}

// ---------------------- PROFILE ENDPOINTS ----------------------

/// GET /profile - the caller's profile row.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<UserProfile>> {
    let profile = db::fetch_profile(&state.db, user.id)
        .await?
        .ok_or_not_found("Profile")?;
    Ok(Json(profile))
}

/// PUT /profile - partial update; omitted fields keep their stored value.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    let mut profile = db::fetch_profile(&state.db, user.id)
        .await?
        .ok_or_not_found("Profile")?;

    if let Some(v) = req.first_name {
        profile.first_name = Some(v);
    }
    if let Some(v) = req.last_name {
        profile.last_name = Some(v);
    }
    if let Some(v) = req.avatar_url {
        profile.avatar_url = Some(v);
    }
    if let Some(v) = req.phone {
        profile.phone = Some(v);
    }
    if let Some(v) = req.date_of_birth {
        profile.date_of_birth = Some(v);
    }
    if let Some(v) = req.gender {
        profile.gender = Some(v);
    }
    if let Some(v) = req.medical_history {
        profile.medical_history = Some(v);
    }
    if let Some(v) = req.allergies {
        profile.allergies = Some(v);
    }
    if let Some(v) = req.current_medications {
        profile.current_medications = Some(v);
    }
    if let Some(v) = req.emergency_contact {
        profile.emergency_contact = Some(v);
    }

    // full_name stays derived from the name fields.
    let full_name = match (profile.first_name.as_deref(), profile.last_name.as_deref()) {
        (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
        (Some(f), None) => Some(f.to_string()),
        (None, Some(l)) => Some(l.to_string()),
        (None, None) => None,
    };
    profile.full_name = full_name.filter(|n| !n.trim().is_empty());
    profile.updated_at = db::now_rfc3339();

    sqlx::query(
        "UPDATE user_profiles SET first_name = ?1, last_name = ?2, full_name = ?3, avatar_url = ?4,
            phone = ?5, date_of_birth = ?6, gender = ?7, medical_history = ?8, allergies = ?9,
            current_medications = ?10, emergency_contact = ?11, updated_at = ?12
         WHERE id = ?13",
    )
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.full_name)
    .bind(&profile.avatar_url)
    .bind(&profile.phone)
    .bind(&profile.date_of_birth)
    .bind(&profile.gender)
    .bind(encode_json(&profile.medical_history)?)
    .bind(encode_json(&profile.allergies)?)
    .bind(encode_json(&profile.current_medications)?)
    .bind(encode_json(&profile.emergency_contact)?)
    .bind(&profile.updated_at)
    .bind(profile.id.to_string())
    .execute(&state.db)
    .await?;

    Ok(Json(profile))
}

fn encode_json<T: serde::Serialize>(value: &Option<T>) -> AppResult<Option<String>> {
    match value {
        Some(v) => serde_json::to_string(v)
            .map(Some)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("profile field encoding failed: {}", e))),
        None => Ok(None),
    }
}
