use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sqlx::Row;
use uuid::Uuid;

use crate::auth::decode_token;
use crate::db::fetch_profile;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::types::AuthUser;

/// Middleware that resolves the Bearer token into an [`AuthUser`].
///
/// Expects `Authorization: Bearer <jwt>`. The token is validated against the
/// configured secret, the account row is re-checked (tokens can outlive a
/// deleted account), and the resulting user is inserted into the request
/// extensions for handlers to pick up via `Extension<AuthUser>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(auth_val) if auth_val.starts_with("Bearer ") => auth_val[7..].trim(),
        _ => return Err(AppError::Unauthorized("Missing bearer token".to_string())),
    };

    let claims = decode_token(token, &state.config.auth.jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    let row = sqlx::query("SELECT email FROM users WHERE id = ?1")
        .bind(user_id.to_string())
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;
    let email: String = row.get("email");

    // Display name follows the profile, falling back to the email address.
    let name = fetch_profile(&state.db, user_id)
        .await?
        .and_then(|p| p.full_name)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.clone());

    req.extensions_mut().insert(AuthUser { id: user_id, email, name });
    Ok(next.run(req).await)
}
