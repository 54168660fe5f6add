use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// An Axum middleware that validates incoming requests for common security issues.
///
/// This middleware checks for:
/// - Path traversal attempts in the request URI.
/// - Suspicious user agents.
/// - Excessive content length.
///
/// # Arguments
///
/// * `req` - The incoming `Request`.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// * `Response` - The response from the next middleware, or a `400 Bad Request`
///   or `413 Payload Too Large` response if a validation check fails.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    // Check for path traversal attempts in URL
    let uri_path = req.uri().path();
    if contains_path_traversal(uri_path) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "code": "INVALID_PATH",
                    "message": "Path traversal detected in request",
                },
                "status": 400,
            })),
        )
            .into_response();
    }

    // Check for suspicious headers
    if let Some(user_agent) = req.headers().get("user-agent") {
        if let Ok(ua_str) = user_agent.to_str() {
            if is_suspicious_user_agent(ua_str) {
                tracing::warn!("Suspicious user agent detected: {}", ua_str);
            }
        }
    }

    // Check content length for POST/PUT requests
    // This is redundant with DefaultBodyLimit but provides early rejection
    if matches!(req.method(), &axum::http::Method::POST | &axum::http::Method::PUT) {
        if let Some(content_length) = req.headers().get("content-length") {
            if let Ok(length_str) = content_length.to_str() {
                if let Ok(length) = length_str.parse::<usize>() {
                    // Use configurable limit matching main.rs
                    let max_body_size = std::env::var("MEDISCAN_MAX_BODY_SIZE")
                        .ok()
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(52 * 1024 * 1024)
                        .clamp(1024 * 1024, 64 * 1024 * 1024);
                    if length > max_body_size {
                        return (
                            StatusCode::PAYLOAD_TOO_LARGE,
                            Json(json!({
                                "error": {
                                    "code": "PAYLOAD_TOO_LARGE",
                                    "message": format!("Request body exceeds maximum size of {} bytes", max_body_size),
                                },
                                "status": 413,
                            })),
                        ).into_response();
                    }
                }
            }
        }
    }

    next.run(req).await
}

/// Check if a path contains traversal attempts.
/// More comprehensive check for actual directory traversal patterns
fn contains_path_traversal(path: &str) -> bool {
    // Check for actual path traversal sequences
    let lower = path.to_lowercase();

    // Direct traversal patterns
    if path.contains("/..") || path.contains("\\..") || path.starts_with("..") {
        return true;
    }

    // Current directory references that could be dangerous
    if path.contains("/./") || path.contains("\\.\\") {
        return true;
    }

    // Multiple dots (bypass attempt: ....)
    if path.contains("....") {
        return true;
    }

    // URL-encoded variants (single and double encoding)
    let encoded_patterns = [
        "%2e%2e",
        "%252e%252e", // .. and double-encoded ..
        "%2e/",
        "%252e%2f", // ./
        "/%2e",
        "%2f%2e", // /.
        "%2e\\",
        "%2e%5c", // .\\
        "%5c%2e",
        "%5c%5c", // \\.
        "%00",    // Null byte
    ];

    for pattern in &encoded_patterns {
        if lower.contains(pattern) {
            return true;
        }
    }

    // Null bytes
    path.contains('\0')
}

/// Check for suspicious user agents (simple heuristic)
fn is_suspicious_user_agent(ua: &str) -> bool {
    let ua_lower = ua.to_lowercase();
    // Only flag if it contains scanner OR if it contains crawler but NOT legitimate bots
    ua_lower.contains("scanner")
        || (ua_lower.contains("crawler") && !ua_lower.contains("googlebot") && !ua_lower.contains("bingbot"))
        || ua_lower.contains("nikto")
        || ua_lower.contains("sqlmap")
        || ua_lower.contains("havij")
        || ua_lower.contains("acunetix")
}

/// Sanitizes user input for logging purposes.
///
/// This function removes control characters, limits the length of the string,
/// and escapes special characters.
///
/// # Arguments
///
/// * `input` - The string to sanitize.
///
/// # Returns
///
/// * `String` - The sanitized string.
pub fn sanitize_for_logging(input: &str) -> String {
    // Remove control characters (except whitespace), escape quotes, and limit length
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .take(200)
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\\'")
}
