#[cfg(test)]
mod tests {
    use axum::middleware::from_fn_with_state;
    use axum::routing::{get, post};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt; // for .collect()
    use serde_json::{json, Value};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Row;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::routes;
    use crate::state::AppState;

    async fn setup_test_app() -> (Router, AppState, tempfile::TempDir) {
        let temp = tempfile::TempDir::new().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_db(&pool).await.unwrap();

        let mut config = AppConfig::default();
        config.storage.media_dir = temp.path().join("media").to_string_lossy().to_string();
        config.auth.require_email_confirmation = true;

        let state = AppState::new(pool, config);

        let protected = Router::new()
            .route("/auth/signout", post(routes::auth::signout))
            .route("/auth/me", get(routes::auth::me))
            .route("/profile", get(routes::auth::get_profile).put(routes::auth::update_profile))
            .route_layer(from_fn_with_state(state.clone(), crate::middleware::auth::require_auth));

        let app = Router::new()
            .route("/auth/signup", post(routes::auth::signup))
            .route("/auth/signin", post(routes::auth::signin))
            .route("/auth/confirm", get(routes::auth::confirm_email))
            .route("/auth/resend-confirmation", post(routes::auth::resend_confirmation))
            .merge(protected)
            .with_state(state.clone());

        (app, state, temp)
    }

    fn signup_payload(email: &str) -> Value {
        json!({
            "first_name": "Max",
            "last_name": "Muster",
            "email": email,
            "password": "secret123",
            "confirm_password": "secret123",
        })
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get_with_token(app: &Router, uri: &str, token: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn confirmation_token_for(state: &AppState, email: &str) -> Option<String> {
        sqlx::query("SELECT confirmation_token FROM users WHERE email = ?1")
            .bind(email)
            .fetch_one(&state.db)
            .await
            .unwrap()
            .get("confirmation_token")
    }

    /// Runs signup, confirmation and signin, returning a usable token.
    async fn signup_and_signin(app: &Router, state: &AppState, email: &str) -> String {
        let (status, _) = post_json(app, "/auth/signup", signup_payload(email)).await;
        assert_eq!(status, StatusCode::CREATED);

        let confirm = confirmation_token_for(state, email).await.unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/confirm?token={}", confirm))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, json) = post_json(
            app,
            "/auth/signin",
            json!({ "email": email, "password": "secret123" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        json["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_signup_requires_confirmation() {
        let (app, state, _temp) = setup_test_app().await;

        let (status, json) = post_json(&app, "/auth/signup", signup_payload("new@example.com")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["needs_confirmation"], true);
        assert!(json.get("token").is_none());
        assert!(json.get("user").is_none());
        assert_eq!(
            json["message"],
            "Please check your email and click the confirmation link to complete registration."
        );

        let row = sqlx::query("SELECT email_confirmed_at, confirmation_token FROM users WHERE email = ?1")
            .bind("new@example.com")
            .fetch_one(&state.db)
            .await
            .unwrap();
        let confirmed: Option<String> = row.get("email_confirmed_at");
        let token: Option<String> = row.get("confirmation_token");
        assert!(confirmed.is_none());
        assert!(token.is_some());
    }

    #[tokio::test]
    async fn test_signup_rejects_password_mismatch() {
        let (app, state, _temp) = setup_test_app().await;

        let mut payload = signup_payload("mismatch@example.com");
        payload["confirm_password"] = json!("something-else");
        let (status, json) = post_json(&app, "/auth/signup", payload).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["details"]["field"], "confirm_password");
        assert_eq!(json["error"]["details"]["message"], "Passwords do not match.");

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&state.db).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_signup_rejects_short_password() {
        let (app, state, _temp) = setup_test_app().await;

        let mut payload = signup_payload("short@example.com");
        payload["password"] = json!("abc");
        payload["confirm_password"] = json!("abc");
        let (status, json) = post_json(&app, "/auth/signup", payload).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["details"]["message"], "Password must be at least 6 characters long.");

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&state.db).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_signup_rejects_invalid_email() {
        let (app, _state, _temp) = setup_test_app().await;

        let (status, json) = post_json(&app, "/auth/signup", signup_payload("not-an-email")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["details"]["field"], "email");
    }

    #[tokio::test]
    async fn test_signup_conflict_on_duplicate_email() {
        let (app, _state, _temp) = setup_test_app().await;

        let (status, _) = post_json(&app, "/auth/signup", signup_payload("dup@example.com")).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = post_json(&app, "/auth/signup", signup_payload("dup@example.com")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_signin_before_confirmation_rejected() {
        let (app, _state, _temp) = setup_test_app().await;

        let (status, _) = post_json(&app, "/auth/signup", signup_payload("pending@example.com")).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = post_json(
            &app,
            "/auth/signin",
            json!({ "email": "pending@example.com", "password": "secret123" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            json["error"]["message"],
            "Please check your email and click the confirmation link before signing in. Check your spam folder if you don't see the email."
        );
    }

    #[tokio::test]
    async fn test_confirm_flow_enables_signin() {
        let (app, state, _temp) = setup_test_app().await;

        let (status, _) = post_json(&app, "/auth/signup", signup_payload("flow@example.com")).await;
        assert_eq!(status, StatusCode::CREATED);

        let confirm = confirmation_token_for(&state, "flow@example.com").await.unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/confirm?token={}", confirm))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["confirmed"], true);

        // The link is one-shot
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/confirm?token={}", confirm))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (status, json) = post_json(
            &app,
            "/auth/signin",
            json!({ "email": "flow@example.com", "password": "secret123" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["token"].as_str().is_some());
        assert_eq!(json["user"]["email"], "flow@example.com");
        assert_eq!(json["user"]["name"], "Max Muster");
    }

    #[tokio::test]
    async fn test_confirm_with_unknown_token() {
        let (app, _state, _temp) = setup_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/confirm?token=definitely-not-issued")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_resend_confirmation_rotates_token() {
        let (app, state, _temp) = setup_test_app().await;

        let (status, _) = post_json(&app, "/auth/signup", signup_payload("resend@example.com")).await;
        assert_eq!(status, StatusCode::CREATED);
        let first = confirmation_token_for(&state, "resend@example.com").await.unwrap();

        let (status, json) = post_json(
            &app,
            "/auth/resend-confirmation",
            json!({ "email": "resend@example.com" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let second = confirmation_token_for(&state, "resend@example.com").await.unwrap();
        assert_ne!(first, second);

        // Unknown addresses get the same answer
        let (status_unknown, json_unknown) = post_json(
            &app,
            "/auth/resend-confirmation",
            json!({ "email": "ghost@example.com" }),
        )
        .await;
        assert_eq!(status_unknown, StatusCode::OK);
        assert_eq!(json["message"], json_unknown["message"]);
    }

    #[tokio::test]
    async fn test_signin_wrong_password() {
        let (app, state, _temp) = setup_test_app().await;
        signup_and_signin(&app, &state, "creds@example.com").await;

        let (status, json) = post_json(
            &app,
            "/auth/signin",
            json!({ "email": "creds@example.com", "password": "wrong-password" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            json["error"]["message"],
            "Invalid email or password. Please check your credentials and try again."
        );
    }

    #[tokio::test]
    async fn test_email_is_case_insensitive() {
        let (app, state, _temp) = setup_test_app().await;

        let (status, _) =
            post_json(&app, "/auth/signup", signup_payload("MiXeD@Example.COM")).await;
        assert_eq!(status, StatusCode::CREATED);

        // Stored lowercased
        let confirm = confirmation_token_for(&state, "mixed@example.com").await.unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/confirm?token={}", confirm))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, json) = post_json(
            &app,
            "/auth/signin",
            json!({ "email": "mixed@EXAMPLE.com", "password": "secret123" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["email"], "mixed@example.com");
    }

    #[tokio::test]
    async fn test_me_and_signout() {
        let (app, state, _temp) = setup_test_app().await;
        let token = signup_and_signin(&app, &state, "me@example.com").await;

        let (status, json) = get_with_token(&app, "/auth/me", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["email"], "me@example.com");
        assert_eq!(json["name"], "Max Muster");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/signout")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (status, _) = get_with_token(&app, "/auth/me", "garbage-token").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me_falls_back_to_email_without_profile_name() {
        let (app, state, _temp) = setup_test_app().await;
        let token = signup_and_signin(&app, &state, "fallback@example.com").await;

        sqlx::query(
            "UPDATE user_profiles SET first_name = NULL, last_name = NULL, full_name = NULL WHERE email = ?1",
        )
        .bind("fallback@example.com")
        .execute(&state.db)
        .await
        .unwrap();

        let (status, json) = get_with_token(&app, "/auth/me", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "fallback@example.com");
    }

    #[tokio::test]
    async fn test_profile_partial_update() {
        let (app, state, _temp) = setup_test_app().await;
        let token = signup_and_signin(&app, &state, "profile@example.com").await;

        let (status, json) = get_with_token(&app, "/profile", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["first_name"], "Max");
        assert_eq!(json["full_name"], "Max Muster");
        assert!(json["phone"].is_null());

        let update = json!({
            "phone": "+49 151 1234567",
            "allergies": ["penicillin"],
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/profile")
                    .header("authorization", format!("Bearer {}", token))
                    .header("content-type", "application/json")
                    .body(Body::from(update.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, json) = get_with_token(&app, "/profile", &token).await;
        assert_eq!(json["phone"], "+49 151 1234567");
        assert_eq!(json["allergies"][0], "penicillin");
        // Untouched fields keep their values
        assert_eq!(json["first_name"], "Max");

        // Renaming recomputes the display name
        let update = json!({ "last_name": "Neumann" });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/profile")
                    .header("authorization", format!("Bearer {}", token))
                    .header("content-type", "application/json")
                    .body(Body::from(update.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let (_, json) = get_with_token(&app, "/profile", &token).await;
        assert_eq!(json["full_name"], "Max Neumann");
        assert_eq!(json["allergies"][0], "penicillin");
    }
}
