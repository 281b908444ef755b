/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{ApiError, ApiResult},
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-device-id"),
        ]);

    Router::new()
        // Health check endpoint (no middleware)
        .route("/health", get(health_check))
        .merge(crate::api::routes())
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> ApiResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Casement listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::AccountManager,
        config::test_config,
        domain::{DetachedDomainStore, DomainStore},
        mailer::Mailer,
        rate_limit::RateLimiter,
        token::TokenIssuer,
    };
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_context() -> AppContext {
        // Single connection so every handle sees the same in-memory db
        let db = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::MIGRATOR.run(&db).await.unwrap();

        let config = Arc::new(test_config());
        let tokens = Arc::new(TokenIssuer::new(
            config.authentication.jwt_secret.clone(),
            config.authentication.token_ttl_days,
        ));
        let mailer = Arc::new(Mailer::new(None).unwrap());
        let domain: Arc<dyn DomainStore> = Arc::new(DetachedDomainStore);

        let accounts = Arc::new(AccountManager::new(
            db.clone(),
            Arc::clone(&config),
            Arc::clone(&mailer),
            Arc::clone(&tokens),
            domain,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        AppContext {
            config,
            db,
            accounts,
            tokens,
            mailer,
            rate_limiter,
        }
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with_session(uri: &str, token: &str, device_id: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("authorization", format!("Bearer {}", token))
            .header("x-device-id", device_id)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn pending_verification_code(ctx: &AppContext, email: &str) -> String {
        let account = ctx.accounts.get_account_by_email(email).await.unwrap();
        account.pending_verification().unwrap().code
    }

    async fn pending_login_code(ctx: &AppContext, email: &str) -> String {
        let account = ctx.accounts.get_account_by_email(email).await.unwrap();
        account.pending_login().unwrap().code
    }

    #[tokio::test]
    async fn full_lifecycle_register_verify_login_me() {
        let ctx = test_context().await;
        let app = build_router(ctx.clone());

        // Register
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/auth/register",
                serde_json::json!({
                    "email": "a@x.com",
                    "password": "secret1",
                    "fullName": "Ada Glazier"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert!(body["userId"].is_string());

        // Verify
        let code = pending_verification_code(&ctx, "a@x.com").await;
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/auth/verify-email",
                serde_json::json!({"email": "a@x.com", "otp": code}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Request login OTP and login from dev-1
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/auth/request-login-otp",
                serde_json::json!({"email": "a@x.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let code = pending_login_code(&ctx, "a@x.com").await;
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/auth/login",
                serde_json::json!({"email": "a@x.com", "otp": code, "deviceId": "dev-1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(body["user"]["email"], "a@x.com");
        // Redacted summary: no hash, no OTP fields
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("loginOtp").is_none());

        // `me` from the bound device succeeds
        let response = app
            .clone()
            .oneshot(get_with_session("/api/auth/me", &token, "dev-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["user"]["email"], "a@x.com");

        // `me` from a different device is a device conflict
        let response = app
            .clone()
            .oneshot(get_with_session("/api/auth/me", &token, "dev-2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "DEVICE_CONFLICT");
    }

    #[tokio::test]
    async fn deactivation_revokes_valid_tokens() {
        let ctx = test_context().await;
        let app = build_router(ctx.clone());

        app.clone()
            .oneshot(post_json(
                "/api/auth/register",
                serde_json::json!({
                    "email": "a@x.com",
                    "password": "secret1",
                    "fullName": "Ada Glazier"
                }),
            ))
            .await
            .unwrap();
        let code = pending_verification_code(&ctx, "a@x.com").await;
        ctx.accounts.verify_email("a@x.com", &code).await.unwrap();
        ctx.accounts.request_login_otp("a@x.com").await.unwrap();
        let code = pending_login_code(&ctx, "a@x.com").await;
        let (token, account) = ctx
            .accounts
            .login("a@x.com", &code, "dev-1", "Test Agent")
            .await
            .unwrap();

        ctx.accounts.set_active(&account.id, false).await.unwrap();

        // Signature and expiry are still fine; admission is not
        let response = app
            .clone()
            .oneshot(get_with_session("/api/auth/me", &token, "dev-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Account is deactivated");
    }

    #[tokio::test]
    async fn device_scoped_requests_require_the_header() {
        let ctx = test_context().await;
        let app = build_router(ctx.clone());

        let token = ctx.tokens.issue("some-account").unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/auth/me")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let ctx = test_context().await;
        let app = build_router(ctx);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/auth/me")
                    .header("x-device-id", "dev-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn operator_gate_ignores_role_flag() {
        let ctx = test_context().await;
        let app = build_router(ctx.clone());

        // An admin-role account whose email is NOT on the allow-list
        let rogue = ctx
            .accounts
            .provision_account(crate::account::ProvisionAccountRequest {
                email: "rogue@example.com".to_string(),
                password: "secret1".to_string(),
                full_name: "Rogue".to_string(),
                role: Some(crate::db::account::Role::Admin),
            })
            .await
            .unwrap();
        let token = ctx.tokens.issue(&rogue.id).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/admin/accounts")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // The configured operator passes and the role flag follows
        let operator = ctx
            .accounts
            .provision_account(crate::account::ProvisionAccountRequest {
                email: "ops@example.com".to_string(),
                password: "secret1".to_string(),
                full_name: "Operator".to_string(),
                role: None,
            })
            .await
            .unwrap();
        let token = ctx.tokens.issue(&operator.id).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/admin/accounts")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let refreshed = ctx.accounts.get_account(&operator.id).await.unwrap();
        assert_eq!(refreshed.role, crate::db::account::Role::Admin);
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let ctx = test_context().await;
        let app = build_router(ctx);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }
}
