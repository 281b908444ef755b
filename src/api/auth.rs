/// Authentication endpoints
use crate::{
    account::{
        AccountSummary, EmailOtpRequest, EmailRequest, LoginRequest, LoginResponse,
        MeResponse, MessageResponse, RegisterRequest, RegisterResponse,
    },
    api::middleware::extract_device_label,
    auth::AuthContext,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

/// Build authentication routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/verify-email", post(verify_email))
        .route("/api/auth/resend-otp", post(resend_otp))
        .route("/api/auth/request-login-otp", post(request_login_otp))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/force-logout", post(force_logout))
        .route("/api/auth/me", get(me))
}

fn check<T: Validate>(req: &T) -> ApiResult<()> {
    req.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

/// Register a new account and issue a verification code
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    check(&req)?;

    let (account, delivered) = ctx.accounts.register(req).await?;

    let message = if delivered {
        "Registration successful. Please verify your email with OTP."
    } else {
        "Registration successful, but the verification email could not be sent. \
         Please request a new OTP."
    };

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: message.to_string(),
            user_id: account.id,
        }),
    ))
}

/// Verify email with a pending OTP
async fn verify_email(
    State(ctx): State<AppContext>,
    Json(req): Json<EmailOtpRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check(&req)?;

    ctx.accounts.verify_email(&req.email, &req.otp).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Email verified successfully".to_string(),
    }))
}

/// Re-issue the verification OTP
async fn resend_otp(
    State(ctx): State<AppContext>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check(&req)?;

    let delivered = ctx.accounts.resend_verification(&req.email).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: if delivered {
            "OTP sent to your email".to_string()
        } else {
            "OTP issued, but the email could not be sent".to_string()
        },
    }))
}

/// Issue a login OTP for a verified account
async fn request_login_otp(
    State(ctx): State<AppContext>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check(&req)?;

    let delivered = ctx.accounts.request_login_otp(&req.email).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: if delivered {
            "Login OTP sent to your email".to_string()
        } else {
            "Login OTP issued, but the email could not be sent".to_string()
        },
    }))
}

/// Login with an OTP, binding the presenting device
async fn login(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    check(&req)?;

    let device_label = extract_device_label(&headers);

    let (token, account) = ctx
        .accounts
        .login(&req.email, &req.otp, &req.device_id, &device_label)
        .await?;

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        token,
        user: AccountSummary::from(&account),
    }))
}

/// Logout: clears the device binding after the standing device check
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> ApiResult<Json<MessageResponse>> {
    ctx.accounts.clear_device(&auth.account.id).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Logged out successfully".to_string(),
    }))
}

/// Clear the device binding with a login OTP instead of a session
async fn force_logout(
    State(ctx): State<AppContext>,
    Json(req): Json<EmailOtpRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check(&req)?;

    ctx.accounts.force_logout(&req.email, &req.otp).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Device session cleared. You can now login from any device.".to_string(),
    }))
}

/// Current account, redacted
async fn me(auth: AuthContext) -> ApiResult<Json<MeResponse>> {
    Ok(Json(MeResponse {
        success: true,
        user: AccountSummary::from(&auth.account),
    }))
}
