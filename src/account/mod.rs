/// Account management system
///
/// Request/response shapes for the auth surface plus the manager that
/// drives the registration -> verification -> login -> active-session
/// lifecycle.

mod manager;

pub use manager::AccountManager;

use crate::db::account::{Account, Role, SubscriptionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(length(min = 1))]
    pub full_name: String,
    pub company_name: Option<String>,
    pub phone: Option<String>,
}

/// Registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user_id: String,
}

/// Email + OTP request (verify-email, force-logout)
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailOtpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub otp: String,
}

/// Email-only request (resend-otp, request-login-otp)
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[validate(email)]
    pub email: String,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub otp: String,
    #[validate(length(min = 1))]
    pub device_id: String,
}

/// Generic success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Login response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub user: AccountSummary,
}

/// Current-account response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub success: bool,
    pub user: AccountSummary,
}

/// Redacted account view. Never carries the password hash or any OTP
/// field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub company_name: Option<String>,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub subscription_status: SubscriptionStatus,
    pub subscription_started_at: DateTime<Utc>,
    pub subscription_ends_at: DateTime<Utc>,
    pub role: Role,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            company_name: account.company_name.clone(),
            phone: account.phone.clone(),
            email_verified: account.email_verified,
            subscription_status: account.subscription_status,
            subscription_started_at: account.subscription_started_at,
            subscription_ends_at: account.subscription_ends_at,
            role: account.role,
        }
    }
}

/// Operator request to provision a pre-verified account
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionAccountRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(length(min = 1))]
    pub full_name: String,
    pub role: Option<Role>,
}

/// Paginated account listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountListResponse {
    pub success: bool,
    pub accounts: Vec<AccountSummary>,
    pub cursor: Option<String>,
}
