/// Account database model and typed projections
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Subscription lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
    Cancelled,
}

/// Account roles. The stored flag is a derived cache of the configured
/// operator list, not the source of authorization truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Account record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub company_name: Option<String>,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub verification_otp: Option<String>,
    pub verification_otp_expires_at: Option<DateTime<Utc>>,
    pub login_otp: Option<String>,
    pub login_otp_expires_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub device_label: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    /// Monotonic counter; every device-binding write is guarded on it
    pub session_version: i64,
    pub subscription_status: SubscriptionStatus,
    pub subscription_started_at: DateTime<Utc>,
    pub subscription_ends_at: DateTime<Utc>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A pending one-time code with its expiry. Only materialized when both
/// halves of the column pair are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOtp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// The single bound device for an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDevice {
    pub device_id: String,
    pub device_label: String,
    pub last_login_at: DateTime<Utc>,
}

/// Authentication state derived from the record. A half-populated device
/// row collapses to `Verified`, so domain logic never sees a partial
/// binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unverified,
    Verified,
    Active(ActiveDevice),
}

impl Account {
    /// Pending email-verification code, if both code and expiry are set
    pub fn pending_verification(&self) -> Option<PendingOtp> {
        match (&self.verification_otp, self.verification_otp_expires_at) {
            (Some(code), Some(expires_at)) => Some(PendingOtp {
                code: code.clone(),
                expires_at,
            }),
            _ => None,
        }
    }

    /// Pending login code, if both code and expiry are set
    pub fn pending_login(&self) -> Option<PendingOtp> {
        match (&self.login_otp, self.login_otp_expires_at) {
            (Some(code), Some(expires_at)) => Some(PendingOtp {
                code: code.clone(),
                expires_at,
            }),
            _ => None,
        }
    }

    /// The bound device. A record missing its device id or login
    /// timestamp counts as no binding at all.
    pub fn active_device(&self) -> Option<ActiveDevice> {
        match (&self.device_id, self.last_login_at) {
            (Some(device_id), Some(last_login_at)) if !device_id.is_empty() => {
                Some(ActiveDevice {
                    device_id: device_id.clone(),
                    device_label: self
                        .device_label
                        .clone()
                        .unwrap_or_else(|| "Unknown".to_string()),
                    last_login_at,
                })
            }
            _ => None,
        }
    }

    /// Derived authentication state
    pub fn auth_state(&self) -> AuthState {
        if !self.email_verified {
            return AuthState::Unverified;
        }
        match self.active_device() {
            Some(device) => AuthState::Active(device),
            None => AuthState::Verified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn blank_account() -> Account {
        let now = Utc::now();
        Account {
            id: "acct-1".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "hash".to_string(),
            full_name: "A".to_string(),
            company_name: None,
            phone: None,
            email_verified: false,
            verification_otp: None,
            verification_otp_expires_at: None,
            login_otp: None,
            login_otp_expires_at: None,
            device_id: None,
            device_label: None,
            last_login_at: None,
            session_version: 0,
            subscription_status: SubscriptionStatus::Trial,
            subscription_started_at: now,
            subscription_ends_at: now + Duration::days(14),
            role: Role::User,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn half_set_otp_pair_is_absent() {
        let mut account = blank_account();
        account.verification_otp = Some("123456".to_string());
        assert!(account.pending_verification().is_none());

        account.verification_otp = None;
        account.verification_otp_expires_at = Some(Utc::now());
        assert!(account.pending_verification().is_none());

        account.verification_otp = Some("123456".to_string());
        assert!(account.pending_verification().is_some());
    }

    #[test]
    fn half_populated_device_is_absent() {
        let mut account = blank_account();
        account.device_id = Some("".to_string());
        account.last_login_at = Some(Utc::now());
        assert!(account.active_device().is_none());

        account.device_id = Some("dev-1".to_string());
        account.last_login_at = None;
        assert!(account.active_device().is_none());

        account.last_login_at = Some(Utc::now());
        let device = account.active_device().unwrap();
        assert_eq!(device.device_id, "dev-1");
        assert_eq!(device.device_label, "Unknown");
    }

    #[test]
    fn auth_state_follows_verification_and_binding() {
        let mut account = blank_account();
        assert_eq!(account.auth_state(), AuthState::Unverified);

        account.email_verified = true;
        assert_eq!(account.auth_state(), AuthState::Verified);

        account.device_id = Some("dev-1".to_string());
        account.device_label = Some("Pixel".to_string());
        account.last_login_at = Some(account.created_at);
        assert!(matches!(account.auth_state(), AuthState::Active(_)));
    }
}
