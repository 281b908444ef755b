/// One-time password engine
///
/// Generates and validates the 6-digit codes used for email verification
/// and login. Validation never clears the pending slot; clearing is done
/// by the account manager atomically with the transition the code
/// enabled.
use crate::db::account::PendingOtp;
use chrono::{DateTime, Utc};
use rand::Rng;

/// Minutes a code stays valid after issuance
pub const OTP_TTL_MINUTES: i64 = 10;

/// What a pending code proves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Verification,
    Login,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Verification => "verification",
            OtpPurpose::Login => "login",
        }
    }
}

/// Validation outcomes, distinguished so callers can map them onto the
/// wire taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpError {
    /// No code is pending for this purpose
    NotPending,
    /// Supplied code does not match the pending one
    Mismatch,
    /// Code matched but is past its expiry
    Expired,
}

pub struct OtpEngine;

impl OtpEngine {
    /// Produce a 6-digit code drawn uniformly from 000000-999999
    pub fn generate() -> String {
        let mut rng = rand::thread_rng();
        format!("{:06}", rng.gen_range(0..1_000_000))
    }

    /// Check a supplied code against the pending slot. Mismatch is
    /// checked before expiry.
    pub fn validate(
        pending: Option<&PendingOtp>,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<(), OtpError> {
        let pending = pending.ok_or(OtpError::NotPending)?;

        if pending.code != supplied {
            return Err(OtpError::Mismatch);
        }

        if now > pending.expires_at {
            return Err(OtpError::Expired);
        }

        Ok(())
    }
}
