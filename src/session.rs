/// Single-active-device session guard
///
/// Decides admission for a presented device id against an account's
/// bound device. Login admission allows a stale binding (older than the
/// configured staleness window) to be displaced; the standing
/// per-request check does not. That asymmetry matches the reference
/// behavior and is intentional: a displaced session must be reclaimed
/// through a fresh login, never by an ordinary request.
use crate::{
    db::account::Account,
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Duration, Utc};

/// Default hours after which a bound device no longer blocks a new login
pub const STALE_SESSION_HOURS: i64 = 24;

/// What an admitted request is allowed to write back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No device bound; bind the presented one
    Bind,
    /// Presented device is the bound one; refresh its last-login time
    Refresh,
    /// Bound device is stale; displace it with the presented one
    Rebind,
}

/// Admission rule at login time, evaluated in order: deactivation,
/// absent/malformed binding, same device, staleness.
pub fn admit_login(
    account: &Account,
    device_id: &str,
    stale_hours: i64,
    now: DateTime<Utc>,
) -> ApiResult<Admission> {
    if !account.is_active {
        return Err(ApiError::AccountDeactivated);
    }

    match account.active_device() {
        None => Ok(Admission::Bind),
        Some(device) if device.device_id == device_id => Ok(Admission::Refresh),
        Some(device) => {
            if now - device.last_login_at < Duration::hours(stale_hours) {
                Err(ApiError::DeviceConflict)
            } else {
                Ok(Admission::Rebind)
            }
        }
    }
}

/// Standing admission rule for authenticated, device-scoped requests.
/// Same ordering as login, but a mismatched binding is rejected outright
/// regardless of age.
pub fn admit_request(account: &Account, device_id: &str) -> ApiResult<Admission> {
    if !account.is_active {
        return Err(ApiError::AccountDeactivated);
    }

    match account.active_device() {
        None => Ok(Admission::Bind),
        Some(device) if device.device_id == device_id => Ok(Admission::Refresh),
        Some(_) => Err(ApiError::DeviceConflict),
    }
}
