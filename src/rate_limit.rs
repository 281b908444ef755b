/// Rate limiting system
use crate::{config::RateLimitSettings, error::ApiError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Rate limiter manager with one quota per traffic class. Endpoints
/// that cause an email send get the tightest quota.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    otp: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    unauthenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    authenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

fn quota(rps: u32, fallback: u32, burst: u32) -> Quota {
    Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::new(fallback).unwrap()))
        .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::new(5).unwrap()))
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            enabled: settings.enabled,
            otp: Arc::new(GovernorLimiter::direct(quota(settings.otp_rps, 2, 5))),
            unauthenticated: Arc::new(GovernorLimiter::direct(quota(
                settings.unauthenticated_rps,
                10,
                10,
            ))),
            authenticated: Arc::new(GovernorLimiter::direct(quota(
                settings.authenticated_rps,
                100,
                50,
            ))),
        }
    }

    pub fn check_otp(&self) -> bool {
        !self.enabled || self.otp.check().is_ok()
    }

    pub fn check_unauthenticated(&self) -> bool {
        !self.enabled || self.unauthenticated.check().is_ok()
    }

    pub fn check_authenticated(&self) -> bool {
        !self.enabled || self.authenticated.check().is_ok()
    }
}

/// Paths whose handlers trigger an email send
fn is_otp_path(path: &str) -> bool {
    matches!(
        path,
        "/api/auth/register" | "/api/auth/resend-otp" | "/api/auth/request-login-otp"
    )
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path();
    let has_auth_header = request.headers().get("authorization").is_some();

    let allowed = if is_otp_path(path) {
        ctx.rate_limiter.check_otp()
    } else if has_auth_header {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_unauthenticated()
    };

    if !allowed {
        return Err(ApiError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(otp_rps: u32) -> RateLimitSettings {
        RateLimitSettings {
            enabled: true,
            otp_rps,
            unauthenticated_rps: 10,
            authenticated_rps: 100,
        }
    }

    #[test]
    fn otp_quota_hits_after_burst() {
        let limiter = RateLimiter::new(&settings(1));

        for _ in 0..5 {
            assert!(limiter.check_otp());
        }
        assert!(!limiter.check_otp());
    }

    #[test]
    fn disabled_limiter_always_admits() {
        let mut s = settings(1);
        s.enabled = false;
        let limiter = RateLimiter::new(&s);

        for _ in 0..100 {
            assert!(limiter.check_otp());
        }
    }

    #[test]
    fn otp_paths_are_recognized() {
        assert!(is_otp_path("/api/auth/register"));
        assert!(is_otp_path("/api/auth/request-login-otp"));
        assert!(!is_otp_path("/api/auth/login"));
        assert!(!is_otp_path("/api/auth/me"));
    }
}
