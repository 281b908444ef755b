/// Background task implementations
use crate::{context::AppContext, error::ApiResult};

/// Clear expired OTP slots (both halves of each pair together)
pub async fn cleanup_expired_otps(ctx: &AppContext) -> ApiResult<u64> {
    let (verification, login) = ctx.accounts.cleanup_expired_otps().await?;
    Ok(verification + login)
}

/// Flip lapsed trial subscriptions to expired. Login does this lazily
/// for the account logging in; the sweep covers everyone else.
pub async fn expire_lapsed_trials(ctx: &AppContext) -> ApiResult<u64> {
    ctx.accounts.expire_lapsed_trials().await
}

/// Health check - verify the database is reachable
pub async fn health_check(ctx: &AppContext) -> ApiResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    Ok(())
}
