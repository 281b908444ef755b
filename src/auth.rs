/// Authentication extractors
use crate::{
    api::middleware::{extract_bearer_token, extract_device_id, extract_device_label},
    context::AppContext,
    db::account::Account,
    error::ApiError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated, device-scoped context. Verifies the bearer token,
/// loads the account, and runs the standing device check (which may
/// bind or refresh the device record).
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account: Account,
    pub device_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            ApiError::Unauthorized("Not authorized to access this route".to_string())
        })?;

        let account_id = state.tokens.verify(&token)?;

        let device_id = extract_device_id(&parts.headers)
            .ok_or_else(|| ApiError::Validation("Device ID is required".to_string()))?;
        let device_label = extract_device_label(&parts.headers);

        // A token for a since-deleted account is just an invalid token
        let account = match state
            .accounts
            .check_device(&account_id, &device_id, &device_label)
            .await
        {
            Ok(account) => account,
            Err(ApiError::NotFound(_)) => {
                return Err(ApiError::Unauthorized("User not found".to_string()))
            }
            Err(e) => return Err(e),
        };

        Ok(AuthContext { account, device_id })
    }
}

/// Operator context. Requires a valid token for an account whose email
/// is on the configured operator allow-list; the stored role flag is
/// only a derived cache and is re-synced here. Operator endpoints are
/// not device-scoped.
#[derive(Debug, Clone)]
pub struct OperatorContext {
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for OperatorContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            ApiError::Unauthorized("Not authorized to access this route".to_string())
        })?;

        let account_id = state.tokens.verify(&token)?;

        let account = match state.accounts.get_account(&account_id).await {
            Ok(account) => account,
            Err(ApiError::NotFound(_)) => {
                return Err(ApiError::Unauthorized("User not found".to_string()))
            }
            Err(e) => return Err(e),
        };

        if !account.is_active {
            return Err(ApiError::AccountDeactivated);
        }

        if !state
            .config
            .authentication
            .operator_emails
            .contains(&account.email)
        {
            tracing::warn!(account_id = %account.id, "operator access denied");
            return Err(ApiError::Forbidden("Admin only".to_string()));
        }

        state.accounts.sync_operator_role(&account).await?;

        Ok(OperatorContext { account })
    }
}
