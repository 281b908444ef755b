/// Operator endpoints
///
/// Gated by the configured operator allow-list, not by the stored role
/// flag. None of these are device-scoped.
use crate::{
    account::{
        AccountListResponse, AccountSummary, MessageResponse, ProvisionAccountRequest,
    },
    auth::OperatorContext,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build operator routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/admin/accounts",
            post(provision_account).get(list_accounts),
        )
        .route("/api/admin/accounts/:id/clear-device", post(clear_device))
        .route("/api/admin/accounts/:id/deactivate", post(deactivate))
        .route("/api/admin/accounts/:id/activate", post(activate))
        .route("/api/admin/accounts/:id", delete(delete_account))
}

/// Provision a pre-verified account
async fn provision_account(
    State(ctx): State<AppContext>,
    operator: OperatorContext,
    Json(req): Json<ProvisionAccountRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    req.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let account = ctx.accounts.provision_account(req).await?;

    tracing::info!(
        operator = %operator.account.id,
        account_id = %account.id,
        "account provisioned by operator"
    );

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            success: true,
            message: format!("Account {} provisioned", account.email),
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    cursor: Option<String>,
    limit: Option<i64>,
}

/// List accounts with cursor pagination
async fn list_accounts(
    State(ctx): State<AppContext>,
    _operator: OperatorContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<AccountListResponse>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let accounts = ctx
        .accounts
        .list_accounts(query.cursor.as_deref(), limit)
        .await?;

    let cursor = if accounts.len() as i64 == limit {
        accounts.last().map(|a| a.id.clone())
    } else {
        None
    };

    Ok(Json(AccountListResponse {
        success: true,
        accounts: accounts.iter().map(AccountSummary::from).collect(),
        cursor,
    }))
}

/// Clear an account's device binding, bypassing OTP
async fn clear_device(
    State(ctx): State<AppContext>,
    operator: OperatorContext,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.accounts.clear_device(&id).await?;

    tracing::info!(operator = %operator.account.id, account_id = %id, "device cleared by operator");

    Ok(Json(MessageResponse {
        success: true,
        message: "Device session cleared".to_string(),
    }))
}

/// Deactivate an account
async fn deactivate(
    State(ctx): State<AppContext>,
    operator: OperatorContext,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.accounts.set_active(&id, false).await?;

    tracing::info!(operator = %operator.account.id, account_id = %id, "account deactivated");

    Ok(Json(MessageResponse {
        success: true,
        message: "Account deactivated".to_string(),
    }))
}

/// Reactivate an account
async fn activate(
    State(ctx): State<AppContext>,
    operator: OperatorContext,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.accounts.set_active(&id, true).await?;

    tracing::info!(operator = %operator.account.id, account_id = %id, "account reactivated");

    Ok(Json(MessageResponse {
        success: true,
        message: "Account activated".to_string(),
    }))
}

/// Delete an account and cascade-remove its domain data
async fn delete_account(
    State(ctx): State<AppContext>,
    operator: OperatorContext,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.accounts.delete_account(&id).await?;

    tracing::info!(operator = %operator.account.id, account_id = %id, "account deleted by operator");

    Ok(Json(MessageResponse {
        success: true,
        message: "User deleted successfully".to_string(),
    }))
}
