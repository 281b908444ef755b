/// Account manager: the orchestrator for the registration ->
/// verification -> login -> active-session lifecycle.
///
/// Uses sqlx runtime query building instead of compile-time macros to
/// avoid needing DATABASE_URL during compilation. Every state
/// transition is a single UPDATE so an account is always observed
/// either fully before or fully after a transition. Device-binding
/// writes are guarded on `session_version` so concurrent logins produce
/// exactly one winner.

use crate::{
    account::{ProvisionAccountRequest, RegisterRequest},
    config::ServerConfig,
    db::account::{Account, AuthState, Role, SubscriptionStatus},
    domain::DomainStore,
    error::{ApiError, ApiResult},
    mailer::Mailer,
    otp::{OtpEngine, OtpError, OtpPurpose, OTP_TTL_MINUTES},
    session::{self, Admission},
    token::TokenIssuer,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, full_name, company_name, phone, \
     email_verified, verification_otp, verification_otp_expires_at, \
     login_otp, login_otp_expires_at, device_id, device_label, last_login_at, \
     session_version, subscription_status, subscription_started_at, subscription_ends_at, \
     role, is_active, created_at, updated_at";

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    mailer: Arc<Mailer>,
    tokens: Arc<TokenIssuer>,
    domain: Arc<dyn DomainStore>,
}

fn map_otp_error(e: OtpError) -> ApiError {
    match e {
        OtpError::NotPending | OtpError::Mismatch => ApiError::InvalidOtp,
        OtpError::Expired => ApiError::OtpExpired,
    }
}

/// One-way password hashing (Argon2id). Plaintext is never stored or
/// read back.
fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(
        db: SqlitePool,
        config: Arc<ServerConfig>,
        mailer: Arc<Mailer>,
        tokens: Arc<TokenIssuer>,
        domain: Arc<dyn DomainStore>,
    ) -> Self {
        Self {
            db,
            config,
            mailer,
            tokens,
            domain,
        }
    }

    /// Register a new account. Returns the account and whether the
    /// verification code was delivered.
    pub async fn register(&self, req: RegisterRequest) -> ApiResult<(Account, bool)> {
        let email = req.email.trim().to_lowercase();

        if self.email_exists(&email).await? {
            return Err(ApiError::Conflict(
                "User already exists with this email".to_string(),
            ));
        }

        let password_hash = hash_password(&req.password)?;

        let now = Utc::now();
        let code = OtpEngine::generate();
        let code_expires_at = now + Duration::minutes(OTP_TTL_MINUTES);
        let trial_ends_at = now + Duration::days(self.config.subscription.trial_days);
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO account (id, email, password_hash, full_name, company_name, phone, \
             email_verified, verification_otp, verification_otp_expires_at, \
             session_version, subscription_status, subscription_started_at, subscription_ends_at, \
             role, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )
        .bind(&id)
        .bind(&email)
        .bind(&password_hash)
        .bind(req.full_name.trim())
        .bind(&req.company_name)
        .bind(&req.phone)
        .bind(false)
        .bind(&code)
        .bind(code_expires_at)
        .bind(0i64)
        .bind(SubscriptionStatus::Trial)
        .bind(now)
        .bind(trial_ends_at)
        .bind(Role::User)
        .bind(true)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        tracing::info!(account_id = %id, "account registered, verification pending");

        // The code is already persisted; a failed send is recoverable
        // through resend and must not abort registration.
        let delivered = self.deliver_otp(&email, &code, OtpPurpose::Verification).await;

        let account = self.get_account(&id).await?;
        Ok((account, delivered))
    }

    /// Verify an email address with a pending verification code
    pub async fn verify_email(&self, email: &str, otp: &str) -> ApiResult<()> {
        let account = self.get_account_by_email(email).await?;

        if account.email_verified {
            return Err(ApiError::AlreadyVerified);
        }

        OtpEngine::validate(account.pending_verification().as_ref(), otp, Utc::now())
            .map_err(map_otp_error)?;

        // Flag flip and slot clear in one statement
        sqlx::query(
            "UPDATE account SET email_verified = 1, verification_otp = NULL, \
             verification_otp_expires_at = NULL, updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(&account.id)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        tracing::info!(account_id = %account.id, "email verified");

        Ok(())
    }

    /// Re-issue a verification code, overwriting any pending one
    pub async fn resend_verification(&self, email: &str) -> ApiResult<bool> {
        let account = self.get_account_by_email(email).await?;

        if account.email_verified {
            return Err(ApiError::AlreadyVerified);
        }

        self.issue_otp(&account, OtpPurpose::Verification).await
    }

    /// Issue a login code for a verified account
    pub async fn request_login_otp(&self, email: &str) -> ApiResult<bool> {
        let account = self.get_account_by_email(email).await?;

        if matches!(account.auth_state(), AuthState::Unverified) {
            return Err(ApiError::EmailNotVerified);
        }

        self.issue_otp(&account, OtpPurpose::Login).await
    }

    /// Login with a pending login code, binding the presented device.
    ///
    /// On `DeviceConflict` the code is left pending so the user can
    /// retry the same code after freeing the other device.
    pub async fn login(
        &self,
        email: &str,
        otp: &str,
        device_id: &str,
        device_label: &str,
    ) -> ApiResult<(String, Account)> {
        let account = self.get_account_by_email(email).await?;

        if matches!(account.auth_state(), AuthState::Unverified) {
            return Err(ApiError::EmailNotVerified);
        }

        let now = Utc::now();

        OtpEngine::validate(account.pending_login().as_ref(), otp, now).map_err(map_otp_error)?;

        session::admit_login(
            &account,
            device_id,
            self.config.authentication.device_stale_hours,
            now,
        )?;

        // Side transition: a lapsed trial flips to expired as part of
        // the same write.
        let status = if account.subscription_ends_at < now
            && account.subscription_status == SubscriptionStatus::Trial
        {
            SubscriptionStatus::Expired
        } else {
            account.subscription_status
        };

        // Guarded commit: if another login for this account landed
        // between our read and this write, zero rows match and the
        // conflict is surfaced instead of silently overwriting.
        let result = sqlx::query(
            "UPDATE account SET device_id = ?1, device_label = ?2, last_login_at = ?3, \
             login_otp = NULL, login_otp_expires_at = NULL, subscription_status = ?4, \
             session_version = session_version + 1, updated_at = ?3 \
             WHERE id = ?5 AND session_version = ?6",
        )
        .bind(device_id)
        .bind(device_label)
        .bind(now)
        .bind(status)
        .bind(&account.id)
        .bind(account.session_version)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        if result.rows_affected() == 0 {
            tracing::warn!(account_id = %account.id, "login lost device-binding race");
            return Err(ApiError::DeviceConflict);
        }

        let account = self.get_account(&account.id).await?;
        let token = self.tokens.issue(&account.id)?;

        tracing::info!(account_id = %account.id, device_id, "login successful");

        Ok((token, account))
    }

    /// Standing per-request device check. Binds when no device is
    /// bound, refreshes the timestamp on a match, rejects a mismatch
    /// outright (no staleness escape outside login).
    pub async fn check_device(
        &self,
        account_id: &str,
        device_id: &str,
        device_label: &str,
    ) -> ApiResult<Account> {
        let account = self.get_account(account_id).await?;

        match session::admit_request(&account, device_id)? {
            Admission::Refresh => {
                sqlx::query(
                    "UPDATE account SET last_login_at = ?1, updated_at = ?1 \
                     WHERE id = ?2 AND device_id = ?3",
                )
                .bind(Utc::now())
                .bind(account_id)
                .bind(device_id)
                .execute(&self.db)
                .await
                .map_err(ApiError::Database)?;
            }
            Admission::Bind | Admission::Rebind => {
                let result = sqlx::query(
                    "UPDATE account SET device_id = ?1, device_label = ?2, last_login_at = ?3, \
                     session_version = session_version + 1, updated_at = ?3 \
                     WHERE id = ?4 AND session_version = ?5",
                )
                .bind(device_id)
                .bind(device_label)
                .bind(Utc::now())
                .bind(account_id)
                .bind(account.session_version)
                .execute(&self.db)
                .await
                .map_err(ApiError::Database)?;

                if result.rows_affected() == 0 {
                    return Err(ApiError::DeviceConflict);
                }
            }
        }

        self.get_account(account_id).await
    }

    /// Clear the device binding unconditionally
    pub async fn clear_device(&self, account_id: &str) -> ApiResult<()> {
        let result = sqlx::query(
            "UPDATE account SET device_id = NULL, device_label = NULL, last_login_at = NULL, \
             session_version = session_version + 1, updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("User not found".to_string()));
        }

        tracing::info!(account_id, "device session cleared");

        Ok(())
    }

    /// Password-less recovery: a valid login code clears the device
    /// binding without minting a token. The code stays pending so the
    /// user can complete a fresh login with it.
    pub async fn force_logout(&self, email: &str, otp: &str) -> ApiResult<()> {
        let account = self.get_account_by_email(email).await?;

        OtpEngine::validate(account.pending_login().as_ref(), otp, Utc::now())
            .map_err(map_otp_error)?;

        self.clear_device(&account.id).await
    }

    /// Provision a pre-verified account (operator only). Provisioned
    /// accounts start with an active one-year subscription.
    pub async fn provision_account(&self, req: ProvisionAccountRequest) -> ApiResult<Account> {
        let email = req.email.trim().to_lowercase();

        if self.email_exists(&email).await? {
            return Err(ApiError::Conflict(
                "User already exists with this email".to_string(),
            ));
        }

        let password_hash = hash_password(&req.password)?;
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO account (id, email, password_hash, full_name, \
             email_verified, session_version, subscription_status, \
             subscription_started_at, subscription_ends_at, role, is_active, \
             created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(&id)
        .bind(&email)
        .bind(&password_hash)
        .bind(req.full_name.trim())
        .bind(true)
        .bind(0i64)
        .bind(SubscriptionStatus::Active)
        .bind(now)
        .bind(now + Duration::days(365))
        .bind(req.role.unwrap_or(Role::User))
        .bind(true)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        tracing::info!(account_id = %id, "account provisioned");

        self.get_account(&id).await
    }

    /// Activate or deactivate an account
    pub async fn set_active(&self, account_id: &str, active: bool) -> ApiResult<()> {
        let result = sqlx::query("UPDATE account SET is_active = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(active)
            .bind(Utc::now())
            .bind(account_id)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("User not found".to_string()));
        }

        tracing::info!(account_id, active, "account active flag updated");

        Ok(())
    }

    /// Delete an account, cascading to the domain store first
    pub async fn delete_account(&self, account_id: &str) -> ApiResult<()> {
        let account = self.get_account(account_id).await?;

        let purged = self.domain.purge_account_data(&account.id).await?;
        tracing::info!(account_id = %account.id, purged, "purged domain records");

        sqlx::query("DELETE FROM account WHERE id = ?1")
            .bind(&account.id)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        tracing::info!(account_id = %account.id, "account deleted");

        Ok(())
    }

    /// Sync the stored role flag to the configured operator list. The
    /// flag is a derived cache; the allow-list is the source of truth.
    pub async fn sync_operator_role(&self, account: &Account) -> ApiResult<()> {
        if account.role != Role::Admin {
            sqlx::query("UPDATE account SET role = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(Role::Admin)
                .bind(Utc::now())
                .bind(&account.id)
                .execute(&self.db)
                .await
                .map_err(ApiError::Database)?;
        }

        Ok(())
    }

    /// Get account by id
    pub async fn get_account(&self, account_id: &str) -> ApiResult<Account> {
        let query = format!("SELECT {} FROM account WHERE id = ?1", ACCOUNT_COLUMNS);

        sqlx::query_as::<_, Account>(&query)
            .bind(account_id)
            .fetch_optional(&self.db)
            .await
            .map_err(ApiError::Database)?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// Get account by email (case-insensitive)
    pub async fn get_account_by_email(&self, email: &str) -> ApiResult<Account> {
        let query = format!("SELECT {} FROM account WHERE email = ?1", ACCOUNT_COLUMNS);

        sqlx::query_as::<_, Account>(&query)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.db)
            .await
            .map_err(ApiError::Database)?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// List accounts ordered by id for cursor pagination
    pub async fn list_accounts(
        &self,
        cursor: Option<&str>,
        limit: i64,
    ) -> ApiResult<Vec<Account>> {
        let accounts = if let Some(cursor_id) = cursor {
            let query = format!(
                "SELECT {} FROM account WHERE id > ?1 ORDER BY id LIMIT ?2",
                ACCOUNT_COLUMNS
            );
            sqlx::query_as::<_, Account>(&query)
                .bind(cursor_id)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
        } else {
            let query = format!("SELECT {} FROM account ORDER BY id LIMIT ?1", ACCOUNT_COLUMNS);
            sqlx::query_as::<_, Account>(&query)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
        };

        Ok(accounts)
    }

    /// Clear expired OTP slots, both halves of each pair together.
    /// Returns (verification_cleared, login_cleared).
    pub async fn cleanup_expired_otps(&self) -> ApiResult<(u64, u64)> {
        let now = Utc::now();

        let verification = sqlx::query(
            "UPDATE account SET verification_otp = NULL, verification_otp_expires_at = NULL, \
             updated_at = ?1 WHERE verification_otp_expires_at < ?1",
        )
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?
        .rows_affected();

        let login = sqlx::query(
            "UPDATE account SET login_otp = NULL, login_otp_expires_at = NULL, \
             updated_at = ?1 WHERE login_otp_expires_at < ?1",
        )
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?
        .rows_affected();

        Ok((verification, login))
    }

    /// Flip lapsed trials to expired
    pub async fn expire_lapsed_trials(&self) -> ApiResult<u64> {
        let result = sqlx::query(
            "UPDATE account SET subscription_status = 'expired', updated_at = ?1 \
             WHERE subscription_status = 'trial' AND subscription_ends_at < ?1",
        )
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        Ok(result.rows_affected())
    }

    /// Check if email exists (case-insensitive)
    async fn email_exists(&self, email: &str) -> ApiResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(count > 0)
    }

    /// Persist a fresh code on the slot for `purpose`, then attempt
    /// delivery. The returned flag reports delivery only; the code is
    /// valid either way.
    async fn issue_otp(&self, account: &Account, purpose: OtpPurpose) -> ApiResult<bool> {
        let code = OtpEngine::generate();
        let now = Utc::now();
        let expires_at = now + Duration::minutes(OTP_TTL_MINUTES);

        let sql = match purpose {
            OtpPurpose::Verification => {
                "UPDATE account SET verification_otp = ?1, verification_otp_expires_at = ?2, \
                 updated_at = ?3 WHERE id = ?4"
            }
            OtpPurpose::Login => {
                "UPDATE account SET login_otp = ?1, login_otp_expires_at = ?2, \
                 updated_at = ?3 WHERE id = ?4"
            }
        };

        sqlx::query(sql)
            .bind(&code)
            .bind(expires_at)
            .bind(now)
            .bind(&account.id)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(self.deliver_otp(&account.email, &code, purpose).await)
    }

    async fn deliver_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> bool {
        match self.mailer.send_otp(email, code, purpose).await {
            Ok(()) => self.mailer.is_configured(),
            Err(e) => {
                tracing::warn!(
                    "Failed to deliver {} OTP to {}: {}",
                    purpose.as_str(),
                    email,
                    e
                );
                false
            }
        }
    }
}
