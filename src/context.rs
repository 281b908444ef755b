/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    db,
    domain::{DetachedDomainStore, DomainStore},
    error::{ApiError, ApiResult},
    mailer::Mailer,
    rate_limit::RateLimiter,
    token::TokenIssuer,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub tokens: Arc<TokenIssuer>,
    pub mailer: Arc<Mailer>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.account_db, db::DatabaseOptions::default())
            .await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let config = Arc::new(config);

        let tokens = Arc::new(TokenIssuer::new(
            config.authentication.jwt_secret.clone(),
            config.authentication.token_ttl_days,
        ));
        let mailer = Arc::new(Mailer::new(config.email.clone())?);
        // Domain CRUD is an external collaborator; nothing is wired here
        let domain: Arc<dyn DomainStore> = Arc::new(DetachedDomainStore);

        let accounts = Arc::new(AccountManager::new(
            db.clone(),
            Arc::clone(&config),
            Arc::clone(&mailer),
            Arc::clone(&tokens),
            domain,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config,
            db,
            accounts,
            tokens,
            mailer,
            rate_limiter,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> ApiResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ApiError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
