/// Configuration management for the Casement backend
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub subscription: SubscriptionConfig,
    pub email: Option<EmailConfig>,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub account_db: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Bearer token lifetime in days
    pub token_ttl_days: i64,
    /// Hours after which a bound device is considered stale at login
    pub device_stale_hours: i64,
    /// Emails allowed to use the operator endpoints (lowercased at load).
    /// The stored role flag is derived from this list, never the reverse.
    pub operator_emails: Vec<String>,
}

/// Subscription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Trial window granted at registration, in days
    pub trial_days: i64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    /// Per-second quota for endpoints that send an email
    pub otp_rps: u32,
    pub unauthenticated_rps: u32,
    pub authenticated_rps: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("CASEMENT_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("CASEMENT_PORT")
            .unwrap_or_else(|_| "5080".to_string())
            .parse()
            .map_err(|_| ApiError::Validation("Invalid port number".to_string()))?;
        let version = env::var("CASEMENT_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("CASEMENT_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let account_db = env::var("CASEMENT_ACCOUNT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("account.sqlite"));

        let jwt_secret = env::var("CASEMENT_JWT_SECRET")
            .map_err(|_| ApiError::Validation("JWT secret required".to_string()))?;
        let token_ttl_days = env::var("CASEMENT_TOKEN_TTL_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .unwrap_or(7);
        let device_stale_hours = env::var("CASEMENT_DEVICE_STALE_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::session::STALE_SESSION_HOURS);

        // Operator identities are provisioned out-of-band; no in-band action
        // can add to this list.
        let operator_emails = env::var("CASEMENT_OPERATOR_EMAILS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let trial_days = env::var("CASEMENT_TRIAL_DAYS")
            .unwrap_or_else(|_| "14".to_string())
            .parse()
            .unwrap_or(14);

        let email = if let Ok(smtp_url) = env::var("CASEMENT_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("CASEMENT_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let rate_limit_enabled = env::var("CASEMENT_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let otp_rps = env::var("CASEMENT_RATE_LIMIT_OTP_RPS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .unwrap_or(2);
        let unauthenticated_rps = env::var("CASEMENT_RATE_LIMIT_UNAUTH_RPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let authenticated_rps = env::var("CASEMENT_RATE_LIMIT_AUTH_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                account_db,
            },
            authentication: AuthConfig {
                jwt_secret,
                token_ttl_days,
                device_stale_hours,
                operator_emails,
            },
            subscription: SubscriptionConfig { trial_days },
            email,
            rate_limit: RateLimitSettings {
                enabled: rate_limit_enabled,
                otp_rps,
                unauthenticated_rps,
                authenticated_rps,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ApiError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.token_ttl_days <= 0 {
            return Err(ApiError::Validation(
                "Token TTL must be positive".to_string(),
            ));
        }

        for email in &self.authentication.operator_emails {
            if !email.contains('@') {
                return Err(ApiError::Validation(format!(
                    "Invalid operator email: {}",
                    email
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 5080,
            version: "0.1.0".to_string(),
        },
        storage: StorageConfig {
            data_directory: PathBuf::from("./data"),
            account_db: PathBuf::from(":memory:"),
        },
        authentication: AuthConfig {
            jwt_secret: "test-secret-key-for-testing-only-0123456789".to_string(),
            token_ttl_days: 7,
            device_stale_hours: crate::session::STALE_SESSION_HOURS,
            operator_emails: vec!["ops@example.com".to_string()],
        },
        subscription: SubscriptionConfig { trial_days: 14 },
        email: None,
        rate_limit: RateLimitSettings {
            enabled: true,
            otp_rps: 2,
            unauthenticated_rps: 10,
            authenticated_rps: 100,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_short_jwt_secret() {
        let mut config = test_config();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_operator_email() {
        let mut config = test_config();
        config.authentication.operator_emails = vec!["not-an-email".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }
}
