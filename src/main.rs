/// Casement - subscription-gated backend for a window costing tool
///
/// OTP-based registration and login, single-active-device session
/// enforcement, and signed bearer tokens. Domain CRUD lives behind an
/// external collaborator boundary.

mod account;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod domain;
mod error;
mod jobs;
mod mailer;
mod otp;
mod rate_limit;
mod server;
mod session;
mod token;

use config::ServerConfig;
use context::AppContext;
use error::ApiResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ApiResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "casement=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}
