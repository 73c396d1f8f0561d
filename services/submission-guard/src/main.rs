// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Submission Guard Service
//!
//! Accepts the contact and reseller forms, enforces the origin allow-list
//! and submission ceilings, and relays each accepted submission as a
//! business notification plus an auto-reply.
//!
//! ## Configuration
//!
//! Read from the environment (an optional `.env` is loaded first):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `SMTP_HOST` / `SMTP_PORT`: relay (default: smtp.gmail.com:587)
//! - `SMTP_USER` / `SMTP_PASS` / `MAIL_TO`: required
//! - `ALLOWED_ORIGINS`: comma-separated allow-list (unset: any origin)
//! - `MAX_SUBMISSIONS_PER_HOUR` / `MAX_SUBMISSIONS_PER_DAY`: ceilings
//!   (both must be set for rate limiting to apply)
//! - `SUBMISSION_LOG`: log path (default: logs/submissions.log)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use submission_guard::{
    config::Config,
    guard::Guard,
    handlers::{router, AppState},
    mail::SmtpMailer,
    metrics::Metrics,
    store::FileStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        smtp_host = %config.mail.smtp_host,
        smtp_port = config.mail.smtp_port,
        max_per_hour = ?config.guard.max_per_hour,
        max_per_day = ?config.guard.max_per_day,
        origins = ?config.guard.allowed_origins,
        log_path = %config.guard.log_path.display(),
        "Starting submission guard"
    );
    if config.guard.ceilings().is_none() {
        warn!("Submission ceilings not configured, rate limiting disabled");
    }

    let store = Arc::new(FileStore::new(config.guard.log_path.clone()));
    let guard = Guard::new(config.guard.clone(), store);
    let mailer = Arc::new(SmtpMailer::new(&config.mail)?);

    let state = Arc::new(AppState {
        guard,
        mailer,
        metrics: Metrics::new()?,
        config: config.clone(),
    });

    // Spawn prune task
    let prune_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3_600));
        loop {
            interval.tick().await;
            match prune_state.guard.prune().await {
                Ok(removed) if removed > 0 => info!(removed, "Pruned expired submissions"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Submission log prune failed"),
            }
        }
    });

    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
