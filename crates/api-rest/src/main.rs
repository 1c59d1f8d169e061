//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the approval REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `approval-run` binary serves the
//! same router after loading `.env`.

use anyhow::Context;
use api_rest::{router, AppState};
use approval_core::config::{config_from_env_values, EnvValues};
use approval_core::DocumentService;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the approval REST API server
///
/// # Environment Variables
/// - `APPROVAL_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `API_KEY`: Key every request must send as `x-api-key` (required)
/// - `APPROVAL_DATA_DIR`, `APPROVAL_TOP_AUTHORITY`, `APPROVAL_HEAD_SUFFIX`,
///   `APPROVAL_COMMIT_EMAIL_DOMAIN`, `BPB_APPROVE_REQUIRES_NOTE`,
///   `HELPDESK_APPROVE_REQUIRES_NOTE`: core configuration
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or `API_KEY` is missing,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("APPROVAL_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let api_key = std::env::var("API_KEY").context("API_KEY not set in environment")?;

    let cfg = Arc::new(config_from_env_values(EnvValues::from_process())?);
    tracing::info!(data_dir = %cfg.data_dir().display(), "-- Starting approval REST API on {}", addr);
    let service = DocumentService::new(cfg)?;

    let app = router(AppState::new(service, api_key));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
