use anyhow::Context;
use api_rest::{AppState, router};
use approval_core::DocumentService;
use approval_core::config::{EnvValues, config_from_env_values};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the approval workflow server
///
/// Loads `.env`, resolves the core configuration once, seeds the org tree when
/// `APPROVAL_ORG_SEED` names a YAML file and the org directory is still empty, then serves the
/// REST API.
///
/// # Environment Variables
/// - `APPROVAL_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `APPROVAL_DATA_DIR`: Directory for documents, attachments and org data
///   (default: "approval_data")
/// - `APPROVAL_ORG_SEED`: Optional org seed file imported on first start
/// - `API_KEY`: API key for REST authentication
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("approval_run=info".parse()?)
                .add_directive("approval_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("APPROVAL_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let api_key = std::env::var("API_KEY").context("API_KEY not set in environment")?;
    let org_seed = std::env::var("APPROVAL_ORG_SEED").ok();

    let cfg = Arc::new(config_from_env_values(EnvValues::from_process())?);
    let service = DocumentService::new(cfg.clone())?;

    if let Some(seed) = org_seed.filter(|s| !s.trim().is_empty()) {
        if service.org().list_users()?.is_empty() {
            let text = std::fs::read_to_string(&seed)
                .with_context(|| format!("failed to read org seed {seed}"))?;
            let (users, departments) = service.org().import(&text)?;
            tracing::info!(users, departments, "seeded org tree from {}", seed);
        }
    }

    tracing::info!("++ Starting approval REST on {}", rest_addr);
    tracing::info!("++ Data directory {}", cfg.data_dir().display());

    let app = router(AppState::new(service, api_key));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
