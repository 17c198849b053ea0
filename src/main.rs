use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use casebook_core::{
    Casebook, CoreConfig,
    constants::{DEFAULT_DATA_DIR, DEFAULT_PUBLIC_BASE_URL},
    max_revision_requests_from_env_value,
};

/// Main entry point for the Casebook server
///
/// Resolves configuration from the environment once, opens the data directory and serves
/// the REST API with Swagger UI at `/swagger-ui`.
///
/// # Environment Variables
/// - `CASEBOOK_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CASEBOOK_DATA_DIR`: data directory (default: "casebook_data")
/// - `CASEBOOK_PUBLIC_URL`: base URL embedded in report QR codes
/// - `CASEBOOK_MAX_REVISION_REQUESTS`: optional cap on revision rounds per case
/// - `API_KEY`: shared secret clients send in `x-api-key` (required)
///
/// # Errors
/// Returns an error if configuration is invalid, the data directory cannot be opened, or
/// the server fails to bind or run.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("casebook=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CASEBOOK_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = std::env::var("CASEBOOK_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let public_url =
        std::env::var("CASEBOOK_PUBLIC_URL").unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.into());
    let max_revisions =
        max_revision_requests_from_env_value(std::env::var("CASEBOOK_MAX_REVISION_REQUESTS").ok())?;
    let api_key = std::env::var("API_KEY")
        .map_err(|_| anyhow::anyhow!("API_KEY must be set"))?;

    let cfg = Arc::new(CoreConfig::new(
        PathBuf::from(data_dir),
        public_url,
        max_revisions,
    )?);
    let casebook = Arc::new(Casebook::open(cfg.clone())?);

    tracing::info!(
        "++ Starting Casebook REST on {} (data in {})",
        rest_addr,
        cfg.data_dir().display()
    );

    let app = api_rest::router(AppState::new(casebook, api_key));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
