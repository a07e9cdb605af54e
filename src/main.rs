use std::env;
use std::path::PathBuf;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use anyhow::anyhow;

use acs_voice_agent::{ServerConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Handle CLI arguments
    let mut config_path: Option<PathBuf> = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            other => {
                anyhow::bail!("Unknown argument '{other}'. Usage: acs-voice-agent [--config <file>]");
            }
        }
    }

    // Load configuration
    let config = match &config_path {
        Some(path) => ServerConfig::from_file(path),
        None => ServerConfig::from_env(),
    }
    .map_err(|e| anyhow!(e.to_string()))?;
    let address = config.address();
    tracing::info!(
        address = %address,
        backend = %config.ai_backend,
        "Starting call automation service"
    );

    // Create application state
    let app_state = AppState::new(config)
        .await
        .map_err(|e| anyhow!("Failed to initialize application state: {e}"))?;

    let app = routes::create_app(app_state);

    // Create listener
    let listener = TcpListener::bind(&address).await?;

    tracing::info!(address = %address, "Server listening");

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
