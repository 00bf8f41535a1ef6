use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vocalis::{ServerConfig, UnconfiguredProviders, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Optional `-c <file>` / `--config <file>` selects a YAML configuration
    let mut args = env::args().skip(1);
    let config = match args.next().as_deref() {
        None => ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?,
        Some("-c" | "--config") => {
            let path = args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("--config requires a file path"))?;
            ServerConfig::from_file(&path).map_err(|e| anyhow!(e.to_string()))?
        }
        Some(other) => anyhow::bail!("Unknown argument '{other}'. Usage: vocalis [--config <file>]"),
    };

    let address = config.address();
    let app_state = AppState::new(config, Arc::new(UnconfiguredProviders));
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&address).await?;
    info!("Server listening on {address}");

    axum::serve(listener, app).await?;

    Ok(())
}
