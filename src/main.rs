//! Credential relay server binary.
//!
//! Serves the relay routes in front of the upstream auth backend.

use clap::Parser;
use scout_auth::relay::{RelayConfig, relay_routes};
use tracing::info;

/// CLI arguments for the relay server.
#[derive(Parser, Debug)]
#[command(name = "scout-relay", about = "Authentication relay for the scout front end")]
struct Args {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 = ephemeral).
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,scout_auth=debug")),
        )
        .init();

    let args = Args::parse();
    let config = RelayConfig::from_env()?;

    info!(
        backend = %config.upstream().base_url(),
        timeout_secs = config.upstream().timeout().as_secs(),
        auth_path = config.auth_path(),
        "configuring relay"
    );

    let app = relay_routes(config);

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!(addr = %listener.local_addr()?, "scout-relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("scout-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
