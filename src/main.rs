//! Tic-Tac-Toe Game Server
//!
//! Binary entry point: configures logging, builds the HTTP collaborators
//! and runs the WebSocket server until it stops.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tictactoe_server::network::{GameServer, HttpAuthenticator, HttpGameArchive, ServerConfig};
use tictactoe_server::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::from_env();

    info!("Tic-Tac-Toe Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!("Max concurrent games: {}", config.max_games);
    info!(
        "Heartbeat: timeout {:?}, sweep every {:?}",
        config.heartbeat_timeout, config.heartbeat_sweep_interval
    );
    info!("Auth service: {}", config.verify_session_url);
    info!("History service: {}", config.save_game_url);

    let auth = Arc::new(HttpAuthenticator::new(
        config.verify_session_url.clone(),
        config.get_username_url.clone(),
    ));
    let archive = Arc::new(HttpGameArchive::new(config.save_game_url.clone()));

    let server = Arc::new(GameServer::new(config, auth, archive));
    server.run().await?;

    Ok(())
}
