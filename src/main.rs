//! Bomb Arena Game Server
//!
//! Loads configuration, sets up logging and serves until Ctrl-C.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bomb_arena::{GameServer, ServerConfig, MAX_ROOM_PLAYERS, TICK_MILLIS, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load().context("failed to load configuration")?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Bomb Arena Server v{}", VERSION);
    info!("Tick: {} ms, match: {} s", TICK_MILLIS, config.match_seconds);
    info!(
        "Rooms hold {} players (default {})",
        config.max_room_players, MAX_ROOM_PLAYERS
    );

    let server = GameServer::new(config);

    tokio::select! {
        result = server.run() => {
            result.context("server stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down");
            server.shutdown();
            server.registry().shutdown().await;
        }
    }

    Ok(())
}
