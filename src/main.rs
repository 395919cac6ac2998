//! Gravity Garden server entry point
//!
//! Loads settings, binds the WebSocket listener and serves the shared puzzle
//! until Ctrl-C.

use gravity_garden::ServerSettings;
use gravity_garden::net::PuzzleServer;

#[tokio::main]
async fn main() -> gravity_garden::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Gravity Garden v{} starting...", env!("CARGO_PKG_VERSION"));

    let settings = ServerSettings::load()?;
    let server = PuzzleServer::bind(settings).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
