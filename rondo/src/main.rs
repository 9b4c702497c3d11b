use std::sync::Arc;

use anyhow::Context;
use rondoconfig::get_config;
use rondoplayer::Player;
use rondoslim::{SlimConfigExt, SlimPlayer, SlimServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ========== Phase 1 : configuration ==========
    let config = get_config();
    let http_port = config.get_http_port();

    // ========== Phase 2 : backend driver ==========
    let mut server = SlimServer::new(config.slim_host(), config.slim_port());
    if let Some(web_url) = config.slim_web_url() {
        server = server.with_web_url(web_url);
    }
    let server = Arc::new(server);

    info!(
        host = %config.slim_host(),
        port = config.slim_port(),
        "Connecting to backend..."
    );
    let player = SlimPlayer::connect(server, config.slim_player().as_deref())
        .await
        .context("failed to attach to a backend player")?;
    info!(player = %player, "Attached to backend player");

    // ========== Phase 3 : HTTP server ==========
    let shared: Arc<dyn Player> = player.clone();
    let router = rondoweb::router(shared);

    let addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "rondo is ready");
    info!("Press Ctrl+C to stop...");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("rondo stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
