use anyhow::Context;
use response_governor::api::{build_router, AppState};
use response_governor::telemetry::init_tracing;
use response_governor::{Config, Toolkit};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    init_tracing(&config.logging)?;

    let toolkit = Arc::new(Toolkit::new(&config));

    let sweeper = Arc::clone(&toolkit);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweeper.sweep();
        }
    });

    let app = build_router(AppState::new(toolkit), config.server.max_body_bytes);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Response governor listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
