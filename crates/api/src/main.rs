//! Driver Monitor - Main Entry Point

use std::sync::Arc;

use anyhow::Context;
use api::{init_logging, install_metrics, run_server, AppConfig, AppState};
use camera_capture::SyntheticCamera;
use session::SessionController;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1);
    let config = AppConfig::load(path.as_deref())?;

    init_logging(&config.logging)?;
    let metrics = install_metrics()?;

    info!("=== Driver Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Analyzer endpoint {}, camera {} ({}x{})",
        config.session.link.endpoint,
        config.camera.device,
        config.camera.width,
        config.camera.height
    );

    let camera = Arc::new(SyntheticCamera::new(config.camera.clone()));
    let controller = SessionController::new(config.session.clone(), camera)
        .context("failed to create session controller")?;
    let state = Arc::new(AppState::new(controller, metrics));

    run_server(&config.server.addr(), state).await?;

    Ok(())
}
