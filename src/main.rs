//! runewatch
//!
//! Watches the display for game windows and logs their focus, input and
//! geometry changes until interrupted.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runewatch::{Config, GameInstance, GameManager, InstanceEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "runewatch=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting runewatch");

    let config = Config::load().context("Failed to load configuration")?;

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    let _ = tx.send(()).await;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    let _ = tx.send(()).await;
                }
            }
        });
    }

    let mut manager = GameManager::connect(&config).context("Failed to start game manager")?;

    let mut watched = HashSet::new();
    let mut rescan = tokio::time::interval(config.game.rescan_interval());

    let result = loop {
        tokio::select! {
            _ = rescan.tick() => {
                if !manager.is_running() {
                    break Err(anyhow::anyhow!("Event worker exited unexpectedly"));
                }
                let instances = match manager.instances() {
                    Ok(instances) => instances,
                    Err(e) => break Err::<(), _>(e).context("Window discovery failed"),
                };
                for instance in instances {
                    if watched.insert(instance.window()) {
                        tokio::spawn(watch(instance));
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, cleaning up...");
                break Ok(());
            }
        }
    };

    match (manager.stop(), result) {
        (Err(e), Err(reason)) => Err(reason.context(e)),
        (Err(e), Ok(())) => {
            error!("Event worker stopped with error: {}", e);
            Ok(())
        }
        (Ok(()), result) => result,
    }
}

/// Log every notification for one game window
async fn watch(instance: Arc<GameInstance>) {
    let window = instance.window();
    info!("Watching game window {:#x}", window);

    let mut events = instance.subscribe();
    while let Some(event) = events.recv().await {
        match event {
            InstanceEvent::FocusChanged(focused) => {
                info!("Window {:#x} focus: {}", window, focused);
            }
            InstanceEvent::Input(input) => {
                debug!(
                    "Window {:#x} input detail={} at ({}, {})",
                    window, input.detail, input.event_x, input.event_y
                );
            }
            InstanceEvent::Configure(cfg) => {
                info!(
                    "Window {:#x} geometry {}x{}+{}+{}",
                    window, cfg.width, cfg.height, cfg.x, cfg.y
                );
            }
        }
    }
}
