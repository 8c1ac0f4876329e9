//! imgdeck - directory-backed image and video viewer
//!
//! Usage: `imgdeck [DIR | FILE]` (defaults to the current directory)

mod app;
mod console;

use anyhow::Result;
use std::path::PathBuf;

fn main() -> Result<()> {
    // Initialize logging and panic hook first
    let _log_guard = app_log::init()?;

    // Clean up old logs (7 days)
    if let Err(e) = app_log::cleanup_old_logs(7) {
        tracing::warn!("Failed to cleanup old logs: {}", e);
    }

    tracing::info!("imgdeck starting...");

    let config = app_core::AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Invalid configuration, using defaults: {}", e);
        app_core::AppConfig::default()
    });

    let target = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let target = target.canonicalize().unwrap_or(target);

    app::run(config, target)
}
