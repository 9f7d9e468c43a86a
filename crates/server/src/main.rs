mod analytics;
mod bootstrap;
mod calendar;
mod guests;
mod health;
mod reminders_api;
mod rides;
mod scheduler;
mod state;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use curbside_core::config::{AppConfig, LoadOptions};

use crate::scheduler::ReminderScheduler;

fn init_logging(config: &AppConfig) {
    use curbside_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let scheduler = ReminderScheduler::start(
        Arc::new(app.state.reminder_engine()),
        Duration::from_secs(app.config.reminders.tick_interval_secs),
    );

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        sms_transport = app.sms_transport,
        "curbside-server started"
    );

    let router = bootstrap::build_router(app.state.clone());
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "curbside-server stopping");
    // No reminder tick starts after this returns; an in-flight sweep is
    // allowed to finish first.
    scheduler.stop().await;
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
