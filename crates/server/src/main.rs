mod bootstrap;
mod export;
mod health;
mod http;
mod poller;
#[cfg(test)]
mod test_support;

use std::time::Duration;

use anyhow::Result;
use ganttbot_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use ganttbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.effective_level().parse::<Level>().unwrap_or(Level::INFO);

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
    // Logging comes from the same config the application is built from
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    let poll_minutes = app.config.schedule.poll_interval_minutes;
    let poller = (poll_minutes > 0).then(|| {
        poller::spawn(app.pipeline.clone(), Duration::from_secs(poll_minutes * 60))
    });

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        poll_interval_minutes = poll_minutes,
        "ganttbot-server listening"
    );

    axum::serve(listener, http::router(http::AppState::new(&app)))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    if let Some(poller) = poller {
        poller.abort();
    }
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "ganttbot-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
    }
}
