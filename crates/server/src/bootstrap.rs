use std::sync::Arc;

use ganttbot_core::config::{AppConfig, ConfigError};
use ganttbot_slack::{GanttPipeline, HttpSlackApi, SlackApi, SlackApiError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: Arc<AppConfig>,
    pub api: Arc<dyn SlackApi>,
    pub pipeline: Arc<GanttPipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack client setup failed: {0}")]
    SlackClient(#[source] SlackApiError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate_runtime()?;

    let api: Arc<dyn SlackApi> =
        Arc::new(HttpSlackApi::new(&config.slack).map_err(BootstrapError::SlackClient)?);
    let application = with_api(config, api);

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        list_id = application.config.targets.list_id.as_deref().unwrap_or("unset"),
        canvas_id = application.config.targets.canvas_id.as_deref().unwrap_or("unset"),
        poll_interval_minutes = application.config.schedule.poll_interval_minutes,
        "slack client and pipeline initialized"
    );
    Ok(application)
}

/// Wires the pipeline over any Slack API implementation.
pub fn with_api(config: AppConfig, api: Arc<dyn SlackApi>) -> Application {
    let pipeline = Arc::new(GanttPipeline::new(Arc::clone(&api), &config));
    Application { config: Arc::new(config), api, pipeline }
}

#[cfg(test)]
mod tests {
    use ganttbot_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use super::{bootstrap_with_config, Application, BootstrapError};

    fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?)
    }

    #[test]
    fn bootstrap_fails_fast_without_canvas() {
        let result = bootstrap(LoadOptions {
            config_path: Some("/nonexistent/ganttbot.toml".into()),
            overrides: ConfigOverrides {
                slack_bot_token: Some("xoxb-valid".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("error").to_string();
        assert!(message.contains("targets.canvas_id"));
    }

    #[test]
    fn bootstrap_rejects_malformed_bot_token() {
        let result = bootstrap(LoadOptions {
            config_path: Some("/nonexistent/ganttbot.toml".into()),
            overrides: ConfigOverrides {
                slack_bot_token: Some("invalid-token".to_string()),
                canvas_id: Some("F0CANVAS".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.bot_token"));
    }

    #[test]
    fn bootstrap_succeeds_with_token_and_canvas() {
        let app = bootstrap(LoadOptions {
            config_path: Some("/nonexistent/ganttbot.toml".into()),
            overrides: ConfigOverrides {
                slack_bot_token: Some("xoxb-test".to_string()),
                canvas_id: Some("F0CANVAS".to_string()),
                list_id: Some("F0LIST".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("bootstrap");

        assert_eq!(app.config.targets.list_id.as_deref(), Some("F0LIST"));
        assert_eq!(app.pipeline.chart_title(), app.config.chart.title);
    }
}
