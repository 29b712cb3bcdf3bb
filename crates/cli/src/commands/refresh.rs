use std::sync::Arc;

use ganttbot_core::config::{AppConfig, LoadOptions};
use ganttbot_slack::canvas::SectionUpdate;
use ganttbot_slack::{GanttPipeline, HttpSlackApi, RunRequest, Trigger};
use serde::Serialize;

use super::{CommandName, CommandResult, Failure};

const COMMAND: CommandName = CommandName::Refresh;

#[derive(Debug, Serialize)]
struct RefreshSummary {
    list_id: String,
    task_count: usize,
    file_id: String,
    permalink: String,
    /// Present when an existing chart section was replaced in place.
    replaced_section_id: Option<String>,
    correlation_id: String,
}

/// Runs the pipeline once against live Slack. Skips the debounce, which only
/// guards concurrent triggers inside the server.
pub fn run(list_id: Option<String>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failed(COMMAND, Failure::ConfigValidation, error.to_string()),
    };
    if let Err(error) = config.validate_runtime() {
        return CommandResult::failed(COMMAND, Failure::ConfigValidation, error.to_string());
    }

    let api = match HttpSlackApi::new(&config.slack) {
        Ok(api) => api,
        Err(error) => return CommandResult::failed(COMMAND, Failure::SlackClient, error.to_string()),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failed(
                COMMAND,
                Failure::Runtime,
                format!("failed to initialize async runtime: {error}"),
            )
        }
    };

    let pipeline = GanttPipeline::new(Arc::new(api), &config);
    let request = RunRequest::new(Trigger::Manual).with_list_id(list_id);

    match runtime.block_on(pipeline.run(&request)) {
        Ok(outcome) => {
            let (section, replaced_section_id) = match outcome.receipt.section {
                SectionUpdate::Replaced { section_id } => {
                    (format!("replaced section {section_id}"), Some(section_id))
                }
                SectionUpdate::Appended => ("appended a new section".to_string(), None),
            };
            let message = format!(
                "list {}: {} task(s) charted, {section} ({}) [correlation_id={}]",
                outcome.list_id, outcome.task_count, outcome.receipt.permalink, outcome.correlation_id
            );
            let summary = RefreshSummary {
                list_id: outcome.list_id,
                task_count: outcome.task_count,
                file_id: outcome.receipt.file_id,
                permalink: outcome.receipt.permalink,
                replaced_section_id,
                correlation_id: outcome.correlation_id,
            };
            CommandResult::completed(COMMAND, message, summary)
        }
        Err(error) => CommandResult::failed(
            COMMAND,
            Failure::Pipeline(error.stage()),
            format!("{error} [correlation_id={}]", request.correlation_id),
        ),
    }
}
