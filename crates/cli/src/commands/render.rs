use std::fs;
use std::path::Path;

use ganttbot_core::config::{AppConfig, LoadOptions};
use ganttbot_core::{ChartService, RawTaskRow, Task};
use serde::Serialize;

use super::{CommandName, CommandResult, Failure};

const COMMAND: CommandName = CommandName::Render;

#[derive(Debug, Serialize)]
struct RenderSummary<'a> {
    output: &'a Path,
    width_px: u32,
    height_px: u32,
    task_count: usize,
    skipped_rows: usize,
    first_day: Option<String>,
    last_day: Option<String>,
}

/// Offline render: rows file in, PNG out. Rows that fail validation are
/// skipped and counted, the same way list rows are.
pub fn run(input: &Path, output: &Path) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failed(COMMAND, Failure::ConfigValidation, error.to_string()),
    };

    let rows = match read_rows(input) {
        Ok(rows) => rows,
        Err(message) => return CommandResult::failed(COMMAND, Failure::Input, message),
    };

    let total = rows.len();
    let tasks: Vec<Task> = rows.into_iter().filter_map(|row| Task::from_raw(row).ok()).collect();
    let skipped = total - tasks.len();

    let chart = match ChartService::new(config.chart).render(&tasks) {
        Ok(chart) => chart,
        Err(error) => return CommandResult::failed(COMMAND, Failure::Render, error.to_string()),
    };

    if let Err(error) = fs::write(output, &chart.png) {
        return CommandResult::failed(
            COMMAND,
            Failure::Output,
            format!("could not write `{}`: {error}", output.display()),
        );
    }

    let summary = RenderSummary {
        output,
        width_px: chart.width_px,
        height_px: chart.height_px,
        task_count: chart.task_count,
        skipped_rows: skipped,
        first_day: chart.axis.map(|axis| axis.start.to_string()),
        last_day: chart.axis.map(|axis| axis.end.to_string()),
    };
    let span = match (&summary.first_day, &summary.last_day) {
        (Some(first), Some(last)) => format!("{first} to {last}"),
        _ => "no dated tasks".to_string(),
    };
    let message = format!(
        "wrote {} ({}x{}px): {} task(s), {} row(s) skipped, {}",
        output.display(),
        summary.width_px,
        summary.height_px,
        summary.task_count,
        summary.skipped_rows,
        span
    );
    CommandResult::completed(COMMAND, message, summary)
}

fn read_rows(input: &Path) -> Result<Vec<RawTaskRow>, String> {
    let raw = fs::read_to_string(input)
        .map_err(|error| format!("could not read `{}`: {error}", input.display()))?;
    serde_json::from_str(&raw)
        .map_err(|error| format!("`{}` is not a JSON array of rows: {error}", input.display()))
}
