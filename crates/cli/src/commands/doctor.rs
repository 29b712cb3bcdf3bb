use ganttbot_core::config::{AppConfig, LoadOptions};
use ganttbot_core::ChartService;
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult::plain(exit_code, output)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_slack_runtime(&config));
            checks.push(check_list_target(&config));
            checks.push(check_chart_font(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["slack_runtime_readiness", "list_target", "chart_font"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    // Skipped checks are informational; only failures fail the report.
    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_slack_runtime(config: &AppConfig) -> DoctorCheck {
    match config.validate_runtime() {
        Ok(()) => DoctorCheck {
            name: "slack_runtime_readiness",
            status: CheckStatus::Pass,
            details: "bot token and canvas target are configured".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "slack_runtime_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_list_target(config: &AppConfig) -> DoctorCheck {
    match config.targets.list_id.as_deref() {
        Some(list_id) => DoctorCheck {
            name: "list_target",
            status: CheckStatus::Pass,
            details: format!("default list `{list_id}`"),
        },
        None => DoctorCheck {
            name: "list_target",
            status: CheckStatus::Skipped,
            details: "no default list; `/gantt <list_id>` must name one".to_string(),
        },
    }
}

fn check_chart_font(config: &AppConfig) -> DoctorCheck {
    let Some(font_path) = config.chart.font_path.as_ref() else {
        return DoctorCheck {
            name: "chart_font",
            status: CheckStatus::Skipped,
            details: "chart.font_path is unset; charts render without labels".to_string(),
        };
    };

    if ChartService::new(config.chart.clone()).has_font() {
        DoctorCheck {
            name: "chart_font",
            status: CheckStatus::Pass,
            details: format!("loaded `{}`", font_path.display()),
        }
    } else {
        DoctorCheck {
            name: "chart_font",
            status: CheckStatus::Fail,
            details: format!("could not load font `{}`", font_path.display()),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
