pub mod config;
pub mod doctor;
pub mod refresh;
pub mod render;

use ganttbot_core::errors::PipelineStage;
use serde::Serialize;
use serde_json::{json, Value};

/// What a command printed and the process exit code it maps to.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Render,
    Refresh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Status {
    Ok,
    Error,
}

/// Why a chart command failed. Each class owns its exit code so scripts can
/// branch without parsing messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    ConfigValidation,
    /// The rows file could not be read or decoded.
    Input,
    SlackClient,
    Runtime,
    Render,
    /// The PNG could not be written.
    Output,
    /// A live run failed; the class is the stage that stopped it.
    Pipeline(PipelineStage),
}

impl Failure {
    pub fn class(self) -> &'static str {
        match self {
            Self::ConfigValidation => "config_validation",
            Self::Input => "input",
            Self::SlackClient => "slack_client",
            Self::Runtime => "runtime",
            Self::Render => "render",
            Self::Output => "output",
            Self::Pipeline(stage) => stage.as_str(),
        }
    }

    pub fn exit_code(self) -> u8 {
        match self {
            Self::ConfigValidation => 2,
            Self::Input | Self::SlackClient => 3,
            Self::Runtime | Self::Render => 4,
            Self::Output | Self::Pipeline(_) => 5,
        }
    }
}

#[derive(Debug, Serialize)]
struct Payload<T> {
    command: CommandName,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'static str>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<T>,
}

impl CommandResult {
    /// Plain output, for commands that print reports rather than a payload.
    pub fn plain(exit_code: u8, output: impl Into<String>) -> Self {
        Self { exit_code, output: output.into() }
    }

    pub fn completed<T: Serialize>(command: CommandName, message: impl Into<String>, details: T) -> Self {
        let payload = Payload {
            command,
            status: Status::Ok,
            error_class: None,
            message: message.into(),
            details: Some(details),
        };
        Self { exit_code: 0, output: to_json(&payload) }
    }

    pub fn failed(command: CommandName, failure: Failure, message: impl Into<String>) -> Self {
        let payload: Payload<Value> = Payload {
            command,
            status: Status::Error,
            error_class: Some(failure.class()),
            message: message.into(),
            details: None,
        };
        Self { exit_code: failure.exit_code(), output: to_json(&payload) }
    }
}

fn to_json<T: Serialize>(payload: &Payload<T>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        json!({
            "command": payload.command,
            "status": Status::Error,
            "error_class": "serialization",
            "message": error.to_string(),
        })
        .to_string()
    })
}
