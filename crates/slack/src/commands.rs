use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{self, MessageTemplate};

pub const GANTT_COMMAND: &str = "/gantt";

/// Form fields Slack posts for a slash command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub command: GanttCommand,
    pub raw_text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GanttCommand {
    /// Refresh from the given list, or the configured one.
    Refresh { list_id: Option<String> },
    Help,
    Unknown { text: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

pub fn normalize_gantt_command(
    payload: SlashCommandPayload,
) -> Result<CommandEnvelope, CommandParseError> {
    if payload.command != GANTT_COMMAND {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let raw_text = payload.text.trim().to_owned();
    Ok(CommandEnvelope {
        command: parse_gantt_command(&raw_text),
        raw_text,
        channel_id: payload.channel_id,
        user_id: payload.user_id,
        trigger_id: payload.trigger_id,
        request_id: payload.request_id,
    })
}

/// `""` refreshes the configured list, `help` prints usage, a single list id
/// (optionally after `refresh`) refreshes that list.
pub fn parse_gantt_command(input: &str) -> GanttCommand {
    let mut parts = input.split_whitespace();
    let Some(first) = parts.next() else {
        return GanttCommand::Refresh { list_id: None };
    };
    let rest: Vec<&str> = parts.collect();

    match first.to_ascii_lowercase().as_str() {
        "help" | "-h" | "--help" | "?" => GanttCommand::Help,
        "refresh" | "update" => match rest.as_slice() {
            [] => GanttCommand::Refresh { list_id: None },
            [id] if is_list_id(id) => GanttCommand::Refresh { list_id: Some((*id).to_owned()) },
            _ => GanttCommand::Unknown { text: input.trim().to_owned() },
        },
        _ if rest.is_empty() && is_list_id(first) => {
            GanttCommand::Refresh { list_id: Some(first.to_owned()) }
        }
        _ => GanttCommand::Unknown { text: input.trim().to_owned() },
    }
}

fn is_list_id(token: &str) -> bool {
    token.len() >= 2
        && token.chars().all(|ch| ch.is_ascii_alphanumeric())
        && token.chars().any(|ch| ch.is_ascii_digit())
        && token.chars().next().is_some_and(|ch| ch.is_ascii_uppercase())
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: GanttCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        match &envelope.command {
            GanttCommand::Refresh { list_id } => {
                self.service.refresh(list_id.clone(), &envelope).await
            }
            GanttCommand::Help => Ok(blocks::help_message()),
            GanttCommand::Unknown { text } => Ok(blocks::error_message(
                &format!("Unsupported command `/gantt {text}`. Try `/gantt help`."),
                &envelope.request_id,
            )),
        }
    }
}

#[async_trait]
pub trait GanttCommandService: Send + Sync {
    async fn refresh(
        &self,
        list_id: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;
}
