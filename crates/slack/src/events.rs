use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::{
    blocks::MessageTemplate,
    commands::{
        normalize_gantt_command, CommandParseError, CommandRouteError, CommandRouter,
        GanttCommandService, SlashCommandPayload,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    UrlVerification { challenge: String },
    AppHomeOpened(AppHomeOpenedEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::UrlVerification { .. } => SlackEventType::UrlVerification,
            Self::AppHomeOpened(_) => SlackEventType::AppHomeOpened,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    UrlVerification,
    AppHomeOpened,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppHomeOpenedEvent {
    pub user_id: String,
    pub tab: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("event payload has no `type`")]
    MissingType,
    #[error("url_verification payload has no challenge")]
    MissingChallenge,
}

/// Reads a JSON body posted to the Events API endpoint.
pub fn parse_event_payload(body: &Value) -> Result<SlackEnvelope, EventParseError> {
    let kind = body.get("type").and_then(Value::as_str).ok_or(EventParseError::MissingType)?;
    let envelope_id = body.get("event_id").and_then(Value::as_str).unwrap_or_default().to_owned();

    let event = match kind {
        "url_verification" => {
            let challenge = body
                .get("challenge")
                .and_then(Value::as_str)
                .ok_or(EventParseError::MissingChallenge)?;
            SlackEvent::UrlVerification { challenge: challenge.to_owned() }
        }
        "event_callback" => {
            let inner = body.get("event").cloned().unwrap_or(Value::Null);
            let inner_type = inner.get("type").and_then(Value::as_str).unwrap_or_default();
            match inner_type {
                "app_home_opened" => SlackEvent::AppHomeOpened(AppHomeOpenedEvent {
                    user_id: inner
                        .get("user")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    tab: inner.get("tab").and_then(Value::as_str).map(str::to_owned),
                }),
                other => SlackEvent::Unsupported { event_type: other.to_owned() },
            }
        }
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    };

    Ok(SlackEnvelope { envelope_id, event })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Challenge(String),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Slash command, url verification and App Home handlers.
pub fn gantt_dispatcher<S>(service: S) -> EventDispatcher
where
    S: GanttCommandService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(service));
    dispatcher.register(UrlVerificationHandler);
    dispatcher.register(AppHomeOpenedHandler);
    dispatcher
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: GanttCommandService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: GanttCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let normalized = normalize_gantt_command(payload.clone())?;
        let message = self.router.route(normalized).await?;
        Ok(HandlerResult::Responded(message))
    }
}

pub struct UrlVerificationHandler;

#[async_trait]
impl EventHandler for UrlVerificationHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::UrlVerification
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        match &envelope.event {
            SlackEvent::UrlVerification { challenge } => {
                Ok(HandlerResult::Challenge(challenge.clone()))
            }
            _ => Ok(HandlerResult::Ignored),
        }
    }
}

/// App Home visits are only logged.
pub struct AppHomeOpenedHandler;

#[async_trait]
impl EventHandler for AppHomeOpenedHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppHomeOpened
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppHomeOpened(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        info!(
            event_name = "slack.app_home.opened",
            correlation_id = %ctx.correlation_id,
            user_id = %event.user_id,
            tab = event.tab.as_deref().unwrap_or("home"),
            "app home opened"
        );
        Ok(HandlerResult::Processed)
    }
}
