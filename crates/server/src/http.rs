//! HTTP surface: Slack slash commands and Events API, read-only exports and health.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use ganttbot_slack::blocks::{self, Block, MessageTemplate};
use ganttbot_slack::commands::SlashCommandPayload;
use ganttbot_slack::events::{
    gantt_dispatcher, parse_event_payload, EventContext, EventDispatcher, HandlerResult,
    SlackEnvelope, SlackEvent,
};
use ganttbot_slack::pipeline::PipelineCommandService;
use ganttbot_slack::responder::DeferredResponder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bootstrap::Application;
use crate::export::{chart_png, list_tasks, ExportState};
use crate::health::{health, HealthState};

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<EventDispatcher>,
    responder: Arc<DeferredResponder>,
    export: ExportState,
    health: HealthState,
}

impl AppState {
    pub fn new(application: &Application) -> Self {
        let service = PipelineCommandService::new(Arc::clone(&application.pipeline));
        Self {
            dispatcher: Arc::new(gantt_dispatcher(service)),
            responder: Arc::new(DeferredResponder::new(
                Arc::clone(&application.api),
                Duration::from_millis(application.config.schedule.response_window_ms),
            )),
            export: ExportState::new(application),
            health: HealthState::from_config(&application.config),
        }
    }
}

impl axum::extract::FromRef<AppState> for ExportState {
    fn from_ref(state: &AppState) -> Self {
        state.export.clone()
    }
}

impl axum::extract::FromRef<AppState> for HealthState {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/slack/commands", post(slash_command))
        .route("/slack/events", post(slack_event))
        .route("/api/tasks", get(list_tasks))
        .route("/api/chart.png", get(chart_png))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Clone, Debug, Deserialize)]
pub struct SlashCommandForm {
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub trigger_id: String,
}

/// Slash command response body. Ephemeral: only the invoking user sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandResponse {
    pub response_type: &'static str,
    pub text: String,
    pub blocks: Vec<Block>,
}

impl From<MessageTemplate> for CommandResponse {
    fn from(message: MessageTemplate) -> Self {
        Self { response_type: "ephemeral", text: message.fallback_text, blocks: message.blocks }
    }
}

pub async fn slash_command(
    State(state): State<AppState>,
    Form(form): Form<SlashCommandForm>,
) -> Json<CommandResponse> {
    let request_id = Uuid::new_v4().to_string();
    let channel_id = form.channel_id.clone();
    let envelope = SlackEnvelope {
        envelope_id: request_id.clone(),
        event: SlackEvent::SlashCommand(SlashCommandPayload {
            command: form.command,
            text: form.text,
            channel_id: form.channel_id,
            user_id: form.user_id,
            trigger_id: form.trigger_id,
            request_id: request_id.clone(),
        }),
    };

    let dispatcher = Arc::clone(&state.dispatcher);
    let correlation_id = request_id.clone();
    let work = async move {
        let ctx = EventContext { correlation_id: correlation_id.clone() };
        match dispatcher.dispatch(&envelope, &ctx).await {
            Ok(HandlerResult::Responded(message)) => message,
            Ok(_) => blocks::help_message(),
            Err(error) => {
                warn!(
                    event_name = "slack.command.rejected",
                    correlation_id = %correlation_id,
                    error = %error,
                    "slash command could not be handled"
                );
                blocks::error_message(&error.to_string(), &correlation_id)
            }
        }
    };

    let message = state.responder.respond(channel_id, request_id, work).await.into_message();
    Json(message.into())
}

pub async fn slack_event(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let envelope = match parse_event_payload(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": error.to_string() })))
                .into_response();
        }
    };

    let ctx = EventContext { correlation_id: Uuid::new_v4().to_string() };
    match state.dispatcher.dispatch(&envelope, &ctx).await {
        Ok(HandlerResult::Challenge(challenge)) => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(result) => {
            debug!(
                event_name = "slack.event.handled",
                correlation_id = %ctx.correlation_id,
                event_type = ?envelope.event.event_type(),
                result = ?result,
                "slack event handled"
            );
            StatusCode::OK.into_response()
        }
        Err(error) => {
            // Slack retries non-2xx deliveries; a failed handler is logged instead.
            warn!(
                event_name = "slack.event.failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "slack event handler failed"
            );
            StatusCode::OK.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{header, Request, StatusCode},
        Form, Json,
    };
    use ganttbot_core::config::AppConfig;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, slash_command, AppState, SlashCommandForm};
    use crate::bootstrap::with_api;
    use crate::test_support::RecordingSlack;

    fn state(slack: Arc<RecordingSlack>) -> AppState {
        let mut config = AppConfig::default();
        config.targets.list_id = Some("F0LIST".to_string());
        config.targets.canvas_id = Some("F0CANVAS".to_string());
        config.chart.width_in = 2.0;
        config.chart.height_in = 1.0;
        config.chart.dpi = 40;
        AppState::new(&with_api(config, slack))
    }

    fn form(text: &str) -> SlashCommandForm {
        SlashCommandForm {
            command: "/gantt".to_string(),
            text: text.to_string(),
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            trigger_id: "T1".to_string(),
        }
    }

    #[tokio::test]
    async fn help_is_answered_inline() {
        let slack = Arc::new(RecordingSlack::default());
        let Json(response) = slash_command(State(state(slack.clone())), Form(form("help"))).await;

        assert_eq!(response.response_type, "ephemeral");
        assert_eq!(response.text, "Gantt command help");
        assert!(slack.calls().await.is_empty());
    }

    #[tokio::test]
    async fn refresh_runs_the_pipeline_and_reports_the_canvas_update() {
        let slack = Arc::new(RecordingSlack::default());
        let Json(response) = slash_command(State(state(slack.clone())), Form(form(""))).await;

        assert_eq!(response.text, "Gantt chart added to the canvas");
        assert_eq!(
            slack.calls().await,
            vec!["list_items:F0LIST", "upload_file", "lookup_sections:F0CANVAS", "edit_canvas:F0CANVAS"]
        );
    }

    #[tokio::test]
    async fn foreign_command_gets_an_error_message() {
        let slack = Arc::new(RecordingSlack::default());
        let mut foreign = form("new");
        foreign.command = "/deploy".to_string();
        let Json(response) = slash_command(State(state(slack)), Form(foreign)).await;

        assert!(response.text.contains("unsupported slash command"));
    }

    #[tokio::test]
    async fn router_serves_commands_events_and_health() {
        let app = router(state(Arc::new(RecordingSlack::default())));

        let command = app
            .clone()
            .oneshot(
                Request::post("/slack/commands")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("command=%2Fgantt&text=help&channel_id=C1&user_id=U1"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(command.status(), StatusCode::OK);
        let body: Value =
            serde_json::from_slice(&to_bytes(command.into_body(), usize::MAX).await.expect("body"))
                .expect("json");
        assert_eq!(body["response_type"], "ephemeral");
        assert_eq!(body["blocks"][0]["type"], "section");

        let challenge = app
            .clone()
            .oneshot(
                Request::post("/slack/events")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "type": "url_verification", "challenge": "c-123" }).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(challenge.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(
            &to_bytes(challenge.into_body(), usize::MAX).await.expect("body"),
        )
        .expect("json");
        assert_eq!(body, json!({ "challenge": "c-123" }));

        let malformed = app
            .clone()
            .oneshot(
                Request::post("/slack/events")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        let health = app
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(health.status(), StatusCode::OK);
    }
}
