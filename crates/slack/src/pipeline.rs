//! One gantt run: fetch the list, render the chart, publish it to the canvas.
//!
//! Slash commands and the poll timer both go through [`GanttPipeline::trigger`],
//! which coalesces triggers that arrive within the debounce window.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ganttbot_core::chart::{AxisBounds, ChartService, RenderError};
use ganttbot_core::config::{AppConfig, TargetConfig};
use ganttbot_core::errors::{InterfaceError, PipelineStage};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::SlackApi;
use crate::blocks::{self, ChartUpdate, MessageTemplate};
use crate::canvas::{CanvasService, PublishError, PublishReceipt, SectionUpdate};
use crate::commands::{CommandEnvelope, CommandRouteError, GanttCommandService};
use crate::lists::{FetchError, ListService};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    SlashCommand { user_id: String, channel_id: String },
    Poll,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlashCommand { .. } => "slash_command",
            Self::Poll => "poll",
            Self::Manual => "manual",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    /// Overrides the configured list for this run.
    pub list_id: Option<String>,
    pub trigger: Trigger,
    pub correlation_id: String,
}

impl RunRequest {
    pub fn new(trigger: Trigger) -> Self {
        Self { list_id: None, trigger, correlation_id: Uuid::new_v4().to_string() }
    }

    pub fn with_list_id(mut self, list_id: Option<String>) -> Self {
        self.list_id = list_id;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        if !correlation_id.trim().is_empty() {
            self.correlation_id = correlation_id;
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub correlation_id: String,
    pub list_id: String,
    pub task_count: usize,
    pub axis: Option<AxisBounds>,
    pub receipt: PublishReceipt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed(PipelineOutcome),
    /// Suppressed because another run started less than the debounce window ago.
    Debounced { retry_after: Duration },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no list id given and targets.list_id is not configured")]
    MissingListId,
    #[error("targets.canvas_id is not configured")]
    MissingCanvasId,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl PipelineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::MissingListId | Self::MissingCanvasId => PipelineStage::Configuration,
            Self::Fetch(_) => PipelineStage::Fetch,
            Self::Render(_) => PipelineStage::Render,
            Self::Publish(_) => PipelineStage::Publish,
        }
    }

    pub fn into_interface(self, correlation_id: &str) -> InterfaceError {
        InterfaceError::new(self.stage(), self.to_string(), correlation_id)
    }
}

/// Remembers when the last accepted run started.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last_start: Mutex::new(None) }
    }

    pub fn try_begin(&self) -> Result<(), Duration> {
        self.try_begin_at(Instant::now())
    }

    /// Accepts the trigger and records `now`, or returns how long until the
    /// window closes.
    pub fn try_begin_at(&self, now: Instant) -> Result<(), Duration> {
        let mut last_start = self.last_start.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last_start {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.window {
                return Err(self.window - elapsed);
            }
        }
        *last_start = Some(now);
        Ok(())
    }
}

pub struct GanttPipeline {
    lists: ListService,
    charts: Arc<ChartService>,
    canvas: CanvasService,
    targets: TargetConfig,
    chart_title: String,
    debouncer: Debouncer,
}

impl GanttPipeline {
    pub fn new(api: Arc<dyn SlackApi>, config: &AppConfig) -> Self {
        Self {
            lists: ListService::new(Arc::clone(&api), config.columns.clone()),
            charts: Arc::new(ChartService::new(config.chart.clone())),
            canvas: CanvasService::new(api, config.chart.title.clone()),
            targets: config.targets.clone(),
            chart_title: config.chart.title.clone(),
            debouncer: Debouncer::new(Duration::from_secs(config.schedule.debounce_secs)),
        }
    }

    pub fn chart_title(&self) -> &str {
        &self.chart_title
    }

    /// Runs unless a run started within the debounce window.
    pub async fn trigger(&self, request: RunRequest) -> Result<RunStatus, PipelineError> {
        if let Err(retry_after) = self.debouncer.try_begin() {
            info!(
                event_name = "pipeline.run.debounced",
                correlation_id = %request.correlation_id,
                trigger = request.trigger.as_str(),
                retry_after_ms = retry_after.as_millis() as u64,
                "skipping trigger inside debounce window"
            );
            return Ok(RunStatus::Debounced { retry_after });
        }

        self.run(&request).await.map(RunStatus::Completed)
    }

    /// Runs all stages, ignoring the debounce window.
    pub async fn run(&self, request: &RunRequest) -> Result<PipelineOutcome, PipelineError> {
        let started = Instant::now();
        let result = self.run_stages(request).await;
        match &result {
            Ok(outcome) => info!(
                event_name = "pipeline.run.completed",
                correlation_id = %request.correlation_id,
                trigger = request.trigger.as_str(),
                list_id = %outcome.list_id,
                tasks = outcome.task_count,
                file_id = %outcome.receipt.file_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "gantt chart published"
            ),
            Err(failure) => error!(
                event_name = "pipeline.run.failed",
                correlation_id = %request.correlation_id,
                trigger = request.trigger.as_str(),
                stage = %failure.stage(),
                error = %failure,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "gantt run failed"
            ),
        }
        result
    }

    async fn run_stages(&self, request: &RunRequest) -> Result<PipelineOutcome, PipelineError> {
        let list_id = request
            .list_id
            .as_deref()
            .or(self.targets.list_id.as_deref())
            .ok_or(PipelineError::MissingListId)?
            .to_owned();
        let canvas_id = self.targets.canvas_id.as_deref().ok_or(PipelineError::MissingCanvasId)?;

        info!(
            event_name = "pipeline.run.started",
            correlation_id = %request.correlation_id,
            trigger = request.trigger.as_str(),
            list_id = %list_id,
            canvas_id,
            "starting gantt run"
        );

        let tasks = self.lists.fetch_tasks(&list_id).await?;
        info!(
            event_name = "pipeline.fetch.completed",
            correlation_id = %request.correlation_id,
            tasks = tasks.len(),
            "fetched tasks"
        );

        let charts = Arc::clone(&self.charts);
        let render = tokio::task::spawn_blocking(move || charts.render(&tasks))
            .await
            .map_err(|join_error| RenderError::Worker(join_error.to_string()))??;
        info!(
            event_name = "pipeline.render.completed",
            correlation_id = %request.correlation_id,
            width_px = render.width_px,
            height_px = render.height_px,
            bytes = render.png.len(),
            "rendered chart"
        );

        let channel_id = if self.targets.share_uploads {
            self.targets.channel_id.as_deref()
        } else {
            None
        };
        let receipt = self.canvas.publish(&render, canvas_id, channel_id).await?;

        Ok(PipelineOutcome {
            correlation_id: request.correlation_id.clone(),
            list_id,
            task_count: render.task_count,
            axis: render.axis,
            receipt,
        })
    }
}

/// Slash command service backed by the pipeline. Failures become user-facing
/// messages; nothing is returned as a route error.
pub struct PipelineCommandService {
    pipeline: Arc<GanttPipeline>,
}

impl PipelineCommandService {
    pub fn new(pipeline: Arc<GanttPipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn outcome_message(title: &str, outcome: &PipelineOutcome) -> MessageTemplate {
    blocks::chart_updated_message(&ChartUpdate {
        title,
        list_id: &outcome.list_id,
        task_count: outcome.task_count,
        span: outcome.axis.map(|axis| (axis.start, axis.end)),
        permalink: &outcome.receipt.permalink,
        appended: outcome.receipt.section == SectionUpdate::Appended,
        correlation_id: &outcome.correlation_id,
    })
}

#[async_trait]
impl GanttCommandService for PipelineCommandService {
    async fn refresh(
        &self,
        list_id: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let request = RunRequest::new(Trigger::SlashCommand {
            user_id: envelope.user_id.clone(),
            channel_id: envelope.channel_id.clone(),
        })
        .with_list_id(list_id)
        .with_correlation_id(envelope.request_id.clone());
        let correlation_id = request.correlation_id.clone();

        let message = match self.pipeline.trigger(request).await {
            Ok(RunStatus::Completed(outcome)) => {
                outcome_message(self.pipeline.chart_title(), &outcome)
            }
            Ok(RunStatus::Debounced { retry_after }) => {
                blocks::debounced_message(retry_after.as_secs().max(1))
            }
            Err(failure) => {
                let interface = failure.into_interface(&correlation_id);
                blocks::error_message(&interface.user_message(), interface.correlation_id())
            }
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use ganttbot_core::chart::{AxisBounds, Color};
    use ganttbot_core::config::{AppConfig, ChartConfig, TargetConfig};
    use ganttbot_core::errors::PipelineStage;
    use serde_json::json;
    use tokio::time::Instant;

    use super::{
        Debouncer, GanttPipeline, PipelineCommandService, PipelineError, RunRequest, RunStatus,
        Trigger,
    };
    use crate::api::ListField;
    use crate::api::ListItem;
    use crate::blocks::{Block, TextObject};
    use crate::canvas::{section_marker, SectionUpdate};
    use crate::commands::{normalize_gantt_command, CommandRouter, SlashCommandPayload};
    use crate::testing::{Call, FakeSlack};

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn row(id: &str, name: &str, start: Option<&str>, end: Option<&str>, category: &str) -> ListItem {
        let mut fields = vec![ListField::new("Name", json!(name))];
        if let Some(start) = start {
            fields.push(ListField::new("Start Date", json!(start)));
        }
        if let Some(end) = end {
            fields.push(ListField::new("End Date", json!(end)));
        }
        fields.push(ListField::new("Category", json!(category)));
        ListItem { id: id.to_owned(), fields }
    }

    fn config(debounce_secs: u64) -> AppConfig {
        let mut config = AppConfig::default();
        config.targets = TargetConfig {
            list_id: Some("L1".to_owned()),
            canvas_id: Some("C1".to_owned()),
            channel_id: Some("CH1".to_owned()),
            share_uploads: false,
        };
        config.chart = ChartConfig {
            width_in: 4.0,
            height_in: 2.0,
            dpi: 50,
            title: "Roadmap".to_owned(),
            category_colors: BTreeMap::from([
                ("development".to_owned(), Color::rgb(0x34, 0x98, 0xdb)),
                ("testing".to_owned(), Color::rgb(0xe7, 0x4c, 0x3c)),
            ]),
            ..ChartConfig::default()
        };
        config.schedule.debounce_secs = debounce_secs;
        config
    }

    fn seeded_slack() -> FakeSlack {
        FakeSlack::default()
            .with_list(
                "L1",
                vec![
                    row("R1", "A", Some("2024-01-01"), Some("2024-01-05"), "development"),
                    row("R2", "B", Some("2024-01-03"), None, "testing"),
                    row("R3", "C", None, None, "testing"),
                ],
            )
            .with_section("C1", "sec-intro", "# Project intro")
            .with_section("C1", "sec-chart", &format!("**{}** | _stale_", section_marker("Roadmap")))
    }

    async fn list_reads(slack: &FakeSlack) -> usize {
        slack.calls().await.iter().filter(|call| matches!(call, Call::ListItems { .. })).count()
    }

    #[tokio::test]
    async fn end_to_end_run_replaces_only_the_chart_section() {
        let slack = Arc::new(seeded_slack());
        let pipeline = GanttPipeline::new(slack.clone(), &config(0));

        let outcome = pipeline.run(&RunRequest::new(Trigger::Manual)).await.expect("run");

        assert_eq!(outcome.list_id, "L1");
        assert_eq!(outcome.task_count, 2);
        assert_eq!(outcome.axis, Some(AxisBounds { start: ymd(2024, 1, 1), end: ymd(2024, 1, 5) }));
        assert_eq!(outcome.receipt.section, SectionUpdate::Replaced { section_id: "sec-chart".into() });

        let sections = slack.sections("C1").await;
        assert_eq!(sections[0], ("sec-intro".to_owned(), "# Project intro".to_owned()));
        assert!(sections[1].1.contains(&outcome.receipt.permalink));

        let calls = slack.calls().await;
        assert!(matches!(&calls[1], Call::Upload { channel_id: None, bytes, .. } if *bytes > 0));
    }

    #[tokio::test]
    async fn shared_uploads_go_to_the_configured_channel() {
        let slack = Arc::new(seeded_slack());
        let mut config = config(0);
        config.targets.share_uploads = true;
        let pipeline = GanttPipeline::new(slack.clone(), &config);

        pipeline.run(&RunRequest::new(Trigger::Poll)).await.expect("run");

        let calls = slack.calls().await;
        assert!(matches!(
            &calls[1],
            Call::Upload { channel_id: Some(channel), .. } if channel == "CH1"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_two_seconds_apart_run_once() {
        let slack = Arc::new(seeded_slack());
        let pipeline = GanttPipeline::new(slack.clone(), &config(5));

        let first = pipeline.trigger(RunRequest::new(Trigger::Poll)).await.expect("first");
        assert!(matches!(first, RunStatus::Completed(_)));

        tokio::time::advance(Duration::from_secs(2)).await;
        let second = pipeline.trigger(RunRequest::new(Trigger::Manual)).await.expect("second");
        assert!(matches!(second, RunStatus::Debounced { retry_after } if retry_after <= Duration::from_secs(3)));
        assert_eq!(list_reads(&slack).await, 1);

        tokio::time::advance(Duration::from_secs(4)).await;
        let third = pipeline.trigger(RunRequest::new(Trigger::Poll)).await.expect("third");
        assert!(matches!(third, RunStatus::Completed(_)));
        assert_eq!(list_reads(&slack).await, 2);
    }

    #[tokio::test]
    async fn missing_list_is_a_configuration_failure_without_api_calls() {
        let slack = Arc::new(seeded_slack());
        let mut config = config(0);
        config.targets.list_id = None;
        let pipeline = GanttPipeline::new(slack.clone(), &config);

        let error = pipeline.run(&RunRequest::new(Trigger::Poll)).await.expect_err("should fail");
        assert!(matches!(error, PipelineError::MissingListId));
        assert_eq!(error.stage(), PipelineStage::Configuration);
        assert!(slack.calls().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_list_fails_in_fetch_and_leaves_canvas_alone() {
        let slack = Arc::new(seeded_slack());
        let pipeline = GanttPipeline::new(slack.clone(), &config(0));

        let request = RunRequest::new(Trigger::Manual).with_list_id(Some("L404".to_owned()));
        let error = pipeline.run(&request).await.expect_err("should fail");
        assert_eq!(error.stage(), PipelineStage::Fetch);

        let interface = error.into_interface("run-7");
        assert!(interface.user_message().contains("fetch"));
        assert!(interface.user_message().contains("run-7"));
        assert_eq!(slack.calls().await.len(), 1);
    }

    #[test]
    fn debouncer_suppresses_inside_window_only() {
        let debouncer = Debouncer::new(Duration::from_secs(5));
        let start = Instant::now();

        assert_eq!(debouncer.try_begin_at(start), Ok(()));
        assert_eq!(
            debouncer.try_begin_at(start + Duration::from_secs(2)),
            Err(Duration::from_secs(3))
        );
        assert_eq!(debouncer.try_begin_at(start + Duration::from_secs(5)), Ok(()));
        assert!(debouncer.try_begin_at(start + Duration::from_secs(6)).is_err());
    }

    #[test]
    fn zero_window_never_suppresses() {
        let debouncer = Debouncer::new(Duration::ZERO);
        let now = Instant::now();
        assert_eq!(debouncer.try_begin_at(now), Ok(()));
        assert_eq!(debouncer.try_begin_at(now), Ok(()));
    }

    fn slash(text: &str) -> SlashCommandPayload {
        SlashCommandPayload {
            command: "/gantt".to_owned(),
            text: text.to_owned(),
            channel_id: "CH1".to_owned(),
            user_id: "U1".to_owned(),
            trigger_id: "T1".to_owned(),
            request_id: "req-42".to_owned(),
        }
    }

    #[tokio::test]
    async fn slash_refresh_reports_the_published_chart() {
        let slack = Arc::new(seeded_slack());
        let pipeline = Arc::new(GanttPipeline::new(slack.clone(), &config(0)));
        let router = CommandRouter::new(PipelineCommandService::new(pipeline));

        let message = router
            .route(normalize_gantt_command(slash("")).expect("normalize"))
            .await
            .expect("route");

        assert_eq!(message.fallback_text, "Gantt chart updated in the canvas");
        assert!(matches!(
            &message.blocks[1],
            Block::Context { elements, .. }
                if matches!(elements.first(), Some(TextObject::Plain { text }) if text.contains("req-42"))
        ));
    }

    #[tokio::test]
    async fn slash_refresh_turns_failures_into_stage_messages() {
        let slack = Arc::new(seeded_slack());
        let pipeline = Arc::new(GanttPipeline::new(slack.clone(), &config(0)));
        let router = CommandRouter::new(PipelineCommandService::new(pipeline));

        let message = router
            .route(normalize_gantt_command(slash("L404")).expect("normalize"))
            .await
            .expect("failures are still responses");

        let Block::Section { text: TextObject::Mrkdwn { text }, .. } = &message.blocks[0] else {
            panic!("expected markdown summary");
        };
        assert!(text.contains("during fetch"));
        assert!(!text.contains("list_not_found"));
    }
}
