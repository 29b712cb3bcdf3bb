//! Read-only task and chart endpoints for dashboards and scripts. Nothing
//! here touches the canvas or the debounce window.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Local, NaiveDate};
use ganttbot_core::chart::RenderError;
use ganttbot_core::{ChartService, Task};
use ganttbot_slack::lists::{FetchError, ListService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bootstrap::Application;

const TASK_COUNT_HEADER: HeaderName = HeaderName::from_static("x-gantt-task-count");
const GROUP_COUNT_HEADER: HeaderName = HeaderName::from_static("x-gantt-group-count");

#[derive(Clone)]
pub struct ExportState {
    lists: Arc<ListService>,
    charts: Arc<ChartService>,
    default_list_id: Option<String>,
}

impl ExportState {
    pub fn new(application: &Application) -> Self {
        let config = &application.config;
        Self {
            lists: Arc::new(ListService::new(Arc::clone(&application.api), config.columns.clone())),
            charts: Arc::new(ChartService::new(config.chart.clone())),
            default_list_id: config.targets.list_id.clone(),
        }
    }

    fn resolve_list(&self, requested: Option<String>) -> Result<String, ExportError> {
        requested
            .filter(|list_id| !list_id.trim().is_empty())
            .or_else(|| self.default_list_id.clone())
            .ok_or(ExportError::MissingListId)
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("missing list_id parameter and no default list is configured")]
    MissingListId,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MissingListId => StatusCode::BAD_REQUEST,
            Self::Fetch(_) => StatusCode::BAD_GATEWAY,
            Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TasksQuery {
    #[serde(default)]
    pub list_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChartQuery {
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
    /// `true` shows tasks that already ended; any other value hides them.
    /// Absent keeps the configured `chart.hide_past_tasks`.
    #[serde(default)]
    pub include_past: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: i64,
    pub category: Option<String>,
    pub group: Option<String>,
    pub notes: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            duration_days: task.duration_days(),
            id: task.id,
            name: task.name,
            start_date: task.start,
            end_date: task.end,
            category: task.category,
            group: task.group,
            notes: task.notes,
            metadata: task.metadata,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TasksResponse {
    pub list_id: String,
    pub count: usize,
    pub tasks: Vec<TaskView>,
}

pub async fn list_tasks(
    State(state): State<ExportState>,
    Query(query): Query<TasksQuery>,
) -> Result<Json<TasksResponse>, ExportError> {
    let list_id = state.resolve_list(query.list_id)?;
    let tasks = state.lists.fetch_tasks(&list_id).await.map_err(|error| {
        warn!(
            event_name = "export.tasks.failed",
            list_id = %list_id,
            error = %error,
            "task export failed"
        );
        error
    })?;

    Ok(Json(TasksResponse {
        count: tasks.len(),
        tasks: tasks.into_iter().map(TaskView::from).collect(),
        list_id,
    }))
}

pub async fn chart_png(
    State(state): State<ExportState>,
    Query(query): Query<ChartQuery>,
) -> Result<Response, ExportError> {
    let correlation_id = Uuid::new_v4().to_string();
    let list_id = state.resolve_list(query.list_id)?;
    let tasks = state.lists.fetch_tasks(&list_id).await?;

    let group_by = query.group_by.filter(|field| !field.trim().is_empty());
    let include_past = query.include_past.map(|flag| flag.trim().eq_ignore_ascii_case("true"));
    let charts = state.charts.reconfigured(|config| {
        if let Some(field) = group_by {
            config.group_by = Some(field);
        }
        if let Some(include_past) = include_past {
            config.hide_past_tasks = !include_past;
        }
    });

    let today = Local::now().date_naive();
    let render = tokio::task::spawn_blocking(move || charts.render_at(&tasks, today))
        .await
        .map_err(|join_error| RenderError::Worker(join_error.to_string()))??;

    info!(
        event_name = "export.chart.rendered",
        correlation_id = %correlation_id,
        list_id = %list_id,
        tasks = render.task_count,
        groups = render.groups.len(),
        bytes = render.png.len(),
        "served chart png"
    );

    let headers = [
        (header::CONTENT_TYPE, "image/png".to_string()),
        (TASK_COUNT_HEADER, render.task_count.to_string()),
        (GROUP_COUNT_HEADER, render.groups.len().to_string()),
    ];
    Ok((headers, render.png).into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use ganttbot_core::config::AppConfig;
    use ganttbot_slack::api::{ListField, ListItem};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::bootstrap::with_api;
    use crate::http::{router, AppState};
    use crate::test_support::RecordingSlack;

    fn row(id: &str, name: &str, start: &str, end: &str, category: &str) -> ListItem {
        ListItem {
            id: id.to_string(),
            fields: vec![
                ListField::new("Name", json!(name)),
                ListField::new("Start Date", json!(start)),
                ListField::new("End Date", json!(end)),
                ListField::new("Category", json!(category)),
            ],
        }
    }

    fn roadmap() -> Vec<ListItem> {
        let mut launch = row("Rec1", "Launch", "2099-01-01", "2099-01-10", "build");
        launch.fields.push(ListField::new("Notes", json!("needs sign-off")));
        vec![launch, row("Rec2", "Retro", "2020-01-01", "2020-01-03", "review")]
    }

    fn app(slack: Arc<RecordingSlack>, list_id: Option<&str>) -> Router {
        let mut config = AppConfig::default();
        config.targets.list_id = list_id.map(str::to_string);
        config.targets.canvas_id = Some("F0CANVAS".to_string());
        config.chart.width_in = 2.0;
        config.chart.height_in = 1.0;
        config.chart.dpi = 40;
        config.chart.hide_past_tasks = true;
        router(AppState::new(&with_api(config, slack)))
    }

    async fn get(app: &Router, uri: &str) -> axum::response::Response {
        app.clone()
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.expect("body"))
            .expect("json")
    }

    fn header_value<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
        response.headers().get(name).and_then(|value| value.to_str().ok()).unwrap_or_default()
    }

    #[tokio::test]
    async fn tasks_endpoint_lists_every_valid_row() {
        let slack = Arc::new(RecordingSlack::with_items(roadmap()));
        let app = app(slack.clone(), Some("F0LIST"));

        let response = get(&app, "/api/tasks").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["list_id"], "F0LIST");
        assert_eq!(body["count"], 2);
        assert_eq!(
            body["tasks"][0],
            json!({
                "id": "Rec1",
                "name": "Launch",
                "start_date": "2099-01-01",
                "end_date": "2099-01-10",
                "duration_days": 10,
                "category": "build",
                "group": null,
                "notes": "needs sign-off",
                "metadata": {}
            })
        );
        assert_eq!(body["tasks"][1]["notes"], Value::Null);

        let other = get(&app, "/api/tasks?list_id=F0OTHER").await;
        assert_eq!(other.status(), StatusCode::OK);
        assert_eq!(slack.calls().await, vec!["list_items:F0LIST", "list_items:F0OTHER"]);
    }

    #[tokio::test]
    async fn chart_endpoint_honors_grouping_and_past_overrides() {
        let app = app(Arc::new(RecordingSlack::with_items(roadmap())), Some("F0LIST"));

        let default = get(&app, "/api/chart.png").await;
        assert_eq!(default.status(), StatusCode::OK);
        assert_eq!(header_value(&default, header::CONTENT_TYPE.as_str()), "image/png");
        assert_eq!(header_value(&default, "x-gantt-task-count"), "1");
        assert_eq!(header_value(&default, "x-gantt-group-count"), "0");
        let png = to_bytes(default.into_body(), usize::MAX).await.expect("body");
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

        let overridden = get(&app, "/api/chart.png?group_by=category&include_past=TRUE").await;
        assert_eq!(overridden.status(), StatusCode::OK);
        assert_eq!(header_value(&overridden, "x-gantt-task-count"), "2");
        assert_eq!(header_value(&overridden, "x-gantt-group-count"), "2");

        let hidden = get(&app, "/api/chart.png?include_past=no&group_by=").await;
        assert_eq!(header_value(&hidden, "x-gantt-task-count"), "1");
        assert_eq!(header_value(&hidden, "x-gantt-group-count"), "0");
    }

    #[tokio::test]
    async fn exports_without_any_list_id_are_bad_requests() {
        let slack = Arc::new(RecordingSlack::with_items(roadmap()));
        let app = app(slack.clone(), None);

        for uri in ["/api/tasks", "/api/chart.png?list_id=%20"] {
            let response = get(&app, uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body = json_body(response).await;
            assert!(body["error"].as_str().unwrap_or_default().contains("list_id"));
        }
        assert!(slack.calls().await.is_empty());
    }
}
