use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use ganttbot_core::config::AppConfig;
use serde::Serialize;

#[derive(Clone, Debug)]
pub struct HealthState {
    list_id: Option<String>,
    canvas_id: Option<String>,
    poll_interval_minutes: u64,
}

impl HealthState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            list_id: config.targets.list_id.clone(),
            canvas_id: config.targets.canvas_id.clone(),
            poll_interval_minutes: config.schedule.poll_interval_minutes,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub targets: HealthCheck,
    pub poller: HealthCheck,
    pub checked_at: String,
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let targets = targets_check(&state);
    let ready = targets.status == "ready";

    let poller = if state.poll_interval_minutes > 0 {
        HealthCheck {
            status: "ready",
            detail: format!("polling every {} minutes", state.poll_interval_minutes),
        }
    } else {
        HealthCheck { status: "disabled", detail: "poll timer disabled".to_string() }
    };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "ganttbot-server runtime initialized".to_string(),
        },
        targets,
        poller,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn targets_check(state: &HealthState) -> HealthCheck {
    match (&state.canvas_id, &state.list_id) {
        (Some(canvas_id), Some(list_id)) => HealthCheck {
            status: "ready",
            detail: format!("list {list_id} publishes to canvas {canvas_id}"),
        },
        (Some(canvas_id), None) => HealthCheck {
            status: "ready",
            detail: format!("canvas {canvas_id}; list id must be passed to /gantt"),
        },
        (None, _) => {
            HealthCheck { status: "degraded", detail: "targets.canvas_id is not set".to_string() }
        }
    }
}
