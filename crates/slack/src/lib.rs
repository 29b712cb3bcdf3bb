//! Slack side of ganttbot
//!
//! - **Web API** (`api`) - `SlackApi` trait and the reqwest-backed client
//! - **Lists** (`lists`) - Slack List rows to validated tasks
//! - **Canvas** (`canvas`) - chart upload and section replace/append
//! - **Pipeline** (`pipeline`) - fetch, render, publish, with debounce
//! - **Slash Commands** (`commands`) - `/gantt`, `/gantt <list_id>`, `/gantt help`
//! - **Events** (`events`) - dispatcher for commands, url verification, App Home
//! - **Responder** (`responder`) - answers within the response window, posts late results
//! - **Block Kit** (`blocks`) - message builders
//!
//! # Architecture
//!
//! ```text
//! /gantt ─→ EventDispatcher → CommandRouter → GanttPipeline ─→ ListService
//! poll timer ─────────────────────────────────↗      │          ChartService
//!                                                    └────────→ CanvasService
//! ```

pub mod api;
pub mod blocks;
pub mod canvas;
pub mod commands;
pub mod events;
pub mod lists;
pub mod pipeline;
pub mod responder;

#[cfg(test)]
mod testing;

pub use api::{HttpSlackApi, SlackApi, SlackApiError};
pub use pipeline::{GanttPipeline, PipelineError, RunRequest, RunStatus, Trigger};
