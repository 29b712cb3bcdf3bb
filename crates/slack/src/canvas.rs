//! Publishing a rendered chart into its canvas section.

use std::sync::Arc;

use chrono::Utc;
use ganttbot_core::chart::RenderResult;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{CanvasChange, FileUpload, SlackApi, SlackApiError};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("chart upload failed: {0}")]
    Upload(#[source] SlackApiError),
    #[error("canvas section lookup failed: {0}")]
    Lookup(#[source] SlackApiError),
    #[error("canvas edit failed: {0}")]
    Edit(#[source] SlackApiError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionUpdate {
    Replaced { section_id: String },
    Appended,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishReceipt {
    pub file_id: String,
    pub permalink: String,
    pub section: SectionUpdate,
}

/// Text that identifies the chart's section inside a canvas.
pub fn section_marker(title: &str) -> String {
    format!("📊 {title}")
}

pub fn section_markdown(title: &str, permalink: &str, updated_at: &str) -> String {
    format!("**{}** | _Updated {updated_at}_\n\n![{title}]({permalink})", section_marker(title))
}

pub struct CanvasService {
    api: Arc<dyn SlackApi>,
    title: String,
}

impl CanvasService {
    pub fn new(api: Arc<dyn SlackApi>, title: impl Into<String>) -> Self {
        Self { api, title: title.into() }
    }

    /// Uploads the chart and points the canvas section at it, replacing the
    /// existing section or appending one. Nothing else in the canvas changes.
    pub async fn publish(
        &self,
        render: &RenderResult,
        canvas_id: &str,
        channel_id: Option<&str>,
    ) -> Result<PublishReceipt, PublishError> {
        let uploaded = self
            .api
            .upload_file(FileUpload {
                filename: format!("gantt-{}.png", Utc::now().format("%Y%m%d-%H%M%S")),
                title: self.title.clone(),
                bytes: render.png.clone(),
                channel_id: channel_id.map(str::to_owned),
            })
            .await
            .map_err(PublishError::Upload)?;
        let permalink = uploaded
            .permalink
            .unwrap_or_else(|| format!("https://slack.com/files/{}", uploaded.id));

        let marker = section_marker(&self.title);
        let sections =
            self.api.lookup_sections(canvas_id, &marker).await.map_err(PublishError::Lookup)?;
        if sections.len() > 1 {
            warn!(
                event_name = "canvas.section.duplicate",
                canvas_id,
                matches = sections.len(),
                "several sections carry the chart marker; replacing the first"
            );
        }

        let markdown = section_markdown(
            &self.title,
            &permalink,
            &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
        );
        let (change, section) = match sections.into_iter().next() {
            Some(existing) => (
                CanvasChange::replace(existing.id.clone(), markdown),
                SectionUpdate::Replaced { section_id: existing.id },
            ),
            None => (CanvasChange::insert_at_end(markdown), SectionUpdate::Appended),
        };

        self.api.edit_canvas(canvas_id, vec![change]).await.map_err(PublishError::Edit)?;

        match &section {
            SectionUpdate::Replaced { section_id } => info!(
                event_name = "canvas.section.replaced",
                canvas_id,
                section_id = %section_id,
                file_id = %uploaded.id,
                "replaced chart section"
            ),
            SectionUpdate::Appended => info!(
                event_name = "canvas.section.appended",
                canvas_id,
                file_id = %uploaded.id,
                "appended chart section"
            ),
        }

        Ok(PublishReceipt { file_id: uploaded.id, permalink, section })
    }
}
