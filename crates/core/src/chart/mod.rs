//! Gantt chart rendering: layout, rasterization and PNG encoding.

pub mod layout;
pub mod palette;
pub mod raster;

use std::fs;

use ab_glyph::FontArc;
use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ChartConfig;
use crate::domain::task::Task;

pub use layout::{compute_layout, group_tasks, AxisBounds, GanttLayout, TaskGroup};
pub use palette::{Color, ColorParseError};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("chart size {width}x{height}px is not drawable")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("png encoding failed: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("render worker failed: {0}")]
    Worker(String),
}

/// A rendered chart, consumed once by the publisher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderResult {
    pub png: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
    pub dpi: u32,
    pub task_count: usize,
    pub axis: Option<AxisBounds>,
    /// Group names in drawing order; empty when the chart is not grouped.
    pub groups: Vec<String>,
}

#[derive(Clone)]
pub struct ChartService {
    config: ChartConfig,
    font: Option<FontArc>,
}

impl std::fmt::Debug for ChartService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartService")
            .field("config", &self.config)
            .field("font_loaded", &self.font.is_some())
            .finish()
    }
}

impl ChartService {
    /// Builds the service and loads the label font. A missing or unreadable
    /// font is logged and the chart is drawn without text.
    pub fn new(config: ChartConfig) -> Self {
        let font = config.font_path.as_ref().and_then(|path| {
            let loaded = fs::read(path)
                .map_err(|error| error.to_string())
                .and_then(|bytes| FontArc::try_from_vec(bytes).map_err(|error| error.to_string()));
            match loaded {
                Ok(font) => {
                    debug!(
                        event_name = "chart.font.loaded",
                        font_path = %path.display(),
                        "loaded chart label font"
                    );
                    Some(font)
                }
                Err(error) => {
                    warn!(
                        event_name = "chart.font.unavailable",
                        font_path = %path.display(),
                        error = %error,
                        "chart labels will be omitted"
                    );
                    None
                }
            }
        });
        Self { config, font }
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// A copy with an edited config. The loaded font is shared, not re-read.
    pub fn reconfigured(&self, edit: impl FnOnce(&mut ChartConfig)) -> Self {
        let mut config = self.config.clone();
        edit(&mut config);
        Self { config, font: self.font.clone() }
    }

    pub fn render(&self, tasks: &[Task]) -> Result<RenderResult, RenderError> {
        self.render_at(tasks, Local::now().date_naive())
    }

    /// Renders as of `today`, which drives the today marker and past-task filtering.
    pub fn render_at(&self, tasks: &[Task], today: NaiveDate) -> Result<RenderResult, RenderError> {
        let (width, height) = self.config.pixel_size();
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }

        let visible: Vec<Task>;
        let tasks = if self.config.hide_past_tasks {
            visible = tasks.iter().filter(|task| !task.is_past(today)).cloned().collect();
            debug!(
                event_name = "chart.tasks.filtered",
                hidden = tasks.len() - visible.len(),
                "hid tasks that ended before today"
            );
            visible.as_slice()
        } else {
            tasks
        };

        let layout = compute_layout(tasks, &self.config, Some(today));
        let canvas = raster::rasterize(&layout, self.font.as_ref());
        let png = raster::encode_png(&canvas, self.config.dpi)?;

        Ok(RenderResult {
            png,
            width_px: width,
            height_px: height,
            dpi: self.config.dpi,
            task_count: tasks.len(),
            groups: layout.bands.iter().filter_map(|band| band.name.clone()).collect(),
            axis: layout.axis,
        })
    }
}

/// One-shot render without keeping a service around.
pub fn render(tasks: &[Task], config: &ChartConfig) -> Result<RenderResult, RenderError> {
    ChartService::new(config.clone()).render(tasks)
}
