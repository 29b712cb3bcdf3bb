pub mod chart;
pub mod config;
pub mod dates;
pub mod domain;
pub mod errors;

pub use chart::{render, ChartService, RenderError, RenderResult};
pub use config::{AppConfig, ChartConfig, ColumnConfig, ConfigError, LoadOptions, TargetConfig};
pub use dates::{parse_date, DateParseError};
pub use domain::task::{RawTaskRow, Task, TaskRowError};
pub use errors::{InterfaceError, PipelineStage};
