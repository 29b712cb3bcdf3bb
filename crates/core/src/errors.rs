use std::fmt;

use thiserror::Error;

/// The step of a gantt run that failed. Ordered the way a run executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Configuration,
    Fetch,
    Render,
    Publish,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Fetch => "fetch",
            Self::Render => "render",
            Self::Publish => "publish",
        }
    }

    fn hint(self) -> &'static str {
        match self {
            Self::Configuration => "Check the list and canvas settings for this app.",
            Self::Fetch => "Check that the list exists and the app can read it.",
            Self::Render => "The task data could not be drawn as a chart.",
            Self::Publish => "Check that the app can upload files and edit the canvas.",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failure as it is shown to Slack users. The detailed message stays
/// in logs; users only see the stage, a hint and the correlation id.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("configuration error: {message}")]
    Configuration { message: String, correlation_id: String },
    #[error("fetch failed: {message}")]
    Fetch { message: String, correlation_id: String },
    #[error("render failed: {message}")]
    Render { message: String, correlation_id: String },
    #[error("publish failed: {message}")]
    Publish { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn new(
        stage: PipelineStage,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let correlation_id = correlation_id.into();
        match stage {
            PipelineStage::Configuration => Self::Configuration { message, correlation_id },
            PipelineStage::Fetch => Self::Fetch { message, correlation_id },
            PipelineStage::Render => Self::Render { message, correlation_id },
            PipelineStage::Publish => Self::Publish { message, correlation_id },
        }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Configuration { .. } => PipelineStage::Configuration,
            Self::Fetch { .. } => PipelineStage::Fetch,
            Self::Render { .. } => PipelineStage::Render,
            Self::Publish { .. } => PipelineStage::Publish,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Configuration { correlation_id, .. }
            | Self::Fetch { correlation_id, .. }
            | Self::Render { correlation_id, .. }
            | Self::Publish { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> String {
        let stage = self.stage();
        format!(
            "Gantt update failed during {stage}. {} (ref `{}`)",
            stage.hint(),
            self.correlation_id()
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{InterfaceError, PipelineStage};

    #[test]
    fn user_message_names_the_failed_stage() {
        let interface =
            InterfaceError::new(PipelineStage::Fetch, "list_not_found", "req-1");

        let message = interface.user_message();
        assert!(message.contains("during fetch"));
        assert!(message.contains("req-1"));
        assert!(!message.contains("list_not_found"));
    }

    #[test]
    fn stage_round_trips_through_constructor() {
        for stage in [
            PipelineStage::Configuration,
            PipelineStage::Fetch,
            PipelineStage::Render,
            PipelineStage::Publish,
        ] {
            let interface = InterfaceError::new(stage, "boom", "req-2");
            assert_eq!(interface.stage(), stage);
            assert_eq!(interface.correlation_id(), "req-2");
        }
    }

    #[test]
    fn display_keeps_the_detailed_message_for_logs() {
        let interface =
            InterfaceError::new(PipelineStage::Publish, "canvas_not_found", "req-3");
        assert_eq!(interface.to_string(), "publish failed: canvas_not_found");
        assert!(interface.user_message().contains("edit the canvas"));
    }
}
