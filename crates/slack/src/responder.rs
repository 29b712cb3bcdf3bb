//! Slash command responses that must arrive within Slack's ack deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::SlackApi;
use crate::blocks::{self, MessageTemplate};

pub enum WindowedResponse {
    Immediate(MessageTemplate),
    /// The work outlived the window. `interim` is sent now; `followup` posts the
    /// final message to the channel when the work finishes.
    Deferred { interim: MessageTemplate, followup: JoinHandle<()> },
}

impl WindowedResponse {
    pub fn into_message(self) -> MessageTemplate {
        match self {
            Self::Immediate(message) => message,
            Self::Deferred { interim, .. } => interim,
        }
    }
}

pub struct DeferredResponder {
    api: Arc<dyn SlackApi>,
    window: Duration,
}

impl DeferredResponder {
    pub fn new(api: Arc<dyn SlackApi>, window: Duration) -> Self {
        Self { api, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Runs `work` in the background and waits at most the response window for it.
    pub async fn respond<F>(
        &self,
        channel_id: String,
        correlation_id: String,
        work: F,
    ) -> WindowedResponse
    where
        F: Future<Output = MessageTemplate> + Send + 'static,
    {
        let mut handle = tokio::spawn(work);
        match tokio::time::timeout(self.window, &mut handle).await {
            Ok(joined) => WindowedResponse::Immediate(finished_message(joined, &correlation_id)),
            Err(_) => {
                info!(
                    event_name = "slack.response.deferred",
                    correlation_id = %correlation_id,
                    channel_id = %channel_id,
                    window_ms = self.window.as_millis() as u64,
                    "response window closed; final message will be posted"
                );

                let api = Arc::clone(&self.api);
                let followup = tokio::spawn(async move {
                    let message = finished_message(handle.await, &correlation_id);
                    if let Err(error) = api.post_message(&channel_id, &message).await {
                        warn!(
                            event_name = "slack.response.post_failed",
                            correlation_id = %correlation_id,
                            channel_id = %channel_id,
                            error = %error,
                            "could not post deferred response"
                        );
                    }
                });
                WindowedResponse::Deferred { interim: blocks::working_message(), followup }
            }
        }
    }
}

fn finished_message(
    joined: Result<MessageTemplate, tokio::task::JoinError>,
    correlation_id: &str,
) -> MessageTemplate {
    joined.unwrap_or_else(|join_error| {
        error!(
            event_name = "slack.response.worker_failed",
            correlation_id,
            error = %join_error,
            "command worker did not finish"
        );
        blocks::error_message("Gantt update failed unexpectedly.", correlation_id)
    })
}
