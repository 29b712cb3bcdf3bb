use std::sync::Arc;
use std::time::Duration;

use ganttbot_slack::{GanttPipeline, RunRequest, RunStatus, Trigger};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Fires the pipeline every `period`, first one period after start.
/// Failures are logged by the pipeline and never stop the loop.
pub fn spawn(pipeline: Arc<GanttPipeline>, period: Duration) -> JoinHandle<()> {
    info!(
        event_name = "system.poller.start",
        correlation_id = "bootstrap",
        period_secs = period.as_secs(),
        "poll timer started"
    );

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let request = RunRequest::new(Trigger::Poll);
            debug!(
                event_name = "system.poller.tick",
                correlation_id = %request.correlation_id,
                "poll tick"
            );
            if let Ok(RunStatus::Debounced { .. }) = pipeline.trigger(request).await {
                debug!(event_name = "system.poller.coalesced", "poll tick coalesced");
            }
        }
    })
}
