use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::bus::ProgressSubscription;
use crate::event::{ProgressEvent, ProgressStatus};

/// Destination for progress events. Delivery is fire-and-forget.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn deliver(&self, event: ProgressEvent);
}

/// Sink that writes every event to the tracing subscriber.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl ProgressSink for TracingSink {
    async fn deliver(&self, event: ProgressEvent) {
        let progress = event.progress.map(|p| format!("{:.0}%", p * 100.0));
        match event.status {
            ProgressStatus::Fail => tracing::warn!(
                job_id = %event.job_id,
                phase = %event.phase,
                progress = progress.as_deref().unwrap_or("-"),
                message = event.message.as_deref().unwrap_or(""),
                "progress"
            ),
            _ => tracing::info!(
                job_id = %event.job_id,
                phase = %event.phase,
                status = event.status.as_str(),
                progress = progress.as_deref().unwrap_or("-"),
                message = event.message.as_deref().unwrap_or(""),
                "progress"
            ),
        }
    }
}

/// Drain `subscription` into `sink` on a background task.
///
/// The task ends when every bus handle has been dropped and resolves to the
/// number of events delivered.
pub fn spawn_sink(
    mut subscription: ProgressSubscription,
    sink: Arc<dyn ProgressSink>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut delivered = 0u64;
        while let Some(event) = subscription.recv().await {
            sink.deliver(event).await;
            delivered += 1;
        }
        tracing::debug!(
            delivered,
            dropped = subscription.dropped(),
            "Progress sink drained"
        );
        delivered
    })
}
