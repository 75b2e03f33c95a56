pub mod agent;
pub mod last_run;
pub mod repair;

use std::sync::Arc;

use forgeloop_progress::{ProgressBus, TracingSink, spawn_sink};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Progress bus whose events are logged by a background task.
pub struct ProgressForwarder {
    bus: ProgressBus,
    handle: JoinHandle<u64>,
}

impl ProgressForwarder {
    pub fn start() -> Self {
        let bus = ProgressBus::new();
        let handle = spawn_sink(bus.subscribe(), Arc::new(TracingSink));
        Self { bus, handle }
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    /// Wait for the sink to drain. Every other clone of the bus must be
    /// dropped first.
    pub async fn finish(self) {
        drop(self.bus);
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "Progress sink task failed");
        }
    }
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping at the next checkpoint");
            child.cancel();
        }
    });
    token
}
