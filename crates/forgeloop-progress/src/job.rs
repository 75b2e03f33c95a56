use parking_lot::Mutex;
use serde_json::Value;

use crate::bus::ProgressBus;
use crate::event::{ProgressEvent, ProgressStatus};

/// Progress reporter bound to one job.
///
/// The reported fraction never moves backwards: values below the highest
/// one already published are raised to it, values outside `[0, 1]` are clamped.
pub struct JobProgress {
    bus: ProgressBus,
    job_id: String,
    high_water: Mutex<f64>,
}

impl JobProgress {
    pub fn new(bus: ProgressBus, job_id: impl Into<String>) -> Self {
        Self {
            bus,
            job_id: job_id.into(),
            high_water: Mutex::new(0.0),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    /// Highest fraction published so far.
    pub fn current(&self) -> f64 {
        *self.high_water.lock()
    }

    pub fn start(&self) {
        self.emit(
            ProgressEvent::new(&self.job_id, "start", ProgressStatus::Running).with_progress(0.0),
        );
    }

    pub fn running(&self, phase: &str, progress: f64, message: impl Into<String>) {
        self.emit(
            ProgressEvent::new(&self.job_id, phase, ProgressStatus::Running)
                .with_progress(progress)
                .with_message(message),
        );
    }

    pub fn running_with(&self, phase: &str, progress: f64, data: Value) {
        self.emit(
            ProgressEvent::new(&self.job_id, phase, ProgressStatus::Running)
                .with_progress(progress)
                .with_data(data),
        );
    }

    pub fn info(&self, phase: &str, message: impl Into<String>, data: Value) {
        self.emit(
            ProgressEvent::new(&self.job_id, phase, ProgressStatus::Info)
                .with_message(message)
                .with_data(data),
        );
    }

    pub fn ok(&self, phase: &str, progress: f64, data: Value) {
        self.emit(
            ProgressEvent::new(&self.job_id, phase, ProgressStatus::Ok)
                .with_progress(progress)
                .with_data(data),
        );
    }

    pub fn done(&self, data: Value) {
        self.ok("done", 1.0, data);
    }

    pub fn fail(&self, phase: &str, message: impl Into<String>) {
        let current = self.current();
        self.emit(
            ProgressEvent::new(&self.job_id, phase, ProgressStatus::Fail)
                .with_progress(current)
                .with_message(message),
        );
    }

    fn emit(&self, mut event: ProgressEvent) {
        if let Some(progress) = event.progress {
            let mut high_water = self.high_water.lock();
            let monotonic = progress.clamp(0.0, 1.0).max(*high_water);
            *high_water = monotonic;
            event.progress = Some(monotonic);
        }
        self.bus.publish(event);
    }
}
