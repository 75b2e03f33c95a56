use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status attached to a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Running,
    Ok,
    Fail,
    Info,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Running => "running",
            ProgressStatus::Ok => "ok",
            ProgressStatus::Fail => "fail",
            ProgressStatus::Info => "info",
        }
    }
}

/// One phase/progress notification for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub phase: String,
    pub status: ProgressStatus,
    /// Fraction in `[0, 1]`; absent for purely informational events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    pub ts: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        job_id: impl Into<String>,
        phase: impl Into<String>,
        status: ProgressStatus,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            phase: phase.into(),
            status,
            progress: None,
            message: None,
            data: Value::Null,
            ts: Utc::now(),
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress.clamp(0.0, 1.0));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_clamped() {
        let event = ProgressEvent::new("job", "phase", ProgressStatus::Running).with_progress(1.7);
        assert_eq!(event.progress, Some(1.0));

        let event = ProgressEvent::new("job", "phase", ProgressStatus::Running).with_progress(-0.2);
        assert_eq!(event.progress, Some(0.0));
    }

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = ProgressEvent::new("job-1", "agent_boot", ProgressStatus::Info);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["status"], "info");
        assert_eq!(value["phase"], "agent_boot");
        assert!(value.get("progress").is_none());
        assert!(value.get("data").is_none());
    }
}
