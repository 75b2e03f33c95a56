//! Last-run record persisted for debugging.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{AgentReport, ExitReason, ToolLogEntry};
use crate::error::Result;

const FILE_NAME: &str = "last_run.json";

/// Snapshot of the most recent agent run. Overwritten by every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastRunRecord {
    pub job_id: String,
    pub summary: String,
    pub diff_preview: String,
    pub tool_log: Vec<ToolLogEntry>,
    pub validate_only: bool,
    pub exit_reason: ExitReason,
    pub turns: usize,
    pub finished_at: DateTime<Utc>,
}

impl LastRunRecord {
    /// Build a record keeping only the last `keep` log entries.
    pub fn from_report(report: &AgentReport, keep: usize) -> Self {
        let skip = report.tool_log.len().saturating_sub(keep);
        Self {
            job_id: report.job_id.clone(),
            summary: report.summary.clone(),
            diff_preview: report.diff_preview.clone(),
            tool_log: report.tool_log[skip..].to_vec(),
            validate_only: report.validate_only,
            exit_reason: report.exit_reason,
            turns: report.turns,
            finished_at: Utc::now(),
        }
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Well-known location of the record: `<data dir>/forgeloop/last_run.json`.
pub fn default_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("forgeloop").join(FILE_NAME))
}

/// Record location inside an explicit state directory.
pub fn path_in(state_dir: &Path) -> PathBuf {
    state_dir.join(FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn report(entries: usize) -> AgentReport {
        AgentReport {
            job_id: "job-1".to_string(),
            summary: "DONE".to_string(),
            tool_log: (0..entries)
                .map(|i| ToolLogEntry::Call {
                    turn: Some(i),
                    id: format!("call-{i}"),
                    name: "fs_read".to_string(),
                    arguments: json!({"path": "a"}),
                    ok: true,
                    skipped: false,
                    error: None,
                    elapsed_ms: 1,
                })
                .collect(),
            diff_preview: String::new(),
            exit_reason: ExitReason::TurnCap,
            turns: 3,
            validate_only: false,
        }
    }

    #[test]
    fn test_record_keeps_tail_of_log() {
        let record = LastRunRecord::from_report(&report(250), 200);
        assert_eq!(record.tool_log.len(), 200);
        match &record.tool_log[0] {
            ToolLogEntry::Call { id, .. } => assert_eq!(id, "call-50"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_save_overwrites_and_loads() {
        let dir = TempDir::new().unwrap();
        let path = path_in(&dir.path().join("state"));

        LastRunRecord::from_report(&report(1), 200).save(&path).unwrap();
        let mut second = report(2);
        second.job_id = "job-2".to_string();
        LastRunRecord::from_report(&second, 200).save(&path).unwrap();

        let loaded = LastRunRecord::load(&path).unwrap();
        assert_eq!(loaded.job_id, "job-2");
        assert_eq!(loaded.tool_log.len(), 2);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
