/// Structured report logging
/// Writes every report record as one JSON line, to the `log` facade and
/// optionally to an append-only audit file.
use crate::config::types::{ExperimentError, Result};
use crate::observability::{ReportRecord, ReportSink};
use crate::verdict::taxonomy::{DelayClass, MetricEvent};
use log::{error, info};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

pub const LOG_TARGET: &str = "lookup_race::report";

/// Report sink backed by the log facade plus an optional JSON-lines file
pub struct AuditSink {
    audit_file: Option<Mutex<File>>,
    audit_path: Option<PathBuf>,
}

impl AuditSink {
    /// Log-only sink
    pub fn new() -> Self {
        Self {
            audit_file: None,
            audit_path: None,
        }
    }

    /// Also append every record to `audit_path`, creating parent directories
    pub fn with_file(audit_path: &Path) -> Result<Self> {
        if let Some(parent) = audit_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ExperimentError::Config(format!("Failed to create audit log directory: {}", e))
                })?;
            }
        }

        let audit_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(audit_path)
            .map_err(|e| ExperimentError::Config(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            audit_file: Some(Mutex::new(audit_file)),
            audit_path: Some(audit_path.to_path_buf()),
        })
    }

    pub fn audit_path(&self) -> Option<&Path> {
        self.audit_path.as_deref()
    }

    fn entry(record: &ReportRecord) -> serde_json::Value {
        let mut entry = serde_json::json!({
            "timestamp": SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            "experiment_id": record.experiment_id.to_string(),
            "name": record.name,
            "event": record.event,
        });

        // Flatten the figure most dashboards want into a plain number.
        match record.event {
            MetricEvent::Duration { duration, .. } => {
                entry["value_ms"] = serde_json::json!(duration.as_micros() as f64 / 1000.0);
            }
            MetricEvent::Delay {
                delay: DelayClass::Delayed(by),
                ..
            } => {
                entry["value_ms"] = serde_json::json!(by.as_micros() as f64 / 1000.0);
            }
            _ => {}
        }
        entry
    }
}

impl Default for AuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink for AuditSink {
    fn emit(&self, record: &ReportRecord) {
        let entry = Self::entry(record);
        info!(target: LOG_TARGET, "{}", entry);

        if let Some(audit_file) = &self.audit_file {
            if let Ok(mut file) = audit_file.lock() {
                if let Err(e) = writeln!(file, "{}", entry) {
                    error!("Failed to write to report audit log: {}", e);
                }
                if let Err(e) = file.flush() {
                    error!("Failed to flush report audit log: {}", e);
                }
            } else {
                error!("Failed to acquire lock on report audit file");
            }
        }
    }
}
