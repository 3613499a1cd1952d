//! Observability
//!
//! Destinations for the comparison events an experiment emits when it
//! concludes: a structured JSON audit log and in-process metrics.

pub mod audit;
pub mod metrics;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::verdict::taxonomy::MetricEvent;

/// One named event tagged with the experiment it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub experiment_id: Uuid,
    pub name: String,
    pub event: MetricEvent,
}

/// Receives report records. Called from the experimenter's executor only.
pub trait ReportSink: Send + Sync {
    fn emit(&self, record: &ReportRecord);
}

/// Forwards every record to each inner sink in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for FanoutSink {
    fn emit(&self, record: &ReportRecord) {
        for sink in &self.sinks {
            sink.emit(record);
        }
    }
}
