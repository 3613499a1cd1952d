/// Scripted mechanisms for deterministic runs
/// Mechanisms park their completion handle on a shared timeline instead of
/// doing real work; the driver completes them once simulated time arrives.
use crate::mechanism::clock::ManualClock;
use crate::mechanism::{CompletionHandle, LookupMechanism, MechanismOutcome, StartOutcome};
use crate::observability::{ReportRecord, ReportSink};
use crate::verdict::taxonomy::MetricEvent;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct PendingCompletion {
    due: Duration,
    seq: u64,
    handle: CompletionHandle,
    outcome: MechanismOutcome,
}

#[derive(Default)]
struct TimelineState {
    next_seq: u64,
    pending: Vec<PendingCompletion>,
}

/// Completions waiting for their simulated due time.
///
/// Ties are broken by scheduling order.
#[derive(Clone, Default)]
pub struct Timeline {
    state: Arc<Mutex<TimelineState>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn schedule(&self, due: Duration, handle: CompletionHandle, outcome: MechanismOutcome) {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(PendingCompletion {
            due,
            seq,
            handle,
            outcome,
        });
    }

    /// Earliest due time still pending
    pub fn next_due(&self) -> Option<Duration> {
        self.lock().pending.iter().map(|p| p.due).min()
    }

    /// Remove the earliest completion due at or before `now`
    pub fn pop_due(&self, now: Duration) -> Option<(CompletionHandle, MechanismOutcome)> {
        let mut state = self.lock();
        let index = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= now)
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(i, _)| i)?;
        let pending = state.pending.swap_remove(index);
        Some((pending.handle, pending.outcome))
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mechanism that resolves with a fixed outcome.
///
/// Without a latency it answers synchronously from `start`; otherwise the
/// completion is scheduled `latency` after the simulated start time.
pub struct ScriptedMechanism {
    timeline: Timeline,
    clock: ManualClock,
    outcome: MechanismOutcome,
    latency: Option<Duration>,
}

impl ScriptedMechanism {
    pub fn new(
        timeline: Timeline,
        clock: ManualClock,
        outcome: MechanismOutcome,
        latency: Option<Duration>,
    ) -> Self {
        Self {
            timeline,
            clock,
            outcome,
            latency,
        }
    }
}

impl LookupMechanism for ScriptedMechanism {
    fn start(&mut self, completion: CompletionHandle) -> StartOutcome {
        match self.latency {
            None => StartOutcome::Resolved(self.outcome),
            Some(latency) => {
                self.timeline
                    .schedule(self.clock.offset() + latency, completion, self.outcome);
                StartOutcome::Pending
            }
        }
    }
}

/// Keeps every record in memory
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<ReportRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ReportRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn records(&self) -> Vec<ReportRecord> {
        self.lock().clone()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.lock().iter().map(|r| r.event).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|r| r.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl ReportSink for RecordingSink {
    fn emit(&self, record: &ReportRecord) {
        self.lock().push(record.clone());
    }
}
