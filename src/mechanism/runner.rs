//! Per-leg wrapper around one lookup mechanism.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::mechanism::clock::Clock;
use crate::mechanism::{CompletionHandle, LookupMechanism, MechanismKind, StartOutcome};

/// Owns one mechanism for one leg and remembers when it was started.
///
/// The mechanism is kept alive until the owning leg is torn down, so a
/// pending lookup is cancelled simply by dropping the runner.
pub struct MechanismRunner {
    kind: MechanismKind,
    mechanism: Box<dyn LookupMechanism>,
    clock: Arc<dyn Clock>,
    started_at: Option<Instant>,
}

impl MechanismRunner {
    pub fn new(kind: MechanismKind, mechanism: Box<dyn LookupMechanism>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            mechanism,
            clock,
            started_at: None,
        }
    }

    pub fn kind(&self) -> MechanismKind {
        self.kind
    }

    /// Start the lookup. Returns the outcome if it resolved synchronously.
    pub fn run(&mut self, completion: CompletionHandle) -> StartOutcome {
        debug_assert!(self.started_at.is_none(), "{} runner started twice", self.kind);
        self.started_at = Some(self.clock.now());
        self.mechanism.start(completion)
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Time since `run`; zero if never started
    pub fn elapsed(&self) -> Duration {
        self.elapsed_until(self.clock.now())
    }

    pub fn elapsed_until(&self, at: Instant) -> Duration {
        self.started_at
            .map(|start| at.saturating_duration_since(start))
            .unwrap_or_default()
    }
}

impl fmt::Debug for MechanismRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MechanismRunner")
            .field("kind", &self.kind)
            .field("started_at", &self.started_at)
            .finish()
    }
}
