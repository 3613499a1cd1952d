//! Per-leg records: one `CheckToRun` per redirect leg, holding a
//! `RunDetails` for each of the three mechanisms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::types::LegIndex;
use crate::mechanism::clock::Clock;
use crate::mechanism::runner::MechanismRunner;
use crate::mechanism::{LookupMechanism, MechanismKind, MechanismOutcome};
use crate::verdict::aggregate::LegEvidence;

/// Carries the canonical decision back to the caller as `(timed_out, outcome)`.
/// `outcome` is `None` when the lookup timed out.
///
/// Fires at most once. It never fires when the canonical lookup resolves
/// synchronously, since that outcome comes back from
/// [`Experimenter::run_checks`](crate::experiment::Experimenter::run_checks) as
/// [`CheckStart::Resolved`](crate::experiment::CheckStart::Resolved), nor when
/// the experiment is torn down before the canonical lookup completes.
pub type DecisionCallback = Box<dyn FnOnce(bool, Option<MechanismOutcome>) + Send>;

/// Measured result of one mechanism on one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismResult {
    pub time_taken: Duration,
    pub had_warning: bool,
    pub timed_out: bool,
}

impl MechanismResult {
    pub fn from_outcome(outcome: MechanismOutcome, time_taken: Duration) -> Self {
        Self {
            time_taken,
            had_warning: outcome.has_warning(),
            timed_out: outcome.is_timed_out(),
        }
    }
}

/// The three mechanisms a caller supplies for one leg
pub struct MechanismSet {
    pub url_real_time: Box<dyn LookupMechanism>,
    pub hash_database: Box<dyn LookupMechanism>,
    pub hash_real_time: Box<dyn LookupMechanism>,
}

/// Runner, result, and (canonical only) pending decision for one mechanism
pub struct RunDetails {
    runner: MechanismRunner,
    result: Option<MechanismResult>,
    decision: Option<DecisionCallback>,
}

impl RunDetails {
    fn new(runner: MechanismRunner, decision: Option<DecisionCallback>) -> Self {
        Self {
            runner,
            result: None,
            decision,
        }
    }

    pub fn runner(&self) -> &MechanismRunner {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut MechanismRunner {
        &mut self.runner
    }

    pub fn result(&self) -> Option<&MechanismResult> {
        self.result.as_ref()
    }

    /// Started and still waiting for a result
    pub fn is_in_flight(&self) -> bool {
        self.runner.is_started() && self.result.is_none()
    }

    pub fn completed_at(&self) -> Option<Instant> {
        let started = self.runner.started_at()?;
        self.result.map(|r| started + r.time_taken)
    }

    /// Store the result. Returns false if one was already recorded.
    pub fn record(&mut self, result: MechanismResult) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.result = Some(result);
        true
    }

    pub fn take_decision(&mut self) -> Option<DecisionCallback> {
        self.decision.take()
    }
}

impl fmt::Debug for RunDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunDetails")
            .field("runner", &self.runner)
            .field("result", &self.result)
            .field("decision_pending", &self.decision.is_some())
            .finish()
    }
}

/// Everything tracked for one leg of the navigation
#[derive(Debug)]
pub struct CheckToRun {
    leg: LegIndex,
    runs: [RunDetails; 3],
    eligible: Option<bool>,
}

impl CheckToRun {
    pub fn new(
        leg: LegIndex,
        mechanisms: MechanismSet,
        decision: DecisionCallback,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let MechanismSet {
            url_real_time,
            hash_database,
            hash_real_time,
        } = mechanisms;

        // Ordered by MechanismKind::index.
        let runs = [
            RunDetails::new(
                MechanismRunner::new(MechanismKind::UrlRealTime, url_real_time, clock.clone()),
                Some(decision),
            ),
            RunDetails::new(
                MechanismRunner::new(MechanismKind::HashDatabase, hash_database, clock.clone()),
                None,
            ),
            RunDetails::new(
                MechanismRunner::new(MechanismKind::HashRealTime, hash_real_time, clock),
                None,
            ),
        ];

        Self {
            leg,
            runs,
            eligible: None,
        }
    }

    pub fn leg(&self) -> LegIndex {
        self.leg
    }

    pub fn run(&self, kind: MechanismKind) -> &RunDetails {
        &self.runs[kind.index()]
    }

    pub fn run_mut(&mut self, kind: MechanismKind) -> &mut RunDetails {
        &mut self.runs[kind.index()]
    }

    pub fn eligible(&self) -> Option<bool> {
        self.eligible
    }

    /// First call wins. Returns true if this call decided eligibility.
    pub fn set_eligible(&mut self, eligible: bool) -> bool {
        if self.eligible.is_some() {
            return false;
        }
        self.eligible = Some(eligible);
        true
    }

    /// All three mechanisms have reported
    pub fn has_all_results(&self) -> bool {
        self.runs.iter().all(|run| run.result.is_some())
    }

    /// Snapshot for the aggregator; `None` until results and eligibility are known
    pub fn evidence(&self) -> Option<LegEvidence> {
        let eligible = self.eligible?;
        let [url, hash_db, hash_rt] = &self.runs;
        Some(LegEvidence {
            leg: self.leg,
            eligible,
            results: [*url.result()?, *hash_db.result()?, *hash_rt.result()?],
            completed_at: [url.completed_at()?, hash_db.completed_at()?, hash_rt.completed_at()?],
        })
    }
}
