//! Lookup race experiments
//!
//! One [`Experimenter`] per navigation. It races the canonical mechanism
//! against two shadow mechanisms on every redirect leg, forwards the
//! canonical outcome to the caller, and reports how the three compared once
//! every leg is settled.

pub mod check;
pub mod experimenter;
pub mod queue;

use serde::{Deserialize, Serialize};

use crate::mechanism::MechanismOutcome;

pub use check::{CheckToRun, DecisionCallback, MechanismResult, MechanismSet, RunDetails};
pub use experimenter::Experimenter;
pub use queue::SecondaryQueue;

/// What `run_checks` tells the caller about the canonical lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStart {
    /// Decided synchronously; the decision callback will not fire
    Resolved(MechanismOutcome),
    /// The decision callback fires once the lookup completes
    Pending,
}

/// Which external owner went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// The per-navigation consumer of the decision. Counts as a completion
    /// trigger if it never reported processing the response.
    ResponseConsumer,
    /// The issuer of the per-leg checks. Aborts without a report if the most
    /// recent leg's canonical lookup is still pending.
    CheckIssuer,
}

/// How an experiment ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    /// The comparison report was emitted
    Reported,
    /// Settled, but no leg was eligible, so nothing was emitted
    NothingEligible,
    /// Torn down early with no report
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Concluded(Conclusion),
}
