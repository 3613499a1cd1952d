//! Lookup mechanisms
//!
//! The three interchangeable "is this resource dangerous" strategies, the
//! capability trait they implement, and the one-shot handle through which a
//! pending lookup reports back to its experiment.

pub mod clock;
pub mod runner;

use crossbeam_channel::Sender;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::mechanism::clock::Clock;

/// The three lookup strategies raced against each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanismKind {
    /// Full URL sent to a remote real-time service
    UrlRealTime,
    /// Hash-prefix match against the local database
    HashDatabase,
    /// Hash-prefix match against a remote real-time service
    HashRealTime,
}

impl MechanismKind {
    pub const ALL: [MechanismKind; 3] = [
        MechanismKind::UrlRealTime,
        MechanismKind::HashDatabase,
        MechanismKind::HashRealTime,
    ];

    /// The mechanism whose outcome decides whether the resource is blocked
    pub const CANONICAL: MechanismKind = MechanismKind::UrlRealTime;

    /// Shadow mechanisms, each limited to one in-flight lookup per experiment
    pub const SECONDARY: [MechanismKind; 2] =
        [MechanismKind::HashDatabase, MechanismKind::HashRealTime];

    /// Stable position used for per-kind arrays
    pub fn index(self) -> usize {
        match self {
            MechanismKind::UrlRealTime => 0,
            MechanismKind::HashDatabase => 1,
            MechanismKind::HashRealTime => 2,
        }
    }

    pub fn is_canonical(self) -> bool {
        self == Self::CANONICAL
    }

    /// Name used inside metric names
    pub fn metric_name(self) -> &'static str {
        match self {
            MechanismKind::UrlRealTime => "UrlRealTime",
            MechanismKind::HashDatabase => "HashDatabase",
            MechanismKind::HashRealTime => "HashRealTime",
        }
    }
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric_name())
    }
}

/// Threat category carried by an unsafe verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    Phishing,
    Malware,
    UnwantedSoftware,
    Billing,
}

/// Terminal result of one lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanismOutcome {
    Verdict(ThreatKind),
    Safe,
    TimedOut,
}

impl MechanismOutcome {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, MechanismOutcome::TimedOut)
    }

    /// Whether this outcome would have shown a warning
    pub fn has_warning(&self) -> bool {
        matches!(self, MechanismOutcome::Verdict(_))
    }
}

/// What a mechanism reports when asked to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Answered without waiting; the completion handle is dropped unused
    Resolved(MechanismOutcome),
    /// The completion handle will be completed later
    Pending,
}

/// A lookup strategy, constructed by the caller for one resource.
pub trait LookupMechanism: Send {
    fn start(&mut self, completion: CompletionHandle) -> StartOutcome;
}

/// Identifies which (experiment generation, leg slot, mechanism) a completion belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionToken {
    pub generation: u64,
    pub slot: usize,
    pub kind: MechanismKind,
}

/// Message delivered to the experimenter's inbox
#[derive(Debug, Clone)]
pub struct Completion {
    pub token: CompletionToken,
    pub outcome: MechanismOutcome,
    pub completed_at: Instant,
}

/// One-shot completion channel for a pending lookup.
///
/// `complete` consumes the handle, so a mechanism cannot report twice.
/// Completing after the experiment concluded is harmless: the message is
/// either undeliverable or carries a stale generation and is dropped.
pub struct CompletionHandle {
    token: CompletionToken,
    inbox: Sender<Completion>,
    clock: Arc<dyn Clock>,
}

impl CompletionHandle {
    pub(crate) fn new(token: CompletionToken, inbox: Sender<Completion>, clock: Arc<dyn Clock>) -> Self {
        Self {
            token,
            inbox,
            clock,
        }
    }

    pub fn token(&self) -> CompletionToken {
        self.token
    }

    pub fn complete(self, outcome: MechanismOutcome) {
        let completion = Completion {
            token: self.token,
            outcome,
            completed_at: self.clock.now(),
        };
        if self.inbox.send(completion).is_err() {
            debug!(
                "{} completion for slot {} dropped: experiment is gone",
                self.token.kind, self.token.slot
            );
        }
    }
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("token", &self.token)
            .finish()
    }
}
