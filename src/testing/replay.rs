//! Discrete-event replay of a navigation.
//!
//! A [`Scenario`] scripts when each leg starts, how every mechanism answers
//! and after how long, and when the external signals (eligibility, response
//! processing, owner teardown) arrive. [`run_scenario`] drives an
//! [`Experimenter`] through it on a [`ManualClock`], so the same scenario
//! always produces the same decisions and report.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::config::experiment::ExperimentConfig;
use crate::config::types::{ExperimentError, LegIndex, Result};
use crate::experiment::{
    CancellationReason, CheckStart, Conclusion, DecisionCallback, Experimenter, MechanismSet,
};
use crate::mechanism::clock::ManualClock;
use crate::mechanism::{MechanismKind, MechanismOutcome};
use crate::observability::{FanoutSink, ReportRecord, ReportSink};
use crate::testing::scripted::{RecordingSink, ScriptedMechanism, Timeline};

/// How one mechanism answers on one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MechanismScript {
    pub outcome: MechanismOutcome,
    /// Absent means the mechanism answers synchronously
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

impl MechanismScript {
    pub fn after(outcome: MechanismOutcome, latency_ms: u64) -> Self {
        Self {
            outcome,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn immediate(outcome: MechanismOutcome) -> Self {
        Self {
            outcome,
            latency_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EligibilityScript {
    pub at_ms: u64,
    pub eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegScript {
    /// Defaults to the leg's position in the scenario
    #[serde(default)]
    pub leg: Option<LegIndex>,
    pub start_ms: u64,
    pub url_real_time: MechanismScript,
    pub hash_database: MechanismScript,
    pub hash_real_time: MechanismScript,
    #[serde(default)]
    pub eligibility: Vec<EligibilityScript>,
}

impl LegScript {
    pub fn mechanism(&self, kind: MechanismKind) -> &MechanismScript {
        match kind {
            MechanismKind::UrlRealTime => &self.url_real_time,
            MechanismKind::HashDatabase => &self.hash_database,
            MechanismKind::HashRealTime => &self.hash_real_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OwnerGoneScript {
    pub at_ms: u64,
    pub reason: CancellationReason,
}

/// A scripted navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    pub legs: Vec<LegScript>,
    #[serde(default)]
    pub response_reached_ms: Option<u64>,
    #[serde(default)]
    pub owner_gone: Vec<OwnerGoneScript>,
}

impl Scenario {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ExperimentError::Scenario(format!(
                "Failed to read scenario {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(content)
            .map_err(|e| ExperimentError::Scenario(format!("Failed to parse scenario: {}", e)))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.legs.is_empty() {
            return Err(ExperimentError::Scenario("scenario has no legs".to_string()));
        }
        for pair in self.legs.windows(2) {
            if pair[1].start_ms < pair[0].start_ms {
                return Err(ExperimentError::Scenario(format!(
                    "leg starting at {}ms is listed after one starting at {}ms",
                    pair[1].start_ms, pair[0].start_ms
                )));
            }
        }
        Ok(())
    }

    pub fn leg_index(&self, position: usize) -> LegIndex {
        self.legs[position].leg.unwrap_or(position as LegIndex)
    }
}

/// Canonical decision delivered through the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub leg: LegIndex,
    pub at_ms: u64,
    pub timed_out: bool,
    pub outcome: Option<MechanismOutcome>,
}

/// Canonical outcome returned directly from `run_checks`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmediateDecision {
    pub leg: LegIndex,
    pub outcome: MechanismOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedLeg {
    pub leg: LegIndex,
    pub error: String,
}

/// Everything observable from one replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayOutcome {
    pub experiment_id: Uuid,
    pub decisions: Vec<DecisionRecord>,
    pub immediate: Vec<ImmediateDecision>,
    pub rejected: Vec<RejectedLeg>,
    pub conclusion: Option<Conclusion>,
    pub records: Vec<ReportRecord>,
    /// Peak number of concurrently running lookups per mechanism
    pub max_in_flight: BTreeMap<MechanismKind, usize>,
}

/// An experimenter on a manual clock with scripted mechanisms
pub struct Simulation {
    clock: ManualClock,
    timeline: Timeline,
    experimenter: Experimenter,
    max_in_flight: [usize; 3],
}

impl Simulation {
    pub fn new(config: ExperimentConfig, sink: Arc<dyn ReportSink>) -> Self {
        let clock = ManualClock::new();
        let experimenter = Experimenter::new(config, Arc::new(clock.clone()), sink);
        Self {
            clock,
            timeline: Timeline::new(),
            experimenter,
            max_in_flight: [0; 3],
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn experimenter(&self) -> &Experimenter {
        &self.experimenter
    }

    pub fn experimenter_mut(&mut self) -> &mut Experimenter {
        &mut self.experimenter
    }

    /// Simulated time since the start
    pub fn now(&self) -> Duration {
        self.clock.offset()
    }

    pub fn max_in_flight(&self, kind: MechanismKind) -> usize {
        self.max_in_flight[kind.index()]
    }

    pub fn scripted(&self, script: &MechanismScript) -> ScriptedMechanism {
        ScriptedMechanism::new(
            self.timeline.clone(),
            self.clock.clone(),
            script.outcome,
            script.latency_ms.map(Duration::from_millis),
        )
    }

    pub fn mechanism_set(&self, leg: &LegScript) -> MechanismSet {
        MechanismSet {
            url_real_time: Box::new(self.scripted(&leg.url_real_time)),
            hash_database: Box::new(self.scripted(&leg.hash_database)),
            hash_real_time: Box::new(self.scripted(&leg.hash_real_time)),
        }
    }

    pub fn run_checks(
        &mut self,
        leg: LegIndex,
        decision: DecisionCallback,
        mechanisms: MechanismSet,
    ) -> Result<CheckStart> {
        let start = self.experimenter.run_checks(leg, decision, mechanisms);
        self.observe();
        start
    }

    /// Deliver every completion due up to `target`, then move the clock there.
    /// Completions due exactly at `target` are delivered.
    pub fn advance_to(&mut self, target: Duration) {
        while let Some(due) = self.timeline.next_due().filter(|due| *due <= target) {
            self.clock.set_offset(due);
            while let Some((handle, outcome)) = self.timeline.pop_due(due) {
                handle.complete(outcome);
            }
            self.experimenter.pump();
            self.observe();
        }
        self.clock.set_offset(target);
    }

    pub fn advance_by(&mut self, delta: Duration) {
        let target = self.now() + delta;
        self.advance_to(target);
    }

    /// Deliver everything still scheduled
    pub fn settle(&mut self) {
        while let Some(due) = self.timeline.next_due() {
            self.advance_to(due.max(self.now()));
        }
    }

    fn observe(&mut self) {
        for kind in MechanismKind::ALL {
            let in_flight = self.experimenter.in_flight(kind);
            let peak = &mut self.max_in_flight[kind.index()];
            *peak = (*peak).max(in_flight);
        }
    }
}

enum Action {
    StartLeg(usize),
    Eligibility(LegIndex, bool),
    ResponseReached,
    OwnerGone(CancellationReason),
}

fn timed_actions(scenario: &Scenario) -> Vec<(u64, Action)> {
    let mut actions = Vec::new();
    for (position, leg) in scenario.legs.iter().enumerate() {
        actions.push((leg.start_ms, Action::StartLeg(position)));
    }
    for (position, leg) in scenario.legs.iter().enumerate() {
        let index = scenario.leg_index(position);
        for step in &leg.eligibility {
            actions.push((step.at_ms, Action::Eligibility(index, step.eligible)));
        }
    }
    if let Some(at_ms) = scenario.response_reached_ms {
        actions.push((at_ms, Action::ResponseReached));
    }
    for gone in &scenario.owner_gone {
        actions.push((gone.at_ms, Action::OwnerGone(gone.reason)));
    }
    // Stable, so same-instant actions keep the order above.
    actions.sort_by_key(|(at_ms, _)| *at_ms);
    actions
}

pub fn run_scenario(scenario: &Scenario, config: ExperimentConfig) -> Result<ReplayOutcome> {
    run_scenario_with_sink(scenario, config, None)
}

/// Replay `scenario`, also forwarding report records to `sink` if given.
pub fn run_scenario_with_sink(
    scenario: &Scenario,
    config: ExperimentConfig,
    sink: Option<Arc<dyn ReportSink>>,
) -> Result<ReplayOutcome> {
    scenario.validate()?;
    config.validate()?;

    let recording = Arc::new(RecordingSink::new());
    let mut fanout = FanoutSink::new().with(recording.clone());
    if let Some(sink) = sink {
        fanout = fanout.with(sink);
    }

    let mut sim = Simulation::new(config, Arc::new(fanout));
    let decisions: Arc<Mutex<Vec<DecisionRecord>>> = Arc::default();
    let mut immediate = Vec::new();
    let mut rejected = Vec::new();

    for (at_ms, action) in timed_actions(scenario) {
        sim.advance_to(Duration::from_millis(at_ms));
        match action {
            Action::StartLeg(position) => {
                let leg = scenario.leg_index(position);
                let mechanisms = sim.mechanism_set(&scenario.legs[position]);
                let sink = decisions.clone();
                let clock = sim.clock().clone();
                let decision: DecisionCallback = Box::new(move |timed_out, outcome| {
                    sink.lock().unwrap_or_else(PoisonError::into_inner).push(DecisionRecord {
                        leg,
                        at_ms: clock.offset().as_millis() as u64,
                        timed_out,
                        outcome,
                    });
                });
                match sim.run_checks(leg, decision, mechanisms) {
                    Ok(CheckStart::Resolved(outcome)) => {
                        immediate.push(ImmediateDecision { leg, outcome })
                    }
                    Ok(CheckStart::Pending) => {}
                    Err(e) => {
                        warn!("Replay: leg {} rejected: {}", leg, e);
                        rejected.push(RejectedLeg {
                            leg,
                            error: e.to_string(),
                        });
                    }
                }
            }
            Action::Eligibility(leg, eligible) => {
                sim.experimenter_mut().set_check_eligibility(leg, eligible)
            }
            Action::ResponseReached => {
                let at = sim.clock().now();
                sim.experimenter_mut().on_will_process_response_reached(at);
            }
            Action::OwnerGone(reason) => sim.experimenter_mut().on_owner_gone(reason),
        }
    }
    sim.settle();

    debug!(
        "Replay of {} finished at {:?}",
        scenario.name.as_deref().unwrap_or("<unnamed>"),
        sim.now()
    );

    let decisions = decisions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    Ok(ReplayOutcome {
        experiment_id: sim.experimenter().id(),
        decisions,
        immediate,
        rejected,
        conclusion: sim.experimenter().conclusion(),
        records: recording.records(),
        max_in_flight: MechanismKind::ALL
            .iter()
            .map(|&kind| (kind, sim.max_in_flight(kind)))
            .collect(),
    })
}
