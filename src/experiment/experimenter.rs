//! The per-navigation orchestrator.
//!
//! Legs live in an index-addressed arena (`checks`) that is only ever
//! cleared as a whole. Mechanisms never call back into the experimenter:
//! they complete a [`CompletionHandle`], which queues a message on the
//! experimenter's inbox, and the owner drains the inbox with [`Experimenter::pump`].
//! Teardown therefore never happens underneath a running call; it clears the
//! arena and bumps `generation`, which turns every outstanding handle stale.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::experiment::ExperimentConfig;
use crate::config::types::{ExperimentError, LegIndex, Result};
use crate::experiment::check::{CheckToRun, DecisionCallback, MechanismResult, MechanismSet};
use crate::experiment::queue::SecondaryQueue;
use crate::experiment::{CancellationReason, CheckStart, Conclusion, Phase};
use crate::mechanism::clock::Clock;
use crate::mechanism::{Completion, CompletionHandle, CompletionToken, MechanismKind, StartOutcome};
use crate::observability::{ReportRecord, ReportSink};
use crate::verdict::aggregate::{ExperimentReport, LegEvidence};

pub struct Experimenter {
    id: Uuid,
    config: ExperimentConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ReportSink>,
    inbox: Receiver<Completion>,
    outbox: Sender<Completion>,
    checks: Vec<CheckToRun>,
    leg_slots: HashMap<LegIndex, usize>,
    secondary: [SecondaryQueue; 2],
    first_leg_started: Option<Instant>,
    response_reached: Option<Instant>,
    consumer_gone: bool,
    eligibility_determined: usize,
    generation: u64,
    phase: Phase,
}

impl Experimenter {
    pub fn new(config: ExperimentConfig, clock: Arc<dyn Clock>, sink: Arc<dyn ReportSink>) -> Self {
        let (outbox, inbox) = crossbeam_channel::unbounded();
        let [first, second] = MechanismKind::SECONDARY;
        let id = Uuid::new_v4();
        debug!("Created lookup race experiment {}", id);

        Self {
            id,
            config,
            clock,
            sink,
            inbox,
            outbox,
            checks: Vec::new(),
            leg_slots: HashMap::new(),
            secondary: [SecondaryQueue::new(first), SecondaryQueue::new(second)],
            first_leg_started: None,
            response_reached: None,
            consumer_gone: false,
            eligibility_determined: 0,
            generation: 0,
            phase: Phase::Running,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_concluded(&self) -> bool {
        matches!(self.phase, Phase::Concluded(_))
    }

    pub fn conclusion(&self) -> Option<Conclusion> {
        match self.phase {
            Phase::Running => None,
            Phase::Concluded(conclusion) => Some(conclusion),
        }
    }

    pub fn leg_count(&self) -> usize {
        self.checks.len()
    }

    pub fn check(&self, leg: LegIndex) -> Option<&CheckToRun> {
        self.leg_slots.get(&leg).map(|&slot| &self.checks[slot])
    }

    pub fn result(&self, leg: LegIndex, kind: MechanismKind) -> Option<MechanismResult> {
        self.check(leg)?.run(kind).result().copied()
    }

    /// Runners of `kind` started but not yet completed, across all legs
    pub fn in_flight(&self, kind: MechanismKind) -> usize {
        self.checks
            .iter()
            .filter(|check| check.run(kind).is_in_flight())
            .count()
    }

    /// Time since the first leg was registered
    pub fn age(&self) -> Option<Duration> {
        self.first_leg_started
            .map(|start| self.clock.now().saturating_duration_since(start))
    }

    /// Register the next leg and start its lookups.
    ///
    /// The canonical mechanism starts immediately. Each secondary mechanism
    /// starts only if no other leg's instance of that kind is in flight;
    /// otherwise it waits for the in-flight one to complete.
    pub fn run_checks(
        &mut self,
        leg: LegIndex,
        decision: DecisionCallback,
        mechanisms: MechanismSet,
    ) -> Result<CheckStart> {
        if self.is_concluded() {
            return Err(ExperimentError::Concluded);
        }
        if let Some(last) = self.checks.last().map(CheckToRun::leg) {
            if leg <= last {
                if self.leg_slots.contains_key(&leg) {
                    debug_assert!(false, "leg {} registered twice", leg);
                    return Err(ExperimentError::DuplicateLeg { leg });
                }
                return Err(ExperimentError::OutOfOrderLeg { leg, last });
            }
            if leg != last + 1 {
                warn!(
                    "Experiment {}: leg {} follows leg {}, skipping {} index(es)",
                    self.id,
                    leg,
                    last,
                    leg - last - 1
                );
            }
        }
        if self.checks.len() >= self.config.max_legs {
            return Err(ExperimentError::TooManyLegs {
                max: self.config.max_legs,
            });
        }

        let slot = self.checks.len();
        if self.first_leg_started.is_none() {
            self.first_leg_started = Some(self.clock.now());
        }
        self.checks
            .push(CheckToRun::new(leg, mechanisms, decision, self.clock.clone()));
        self.leg_slots.insert(leg, slot);
        debug!("Experiment {}: registered leg {} in slot {}", self.id, leg, slot);

        let canonical = MechanismKind::CANONICAL;
        let handle = self.handle(slot, canonical);
        let run = self.checks[slot].run_mut(canonical);
        let start = match run.runner_mut().run(handle) {
            StartOutcome::Resolved(outcome) => {
                // The caller acts on the returned outcome directly.
                drop(run.take_decision());
                let time_taken = run.runner().elapsed();
                run.record(MechanismResult::from_outcome(outcome, time_taken));
                CheckStart::Resolved(outcome)
            }
            StartOutcome::Pending => CheckStart::Pending,
        };

        for kind in MechanismKind::SECONDARY {
            self.advance_secondary(kind);
        }

        Ok(start)
    }

    /// Record whether `leg` would have surfaced a warning. First call wins.
    pub fn set_check_eligibility(&mut self, leg: LegIndex, eligible: bool) {
        if self.is_concluded() {
            debug!("Experiment {}: eligibility for leg {} after conclusion", self.id, leg);
            return;
        }
        let Some(&slot) = self.leg_slots.get(&leg) else {
            debug!("Experiment {}: eligibility for unknown leg {}", self.id, leg);
            return;
        };
        if !self.checks[slot].set_eligible(eligible) {
            return;
        }
        self.eligibility_determined += 1;
        self.maybe_complete();
    }

    /// The consumer no longer depends on the canonical path for the most recent leg.
    pub fn on_will_process_response_reached(&mut self, at: Instant) {
        if self.is_concluded() {
            return;
        }
        self.response_reached = Some(at);
        self.maybe_complete();
    }

    pub fn on_owner_gone(&mut self, reason: CancellationReason) {
        if self.is_concluded() {
            return;
        }
        match reason {
            CancellationReason::ResponseConsumer => {
                if self.response_reached.is_none() {
                    debug!("Experiment {}: response consumer gone before processing", self.id);
                    self.consumer_gone = true;
                    self.maybe_complete();
                }
            }
            CancellationReason::CheckIssuer => {
                let canonical_pending = self
                    .checks
                    .last()
                    .is_some_and(|check| check.run(MechanismKind::CANONICAL).result().is_none());
                if canonical_pending {
                    info!(
                        "Experiment {}: check issuer gone with canonical lookup pending; aborting",
                        self.id
                    );
                    self.teardown(Conclusion::Aborted);
                }
            }
        }
    }

    /// Handle every completion queued so far. Returns how many were drained.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(completion) = self.inbox.try_recv() {
            self.on_completion(completion);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for a completion, then drain whatever else is queued.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.inbox.recv_timeout(timeout) {
            Ok(completion) => {
                self.on_completion(completion);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }

    fn handle(&self, slot: usize, kind: MechanismKind) -> CompletionHandle {
        let token = CompletionToken {
            generation: self.generation,
            slot,
            kind,
        };
        CompletionHandle::new(token, self.outbox.clone(), self.clock.clone())
    }

    fn queue_index(kind: MechanismKind) -> usize {
        match kind {
            MechanismKind::HashDatabase => 0,
            MechanismKind::HashRealTime => 1,
            MechanismKind::UrlRealTime => unreachable!("canonical mechanism is not queued"),
        }
    }

    /// Start waiting legs of `kind` while the budget is free. Mechanisms
    /// that resolve synchronously release the budget straight away.
    fn advance_secondary(&mut self, kind: MechanismKind) {
        let q = Self::queue_index(kind);
        while let Some(slot) = self.secondary[q].claim_next(self.checks.len()) {
            let handle = self.handle(slot, kind);
            let run = self.checks[slot].run_mut(kind);
            match run.runner_mut().run(handle) {
                StartOutcome::Pending => {
                    debug!("Experiment {}: started {} for slot {}", self.id, kind, slot);
                    break;
                }
                StartOutcome::Resolved(outcome) => {
                    let time_taken = run.runner().elapsed();
                    run.record(MechanismResult::from_outcome(outcome, time_taken));
                    self.secondary[q].finish(slot);
                }
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        let Completion {
            token,
            outcome,
            completed_at,
        } = completion;

        if self.is_concluded() || token.generation != self.generation {
            debug!(
                "Experiment {}: dropping stale {} completion for slot {}",
                self.id, token.kind, token.slot
            );
            return;
        }
        let Some(check) = self.checks.get_mut(token.slot) else {
            warn!("Experiment {}: completion for unknown slot {}", self.id, token.slot);
            return;
        };
        let run = check.run_mut(token.kind);
        if run.result().is_some() {
            warn!(
                "Experiment {}: duplicate {} completion for slot {}",
                self.id, token.kind, token.slot
            );
            return;
        }

        let time_taken = run.runner().elapsed_until(completed_at);
        if token.kind.is_canonical() {
            // The real decision goes out before any bookkeeping.
            if let Some(decision) = run.take_decision() {
                let timed_out = outcome.is_timed_out();
                decision(timed_out, (!timed_out).then_some(outcome));
            }
        }
        run.record(MechanismResult::from_outcome(outcome, time_taken));

        if !token.kind.is_canonical() {
            self.secondary[Self::queue_index(token.kind)].finish(token.slot);
            self.advance_secondary(token.kind);
        }

        self.maybe_complete();
    }

    fn maybe_complete(&mut self) {
        if self.is_concluded() || self.checks.is_empty() {
            return;
        }
        if !self.checks.iter().all(CheckToRun::has_all_results) {
            return;
        }
        if self.eligibility_determined < self.checks.len() {
            return;
        }
        if self.response_reached.is_none() && !self.consumer_gone {
            return;
        }

        let conclusion = if self.checks.iter().any(|check| check.eligible() == Some(true)) {
            self.report();
            Conclusion::Reported
        } else {
            Conclusion::NothingEligible
        };
        self.teardown(conclusion);
    }

    fn report(&self) {
        let evidence: Vec<LegEvidence> = self.checks.iter().filter_map(CheckToRun::evidence).collect();
        let Some(report) = ExperimentReport::build(&evidence, self.response_reached) else {
            return;
        };
        for event in report.events() {
            self.sink.emit(&ReportRecord {
                experiment_id: self.id,
                name: event.name(&self.config.metric_prefix),
                event,
            });
        }
    }

    fn teardown(&mut self, conclusion: Conclusion) {
        info!(
            "Experiment {} concluded ({:?}) after {} leg(s), {:?}",
            self.id,
            conclusion,
            self.checks.len(),
            self.age().unwrap_or_default()
        );
        self.checks.clear();
        self.leg_slots.clear();
        for queue in &mut self.secondary {
            queue.reset();
        }
        self.generation += 1;
        self.phase = Phase::Concluded(conclusion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanism::clock::ManualClock;
    use crate::mechanism::{LookupMechanism, MechanismOutcome, ThreatKind};
    use crate::testing::RecordingSink;
    use std::sync::Mutex;

    type Slot = Arc<Mutex<Option<CompletionHandle>>>;
    type Decisions = Arc<Mutex<Vec<(bool, Option<MechanismOutcome>)>>>;

    struct Parked(Slot);

    impl LookupMechanism for Parked {
        fn start(&mut self, completion: CompletionHandle) -> StartOutcome {
            *self.0.lock().unwrap() = Some(completion);
            StartOutcome::Pending
        }
    }

    struct Immediate(MechanismOutcome);

    impl LookupMechanism for Immediate {
        fn start(&mut self, _completion: CompletionHandle) -> StartOutcome {
            StartOutcome::Resolved(self.0)
        }
    }

    #[derive(Default, Clone)]
    struct LegSlots {
        url: Slot,
        hash_db: Slot,
        hash_rt: Slot,
    }

    impl LegSlots {
        fn slot(&self, kind: MechanismKind) -> &Slot {
            match kind {
                MechanismKind::UrlRealTime => &self.url,
                MechanismKind::HashDatabase => &self.hash_db,
                MechanismKind::HashRealTime => &self.hash_rt,
            }
        }

        fn started(&self, kind: MechanismKind) -> bool {
            self.slot(kind).lock().unwrap().is_some()
        }

        fn complete(&self, kind: MechanismKind, outcome: MechanismOutcome) {
            let handle = self.slot(kind).lock().unwrap().take();
            handle.expect("mechanism not started").complete(outcome);
        }

        fn mechanisms(&self) -> MechanismSet {
            MechanismSet {
                url_real_time: Box::new(Parked(self.url.clone())),
                hash_database: Box::new(Parked(self.hash_db.clone())),
                hash_real_time: Box::new(Parked(self.hash_rt.clone())),
            }
        }
    }

    struct Fixture {
        clock: ManualClock,
        sink: Arc<RecordingSink>,
        experimenter: Experimenter,
        decisions: Decisions,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(ExperimentConfig::default())
        }

        fn with_config(config: ExperimentConfig) -> Self {
            let clock = ManualClock::new();
            let sink = Arc::new(RecordingSink::new());
            let experimenter = Experimenter::new(config, Arc::new(clock.clone()), sink.clone());
            Self {
                clock,
                sink,
                experimenter,
                decisions: Arc::default(),
            }
        }

        fn decision(&self) -> DecisionCallback {
            let decisions = self.decisions.clone();
            Box::new(move |timed_out, outcome| decisions.lock().unwrap().push((timed_out, outcome)))
        }

        fn add_leg(&mut self, leg: LegIndex) -> LegSlots {
            let slots = LegSlots::default();
            let decision = self.decision();
            let start = self
                .experimenter
                .run_checks(leg, decision, slots.mechanisms())
                .unwrap();
            assert_eq!(start, CheckStart::Pending);
            slots
        }

        fn complete_all(&mut self, slots: &LegSlots, outcome: MechanismOutcome) {
            for kind in MechanismKind::ALL {
                slots.complete(kind, outcome);
                self.experimenter.pump();
            }
        }

        fn decisions(&self) -> Vec<(bool, Option<MechanismOutcome>)> {
            self.decisions.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_all_mechanisms_start_for_first_leg() {
        let mut fx = Fixture::new();
        let leg = fx.add_leg(0);
        for kind in MechanismKind::ALL {
            assert!(leg.started(kind), "{} not started", kind);
            assert_eq!(fx.experimenter.in_flight(kind), 1);
        }
    }

    #[test]
    fn test_secondary_waits_for_previous_leg() {
        let mut fx = Fixture::new();
        let first = fx.add_leg(0);
        let second = fx.add_leg(1);

        assert!(second.started(MechanismKind::UrlRealTime));
        assert!(!second.started(MechanismKind::HashDatabase));
        assert!(!second.started(MechanismKind::HashRealTime));

        first.complete(MechanismKind::HashDatabase, MechanismOutcome::Safe);
        fx.experimenter.pump();
        assert!(second.started(MechanismKind::HashDatabase));
        assert!(!second.started(MechanismKind::HashRealTime));
        assert_eq!(fx.experimenter.in_flight(MechanismKind::HashDatabase), 1);
        assert_eq!(fx.experimenter.in_flight(MechanismKind::UrlRealTime), 2);
    }

    #[test]
    fn test_decision_carries_canonical_outcome() {
        let mut fx = Fixture::new();
        let leg = fx.add_leg(0);

        leg.complete(MechanismKind::HashDatabase, MechanismOutcome::Verdict(ThreatKind::Malware));
        fx.experimenter.pump();
        assert!(fx.decisions().is_empty());

        fx.clock.advance(Duration::from_millis(12));
        leg.complete(MechanismKind::UrlRealTime, MechanismOutcome::Safe);
        fx.experimenter.pump();
        assert_eq!(fx.decisions(), vec![(false, Some(MechanismOutcome::Safe))]);
        assert_eq!(
            fx.experimenter.result(0, MechanismKind::UrlRealTime).unwrap().time_taken,
            Duration::from_millis(12)
        );
    }

    #[test]
    fn test_timed_out_decision_has_no_outcome() {
        let mut fx = Fixture::new();
        let leg = fx.add_leg(0);
        leg.complete(MechanismKind::UrlRealTime, MechanismOutcome::TimedOut);
        fx.experimenter.pump();
        assert_eq!(fx.decisions(), vec![(true, None)]);
        assert!(fx.experimenter.result(0, MechanismKind::UrlRealTime).unwrap().timed_out);
    }

    #[test]
    fn test_synchronous_canonical_is_returned_not_called_back() {
        let mut fx = Fixture::new();
        let parked = LegSlots::default();
        let decision = fx.decision();
        let mechanisms = MechanismSet {
            url_real_time: Box::new(Immediate(MechanismOutcome::Safe)),
            hash_database: Box::new(Parked(parked.hash_db.clone())),
            hash_real_time: Box::new(Parked(parked.hash_rt.clone())),
        };
        let start = fx.experimenter.run_checks(0, decision, mechanisms).unwrap();
        assert_eq!(start, CheckStart::Resolved(MechanismOutcome::Safe));
        assert!(fx.decisions().is_empty());
        assert_eq!(
            fx.experimenter.result(0, MechanismKind::UrlRealTime),
            Some(MechanismResult::from_outcome(MechanismOutcome::Safe, Duration::ZERO))
        );

        parked.complete(MechanismKind::HashDatabase, MechanismOutcome::Safe);
        parked.complete(MechanismKind::HashRealTime, MechanismOutcome::Safe);
        fx.experimenter.pump();
        fx.experimenter.set_check_eligibility(0, true);
        fx.experimenter.on_will_process_response_reached(fx.clock.now());
        assert_eq!(fx.experimenter.conclusion(), Some(Conclusion::Reported));
        assert!(fx.decisions().is_empty());
    }

    #[test]
    fn test_synchronous_secondary_frees_budget_for_next_leg() {
        let mut fx = Fixture::new();
        let first = fx.add_leg(0);
        let second = LegSlots::default();
        let decision = fx.decision();
        let mechanisms = MechanismSet {
            url_real_time: Box::new(Parked(second.url.clone())),
            hash_database: Box::new(Immediate(MechanismOutcome::Safe)),
            hash_real_time: Box::new(Parked(second.hash_rt.clone())),
        };
        fx.experimenter.run_checks(1, decision, mechanisms).unwrap();
        let third = fx.add_leg(2);

        // Leg 1's database lookup resolves synchronously once leg 0's finishes,
        // which lets leg 2's start in the same pass.
        first.complete(MechanismKind::HashDatabase, MechanismOutcome::Safe);
        fx.experimenter.pump();
        assert!(fx.experimenter.result(1, MechanismKind::HashDatabase).is_some());
        assert!(third.started(MechanismKind::HashDatabase));
        assert_eq!(fx.experimenter.in_flight(MechanismKind::HashDatabase), 1);
    }

    #[test]
    fn test_gate_waits_for_response_signal() {
        let mut fx = Fixture::new();
        let leg = fx.add_leg(0);
        fx.complete_all(&leg, MechanismOutcome::Safe);
        fx.experimenter.set_check_eligibility(0, true);
        assert_eq!(fx.experimenter.phase(), Phase::Running);

        fx.experimenter.on_will_process_response_reached(fx.clock.now());
        assert_eq!(fx.experimenter.conclusion(), Some(Conclusion::Reported));
        assert!(!fx.sink.records().is_empty());
        assert_eq!(fx.experimenter.leg_count(), 0);
    }

    #[test]
    fn test_consumer_gone_completes_with_unknown_delay() {
        let mut fx = Fixture::new();
        let leg = fx.add_leg(0);
        fx.experimenter.set_check_eligibility(0, true);
        fx.experimenter.on_owner_gone(CancellationReason::ResponseConsumer);
        assert_eq!(fx.experimenter.phase(), Phase::Running);

        fx.complete_all(&leg, MechanismOutcome::Safe);
        assert_eq!(fx.experimenter.conclusion(), Some(Conclusion::Reported));
        assert!(fx
            .sink
            .events()
            .iter()
            .all(|event| !matches!(event, crate::verdict::taxonomy::MetricEvent::Comparison {
                dimension: crate::verdict::taxonomy::ComparisonDimension::Delayed,
                ..
            })));
    }

    #[test]
    fn test_nothing_eligible_emits_nothing() {
        let mut fx = Fixture::new();
        let leg = fx.add_leg(0);
        fx.complete_all(&leg, MechanismOutcome::Verdict(ThreatKind::Phishing));
        fx.experimenter.set_check_eligibility(0, false);
        fx.experimenter.on_will_process_response_reached(fx.clock.now());
        assert_eq!(fx.experimenter.conclusion(), Some(Conclusion::NothingEligible));
        assert!(fx.sink.records().is_empty());
    }

    #[test]
    fn test_check_issuer_gone_aborts_only_when_canonical_pending() {
        let mut fx = Fixture::new();
        let first = fx.add_leg(0);
        first.complete(MechanismKind::UrlRealTime, MechanismOutcome::Safe);
        fx.experimenter.pump();

        fx.experimenter.on_owner_gone(CancellationReason::CheckIssuer);
        assert_eq!(fx.experimenter.phase(), Phase::Running);

        let _second = fx.add_leg(1);
        fx.experimenter.on_owner_gone(CancellationReason::CheckIssuer);
        assert_eq!(fx.experimenter.conclusion(), Some(Conclusion::Aborted));
        assert_eq!(fx.experimenter.leg_count(), 0);
        assert!(fx.sink.records().is_empty());
    }

    #[test]
    fn test_operations_after_teardown_are_ignored() {
        let mut fx = Fixture::new();
        let leg = fx.add_leg(0);
        fx.experimenter.on_owner_gone(CancellationReason::CheckIssuer);
        assert!(fx.experimenter.is_concluded());

        // Late completion from the torn-down leg is stale.
        leg.complete(MechanismKind::HashDatabase, MechanismOutcome::Safe);
        assert_eq!(fx.experimenter.pump(), 1);
        fx.experimenter.set_check_eligibility(0, true);
        fx.experimenter.on_will_process_response_reached(fx.clock.now());
        fx.experimenter.on_owner_gone(CancellationReason::ResponseConsumer);
        assert_eq!(fx.experimenter.conclusion(), Some(Conclusion::Aborted));

        let decision = fx.decision();
        let err = fx
            .experimenter
            .run_checks(1, decision, LegSlots::default().mechanisms())
            .unwrap_err();
        assert!(matches!(err, ExperimentError::Concluded));
        assert!(fx.decisions().is_empty());
    }

    #[test]
    fn test_out_of_order_leg_rejected() {
        let mut fx = Fixture::new();
        fx.add_leg(0);
        fx.add_leg(2);
        let decision = fx.decision();
        let err = fx
            .experimenter
            .run_checks(1, decision, LegSlots::default().mechanisms())
            .unwrap_err();
        assert!(matches!(err, ExperimentError::OutOfOrderLeg { leg: 1, last: 2 }));
        assert_eq!(fx.experimenter.leg_count(), 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_leg_is_fatal_in_debug() {
        let mut fx = Fixture::new();
        fx.add_leg(0);
        let decision = fx.decision();
        let _ = fx
            .experimenter
            .run_checks(0, decision, LegSlots::default().mechanisms());
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_duplicate_leg_is_an_error_in_release() {
        let mut fx = Fixture::new();
        fx.add_leg(0);
        let decision = fx.decision();
        let err = fx
            .experimenter
            .run_checks(0, decision, LegSlots::default().mechanisms())
            .unwrap_err();
        assert!(matches!(err, ExperimentError::DuplicateLeg { leg: 0 }));
    }

    #[test]
    fn test_leg_cap() {
        let mut fx = Fixture::with_config(ExperimentConfig {
            max_legs: 1,
            ..ExperimentConfig::default()
        });
        fx.add_leg(0);
        let decision = fx.decision();
        let err = fx
            .experimenter
            .run_checks(1, decision, LegSlots::default().mechanisms())
            .unwrap_err();
        assert!(matches!(err, ExperimentError::TooManyLegs { max: 1 }));
    }

    #[test]
    fn test_unknown_leg_eligibility_ignored() {
        let mut fx = Fixture::new();
        fx.add_leg(0);
        fx.experimenter.set_check_eligibility(7, true);
        assert_eq!(fx.experimenter.check(0).unwrap().eligible(), None);
    }

    #[test]
    fn test_pump_timeout_receives_from_other_thread() {
        let mut fx = Fixture::new();
        let leg = fx.add_leg(0);
        let handle = leg.url.lock().unwrap().take().unwrap();
        let worker = std::thread::spawn(move || handle.complete(MechanismOutcome::Safe));

        let handled = fx.experimenter.pump_timeout(Duration::from_secs(5));
        worker.join().unwrap();
        assert_eq!(handled, 1);
        assert_eq!(fx.decisions(), vec![(false, Some(MechanismOutcome::Safe))]);
        assert_eq!(fx.experimenter.pump_timeout(Duration::from_millis(1)), 0);
    }
}
