/// Cross-leg aggregation of mechanism results
///
/// Pure functions over immutable leg evidence: the report is a function of
/// the evidence and the response timestamp, nothing else.
use std::time::Instant;

use crate::config::types::LegIndex;
use crate::experiment::check::MechanismResult;
use crate::mechanism::MechanismKind;
use crate::verdict::taxonomy::{Agreement, ComparisonDimension, DelayClass, MetricEvent, ReportScope};

/// Complete results for one leg. Arrays are indexed by [`MechanismKind::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegEvidence {
    pub leg: LegIndex,
    pub eligible: bool,
    pub results: [MechanismResult; 3],
    pub completed_at: [Instant; 3],
}

impl LegEvidence {
    /// Warnings only count on legs that would have surfaced them
    fn counted_warning(&self, kind: MechanismKind) -> bool {
        self.eligible && self.results[kind.index()].had_warning
    }
}

/// Compare a completion instant with the moment the response was processed
pub fn classify_delay(completed_at: Instant, response_reached: Option<Instant>) -> DelayClass {
    match response_reached {
        None => DelayClass::Unknown,
        Some(reached) if completed_at > reached => DelayClass::Delayed(completed_at - reached),
        Some(_) => DelayClass::NotDelayed,
    }
}

fn merge_delay(acc: DelayClass, next: DelayClass) -> DelayClass {
    match (acc, next) {
        (DelayClass::Unknown, _) | (_, DelayClass::Unknown) => DelayClass::Unknown,
        (DelayClass::Delayed(a), DelayClass::Delayed(b)) => DelayClass::Delayed(a.max(b)),
        (DelayClass::Delayed(a), DelayClass::NotDelayed)
        | (DelayClass::NotDelayed, DelayClass::Delayed(a)) => DelayClass::Delayed(a),
        (DelayClass::NotDelayed, DelayClass::NotDelayed) => DelayClass::NotDelayed,
    }
}

/// One mechanism's figures within a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MechanismSummary {
    pub kind: MechanismKind,
    pub result: MechanismResult,
    pub delay: DelayClass,
}

/// All three mechanisms' figures for one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeSummary {
    pub scope: ReportScope,
    pub mechanisms: [MechanismSummary; 3],
}

impl ScopeSummary {
    fn for_leg(leg: &LegEvidence, response_reached: Option<Instant>) -> Self {
        let mechanisms = MechanismKind::ALL.map(|kind| {
            let mut result = leg.results[kind.index()];
            result.had_warning = leg.counted_warning(kind);
            MechanismSummary {
                kind,
                result,
                delay: classify_delay(leg.completed_at[kind.index()], response_reached),
            }
        });
        Self {
            scope: ReportScope::FinalLeg,
            mechanisms,
        }
    }

    fn for_redirects(legs: &[LegEvidence], response_reached: Option<Instant>) -> Self {
        let mechanisms = MechanismKind::ALL.map(|kind| {
            let i = kind.index();
            let mut result = MechanismResult {
                time_taken: Default::default(),
                had_warning: false,
                timed_out: false,
            };
            let mut delay = if response_reached.is_some() {
                DelayClass::NotDelayed
            } else {
                DelayClass::Unknown
            };
            for leg in legs {
                result.time_taken += leg.results[i].time_taken;
                result.had_warning |= leg.counted_warning(kind);
                result.timed_out |= leg.results[i].timed_out;
                delay = merge_delay(delay, classify_delay(leg.completed_at[i], response_reached));
            }
            MechanismSummary {
                kind,
                result,
                delay,
            }
        });
        Self {
            scope: ReportScope::Redirects,
            mechanisms,
        }
    }

    pub fn mechanism(&self, kind: MechanismKind) -> &MechanismSummary {
        &self.mechanisms[kind.index()]
    }

    /// Which mechanisms satisfied `dimension`; `None` for delays that are unknown
    pub fn agreement(&self, dimension: ComparisonDimension) -> Option<Agreement> {
        let mut flags = [false; 3];
        for summary in &self.mechanisms {
            flags[summary.kind.index()] = match dimension {
                ComparisonDimension::Warning => summary.result.had_warning,
                ComparisonDimension::TimedOut => summary.result.timed_out,
                ComparisonDimension::Delayed => summary.delay.is_delayed()?,
            };
        }
        Some(Agreement::from_flags(flags))
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        let scope = self.scope;
        let mut events = Vec::with_capacity(12);
        for summary in &self.mechanisms {
            events.push(MetricEvent::Duration {
                kind: summary.kind,
                scope,
                duration: summary.result.time_taken,
            });
            events.push(MetricEvent::TimedOut {
                kind: summary.kind,
                scope,
                timed_out: summary.result.timed_out,
            });
            events.push(MetricEvent::Delay {
                kind: summary.kind,
                scope,
                delay: summary.delay,
            });
        }
        for dimension in ComparisonDimension::ALL {
            if let Some(agreement) = self.agreement(dimension) {
                events.push(MetricEvent::Comparison {
                    scope,
                    dimension,
                    agreement,
                });
            }
        }
        events
    }
}

/// Final comparison report for one experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentReport {
    pub final_leg: ScopeSummary,
    /// Present only when the navigation redirected
    pub redirects: Option<ScopeSummary>,
}

impl ExperimentReport {
    /// Build the report; `None` if there is no leg to report on
    pub fn build(legs: &[LegEvidence], response_reached: Option<Instant>) -> Option<Self> {
        let last = legs.last()?;
        let redirects = if legs.len() > 1 {
            Some(ScopeSummary::for_redirects(legs, response_reached))
        } else {
            None
        };
        Some(Self {
            final_leg: ScopeSummary::for_leg(last, response_reached),
            redirects,
        })
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        let mut events = self.final_leg.events();
        if let Some(redirects) = &self.redirects {
            events.extend(redirects.events());
        }
        events
    }
}
