/// Closed taxonomy of comparison events emitted when an experiment concludes
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::mechanism::MechanismKind;

/// Which legs an event summarizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportScope {
    /// The final leg, whose response the consumer processed
    FinalLeg,
    /// Every leg of a redirect chain, durations summed and outcomes OR'd
    Redirects,
}

impl ReportScope {
    pub fn index(self) -> usize {
        match self {
            ReportScope::FinalLeg => 0,
            ReportScope::Redirects => 1,
        }
    }

    pub fn name_suffix(self) -> &'static str {
        match self {
            ReportScope::FinalLeg => "",
            ReportScope::Redirects => ".Redirects",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportScope::FinalLeg => "final_leg",
            ReportScope::Redirects => "redirects",
        }
    }
}

/// Whether a mechanism would have held up response processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayClass {
    /// The consumer never reported when it processed the response
    Unknown,
    Delayed(Duration),
    NotDelayed,
}

impl DelayClass {
    /// `None` when unknown
    pub fn is_delayed(&self) -> Option<bool> {
        match self {
            DelayClass::Unknown => None,
            DelayClass::Delayed(_) => Some(true),
            DelayClass::NotDelayed => Some(false),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DelayClass::Unknown => "unknown",
            DelayClass::Delayed(_) => "delayed",
            DelayClass::NotDelayed => "not_delayed",
        }
    }
}

/// What a tri-mechanism comparison looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonDimension {
    Warning,
    TimedOut,
    Delayed,
}

impl ComparisonDimension {
    pub const ALL: [ComparisonDimension; 3] = [
        ComparisonDimension::Warning,
        ComparisonDimension::TimedOut,
        ComparisonDimension::Delayed,
    ];

    pub fn index(self) -> usize {
        match self {
            ComparisonDimension::Warning => 0,
            ComparisonDimension::TimedOut => 1,
            ComparisonDimension::Delayed => 2,
        }
    }

    pub fn metric_name(self) -> &'static str {
        match self {
            ComparisonDimension::Warning => "WarningComparison",
            ComparisonDimension::TimedOut => "TimedOutComparison",
            ComparisonDimension::Delayed => "DelayedComparison",
        }
    }
}

/// The subset of mechanisms for which a dimension held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    None,
    UrlRealTimeOnly,
    HashDatabaseOnly,
    HashRealTimeOnly,
    UrlRealTimeAndHashDatabase,
    UrlRealTimeAndHashRealTime,
    HashDatabaseAndHashRealTime,
    All,
}

impl Agreement {
    pub const ALL: [Agreement; 8] = [
        Agreement::None,
        Agreement::UrlRealTimeOnly,
        Agreement::HashDatabaseOnly,
        Agreement::HashRealTimeOnly,
        Agreement::UrlRealTimeAndHashDatabase,
        Agreement::UrlRealTimeAndHashRealTime,
        Agreement::HashDatabaseAndHashRealTime,
        Agreement::All,
    ];

    /// Flags are indexed by [`MechanismKind::index`]
    pub fn from_flags(flags: [bool; 3]) -> Self {
        match flags {
            [false, false, false] => Agreement::None,
            [true, false, false] => Agreement::UrlRealTimeOnly,
            [false, true, false] => Agreement::HashDatabaseOnly,
            [false, false, true] => Agreement::HashRealTimeOnly,
            [true, true, false] => Agreement::UrlRealTimeAndHashDatabase,
            [true, false, true] => Agreement::UrlRealTimeAndHashRealTime,
            [false, true, true] => Agreement::HashDatabaseAndHashRealTime,
            [true, true, true] => Agreement::All,
        }
    }

    pub fn contains(self, kind: MechanismKind) -> bool {
        use MechanismKind::*;
        matches!(
            (self, kind),
            (Agreement::All, _)
                | (Agreement::UrlRealTimeOnly, UrlRealTime)
                | (Agreement::HashDatabaseOnly, HashDatabase)
                | (Agreement::HashRealTimeOnly, HashRealTime)
                | (Agreement::UrlRealTimeAndHashDatabase, UrlRealTime | HashDatabase)
                | (Agreement::UrlRealTimeAndHashRealTime, UrlRealTime | HashRealTime)
                | (Agreement::HashDatabaseAndHashRealTime, HashDatabase | HashRealTime)
        )
    }

    pub fn index(self) -> usize {
        match self {
            Agreement::None => 0,
            Agreement::UrlRealTimeOnly => 1,
            Agreement::HashDatabaseOnly => 2,
            Agreement::HashRealTimeOnly => 3,
            Agreement::UrlRealTimeAndHashDatabase => 4,
            Agreement::UrlRealTimeAndHashRealTime => 5,
            Agreement::HashDatabaseAndHashRealTime => 6,
            Agreement::All => 7,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Agreement::None => "none",
            Agreement::UrlRealTimeOnly => "url_real_time_only",
            Agreement::HashDatabaseOnly => "hash_database_only",
            Agreement::HashRealTimeOnly => "hash_real_time_only",
            Agreement::UrlRealTimeAndHashDatabase => "url_real_time_and_hash_database",
            Agreement::UrlRealTimeAndHashRealTime => "url_real_time_and_hash_real_time",
            Agreement::HashDatabaseAndHashRealTime => "hash_database_and_hash_real_time",
            Agreement::All => "all",
        }
    }
}

/// One emitted comparison event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum MetricEvent {
    Duration {
        kind: MechanismKind,
        scope: ReportScope,
        duration: Duration,
    },
    TimedOut {
        kind: MechanismKind,
        scope: ReportScope,
        timed_out: bool,
    },
    Delay {
        kind: MechanismKind,
        scope: ReportScope,
        delay: DelayClass,
    },
    Comparison {
        scope: ReportScope,
        dimension: ComparisonDimension,
        agreement: Agreement,
    },
}

impl MetricEvent {
    pub fn scope(&self) -> ReportScope {
        match self {
            MetricEvent::Duration { scope, .. }
            | MetricEvent::TimedOut { scope, .. }
            | MetricEvent::Delay { scope, .. }
            | MetricEvent::Comparison { scope, .. } => *scope,
        }
    }

    /// `<prefix>.<Mechanism>.<Metric>[.Redirects]`, or
    /// `<prefix>.<Dimension>Comparison[.Redirects]` for comparisons
    pub fn name(&self, prefix: &str) -> String {
        let suffix = self.scope().name_suffix();
        match self {
            MetricEvent::Duration { kind, .. } => {
                format!("{}.{}.Duration{}", prefix, kind.metric_name(), suffix)
            }
            MetricEvent::TimedOut { kind, .. } => {
                format!("{}.{}.TimedOut{}", prefix, kind.metric_name(), suffix)
            }
            MetricEvent::Delay { kind, .. } => format!(
                "{}.{}.WouldHaveDelayedResponse{}",
                prefix,
                kind.metric_name(),
                suffix
            ),
            MetricEvent::Comparison { dimension, .. } => {
                format!("{}.{}{}", prefix, dimension.metric_name(), suffix)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_covers_every_subset() {
        let mut seen = std::collections::HashSet::new();
        for bits in 0u8..8 {
            let flags = [bits & 1 != 0, bits & 2 != 0, bits & 4 != 0];
            let agreement = Agreement::from_flags(flags);
            for kind in MechanismKind::ALL {
                assert_eq!(agreement.contains(kind), flags[kind.index()], "{:?}", agreement);
            }
            seen.insert(agreement);
        }
        assert_eq!(seen.len(), Agreement::ALL.len());
    }

    #[test]
    fn test_agreement_indices_match_table() {
        for (i, agreement) in Agreement::ALL.iter().enumerate() {
            assert_eq!(agreement.index(), i);
        }
    }

    #[test]
    fn test_event_names() {
        let duration = MetricEvent::Duration {
            kind: MechanismKind::HashDatabase,
            scope: ReportScope::FinalLeg,
            duration: Duration::from_millis(1),
        };
        assert_eq!(duration.name("LookupRace"), "LookupRace.HashDatabase.Duration");

        let comparison = MetricEvent::Comparison {
            scope: ReportScope::Redirects,
            dimension: ComparisonDimension::Warning,
            agreement: Agreement::All,
        };
        assert_eq!(comparison.name("X"), "X.WarningComparison.Redirects");
    }

    #[test]
    fn test_delay_flags() {
        assert_eq!(DelayClass::Unknown.is_delayed(), None);
        assert_eq!(DelayClass::NotDelayed.is_delayed(), Some(false));
        assert_eq!(DelayClass::Delayed(Duration::from_millis(2)).is_delayed(), Some(true));
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = MetricEvent::TimedOut {
            kind: MechanismKind::UrlRealTime,
            scope: ReportScope::FinalLeg,
            timed_out: true,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["event"], "timed_out");
        assert_eq!(json["kind"], "url_real_time");
    }
}
