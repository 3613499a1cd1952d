// Comparison metrics
//
// Counters and latency histograms fed by report records, so the outcome of
// many experiments can be read back or scraped in Prometheus text format.
//
// Per mechanism and scope: duration, timeouts, delay classification.
// Per dimension and scope: which subset of mechanisms agreed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::mechanism::MechanismKind;
use crate::observability::{ReportRecord, ReportSink};
use crate::verdict::taxonomy::{Agreement, ComparisonDimension, DelayClass, MetricEvent, ReportScope};

/// Counter metric (monotonically increasing)
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Histogram bucket for latency tracking
#[derive(Debug)]
pub struct HistogramBucket {
    pub le: f64, // upper bound in seconds
    pub count: AtomicU64,
}

/// Histogram metric for lookup latencies
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
    sum: AtomicU64, // microseconds
    count: AtomicU64,
}

impl Histogram {
    /// Buckets sized for network lookups, 1ms to 10s
    pub fn new_latency() -> Self {
        let bucket_bounds = [
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ];

        let buckets = bucket_bounds
            .into_iter()
            .map(|le| HistogramBucket {
                le,
                count: AtomicU64::new(0),
            })
            .collect();

        Self {
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: Duration) {
        let seconds = value.as_secs_f64();
        let micros = value.as_micros() as u64;

        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for bucket in &self.buckets {
            if seconds <= bucket.le {
                bucket.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn get_bucket_count(&self, le: f64) -> u64 {
        self.buckets
            .iter()
            .find(|b| (b.le - le).abs() < 0.0001)
            .map(|b| b.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        self.sum.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        for bucket in &self.buckets {
            bucket.count.store(0, Ordering::Relaxed);
        }
    }
}

/// Figures for one mechanism within one scope
#[derive(Debug, Default)]
pub struct MechanismMetrics {
    pub duration: Histogram,
    pub timed_out: Counter,
    pub completed: Counter,
    pub delayed: Counter,
    pub not_delayed: Counter,
    pub delay_unknown: Counter,
    pub delay_magnitude: Histogram,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new_latency()
    }
}

/// Everything recorded for one report scope
#[derive(Debug, Default)]
pub struct ScopeMetrics {
    pub mechanisms: [MechanismMetrics; 3],
    /// Indexed by dimension, then by [`Agreement::index`]
    pub agreements: [[Counter; 8]; 3],
}

impl ScopeMetrics {
    pub fn mechanism(&self, kind: MechanismKind) -> &MechanismMetrics {
        &self.mechanisms[kind.index()]
    }

    pub fn agreement_count(&self, dimension: ComparisonDimension, agreement: Agreement) -> u64 {
        self.agreements[dimension.index()][agreement.index()].get()
    }
}

/// Registry of comparison metrics
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    pub scopes: [ScopeMetrics; 2],
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self, scope: ReportScope) -> &ScopeMetrics {
        &self.scopes[scope.index()]
    }

    /// Record one event
    pub fn record_event(&self, event: &MetricEvent) {
        let scope = self.scope(event.scope());
        match *event {
            MetricEvent::Duration { kind, duration, .. } => {
                scope.mechanism(kind).duration.observe(duration);
            }
            MetricEvent::TimedOut { kind, timed_out, .. } => {
                let metrics = scope.mechanism(kind);
                metrics.completed.inc();
                if timed_out {
                    metrics.timed_out.inc();
                }
            }
            MetricEvent::Delay { kind, delay, .. } => {
                let metrics = scope.mechanism(kind);
                match delay {
                    DelayClass::Unknown => metrics.delay_unknown.inc(),
                    DelayClass::NotDelayed => metrics.not_delayed.inc(),
                    DelayClass::Delayed(by) => {
                        metrics.delayed.inc();
                        metrics.delay_magnitude.observe(by);
                    }
                }
            }
            MetricEvent::Comparison {
                dimension,
                agreement,
                ..
            } => {
                scope.agreements[dimension.index()][agreement.index()].inc();
            }
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self, prefix: &str) -> String {
        let base = prometheus_name(prefix);
        let mut output = String::new();

        let family = format!("{}_duration_seconds", base);
        output.push_str(&format!("# HELP {} Mechanism lookup duration\n", family));
        output.push_str(&format!("# TYPE {} histogram\n", family));
        for scope in [ReportScope::FinalLeg, ReportScope::Redirects] {
            for kind in MechanismKind::ALL {
                let labels = format!(
                    "mechanism=\"{}\",scope=\"{}\"",
                    kind.metric_name(),
                    scope.label()
                );
                let histogram = &self.scope(scope).mechanism(kind).duration;
                write_histogram(&mut output, &family, &labels, histogram);
            }
        }

        output.push_str(&format!("# HELP {}_timed_out_total Lookups that timed out\n", base));
        output.push_str(&format!("# TYPE {}_timed_out_total counter\n", base));
        for scope in [ReportScope::FinalLeg, ReportScope::Redirects] {
            for kind in MechanismKind::ALL {
                output.push_str(&format!(
                    "{}_timed_out_total{{mechanism=\"{}\",scope=\"{}\"}} {}\n",
                    base,
                    kind.metric_name(),
                    scope.label(),
                    self.scope(scope).mechanism(kind).timed_out.get()
                ));
            }
        }

        output.push_str(&format!(
            "# HELP {}_response_delay_total Whether a mechanism would have delayed the response\n",
            base
        ));
        output.push_str(&format!("# TYPE {}_response_delay_total counter\n", base));
        for scope in [ReportScope::FinalLeg, ReportScope::Redirects] {
            for kind in MechanismKind::ALL {
                let metrics = self.scope(scope).mechanism(kind);
                for (label, counter) in [
                    (DelayClass::Unknown.label(), &metrics.delay_unknown),
                    ("delayed", &metrics.delayed),
                    (DelayClass::NotDelayed.label(), &metrics.not_delayed),
                ] {
                    output.push_str(&format!(
                        "{}_response_delay_total{{mechanism=\"{}\",scope=\"{}\",class=\"{}\"}} {}\n",
                        base,
                        kind.metric_name(),
                        scope.label(),
                        label,
                        counter.get()
                    ));
                }
            }
        }

        let family = format!("{}_response_delay_seconds", base);
        output.push_str(&format!(
            "# HELP {} How long a mechanism outlasted the response, when it did\n",
            family
        ));
        output.push_str(&format!("# TYPE {} histogram\n", family));
        for scope in [ReportScope::FinalLeg, ReportScope::Redirects] {
            for kind in MechanismKind::ALL {
                let labels = format!(
                    "mechanism=\"{}\",scope=\"{}\"",
                    kind.metric_name(),
                    scope.label()
                );
                let histogram = &self.scope(scope).mechanism(kind).delay_magnitude;
                write_histogram(&mut output, &family, &labels, histogram);
            }
        }

        output.push_str(&format!(
            "# HELP {}_agreement_total Which mechanisms agreed per comparison dimension\n",
            base
        ));
        output.push_str(&format!("# TYPE {}_agreement_total counter\n", base));
        for scope in [ReportScope::FinalLeg, ReportScope::Redirects] {
            for dimension in ComparisonDimension::ALL {
                for agreement in Agreement::ALL {
                    let count = self.scope(scope).agreement_count(dimension, agreement);
                    if count == 0 {
                        continue;
                    }
                    output.push_str(&format!(
                        "{}_agreement_total{{dimension=\"{}\",scope=\"{}\",subset=\"{}\"}} {}\n",
                        base,
                        dimension.metric_name(),
                        scope.label(),
                        agreement.label(),
                        count
                    ));
                }
            }
        }

        output
    }
}

impl ReportSink for MetricsRegistry {
    fn emit(&self, record: &ReportRecord) {
        self.record_event(&record.event);
    }
}

/// Bucket, `+Inf`, sum and count lines of one labelled histogram
fn write_histogram(output: &mut String, family: &str, labels: &str, histogram: &Histogram) {
    for bucket in &histogram.buckets {
        output.push_str(&format!(
            "{}_bucket{{{},le=\"{}\"}} {}\n",
            family,
            labels,
            bucket.le,
            bucket.count.load(Ordering::Relaxed)
        ));
    }
    output.push_str(&format!(
        "{}_bucket{{{},le=\"+Inf\"}} {}\n",
        family,
        labels,
        histogram.get_count()
    ));
    output.push_str(&format!(
        "{}_sum{{{}}} {}\n",
        family,
        labels,
        histogram.get_sum_micros() as f64 / 1_000_000.0
    ));
    output.push_str(&format!("{}_count{{{}}} {}\n", family, labels, histogram.get_count()));
}

/// Lowercase snake-case form of a dotted metric prefix
fn prometheus_name(prefix: &str) -> String {
    let mut name = String::with_capacity(prefix.len() + 4);
    for (i, c) in prefix.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !name.ends_with('_') {
                name.push('_');
            }
            name.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    name
}

/// Global metrics instance
static METRICS: once_cell::sync::Lazy<Arc<MetricsRegistry>> =
    once_cell::sync::Lazy::new(|| Arc::new(MetricsRegistry::new()));

/// Get global metrics registry
pub fn get_metrics() -> Arc<MetricsRegistry> {
    Arc::clone(&METRICS)
}
