// Experiment overhead benchmark
// Measures the wall time to drive a full navigation through the replay
// simulator, from the first leg to the emitted report.
// Target: p95 < 1ms for a single leg, p95 < 5ms for a 10-leg redirect chain

use lookup_race::mechanism::MechanismOutcome;
use lookup_race::testing::replay::{EligibilityScript, LegScript, MechanismScript};
use lookup_race::testing::{run_scenario, Scenario};
use lookup_race::ExperimentConfig;
use std::time::{Duration, Instant};

/// Benchmark configuration
const ITERATIONS: usize = 1000;
const WARMUP_ITERATIONS: usize = 50;

/// Sorted wall times of every measured run
struct RunTimes {
    sorted: Vec<Duration>,
}

impl RunTimes {
    fn new(mut samples: Vec<Duration>) -> Self {
        samples.sort_unstable();
        Self { sorted: samples }
    }

    /// Nearest-rank quantile, `q` in `0.0..=1.0`
    fn quantile(&self, q: f64) -> Duration {
        if self.sorted.is_empty() {
            return Duration::ZERO;
        }
        let rank = (q * self.sorted.len() as f64).ceil() as usize;
        self.sorted[rank.clamp(1, self.sorted.len()) - 1]
    }

    fn runs_per_second(&self) -> f64 {
        let total: Duration = self.sorted.iter().sum();
        if total.is_zero() {
            return 0.0;
        }
        self.sorted.len() as f64 / total.as_secs_f64()
    }
}

struct BenchmarkResult {
    scenario: String,
    legs: u64,
    times: RunTimes,
    records_per_run: usize,
    reason: Option<String>,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n=== {} ({} legs) ===", self.scenario, self.legs);
        println!(
            "  p50 {:?}  p95 {:?}  worst {:?}",
            self.times.quantile(0.50),
            self.times.quantile(0.95),
            self.times.quantile(1.0)
        );
        println!(
            "  {:.0} runs/s, {} report records per run",
            self.times.runs_per_second(),
            self.records_per_run
        );

        match &self.reason {
            None => println!("PASS"),
            Some(reason) => println!("FAIL: {}", reason),
        }
    }
}

fn redirect_chain(legs: u64) -> Scenario {
    let legs = (0..legs)
        .map(|i| LegScript {
            leg: None,
            start_ms: i * 10,
            url_real_time: MechanismScript::after(MechanismOutcome::Safe, 8),
            hash_database: MechanismScript::after(MechanismOutcome::Safe, 2),
            hash_real_time: MechanismScript::after(MechanismOutcome::Safe, 15),
            eligibility: vec![EligibilityScript {
                at_ms: i * 10 + 1,
                eligible: true,
            }],
        })
        .collect::<Vec<_>>();
    let response_reached_ms = legs.last().map(|leg| leg.start_ms + 9);
    Scenario {
        name: None,
        legs,
        response_reached_ms,
        owner_gone: Vec::new(),
    }
}

fn benchmark_chain(label: &str, legs: u64, budget: Duration) -> BenchmarkResult {
    let scenario = redirect_chain(legs);

    for _ in 0..WARMUP_ITERATIONS {
        let _ = run_scenario(&scenario, ExperimentConfig::default());
    }

    let mut samples = Vec::with_capacity(ITERATIONS);
    let mut records_per_run = 0;
    let mut failures = 0;
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        let outcome = run_scenario(&scenario, ExperimentConfig::default());
        samples.push(start.elapsed());
        match outcome {
            Ok(outcome) if !outcome.records.is_empty() => records_per_run = outcome.records.len(),
            _ => failures += 1,
        }
    }

    let times = RunTimes::new(samples);
    let p95 = times.quantile(0.95);
    let reason = if failures > 0 {
        Some(format!("{} runs produced no report", failures))
    } else if p95 > budget {
        Some(format!("p95 {:?} exceeds budget {:?}", p95, budget))
    } else {
        None
    };

    BenchmarkResult {
        scenario: label.to_string(),
        legs,
        times,
        records_per_run,
        reason,
    }
}

fn main() {
    println!("=== lookup-race Experiment Overhead Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let results = vec![
        benchmark_chain("Single leg", 1, Duration::from_millis(1)),
        benchmark_chain("10-leg redirect chain", 10, Duration::from_millis(5)),
    ];

    for result in &results {
        result.print();
    }

    let passed_count = results.iter().filter(|r| r.reason.is_none()).count();
    let total_count = results.len();

    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed_count, total_count);

    if passed_count == total_count {
        println!("All overhead budgets met");
        std::process::exit(0);
    } else {
        println!("Some overhead budgets exceeded");
        std::process::exit(1);
    }
}
