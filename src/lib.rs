//! lookup-race: race-and-compare harness for resource safety lookups
//!
//! For every leg of a navigation, three lookup mechanisms run against the
//! same resource. The canonical one decides; the other two run in the shadow
//! and are measured against it. Once the navigation settles, one experiment
//! report compares their latency, timeouts, verdicts, and whether they would
//! have delayed the response.
//!
//! # Architecture
//!
//! ## Mechanisms ([`mechanism`])
//! - [`mechanism::LookupMechanism`]: capability trait a lookup strategy implements
//! - [`mechanism::runner`]: per-leg runner that timestamps the start
//! - [`mechanism::clock`]: system and manual time sources
//!
//! ## Experiments ([`experiment`])
//! - [`experiment::experimenter`]: per-navigation orchestrator
//! - [`experiment::check`]: per-leg records and results
//! - [`experiment::queue`]: one-in-flight budget for secondary mechanisms
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::taxonomy`]: report scopes, delay classes, agreement subsets, metric events
//! - [`verdict::aggregate`]: per-leg and across-redirect summaries
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: structured JSON report log
//! - [`observability::metrics`]: Prometheus metrics export
//!
//! ## Configuration ([`config`])
//! - [`config::experiment`]: experiment tunables loaded from JSON
//! - [`config::types`]: shared error and index types
//!
//! ## Testing Infrastructure ([`testing`])
//! - [`testing::scripted`]: scripted mechanisms on a shared timeline
//! - [`testing::replay`]: deterministic scenario replay

// Lookup mechanisms
pub mod mechanism;

// Orchestration
pub mod experiment;

// Comparison and reporting taxonomy
pub mod verdict;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Testing Infrastructure
pub mod testing;

// CLI entrypoint wiring for the lookup-race binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::experiment::ExperimentConfig;
pub use config::types::*;
pub use experiment::{CancellationReason, CheckStart, Conclusion, Experimenter, MechanismSet, Phase};
pub use mechanism::{CompletionHandle, LookupMechanism, MechanismKind, MechanismOutcome, StartOutcome, ThreatKind};
