//! Testing infrastructure
//!
//! Deterministic drivers for experiments: scripted mechanisms on a manual
//! clock, an in-memory report sink, and JSON scenario replay.

pub mod replay;
pub mod scripted;

pub use replay::{run_scenario, run_scenario_with_sink, ReplayOutcome, Scenario, Simulation};
pub use scripted::{RecordingSink, ScriptedMechanism, Timeline};
