//! Configuration
//!
//! Experiment tunables and the shared error type.

pub mod experiment;
pub mod types;
