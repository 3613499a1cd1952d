//! Comparison verdicts
//!
//! Derives the cross-mechanism comparison report as pure functions over
//! immutable per-leg evidence, and defines the closed event taxonomy.

pub mod aggregate;
pub mod taxonomy;
