/// Error and index types shared across the lookup race
use thiserror::Error;

/// Position of a leg in the redirect chain of one navigation
pub type LegIndex = u32;

/// Custom error types for lookup-race
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("Leg {leg} is already registered")]
    DuplicateLeg { leg: LegIndex },

    #[error("Leg {leg} registered after leg {last}; legs must arrive in increasing order")]
    OutOfOrderLeg { leg: LegIndex, last: LegIndex },

    #[error("Redirect chain exceeds {max} legs")]
    TooManyLegs { max: usize },

    #[error("Experiment already concluded")]
    Concluded,
}

/// Result type for lookup-race operations
pub type Result<T> = std::result::Result<T, ExperimentError>;
