use thiserror::Error;

/// Everything that can go wrong between assembly and inclusion. All variants
/// are fatal to the retry loop; a block passing without inclusion is a
/// [`Resolution`](crate::relay::Resolution) outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("invalid producer input: {0}")]
    Validation(String),

    #[error("gas estimate table has {estimates} entries for {sponsored} sponsored transactions")]
    EstimateMismatch { estimates: usize, sponsored: usize },

    #[error("failed to sign bundle entry {index}: {reason}")]
    Signing { index: usize, reason: String },

    #[error("bundle simulation reverted at index {index}: {reason}")]
    SimulationRevert { index: usize, reason: String },

    #[error("relay error: {0}")]
    Relay(String),
}
