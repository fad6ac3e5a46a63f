use alloy::rpc::types::Header;
use std::time::Instant;

use crate::error::BundleError;
use crate::executor::BundleRequest;
use crate::relay::Resolution;

/// Core Event enum for the submission engine.
#[derive(Debug, Clone)]
pub enum Event {
    Block(Header),
}

/// Core Action enum for the submission engine.
#[derive(Debug, Clone)]
pub enum Action {
    SubmitBundle(BundleRequest),
}

/// Asynchronous outcome of one relay submission, reported back to the
/// controller on the outcome channel.
#[derive(Debug, Clone)]
pub enum Outcome {
    Resolved {
        target_block: u64,
        resolution: Resolution,
    },
    Failed {
        target_block: u64,
        error: BundleError,
    },
}

/// One submission attempt. Superseded, not merged, by the next tick's attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryAttempt {
    pub observed_block: u64,
    pub target_block: u64,
    pub submitted_at: Instant,
}
