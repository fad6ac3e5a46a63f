pub mod block_state;

pub mod bundle;

pub mod constants;

pub mod controller;

pub mod error;

pub mod executor;

pub mod gas;

pub mod producer;

pub mod relay;

pub mod signer;

pub mod simulation;

pub mod types;
