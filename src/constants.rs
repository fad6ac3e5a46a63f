pub const GWEI: u128 = 1_000_000_000;

/// Gas limit for the plain ETH transfer funding the executor.
pub const FUNDING_GAS_LIMIT: u64 = 25_000;

/// Gas limit for the ERC-20 top-up transfer to the executor.
pub const TOKEN_TRANSFER_GAS_LIMIT: u64 = 60_000;

pub const DEFAULT_RELAY_URL: &str = "https://relay.flashbots.net";

/// How often to poll the chain head while waiting for a target block to pass.
pub const RESOLUTION_POLL_INTERVAL_MS: u64 = 3_000;
