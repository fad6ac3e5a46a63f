use alloy::{eips::BlockNumberOrTag, providers::Provider, rpc::types::Header};
use eyre::{ContextCompat, WrapErr};
use std::sync::Arc;
use tracing::info;

/// The slice of a block header the pricing and retry logic cares about.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
    pub base_fee_per_gas: Option<u64>,
}

impl From<Header> for BlockInfo {
    fn from(value: Header) -> Self {
        Self {
            number: value.number,
            timestamp: value.timestamp,
            base_fee_per_gas: value.base_fee_per_gas,
        }
    }
}

/// Fetch the latest block once at startup; after that, block ticks carry
/// their own headers.
pub async fn latest_block_info(provider: &Arc<dyn Provider>) -> eyre::Result<BlockInfo> {
    let latest = provider
        .get_block_by_number(BlockNumberOrTag::Latest)
        .await
        .context("failed to get latest block")?
        .context("latest block not found")?;

    info!("latest block synced: {}", latest.header.number);
    Ok(latest.header.into())
}
