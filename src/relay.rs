use alloy::{
    eips::BlockNumberOrTag,
    primitives::{hex, U256},
    providers::{ext::MevApi, Provider, ProviderBuilder},
    rpc::types::mev::{EthCallBundle, EthSendBundle},
    signers::local::PrivateKeySigner,
    sol_types::decode_revert_reason,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::constants::RESOLUTION_POLL_INTERVAL_MS;
use crate::error::BundleError;
use crate::signer::SignedBundle;

/// How a submission targeting one block resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Mined at or before the target block. Terminal success.
    Included,
    /// Target block passed without inclusion. Expected; the next tick retries.
    NotIncluded,
    /// An account nonce advanced past the bundle's premise, so no resubmission
    /// can ever land it. Terminal failure.
    NonceTooHigh,
}

/// Per-transaction simulation outcome.
#[derive(Debug, Clone)]
pub struct TxSimulation {
    pub gas_used: u64,
    pub revert: Option<String>,
}

/// Relay simulation output. Derived and read-only; recomputed each telemetry
/// cycle.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub coinbase_diff: U256,
    pub total_gas_used: u64,
    pub transactions: Vec<TxSimulation>,
}

#[async_trait]
pub trait Relay: Send + Sync {
    /// Simulate the bundle on top of `block_number` state.
    async fn simulate(
        &self,
        bundle: &SignedBundle,
        block_number: u64,
    ) -> Result<SimulationResult, BundleError>;

    /// Submit the bundle for inclusion in `target_block`.
    async fn submit(&self, bundle: &SignedBundle, target_block: u64) -> Result<(), BundleError>;

    /// Wait until the chain reaches `target_block` and classify the attempt.
    async fn await_resolution(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> Result<Resolution, BundleError>;
}

/// Flashbots-style relay speaking `eth_callBundle` / `eth_sendBundle`, with
/// requests authenticated by the reputation key. Resolution is classified
/// against the public chain through the regular provider.
pub struct FlashbotsRelay {
    url: Url,
    auth: PrivateKeySigner,
    provider: Arc<dyn Provider>,
}

impl FlashbotsRelay {
    pub fn new(
        url: &str,
        auth: PrivateKeySigner,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, BundleError> {
        let url =
            Url::parse(url).map_err(|e| BundleError::Relay(format!("invalid relay url: {e}")))?;
        Ok(Self {
            url,
            auth,
            provider,
        })
    }
}

#[async_trait]
impl Relay for FlashbotsRelay {
    async fn simulate(
        &self,
        bundle: &SignedBundle,
        block_number: u64,
    ) -> Result<SimulationResult, BundleError> {
        let relay = ProviderBuilder::new().connect_http(self.url.clone());

        let request = EthCallBundle {
            txs: bundle.raw_txs.clone(),
            block_number: block_number + 1,
            state_block_number: BlockNumberOrTag::Number(block_number),
            ..Default::default()
        };

        let response = relay
            .call_bundle(request)
            .with_auth(self.auth.clone())
            .await
            .map_err(|e| BundleError::Relay(e.to_string()))?
            .ok_or_else(|| BundleError::Relay("empty call bundle response".to_string()))?;

        Ok(SimulationResult {
            coinbase_diff: response.coinbase_diff,
            total_gas_used: response.total_gas_used,
            transactions: response
                .results
                .into_iter()
                .map(|result| TxSimulation {
                    gas_used: result.gas_used,
                    revert: result.revert.map(|data| {
                        decode_revert_reason(&data)
                            .unwrap_or_else(|| format!("0x{}", hex::encode(&data)))
                    }),
                })
                .collect(),
        })
    }

    async fn submit(&self, bundle: &SignedBundle, target_block: u64) -> Result<(), BundleError> {
        let relay = ProviderBuilder::new().connect_http(self.url.clone());

        let request = EthSendBundle {
            txs: bundle.raw_txs.clone(),
            block_number: target_block,
            ..Default::default()
        };

        relay
            .send_bundle(request)
            .with_auth(self.auth.clone())
            .await
            .map_err(|e| BundleError::Relay(e.to_string()))?;

        debug!(target_block, relay = %self.url, "bundle sent");
        Ok(())
    }

    async fn await_resolution(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> Result<Resolution, BundleError> {
        let first_hash = *bundle
            .tx_hashes
            .first()
            .ok_or_else(|| BundleError::Relay("cannot resolve an empty bundle".to_string()))?;

        loop {
            let head = self
                .provider
                .get_block_number()
                .await
                .map_err(|e| BundleError::Relay(e.to_string()))?;
            if head >= target_block {
                break;
            }
            tokio::time::sleep(Duration::from_millis(RESOLUTION_POLL_INTERVAL_MS)).await;
        }

        let mined_block = self
            .provider
            .get_transaction_receipt(first_hash)
            .await
            .map_err(|e| BundleError::Relay(e.to_string()))?
            .and_then(|receipt| receipt.block_number);

        let executor_nonce = self
            .provider
            .get_transaction_count(bundle.executor)
            .await
            .map_err(|e| BundleError::Relay(e.to_string()))?;
        let sponsor_nonce = self
            .provider
            .get_transaction_count(bundle.sponsor)
            .await
            .map_err(|e| BundleError::Relay(e.to_string()))?;

        Ok(classify(
            mined_block,
            executor_nonce,
            bundle.executor_base_nonce,
            sponsor_nonce,
            bundle.sponsor_base_nonce,
        ))
    }
}

/// Classification once the chain has reached the target block: a mined first
/// transaction means the whole bundle landed (atomic inclusion); otherwise an
/// advanced nonce on either account means the premise is stale and retrying
/// cannot help; otherwise the block simply passed without inclusion.
pub fn classify(
    mined_block: Option<u64>,
    executor_nonce: u64,
    executor_base_nonce: u64,
    sponsor_nonce: u64,
    sponsor_base_nonce: u64,
) -> Resolution {
    if mined_block.is_some() {
        return Resolution::Included;
    }
    if executor_nonce > executor_base_nonce || sponsor_nonce > sponsor_base_nonce {
        return Resolution::NonceTooHigh;
    }
    Resolution::NotIncluded
}
