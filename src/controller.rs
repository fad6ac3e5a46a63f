use alloy::primitives::{Address, U256};
use burberry::{ActionSubmitter, Strategy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::block_state::BlockInfo;
use crate::bundle::BundlePlan;
use crate::constants::GWEI;
use crate::error::BundleError;
use crate::executor::BundleRequest;
use crate::gas::{bundle_gas_price, to_gwei};
use crate::relay::{Relay, Resolution};
use crate::signer::{BundleSigner, SignedBundle};
use crate::simulation::check_simulation;
use crate::types::{Action, Event, Outcome, RetryAttempt};

/// Every knob the submission loop depends on.
#[derive(Debug, Clone, clap::Args)]
pub struct Config {
    /// NFT collection with the allowlisted mint.
    #[arg(long, env = "NFT_ADDRESS")]
    pub nft_address: Address,

    /// Deployed helper contract that sweeps the minted collection.
    #[arg(long, env = "NFT_TRANSFER_ADDRESS")]
    pub nft_transfer_address: Address,

    /// ERC-20 token the mint is paid in.
    #[arg(long, env = "TOKEN_ADDRESS")]
    pub token_address: Address,

    #[arg(long, default_value_t = 1)]
    pub nfts_to_mint: u64,

    /// Token cost per NFT, in the token's smallest unit.
    #[arg(long, default_value = "305000000000000000000")]
    pub tokens_per_nft: U256,

    /// Static priority premium offered to the block producer, in gwei.
    #[arg(long, default_value_t = 4_000)]
    pub priority_gwei: u64,

    /// How many blocks ahead of the observed block to target.
    #[arg(long, default_value_t = 1)]
    pub blocks_ahead: u64,

    /// Pre-measured gas limits for the sponsored transactions, in order.
    /// When absent, limits are measured with eth_estimateGas at startup.
    #[arg(long = "gas-estimate")]
    pub gas_estimates: Vec<u64>,

    /// JSON file mapping executor addresses to merkle allowlist proofs.
    #[arg(long)]
    pub merkle_proofs: Option<PathBuf>,

    /// Re-price and re-sign the bundle on every block. When off, the bundle
    /// signed at startup is resubmitted unchanged.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub reprice_every_block: bool,

    /// Approve the payment token for the mint contract inside the bundle.
    #[arg(long)]
    pub approve_token: bool,

    /// Approve the transfer helper as operator for the collection inside the
    /// bundle.
    #[arg(long)]
    pub approve_collection: bool,
}

impl Config {
    pub fn priority_premium(&self) -> u128 {
        self.priority_gwei as u128 * GWEI
    }

    pub fn token_amount(&self) -> U256 {
        self.tokens_per_nft * U256::from(self.nfts_to_mint)
    }
}

/// Block-by-block retry state machine. Each tick re-prices the bundle from
/// the observed base fee, re-simulates for telemetry, and submits at the next
/// target block. Outstanding attempts share nonces, so at most one of them
/// can ever be mined and ticks never wait on each other.
pub struct SubmissionController {
    plan: BundlePlan,
    signer: BundleSigner,
    relay: Arc<dyn Relay>,
    priority_premium: u128,
    blocks_ahead: u64,
    reprice_every_block: bool,
    outcomes: mpsc::UnboundedReceiver<Outcome>,
    shutdown: watch::Sender<Option<i32>>,
    current: Option<(u128, SignedBundle)>,
    last_attempt: Option<RetryAttempt>,
    halted: bool,
}

impl SubmissionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plan: BundlePlan,
        signer: BundleSigner,
        relay: Arc<dyn Relay>,
        config: &Config,
        initial: Option<(u128, SignedBundle)>,
        outcomes: mpsc::UnboundedReceiver<Outcome>,
        shutdown: watch::Sender<Option<i32>>,
    ) -> Self {
        Self {
            plan,
            signer,
            relay,
            priority_premium: config.priority_premium(),
            blocks_ahead: config.blocks_ahead,
            reprice_every_block: config.reprice_every_block,
            outcomes,
            shutdown,
            current: initial,
            last_attempt: None,
            halted: false,
        }
    }

    fn halt(&mut self, code: i32) {
        if self.halted {
            return;
        }
        self.halted = true;
        let _ = self.shutdown.send(Some(code));
    }

    /// Process every queued outcome before deciding how to halt. Sibling
    /// attempts share nonces, so an `Included` anywhere in the queue is
    /// definitive and outranks fatal outcomes from superseded targets.
    fn drain_outcomes(&mut self) {
        let mut fatal = false;
        while let Ok(outcome) = self.outcomes.try_recv() {
            match outcome {
                Outcome::Resolved {
                    target_block,
                    resolution: Resolution::Included,
                } => {
                    info!(target_block, "bundle included");
                    self.halt(0);
                    return;
                }
                Outcome::Resolved {
                    target_block,
                    resolution: Resolution::NotIncluded,
                } => match self
                    .last_attempt
                    .filter(|attempt| attempt.target_block == target_block)
                {
                    Some(attempt) => info!(
                        target_block,
                        waited_secs = attempt.submitted_at.elapsed().as_secs_f64(),
                        "not included, retrying at next block"
                    ),
                    None => info!(target_block, "superseded attempt not included"),
                },
                Outcome::Resolved {
                    target_block,
                    resolution: Resolution::NonceTooHigh,
                } => {
                    error!(target_block, "account nonce too high, bailing");
                    fatal = true;
                }
                Outcome::Failed {
                    target_block,
                    error,
                } => {
                    error!(target_block, %error, "relay submission failed");
                    fatal = true;
                }
            }
        }
        if fatal {
            self.halt(1);
        }
    }

    /// Signed bundle for this tick. Reuses the cached bundle unless the
    /// reprice policy is on and the price moved, in which case the whole
    /// bundle is re-assembled and re-signed at the fresh price.
    fn bundle_for_price(&mut self, gas_price: u128) -> Result<SignedBundle, BundleError> {
        if let Some((price, bundle)) = &self.current {
            if !self.reprice_every_block || *price == gas_price {
                return Ok(bundle.clone());
            }
        }

        let entries = self.plan.assemble(gas_price)?;
        let bundle = self.signer.sign(&entries)?;
        self.current = Some((gas_price, bundle.clone()));
        Ok(bundle)
    }

    pub async fn on_block(&mut self, block: BlockInfo, submitter: &dyn ActionSubmitter<Action>) {
        if self.halted {
            return;
        }
        self.drain_outcomes();
        if self.halted {
            return;
        }

        let gas_price = bundle_gas_price(block.base_fee_per_gas, self.priority_premium);
        let bundle = match self.bundle_for_price(gas_price) {
            Ok(bundle) => bundle,
            Err(error) => {
                error!(%error, "failed to rebuild bundle");
                self.halt(1);
                return;
            }
        };

        let target_block = block.number + self.blocks_ahead;

        match check_simulation(self.relay.as_ref(), &bundle, block.number).await {
            Ok(price) => info!(
                block = block.number,
                target_block,
                gas_price_gwei = to_gwei(gas_price),
                effective_gwei = to_gwei(price.effective_gas_price),
                "bundle simulated"
            ),
            Err(error) => {
                error!(%error, "bundle simulation failed, aborting");
                self.halt(1);
                return;
            }
        }

        submitter.submit(Action::SubmitBundle(BundleRequest {
            bundle,
            target_block,
        }));
        self.last_attempt = Some(RetryAttempt {
            observed_block: block.number,
            target_block,
            submitted_at: Instant::now(),
        });
    }
}

#[async_trait::async_trait]
impl Strategy<Event, Action> for SubmissionController {
    async fn process_event(&mut self, event: Event, submitter: Arc<dyn ActionSubmitter<Action>>) {
        match event {
            Event::Block(header) => self.on_block(header.into(), submitter.as_ref()).await,
        }
    }
}
