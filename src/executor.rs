use burberry::Executor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::relay::Relay;
use crate::signer::SignedBundle;
use crate::types::Outcome;

/// A signed bundle bound to one target block, ready for relay submission.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub bundle: SignedBundle,
    pub target_block: u64,
}

/// Submits bundles to the relay and reports every attempt's resolution back
/// on the outcome channel. The resolution wait runs in its own task so that
/// submissions for later target blocks are never held up behind it.
pub struct RelaySubmitter {
    relay: Arc<dyn Relay>,
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl RelaySubmitter {
    pub fn new(relay: Arc<dyn Relay>, outcomes: mpsc::UnboundedSender<Outcome>) -> Self {
        Self { relay, outcomes }
    }
}

#[async_trait::async_trait]
impl Executor<BundleRequest> for RelaySubmitter {
    async fn execute(&self, request: BundleRequest) -> eyre::Result<()> {
        let BundleRequest {
            bundle,
            target_block,
        } = request;

        if let Err(error) = self.relay.submit(&bundle, target_block).await {
            error!(target_block, %error, "relay rejected bundle");
            let _ = self.outcomes.send(Outcome::Failed {
                target_block,
                error,
            });
            return Ok(());
        }
        debug!(target_block, txs = bundle.raw_txs.len(), "bundle submitted");

        let relay = Arc::clone(&self.relay);
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let outcome = match relay.await_resolution(&bundle, target_block).await {
                Ok(resolution) => Outcome::Resolved {
                    target_block,
                    resolution,
                },
                Err(error) => Outcome::Failed {
                    target_block,
                    error,
                },
            };
            let _ = outcomes.send(outcome);
        });

        Ok(())
    }
}
