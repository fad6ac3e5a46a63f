use alloy::{
    network::TransactionBuilder,
    primitives::{Address, U256},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};
use tracing::info;

use crate::constants::{FUNDING_GAS_LIMIT, TOKEN_TRANSFER_GAS_LIMIT};
use crate::error::BundleError;
use crate::producer::{TransactionProducer, IERC20};

/// Which account signs a bundle entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerRole {
    /// Funds the operation: pays the executor's gas and the token cost.
    Sponsor,
    /// Performs the sponsored actions.
    Executor,
}

/// One slot in the bundle: a fully materialized request plus the role that
/// signs it. Bundle order is fixed here and never reordered downstream.
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub tx: TransactionRequest,
    pub role: SignerRole,
}

/// Invoke every producer in declaration order and flatten their requests,
/// preserving order. Producers run once at startup; their output is reused by
/// every assembly afterwards.
pub async fn collect_sponsored(
    producers: &[Box<dyn TransactionProducer>],
) -> eyre::Result<Vec<TransactionRequest>> {
    let mut txs = Vec::new();
    for producer in producers {
        let batch = producer.sponsored_transactions().await?;
        info!(
            producer = %producer.description(),
            transactions = batch.len(),
            "collected sponsored transactions"
        );
        txs.extend(batch);
    }
    Ok(txs)
}

/// Everything needed to re-assemble the bundle at a fresh gas price. The
/// sponsored transactions and the gas estimate table are fixed at startup;
/// only the gas price varies between ticks.
#[derive(Debug, Clone)]
pub struct BundlePlan {
    pub executor: Address,
    pub token: Address,
    pub token_amount: U256,
    pub sponsored: Vec<TransactionRequest>,
    pub gas_estimates: Vec<u64>,
}

impl BundlePlan {
    pub fn total_gas_estimate(&self) -> u64 {
        self.gas_estimates.iter().sum()
    }

    /// Assemble the ordered bundle. Infrastructure entries come first because
    /// the sponsored transactions spend the funds and tokens they establish:
    /// a sponsor-signed ETH transfer covering the sponsored gas, then a
    /// sponsor-signed ERC-20 top-up. Sponsored entries follow in producer
    /// order, executor-signed, with gas limits taken positionally from the
    /// estimate table and the uniform gas price applied throughout.
    pub fn assemble(&self, gas_price: u128) -> Result<Vec<BundleEntry>, BundleError> {
        if self.gas_estimates.len() != self.sponsored.len() {
            return Err(BundleError::EstimateMismatch {
                estimates: self.gas_estimates.len(),
                sponsored: self.sponsored.len(),
            });
        }

        let mut entries = Vec::with_capacity(2 + self.sponsored.len());

        let funding = U256::from(self.total_gas_estimate()) * U256::from(gas_price);
        entries.push(BundleEntry {
            tx: TransactionRequest::default()
                .with_to(self.executor)
                .with_value(funding)
                .with_gas_limit(FUNDING_GAS_LIMIT)
                .with_gas_price(gas_price),
            role: SignerRole::Sponsor,
        });

        let top_up = IERC20::transferCall {
            to: self.executor,
            amount: self.token_amount,
        }
        .abi_encode();
        entries.push(BundleEntry {
            tx: TransactionRequest::default()
                .with_to(self.token)
                .with_input(top_up)
                .with_value(U256::ZERO)
                .with_gas_limit(TOKEN_TRANSFER_GAS_LIMIT)
                .with_gas_price(gas_price),
            role: SignerRole::Sponsor,
        });

        for (tx, limit) in self.sponsored.iter().zip(&self.gas_estimates) {
            entries.push(BundleEntry {
                tx: tx.clone().with_gas_limit(*limit).with_gas_price(gas_price),
                role: SignerRole::Executor,
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use async_trait::async_trait;

    const EXECUTOR: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const TOKEN: Address = address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

    fn request_to(to: Address) -> TransactionRequest {
        TransactionRequest::default().with_to(to)
    }

    fn plan(sponsored: Vec<TransactionRequest>, gas_estimates: Vec<u64>) -> BundlePlan {
        BundlePlan {
            executor: EXECUTOR,
            token: TOKEN,
            token_amount: U256::from(305u64),
            sponsored,
            gas_estimates,
        }
    }

    struct StaticProducer {
        name: &'static str,
        txs: Vec<TransactionRequest>,
    }

    #[async_trait]
    impl TransactionProducer for StaticProducer {
        fn description(&self) -> String {
            self.name.to_string()
        }

        async fn sponsored_transactions(&self) -> eyre::Result<Vec<TransactionRequest>> {
            Ok(self.txs.clone())
        }
    }

    #[tokio::test]
    async fn collection_preserves_producer_order() {
        let a1 = address!("0x0000000000000000000000000000000000000a01");
        let a2 = address!("0x0000000000000000000000000000000000000a02");
        let b1 = address!("0x0000000000000000000000000000000000000b01");

        let producers: Vec<Box<dyn TransactionProducer>> = vec![
            Box::new(StaticProducer {
                name: "a",
                txs: vec![request_to(a1), request_to(a2)],
            }),
            Box::new(StaticProducer {
                name: "b",
                txs: vec![request_to(b1)],
            }),
        ];

        let txs = collect_sponsored(&producers).await.unwrap();
        let order: Vec<_> = txs.iter().map(|tx| tx.to.unwrap()).collect();
        assert_eq!(order, vec![a1.into(), a2.into(), b1.into()]);
    }

    #[test]
    fn assembly_puts_infrastructure_first_and_keeps_order() {
        let a1 = address!("0x0000000000000000000000000000000000000a01");
        let b1 = address!("0x0000000000000000000000000000000000000b01");
        let plan = plan(vec![request_to(a1), request_to(b1)], vec![100_000, 50_000]);

        let entries = plan.assemble(10).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].tx.to, Some(EXECUTOR.into()));
        assert_eq!(entries[1].tx.to, Some(TOKEN.into()));
        assert_eq!(entries[2].tx.to, Some(a1.into()));
        assert_eq!(entries[3].tx.to, Some(b1.into()));
    }

    #[test]
    fn assembly_assigns_roles_limits_and_uniform_price() {
        let plan = plan(
            vec![request_to(EXECUTOR), request_to(TOKEN)],
            vec![252_149, 136_423],
        );

        let entries = plan.assemble(42).unwrap();
        let roles: Vec<_> = entries.iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![
                SignerRole::Sponsor,
                SignerRole::Sponsor,
                SignerRole::Executor,
                SignerRole::Executor
            ]
        );

        assert!(entries.iter().all(|e| e.tx.gas_price == Some(42)));
        assert_eq!(entries[0].tx.gas, Some(FUNDING_GAS_LIMIT));
        assert_eq!(entries[1].tx.gas, Some(TOKEN_TRANSFER_GAS_LIMIT));
        assert_eq!(entries[2].tx.gas, Some(252_149));
        assert_eq!(entries[3].tx.gas, Some(136_423));
    }

    #[test]
    fn funding_covers_estimated_gas_at_current_price() {
        let plan = plan(
            vec![request_to(EXECUTOR), request_to(TOKEN)],
            vec![252_149, 136_423],
        );

        let entries = plan.assemble(1_000).unwrap();
        let expected = U256::from(252_149u64 + 136_423) * U256::from(1_000u64);
        assert_eq!(entries[0].tx.value, Some(expected));
    }

    #[test]
    fn estimate_mismatch_is_rejected() {
        let short = plan(vec![request_to(EXECUTOR), request_to(TOKEN)], vec![100_000]);
        assert_eq!(
            short.assemble(1).unwrap_err(),
            BundleError::EstimateMismatch {
                estimates: 1,
                sponsored: 2
            }
        );

        let exact = plan(
            vec![request_to(EXECUTOR), request_to(TOKEN)],
            vec![100_000, 50_000],
        );
        assert!(exact.assemble(1).is_ok());
    }
}
