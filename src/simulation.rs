use alloy::primitives::U256;

use crate::error::BundleError;
use crate::relay::{Relay, SimulationResult};
use crate::signer::SignedBundle;

/// Effective (coinbase-normalized) bundle gas price. Observability only; the
/// retry loop never branches on it.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedPrice {
    pub effective_gas_price: u128,
    pub total_gas_used: u64,
}

/// Simulate the signed bundle and fail loudly on any revert. A reverting
/// bundle can never be fixed by resubmission, so callers must treat the error
/// as fatal.
pub async fn check_simulation(
    relay: &dyn Relay,
    bundle: &SignedBundle,
    block_number: u64,
) -> Result<SimulatedPrice, BundleError> {
    let result = relay.simulate(bundle, block_number).await?;
    verify(&result)
}

/// Reject results containing a revert; otherwise derive the effective price.
pub fn verify(result: &SimulationResult) -> Result<SimulatedPrice, BundleError> {
    for (index, tx) in result.transactions.iter().enumerate() {
        if let Some(reason) = &tx.revert {
            return Err(BundleError::SimulationRevert {
                index,
                reason: reason.clone(),
            });
        }
    }

    let effective_gas_price = if result.total_gas_used == 0 {
        0
    } else {
        (result.coinbase_diff / U256::from(result.total_gas_used)).saturating_to::<u128>()
    };

    Ok(SimulatedPrice {
        effective_gas_price,
        total_gas_used: result.total_gas_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::TxSimulation;

    fn passing(gas_used: u64) -> TxSimulation {
        TxSimulation {
            gas_used,
            revert: None,
        }
    }

    #[test]
    fn revert_reports_the_failing_index() {
        let result = SimulationResult {
            coinbase_diff: U256::ZERO,
            total_gas_used: 90_000,
            transactions: vec![
                passing(30_000),
                passing(30_000),
                TxSimulation {
                    gas_used: 30_000,
                    revert: Some("insufficient allowance".to_string()),
                },
            ],
        };

        let err = verify(&result).unwrap_err();
        assert_eq!(
            err,
            BundleError::SimulationRevert {
                index: 2,
                reason: "insufficient allowance".to_string()
            }
        );
    }

    #[test]
    fn effective_price_is_coinbase_diff_over_gas() {
        let result = SimulationResult {
            coinbase_diff: U256::from(1_000_000u64),
            total_gas_used: 500,
            transactions: vec![passing(500)],
        };

        let price = verify(&result).unwrap();
        assert_eq!(price.effective_gas_price, 2_000);
        assert_eq!(price.total_gas_used, 500);
    }

    #[test]
    fn zero_gas_used_does_not_divide() {
        let result = SimulationResult {
            coinbase_diff: U256::from(1u64),
            total_gas_used: 0,
            transactions: vec![],
        };

        assert_eq!(verify(&result).unwrap().effective_gas_price, 0);
    }
}
