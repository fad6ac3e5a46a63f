use crate::constants::GWEI;

/// Uniform gas price for every transaction in the bundle: a static priority
/// premium on top of the observed base fee. Pre-1559 chains report no base
/// fee, which counts as zero.
pub fn bundle_gas_price(base_fee_per_gas: Option<u64>, priority_premium: u128) -> u128 {
    priority_premium + base_fee_per_gas.unwrap_or_default() as u128
}

pub fn to_gwei(wei: u128) -> f64 {
    wei as f64 / GWEI as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_is_base_fee_plus_premium() {
        for (base_fee, premium) in [(0u64, 0u128), (1, 1), (30 * GWEI as u64, 4_000 * GWEI), (u32::MAX as u64, 7)] {
            assert_eq!(
                bundle_gas_price(Some(base_fee), premium),
                base_fee as u128 + premium
            );
        }
    }

    #[test]
    fn missing_base_fee_counts_as_zero() {
        assert_eq!(bundle_gas_price(None, 4_000 * GWEI), 4_000 * GWEI);
        assert_eq!(bundle_gas_price(None, 0), 0);
    }

    #[test]
    fn gwei_formatting() {
        assert_eq!(to_gwei(GWEI), 1.0);
        assert_eq!(to_gwei(GWEI / 2), 0.5);
    }
}
