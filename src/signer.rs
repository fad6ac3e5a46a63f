use alloy::{
    consensus::{SignableTransaction, TxEnvelope, TxLegacy},
    eips::eip2718::Encodable2718,
    network::TxSignerSync,
    primitives::{Address, Bytes, B256},
    signers::local::PrivateKeySigner,
};

use crate::bundle::{BundleEntry, SignerRole};
use crate::error::BundleError;

/// An account that signs bundle entries. The nonce is fetched once at startup
/// and stays fixed for the process lifetime, which is what makes resubmitting
/// the same bundle at successive target blocks safe.
#[derive(Debug, Clone)]
pub struct SignerIdentity {
    signer: PrivateKeySigner,
    pub address: Address,
    pub base_nonce: u64,
}

impl SignerIdentity {
    pub fn new(signer: PrivateKeySigner, base_nonce: u64) -> Self {
        let address = signer.address();
        Self {
            signer,
            address,
            base_nonce,
        }
    }
}

/// Relay-ready bundle: raw EIP-2718 encodings in assembly order, plus the
/// account premises the resolution classifier needs.
#[derive(Debug, Clone)]
pub struct SignedBundle {
    pub raw_txs: Vec<Bytes>,
    pub tx_hashes: Vec<B256>,
    pub executor: Address,
    pub executor_base_nonce: u64,
    pub sponsor: Address,
    pub sponsor_base_nonce: u64,
}

pub struct BundleSigner {
    pub executor: SignerIdentity,
    pub sponsor: SignerIdentity,
    chain_id: u64,
}

impl BundleSigner {
    pub fn new(executor: SignerIdentity, sponsor: SignerIdentity, chain_id: u64) -> Self {
        Self {
            executor,
            sponsor,
            chain_id,
        }
    }

    /// Sign every entry in order. Nonces are assigned per role in bundle
    /// order starting from each identity's base nonce, so signing the same
    /// entries twice yields byte-identical transactions.
    pub fn sign(&self, entries: &[BundleEntry]) -> Result<SignedBundle, BundleError> {
        let mut raw_txs = Vec::with_capacity(entries.len());
        let mut tx_hashes = Vec::with_capacity(entries.len());
        let mut sponsor_nonce = self.sponsor.base_nonce;
        let mut executor_nonce = self.executor.base_nonce;

        for (index, entry) in entries.iter().enumerate() {
            let (identity, nonce) = match entry.role {
                SignerRole::Sponsor => {
                    let nonce = sponsor_nonce;
                    sponsor_nonce += 1;
                    (&self.sponsor, nonce)
                }
                SignerRole::Executor => {
                    let nonce = executor_nonce;
                    executor_nonce += 1;
                    (&self.executor, nonce)
                }
            };

            let mut tx = materialize(entry, nonce, self.chain_id, index)?;
            let signature = identity
                .signer
                .sign_transaction_sync(&mut tx)
                .map_err(|e| BundleError::Signing {
                    index,
                    reason: e.to_string(),
                })?;

            let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
            tx_hashes.push(*envelope.tx_hash());
            raw_txs.push(envelope.encoded_2718().into());
        }

        Ok(SignedBundle {
            raw_txs,
            tx_hashes,
            executor: self.executor.address,
            executor_base_nonce: self.executor.base_nonce,
            sponsor: self.sponsor.address,
            sponsor_base_nonce: self.sponsor.base_nonce,
        })
    }
}

/// A bundle entry must carry a target, a gas limit, and a gas price before it
/// can be signed; the assembler is responsible for all three.
fn materialize(
    entry: &BundleEntry,
    nonce: u64,
    chain_id: u64,
    index: usize,
) -> Result<TxLegacy, BundleError> {
    let missing = |field: &str| BundleError::Signing {
        index,
        reason: format!("entry is missing {field}"),
    };

    Ok(TxLegacy {
        chain_id: Some(chain_id),
        nonce,
        gas_price: entry.tx.gas_price.ok_or_else(|| missing("gas price"))?,
        gas_limit: entry.tx.gas.ok_or_else(|| missing("gas limit"))?,
        to: entry.tx.to.ok_or_else(|| missing("to address"))?,
        value: entry.tx.value.unwrap_or_default(),
        input: entry.tx.input.input().cloned().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::transaction::SignerRecoverable;
    use alloy::consensus::Transaction;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::network::TransactionBuilder;
    use alloy::primitives::{address, U256};
    use alloy::rpc::types::TransactionRequest;

    fn entry(role: SignerRole) -> BundleEntry {
        BundleEntry {
            tx: TransactionRequest::default()
                .with_to(address!("0xcccccccccccccccccccccccccccccccccccccccc"))
                .with_value(U256::from(1u64))
                .with_gas_limit(25_000)
                .with_gas_price(1_000),
            role,
        }
    }

    fn signer() -> BundleSigner {
        BundleSigner::new(
            SignerIdentity::new(PrivateKeySigner::random(), 7),
            SignerIdentity::new(PrivateKeySigner::random(), 3),
            1,
        )
    }

    #[test]
    fn resigning_is_byte_identical() {
        let signer = signer();
        let entries = vec![
            entry(SignerRole::Sponsor),
            entry(SignerRole::Sponsor),
            entry(SignerRole::Executor),
        ];

        let first = signer.sign(&entries).unwrap();
        let second = signer.sign(&entries).unwrap();
        assert_eq!(first.raw_txs, second.raw_txs);
        assert_eq!(first.tx_hashes, second.tx_hashes);
    }

    #[test]
    fn nonces_and_signers_follow_roles_in_order() {
        let signer = signer();
        let entries = vec![
            entry(SignerRole::Sponsor),
            entry(SignerRole::Sponsor),
            entry(SignerRole::Executor),
            entry(SignerRole::Executor),
        ];

        let bundle = signer.sign(&entries).unwrap();
        assert_eq!(bundle.raw_txs.len(), 4);

        let mut senders = Vec::new();
        let mut nonces = Vec::new();
        for raw in &bundle.raw_txs {
            let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
            senders.push(envelope.recover_signer().unwrap());
            nonces.push(envelope.nonce());
        }

        assert_eq!(
            senders,
            vec![
                signer.sponsor.address,
                signer.sponsor.address,
                signer.executor.address,
                signer.executor.address
            ]
        );
        assert_eq!(nonces, vec![3, 4, 7, 8]);
    }

    #[test]
    fn unmaterialized_entry_is_a_signing_error() {
        let signer = signer();
        let mut bad = entry(SignerRole::Executor);
        bad.tx.gas = None;

        let err = signer.sign(&[bad]).unwrap_err();
        assert!(matches!(err, BundleError::Signing { index: 0, .. }));
    }
}
