use alloy::{
    network::TransactionBuilder,
    primitives::{Address, B256, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
    sol,
    sol_types::{SolCall, SolValue},
};
use async_trait::async_trait;
use eyre::Context;
use std::{collections::HashMap, fs, path::Path, sync::Arc};

use crate::error::BundleError;

sol!(
    #[allow(missing_docs)]
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    #[allow(missing_docs)]
    interface IERC721 {
        function setApprovalForAll(address operator, bool approved) external;
    }

    #[allow(missing_docs)]
    interface IAllowlistMinter {
        function mint(uint256 quantity, bytes32[] calldata merkleProof) external;
    }

    #[allow(missing_docs)]
    interface INftTransfer {
        function transferAllNFT(address collectionAddress, address recipientAddress) external;
    }
);

/// A producer contributes zero or more executor-signed transactions to the
/// bundle. Producers may perform read-only chain queries while building call
/// data; the assembler treats their output as opaque ordered requests and
/// overwrites the gas fields.
#[async_trait]
pub trait TransactionProducer: Send + Sync {
    fn description(&self) -> String;

    async fn sponsored_transactions(&self) -> eyre::Result<Vec<TransactionRequest>>;
}

/// Mints through a merkle-allowlisted mint function on the collection.
pub struct MintNft {
    collection: Address,
    quantity: u64,
    proof: Vec<B256>,
}

impl MintNft {
    pub fn new(collection: Address, quantity: u64, proof: Vec<B256>) -> Self {
        Self {
            collection,
            quantity,
            proof,
        }
    }
}

#[async_trait]
impl TransactionProducer for MintNft {
    fn description(&self) -> String {
        format!("Mint {} NFT(s) from collection {}", self.quantity, self.collection)
    }

    async fn sponsored_transactions(&self) -> eyre::Result<Vec<TransactionRequest>> {
        let calldata = IAllowlistMinter::mintCall {
            quantity: U256::from(self.quantity),
            merkleProof: self.proof.clone(),
        }
        .abi_encode();

        Ok(vec![TransactionRequest::default()
            .with_to(self.collection)
            .with_input(calldata)])
    }
}

/// Sweeps every NFT in the collection to the recipient through the deployed
/// transfer helper contract.
pub struct TransferAllNft {
    transfer_contract: Address,
    collection: Address,
    recipient: Address,
}

impl TransferAllNft {
    pub fn new(transfer_contract: Address, collection: Address, recipient: Address) -> Self {
        Self {
            transfer_contract,
            collection,
            recipient,
        }
    }
}

#[async_trait]
impl TransactionProducer for TransferAllNft {
    fn description(&self) -> String {
        format!(
            "Transfer all NFTs in collection {} to {}",
            self.collection, self.recipient
        )
    }

    async fn sponsored_transactions(&self) -> eyre::Result<Vec<TransactionRequest>> {
        let calldata = INftTransfer::transferAllNFTCall {
            collectionAddress: self.collection,
            recipientAddress: self.recipient,
        }
        .abi_encode();

        Ok(vec![TransactionRequest::default()
            .with_to(self.transfer_contract)
            .with_input(calldata)])
    }
}

/// Approves the payment token for the mint contract, skipping the transaction
/// entirely when the current allowance already covers the amount.
pub struct ApproveErc20 {
    provider: Arc<dyn Provider>,
    owner: Address,
    token: Address,
    spender: Address,
    amount: U256,
}

impl ApproveErc20 {
    pub fn new(
        provider: Arc<dyn Provider>,
        owner: Address,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Self {
        Self {
            provider,
            owner,
            token,
            spender,
            amount,
        }
    }

    async fn current_allowance(&self) -> eyre::Result<U256> {
        let calldata = IERC20::allowanceCall {
            owner: self.owner,
            spender: self.spender,
        }
        .abi_encode();

        let tx = TransactionRequest::default()
            .with_to(self.token)
            .with_input(calldata);

        let res = self
            .provider
            .call(tx)
            .await
            .context("allowance query failed")?;
        U256::abi_decode(&res).context("failed to decode allowance return data")
    }
}

#[async_trait]
impl TransactionProducer for ApproveErc20 {
    fn description(&self) -> String {
        format!(
            "Approve {} of token {} for spender {}",
            self.amount, self.token, self.spender
        )
    }

    async fn sponsored_transactions(&self) -> eyre::Result<Vec<TransactionRequest>> {
        if self.current_allowance().await? >= self.amount {
            return Ok(vec![]);
        }

        let calldata = IERC20::approveCall {
            spender: self.spender,
            amount: self.amount,
        }
        .abi_encode();

        Ok(vec![TransactionRequest::default()
            .with_to(self.token)
            .with_input(calldata)])
    }
}

/// Grants the transfer helper operator rights over the collection.
pub struct Approval721 {
    collection: Address,
    operator: Address,
}

impl Approval721 {
    pub fn new(collection: Address, operator: Address) -> Self {
        Self {
            collection,
            operator,
        }
    }
}

#[async_trait]
impl TransactionProducer for Approval721 {
    fn description(&self) -> String {
        format!(
            "Approve operator {} for all NFTs in collection {}",
            self.operator, self.collection
        )
    }

    async fn sponsored_transactions(&self) -> eyre::Result<Vec<TransactionRequest>> {
        let calldata = IERC721::setApprovalForAllCall {
            operator: self.operator,
            approved: true,
        }
        .abi_encode();

        Ok(vec![TransactionRequest::default()
            .with_to(self.collection)
            .with_input(calldata)])
    }
}

/// Resolve the executor's merkle allowlist proof. No proof file means the
/// mint takes an empty proof; a file without an entry for the executor is a
/// validation failure raised before anything is signed or submitted.
pub fn load_merkle_proof(path: Option<&Path>, executor: Address) -> eyre::Result<Vec<B256>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let file = fs::File::open(path).with_context(|| format!("read {}", path.display()))?;
    let proofs: HashMap<Address, Vec<B256>> =
        serde_json::from_reader(file).context("parse merkle proof file")?;

    proofs.get(&executor).cloned().ok_or_else(|| {
        BundleError::Validation(format!("no merkle proof for executor {executor}")).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    const COLLECTION: Address = address!("0x34d85c9CDeB23FA97cb08333b511ac86E1C4E258");
    const HELPER: Address = address!("0x1111111111111111111111111111111111111111");
    const RECIPIENT: Address = address!("0x2222222222222222222222222222222222222222");

    #[tokio::test]
    async fn mint_calldata_targets_collection() {
        let proof =
            vec![b256!("0x00000000000000000000000000000000000000000000000000000000000000aa")];
        let producer = MintNft::new(COLLECTION, 2, proof.clone());

        let txs = producer.sponsored_transactions().await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].to, Some(COLLECTION.into()));

        let input = txs[0].input.input().unwrap();
        let decoded = IAllowlistMinter::mintCall::abi_decode(input).unwrap();
        assert_eq!(decoded.quantity, U256::from(2));
        assert_eq!(decoded.merkleProof, proof);
    }

    #[tokio::test]
    async fn transfer_all_calldata_targets_helper() {
        let producer = TransferAllNft::new(HELPER, COLLECTION, RECIPIENT);

        let txs = producer.sponsored_transactions().await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].to, Some(HELPER.into()));

        let input = txs[0].input.input().unwrap();
        let decoded = INftTransfer::transferAllNFTCall::abi_decode(input).unwrap();
        assert_eq!(decoded.collectionAddress, COLLECTION);
        assert_eq!(decoded.recipientAddress, RECIPIENT);
    }

    #[test]
    fn absent_proof_file_means_an_open_mint() {
        let proof = load_merkle_proof(None, RECIPIENT).unwrap();
        assert!(proof.is_empty());
    }

    #[test]
    fn proof_is_looked_up_by_executor_address() {
        let leaf = b256!("0x00000000000000000000000000000000000000000000000000000000000000aa");
        let path = std::env::temp_dir().join("sponsored-bundle-proof-hit.json");
        fs::write(&path, format!(r#"{{"{RECIPIENT}": ["{leaf}"]}}"#)).unwrap();

        let proof = load_merkle_proof(Some(&path), RECIPIENT).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(proof, vec![leaf]);
    }

    #[test]
    fn proof_file_without_the_executor_is_a_validation_error() {
        let path = std::env::temp_dir().join("sponsored-bundle-proof-miss.json");
        fs::write(&path, format!(r#"{{"{RECIPIENT}": []}}"#)).unwrap();

        let err = load_merkle_proof(Some(&path), COLLECTION).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(
            err.downcast_ref::<BundleError>(),
            Some(BundleError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn approval_721_grants_operator() {
        let producer = Approval721::new(COLLECTION, HELPER);

        let txs = producer.sponsored_transactions().await.unwrap();
        let input = txs[0].input.input().unwrap();
        let decoded = IERC721::setApprovalForAllCall::abi_decode(input).unwrap();
        assert_eq!(decoded.operator, HELPER);
        assert!(decoded.approved);
    }
}
