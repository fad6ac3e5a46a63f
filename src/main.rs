use alloy::{
    primitives::{Address, B256},
    providers::{Provider, ProviderBuilder, WsConnect},
    rpc::types::TransactionRequest,
    signers::{local::PrivateKeySigner, Signer},
};
use burberry::{collector::BlockCollector, map_collector, map_executor, Engine};
use clap::Parser;
use eyre::WrapErr;
use sponsored_bundle::{
    block_state::latest_block_info,
    bundle::{collect_sponsored, BundlePlan},
    constants::DEFAULT_RELAY_URL,
    controller::{Config, SubmissionController},
    executor::RelaySubmitter,
    gas::{bundle_gas_price, to_gwei},
    producer::{
        load_merkle_proof, Approval721, ApproveErc20, MintNft, TransactionProducer, TransferAllNft,
    },
    relay::{FlashbotsRelay, Relay},
    signer::{BundleSigner, SignerIdentity},
    simulation::check_simulation,
    types::{Action, Event},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, Level};
use tracing_subscriber::{filter, prelude::*};

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "ETH_RPC_URL")]
    pub rpc_url: String,

    /// EOA performing the sponsored actions (mint, transfer).
    #[arg(long, env = "PRIVATE_KEY_EXECUTOR")]
    pub executor_key: B256,

    /// EOA paying the executor's gas and the token cost.
    #[arg(long, env = "PRIVATE_KEY_SPONSOR")]
    pub sponsor_key: B256,

    /// Flashbots reputation key used to sign relay requests.
    #[arg(long, env = "FLASHBOTS_RELAY_SIGNING_KEY")]
    pub relay_key: B256,

    /// Address receiving the swept NFTs; defaults to the sponsor.
    #[arg(long, env = "RECIPIENT")]
    pub recipient: Option<Address>,

    #[arg(long, env = "RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    pub relay_url: String,

    #[command(flatten)]
    pub config: Config,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Set up tracing and parse args.
    let filter = filter::Targets::new()
        .with_target("sponsored_bundle", Level::INFO)
        .with_target("burberry", Level::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let args = Args::parse();
    let cfg = args.config;

    let ws = WsConnect::new(args.rpc_url);
    let provider = ProviderBuilder::new()
        .connect_ws(ws)
        .await
        .context("failed to create ws provider")?;

    let provider: Arc<dyn Provider> = Arc::new(provider);
    let chain_id = provider
        .get_chain_id()
        .await
        .context("failed to get chain id")?;

    let executor_signer = PrivateKeySigner::from_bytes(&args.executor_key)
        .context("failed to parse executor key")?
        .with_chain_id(Some(chain_id));
    let sponsor_signer = PrivateKeySigner::from_bytes(&args.sponsor_key)
        .context("failed to parse sponsor key")?
        .with_chain_id(Some(chain_id));
    let relay_signer =
        PrivateKeySigner::from_bytes(&args.relay_key).context("failed to parse relay key")?;

    let executor_nonce = provider
        .get_transaction_count(executor_signer.address())
        .await
        .context("failed to get executor nonce")?;
    let sponsor_nonce = provider
        .get_transaction_count(sponsor_signer.address())
        .await
        .context("failed to get sponsor nonce")?;

    let signer = BundleSigner::new(
        SignerIdentity::new(executor_signer, executor_nonce),
        SignerIdentity::new(sponsor_signer, sponsor_nonce),
        chain_id,
    );
    let executor = signer.executor.address;
    let sponsor = signer.sponsor.address;
    let recipient = args.recipient.unwrap_or(sponsor);

    let proof = load_merkle_proof(cfg.merkle_proofs.as_deref(), executor)?;
    let mut producers: Vec<Box<dyn TransactionProducer>> = Vec::new();
    if cfg.approve_token {
        producers.push(Box::new(ApproveErc20::new(
            Arc::clone(&provider),
            executor,
            cfg.token_address,
            cfg.nft_address,
            cfg.token_amount(),
        )));
    }
    producers.push(Box::new(MintNft::new(
        cfg.nft_address,
        cfg.nfts_to_mint,
        proof,
    )));
    if cfg.approve_collection {
        producers.push(Box::new(Approval721::new(
            cfg.nft_address,
            cfg.nft_transfer_address,
        )));
    }
    producers.push(Box::new(TransferAllNft::new(
        cfg.nft_transfer_address,
        cfg.nft_address,
        recipient,
    )));

    let sponsored = collect_sponsored(&producers).await?;

    let gas_estimates = if cfg.gas_estimates.is_empty() {
        estimate_gas_limits(&provider, executor, &sponsored).await?
    } else {
        cfg.gas_estimates.clone()
    };

    let plan = BundlePlan {
        executor,
        token: cfg.token_address,
        token_amount: cfg.token_amount(),
        sponsored,
        gas_estimates,
    };

    let relay: Arc<dyn Relay> = Arc::new(FlashbotsRelay::new(
        &args.relay_url,
        relay_signer,
        Arc::clone(&provider),
    )?);

    // Assemble, sign, and simulate once before the retry loop starts; a
    // reverting bundle must never reach the relay's submit endpoint.
    let block = latest_block_info(&provider).await?;
    let gas_price = bundle_gas_price(block.base_fee_per_gas, cfg.priority_premium());
    let entries = plan.assemble(gas_price)?;
    let bundle = signer.sign(&entries)?;

    info!(
        %executor,
        %sponsor,
        transactions = bundle.raw_txs.len(),
        total_gas = plan.total_gas_estimate(),
        gas_price_gwei = to_gwei(gas_price),
        "bundle assembled"
    );

    let simulated = check_simulation(relay.as_ref(), &bundle, block.number).await?;
    info!(
        effective_gwei = to_gwei(simulated.effective_gas_price),
        gas_used = simulated.total_gas_used,
        "initial simulation passed"
    );

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(None::<i32>);

    let controller = SubmissionController::new(
        plan,
        signer,
        Arc::clone(&relay),
        &cfg,
        Some((gas_price, bundle)),
        outcome_rx,
        shutdown_tx,
    );

    let mut engine = Engine::new();

    let block_collector = BlockCollector::new(Arc::clone(&provider));
    engine.add_collector(map_collector!(block_collector, Event::Block));
    engine.add_strategy(Box::new(controller));

    let relay_submitter = RelaySubmitter::new(relay, outcome_tx);
    engine.add_executor(map_executor!(relay_submitter, Action::SubmitBundle));

    tokio::spawn(async move {
        while shutdown_rx.changed().await.is_ok() {
            let code = *shutdown_rx.borrow_and_update();
            if let Some(code) = code {
                if code == 0 {
                    info!("bundle included, exiting");
                } else {
                    error!("terminal bundle failure, exiting");
                }
                std::process::exit(code);
            }
        }
    });

    engine.run_and_join().await.unwrap();
    Ok(())
}

/// Fallback when no pre-measured gas limits are configured: dry-run each
/// sponsored transaction against the node.
async fn estimate_gas_limits(
    provider: &Arc<dyn Provider>,
    from: Address,
    txs: &[TransactionRequest],
) -> eyre::Result<Vec<u64>> {
    let mut limits = Vec::with_capacity(txs.len());
    for tx in txs {
        let mut request = tx.clone();
        request.from = Some(from);
        let gas = provider
            .estimate_gas(request)
            .await
            .context("failed to estimate gas for sponsored transaction")?;
        limits.push(gas);
    }
    info!(?limits, "measured sponsored gas limits");
    Ok(limits)
}
