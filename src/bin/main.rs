use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sentinel_ai::PendingAction;
use sentinel_core::{keccak256, Address};
use sentinel_crypto::BlsSigner;
use sentinel_root::{logging, Devnet, SentinelConfig};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Sentinel local devnet: threshold-signed emergency pauses", long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides RUST_LOG and the configured level
    #[arg(long)]
    log_level: Option<String>,

    /// Number of in-process signer nodes
    #[arg(long, default_value_t = 5)]
    nodes: usize,

    /// Seconds between synthetic exploit attempts; 0 disables traffic
    #[arg(long, default_value_t = 30)]
    traffic_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = SentinelConfig::load(args.config.as_deref()).context("loading configuration")?;
    logging::init(&config.logging, args.log_level.as_deref())?;

    let key_path = config.node.key_path();
    let signer = BlsSigner::load_or_generate(&key_path)
        .with_context(|| format!("loading BLS key from {}", key_path.display()))?;
    info!(node = %config.node.name, public_key = %signer.public_key_hex(), "loaded signer key");

    let devnet = Devnet::build(&config, args.nodes, Some(signer), None).context("building devnet")?;
    let cancel = CancellationToken::new();
    let handle = devnet.start(&cancel);

    let traffic = {
        let cancel = cancel.clone();
        let feeder = handle.feeder();
        let target = devnet.protected;
        let interval = args.traffic_interval;
        tokio::spawn(async move {
            if interval == 0 {
                return;
            }
            let mut ticker = tokio::time::interval(Duration::from_secs(interval));
            let mut nonce: u64 = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        nonce += 1;
                        let action = synthetic_exploit(target, nonce);
                        info!(tx = %action.hash, "injecting synthetic exploit");
                        if feeder.broadcast(&action).await == 0 {
                            return;
                        }
                    }
                }
            }
        })
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    cancel.cancel();

    let timeout = Duration::from_secs(config.node.shutdown_timeout_secs);
    if tokio::time::timeout(timeout, handle.join()).await.is_err() {
        warn!("nodes did not stop within {:?}", timeout);
    }
    if let Err(e) = traffic.await {
        error!(error = %e, "traffic task failed");
    }

    let stats = devnet.ledger.with(|l| l.stats());
    info!(
        created = stats.requests_created,
        attempted = stats.pauses_attempted,
        succeeded = stats.pauses_succeeded,
        failed = stats.pauses_failed,
        "final ledger statistics"
    );
    for node in &devnet.nodes {
        info!(node = %node.id(), stats = %serde_json::to_string(&node.stats())?, "final node statistics");
    }
    Ok(())
}

/// Flash-loan call with heavy gas and calldata against the protected entity.
fn synthetic_exploit(target: Address, nonce: u64) -> PendingAction {
    let mut input = vec![0x5c, 0xff, 0xe9, 0xde];
    input.resize(12_000, 0);
    PendingAction {
        hash: keccak256(&[b"synthetic-exploit".as_slice(), &nonce.to_be_bytes()[..]].concat()),
        from: Address::derive(b"synthetic-attacker"),
        to: Some(target),
        value: 10 * sentinel_ai::ONE_ETHER,
        gas: 5_000_000,
        input,
    }
}
