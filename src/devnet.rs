//! Local devnet: several signer nodes in one process sharing an in-process
//! transport and ledger, with one funded protected entity.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sentinel_ai::{InferenceBridge, PendingAction, RiskEngine};
use sentinel_consensus::{InMemoryPauseTarget, ShieldLedger};
use sentinel_core::{unix_now, Address};
use sentinel_crypto::BlsSigner;
use sentinel_p2p::{CoordinationChannel, LocalHub, LocalTransport, MessageVerifier};

use crate::config::{tokens, SentinelConfig};
use crate::error::NodeError;
use crate::gateway::{InProcessLedger, LedgerGateway};
use crate::node::{signer_address, NodeSettings, SentinelNode};

pub type DevnetLedger = InProcessLedger<InMemoryPauseTarget>;
pub type DevnetNode = SentinelNode<LocalTransport>;

/// Stake each devnet signer bonds, as a multiple of the minimum.
const STAKE_MULTIPLIER: u128 = 2;
const PROTECTED_TVL_TOKENS: u64 = 5_000_000;
const PROTECTED_DEPOSIT_TOKENS: u64 = 10_000;

pub struct Devnet {
    pub nodes: Vec<Arc<DevnetNode>>,
    pub ledger: DevnetLedger,
    pub protected: Address,
    pub admin: Address,
    pub oracle: Address,
}

pub struct DevnetHandle {
    /// One feed per node, same order as [`Devnet::nodes`]
    pub feeds: Vec<mpsc::Sender<PendingAction>>,
    tasks: JoinSet<()>,
}

/// Cloneable sending side of every node's action feed.
#[derive(Clone)]
pub struct DevnetFeeder {
    feeds: Vec<mpsc::Sender<PendingAction>>,
}

impl DevnetFeeder {
    /// Deliver one pending action to every node. Returns how many nodes
    /// accepted it.
    pub async fn broadcast(&self, action: &PendingAction) -> usize {
        let mut delivered = 0;
        for (node, feed) in self.feeds.iter().enumerate() {
            match feed.send(action.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => warn!(node, tx = %action.hash, "node stopped, dropping action"),
            }
        }
        delivered
    }
}

impl DevnetHandle {
    pub fn feeder(&self) -> DevnetFeeder {
        DevnetFeeder {
            feeds: self.feeds.clone(),
        }
    }

    pub async fn join(mut self) {
        self.feeds.clear();
        while self.tasks.join_next().await.is_some() {}
    }
}

impl Devnet {
    /// Build `node_count` signers. When `first_key` is given the first node
    /// uses it instead of an ephemeral key.
    pub fn build(
        config: &SentinelConfig,
        node_count: usize,
        first_key: Option<BlsSigner>,
        engine: Option<Arc<dyn RiskEngine>>,
    ) -> Result<Self, NodeError> {
        if node_count == 0 {
            return Err(NodeError::EmptyDevnet);
        }
        let now = unix_now();
        let admin = Address::derive(b"sentinel-devnet-admin");
        let oracle = Address::derive(b"sentinel-devnet-oracle");
        let protected = Address::derive(b"sentinel-devnet-protocol");

        let mut ledger = ShieldLedger::new(
            config.consensus.consensus_config(),
            config.escrow.escrow_config(),
            config.consensus.min_stake(),
            admin,
            oracle,
            InMemoryPauseTarget::new(),
        )?;

        let mut signers = Vec::with_capacity(node_count);
        let mut first_key = first_key;
        for _ in 0..node_count {
            let signer = first_key.take().unwrap_or_else(BlsSigner::ephemeral);
            let id = signer_address(&signer.public_key());
            let stake = config.consensus.min_stake().max(1) * STAKE_MULTIPLIER;
            ledger
                .registry_mut()
                .register(id, signer.public_key(), &signer.prove_possession(), stake, now)?;
            ledger.registry_mut().activate(&id)?;
            signers.push(signer);
        }

        ledger
            .escrow_mut()
            .register_protocol(protected, tokens(PROTECTED_TVL_TOKENS), now)?;
        ledger
            .escrow_mut()
            .deposit_bounty(&protected, tokens(PROTECTED_DEPOSIT_TOKENS))?;

        let ledger = InProcessLedger::new(ledger);
        let hub = LocalHub::new(config.p2p.hub_capacity);
        let settings = NodeSettings {
            pause_threshold: config.inference.pause_threshold,
            cosign_window: std::time::Duration::from_secs(config.node.cosign_window_secs),
        };

        let mut nodes = Vec::with_capacity(node_count);
        for signer in signers {
            let id = signer_address(&signer.public_key());
            let verifier: Arc<dyn MessageVerifier> = Arc::new(ledger.clone());
            let channel = CoordinationChannel::new(
                id,
                hub.join(&config.p2p.topic_name),
                verifier,
                config.p2p.channel_config(),
            )?;
            let bridge = match &engine {
                Some(engine) => InferenceBridge::new(Arc::clone(engine), config.inference.bridge_config()),
                None => InferenceBridge::offline(config.inference.bridge_config()),
            };
            let gateway: Arc<dyn LedgerGateway> = Arc::new(ledger.clone());
            nodes.push(Arc::new(SentinelNode::new(signer, channel, bridge, gateway, settings)?));
        }

        info!(
            nodes = nodes.len(),
            required = ledger.with(|l| l.required_signers()),
            protected = %protected,
            "devnet ready"
        );

        Ok(Devnet {
            nodes,
            ledger,
            protected,
            admin,
            oracle,
        })
    }

    /// Spawn every node's run loop.
    pub fn start(&self, cancel: &CancellationToken) -> DevnetHandle {
        let mut tasks = JoinSet::new();
        let mut feeds = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let (tx, rx) = mpsc::channel(64);
            let node = Arc::clone(node);
            let cancel = cancel.clone();
            tasks.spawn(async move { node.run(rx, cancel).await });
            feeds.push(tx);
        }
        DevnetHandle { feeds, tasks }
    }
}
