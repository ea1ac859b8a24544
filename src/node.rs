//! SENTINEL NODE
//!
//! One signer's runtime: scores pending actions, raises alerts, opens pause
//! requests for protected entities and co-signs requests from peers that it
//! can corroborate from its own recent alerts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sentinel_ai::{quick_filter, InferenceBridge, PendingAction, RiskVerdict};
use sentinel_consensus::{ConsensusError, Submission};
use sentinel_core::{unix_now, Address, RequestId};
use sentinel_crypto::{BlsSigner, PublicKey};
use sentinel_p2p::{
    Alert, AlertLevel, CoordinationChannel, Inbound, PauseRequestBody, SignedPauseRequest, Transport,
};

use crate::error::NodeError;
use crate::gateway::LedgerGateway;

/// Signer address bound to a BLS public key.
pub fn signer_address(public_key: &PublicKey) -> Address {
    Address::derive(&public_key.to_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSettings {
    pub pause_threshold: f64,
    pub cosign_window: Duration,
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            pause_threshold: 0.8,
            cosign_window: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub analyzed: u64,
    pub filtered: u64,
    pub suspicious: u64,
    pub alerts_received: u64,
    pub requests_created: u64,
    pub requests_signed: u64,
    /// Peer requests held until this node sees the threat itself
    pub requests_deferred: u64,
    /// Peer requests refused because this node already backs another one
    pub requests_declined: u64,
    /// Executions triggered by this node's submission
    pub pauses_triggered: u64,
}

/// What a node did with one pending action.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    Filtered,
    Cleared(RiskVerdict),
    Alerted(RiskVerdict),
    PauseRequested {
        verdict: RiskVerdict,
        request: SignedPauseRequest,
        submission: Submission,
    },
    Cosigned {
        verdict: RiskVerdict,
        submission: Submission,
    },
    PauseRejected {
        verdict: RiskVerdict,
        reason: ConsensusError,
    },
}

#[derive(Default)]
struct Memory {
    /// Targets this node flagged, with when
    flagged: HashMap<Address, Instant>,
    /// Request this node backs per target
    backing: HashMap<Address, (RequestId, Instant)>,
    /// Peer requests waiting for local corroboration
    deferred: HashMap<Address, (SignedPauseRequest, Instant)>,
}

impl Memory {
    fn prune(&mut self, now: Instant, window: Duration) {
        let fresh = |at: &Instant| now.saturating_duration_since(*at) <= window;
        self.flagged.retain(|_, at| fresh(at));
        self.backing.retain(|_, (_, at)| fresh(at));
        self.deferred.retain(|_, (_, at)| fresh(at));
    }
}

pub struct SentinelNode<T: Transport> {
    id: Address,
    signer: BlsSigner,
    channel: CoordinationChannel<T>,
    bridge: InferenceBridge,
    gateway: Arc<dyn LedgerGateway>,
    settings: NodeSettings,
    memory: Mutex<Memory>,
    stats: Mutex<NodeStats>,
}

impl<T: Transport> SentinelNode<T> {
    pub fn new(
        signer: BlsSigner,
        channel: CoordinationChannel<T>,
        bridge: InferenceBridge,
        gateway: Arc<dyn LedgerGateway>,
        settings: NodeSettings,
    ) -> Result<Self, NodeError> {
        let id = signer_address(&signer.public_key());
        if channel.local_id() != id {
            return Err(NodeError::IdentityMismatch {
                signer: id,
                channel: channel.local_id(),
            });
        }
        Ok(SentinelNode {
            id,
            signer,
            channel,
            bridge,
            gateway,
            settings,
            memory: Mutex::new(Memory::default()),
            stats: Mutex::new(NodeStats::default()),
        })
    }

    pub fn id(&self) -> Address {
        self.id
    }

    pub fn stats(&self) -> NodeStats {
        *self.stats.lock()
    }

    pub fn channel(&self) -> &CoordinationChannel<T> {
        &self.channel
    }

    pub fn bridge(&self) -> &InferenceBridge {
        &self.bridge
    }

    /// Score one pending action and act on the verdict.
    pub async fn observe(&self, action: &PendingAction) -> Reaction {
        self.stats.lock().analyzed += 1;
        if !quick_filter(action) {
            self.stats.lock().filtered += 1;
            return Reaction::Filtered;
        }

        let verdict = self.bridge.analyze(action).await;
        if !verdict.suspicious {
            return Reaction::Cleared(verdict);
        }
        self.stats.lock().suspicious += 1;
        warn!(
            tx = %action.hash,
            score = verdict.score,
            risk = ?verdict.risk_level,
            indicators = ?verdict.indicators,
            "suspicious transaction detected"
        );
        self.raise_alert(action, &verdict).await;

        let Some(target) = action.to else {
            return Reaction::Alerted(verdict);
        };

        let now = Instant::now();
        let deferred = {
            let mut memory = self.memory.lock();
            memory.prune(now, self.settings.cosign_window);
            memory.flagged.insert(target, now);
            if memory.backing.contains_key(&target) {
                return Reaction::Alerted(verdict);
            }
            memory.deferred.remove(&target).map(|(request, _)| request)
        };

        // A peer already asked for this pause; back it rather than compete.
        if let Some(request) = deferred {
            return match self.cosign(&request).await {
                Ok(submission) => Reaction::Cosigned { verdict, submission },
                Err(reason) => Reaction::PauseRejected { verdict, reason },
            };
        }

        if verdict.score < self.settings.pause_threshold || !self.gateway.is_protected(&target).await {
            return Reaction::Alerted(verdict);
        }
        self.open_request(target, action, verdict).await
    }

    async fn open_request(&self, target: Address, action: &PendingAction, verdict: RiskVerdict) -> Reaction {
        let body = PauseRequestBody {
            target,
            evidence: action.hash,
            created_at: unix_now(),
        };
        let request = SignedPauseRequest {
            request: body,
            signature: self.signer.sign(&body.signing_message()),
            signer: self.id,
        };

        match self.gateway.create_request(self.id, &body, request.signature).await {
            Ok(submission) => {
                {
                    let mut stats = self.stats.lock();
                    stats.requests_created += 1;
                    if submission.execution.is_some() {
                        stats.pauses_triggered += 1;
                    }
                }
                self.memory
                    .lock()
                    .backing
                    .insert(target, (submission.request_id, Instant::now()));
                info!(
                    request = %submission.request_id.short(),
                    %target,
                    attestations = submission.attestations,
                    required = submission.required,
                    "pause request opened"
                );
                if let Err(e) = self.channel.broadcast_pause_request(&request).await {
                    warn!(error = %e, "failed to broadcast pause request");
                }
                Reaction::PauseRequested {
                    verdict,
                    request,
                    submission,
                }
            }
            // A peer opened the identical request in the same second.
            Err(ConsensusError::DuplicateRequest(_)) => match self.cosign(&request).await {
                Ok(submission) => Reaction::Cosigned { verdict, submission },
                Err(reason) => Reaction::PauseRejected { verdict, reason },
            },
            Err(reason) => {
                warn!(%target, error = %reason, "pause request refused");
                Reaction::PauseRejected { verdict, reason }
            }
        }
    }

    async fn raise_alert(&self, action: &PendingAction, verdict: &RiskVerdict) {
        let alert = Alert {
            id: Alert::derive_id(&action.hash, &self.id),
            level: AlertLevel::from_score(verdict.score),
            tx_hash: action.hash,
            target: action.to,
            message: "Suspicious transaction detected".into(),
            timestamp: unix_now(),
            score: verdict.score,
            indicators: verdict.indicators.clone(),
        };
        if let Err(e) = self.channel.broadcast_alert(&alert).await {
            warn!(error = %e, "failed to broadcast alert");
        }
    }

    /// Attest to `request` with this node's key and tell the peers.
    async fn cosign(&self, request: &SignedPauseRequest) -> Result<Submission, ConsensusError> {
        let request_id = request.request.request_id();
        let signature = self.signer.sign(&request.request.signing_message());
        let submission = self
            .gateway
            .attest(&request_id, self.id, signature)
            .await?;

        {
            let mut stats = self.stats.lock();
            stats.requests_signed += 1;
            if submission.execution.is_some() {
                stats.pauses_triggered += 1;
            }
        }
        self.memory
            .lock()
            .backing
            .insert(request.request.target, (request_id, Instant::now()));
        info!(
            request = %request_id.short(),
            attestations = submission.attestations,
            required = submission.required,
            "co-signed pause request"
        );
        if let Err(e) = self.channel.broadcast_signature(request_id, signature).await {
            warn!(error = %e, "failed to broadcast partial signature");
        }
        Ok(submission)
    }

    /// React to one authenticated message. Returns the ledger submission when
    /// this node attested.
    pub async fn handle_inbound(&self, message: Inbound) -> Option<Submission> {
        match message {
            Inbound::PauseRequest(request) => self.on_pause_request(request).await,
            Inbound::PartialSignature { signer, partial } => {
                debug!(%signer, request = %partial.request_id.short(), "peer attested");
                None
            }
            Inbound::Alert { sender, alert } => {
                self.stats.lock().alerts_received += 1;
                info!(
                    %sender,
                    id = %alert.id,
                    level = ?alert.level,
                    message = %alert.message,
                    "received alert from peer"
                );
                None
            }
            Inbound::Heartbeat { .. } => None,
        }
    }

    async fn on_pause_request(&self, request: SignedPauseRequest) -> Option<Submission> {
        let target = request.request.target;
        let request_id = request.request.request_id();
        info!(%target, signer = %request.signer, request = %request_id.short(), "received pause request");

        let now = Instant::now();
        {
            let mut memory = self.memory.lock();
            memory.prune(now, self.settings.cosign_window);
            if let Some((backed, _)) = memory.backing.get(&target) {
                if *backed != request_id {
                    self.stats.lock().requests_declined += 1;
                    debug!(%target, backed = %backed.short(), "already backing another request");
                }
                return None;
            }
            if !memory.flagged.contains_key(&target) {
                self.stats.lock().requests_deferred += 1;
                debug!(%target, "not corroborated locally, holding request");
                memory.deferred.insert(target, (request, now));
                return None;
            }
        }

        match self.cosign(&request).await {
            Ok(submission) => Some(submission),
            Err(e) => {
                debug!(request = %request_id.short(), error = %e, "could not co-sign");
                None
            }
        }
    }

    /// Run until `cancel` fires: pending actions arrive on `actions`, peer
    /// messages through the coordination channel.
    pub async fn run(&self, mut actions: mpsc::Receiver<PendingAction>, cancel: CancellationToken) {
        let (inbound_tx, mut inbound_rx) = mpsc::channel(256);
        info!(node = %self.id, "sentinel node started");

        let events = async {
            let mut actions_open = true;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    action = actions.recv(), if actions_open => match action {
                        Some(action) => {
                            self.observe(&action).await;
                        }
                        None => actions_open = false,
                    },
                    message = inbound_rx.recv() => match message {
                        Some(message) => {
                            self.handle_inbound(message).await;
                        }
                        None => break,
                    },
                }
            }
        };

        tokio::join!(self.channel.run(inbound_tx, cancel.clone()), events);

        let stats = self.stats();
        info!(
            node = %self.id,
            analyzed = stats.analyzed,
            suspicious = stats.suspicious,
            created = stats.requests_created,
            signed = stats.requests_signed,
            "sentinel node stopped"
        );
    }
}
