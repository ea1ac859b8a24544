use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sentinel_core::{unix_now, Address, RequestId};
use sentinel_crypto::Signature;

use crate::error::ChannelError;
use crate::message::{
    message_digest, Alert, Envelope, Inbound, MessageKind, PartialSignature, SignedPauseRequest,
};
use crate::peers::{CleanupReport, PeerTable};
use crate::transport::Transport;

pub const DEFAULT_TOPIC: &str = "sentinel/v1/alerts";

/// Authentication capability every channel is built with.
pub trait MessageVerifier: Send + Sync {
    fn is_active_signer(&self, id: &Address) -> bool;

    /// The embedded signature verifies against the signer's registered key.
    fn verify_pause_request(&self, request: &SignedPauseRequest) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub heartbeat_interval: Duration,
    pub peer_inactive_after: Duration,
    pub peer_evict_after: Duration,
    pub seen_cache_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            heartbeat_interval: Duration::from_secs(10),
            peer_inactive_after: Duration::from_secs(30),
            peer_evict_after: Duration::from_secs(300),
            seen_cache_size: 4096,
        }
    }
}

/// Authenticated broadcast among signer nodes.
pub struct CoordinationChannel<T: Transport> {
    local_id: Address,
    transport: T,
    verifier: Arc<dyn MessageVerifier>,
    peers: PeerTable,
    seen: Mutex<LruCache<[u8; 32], ()>>,
    heartbeat_interval: Duration,
}

impl<T: Transport> CoordinationChannel<T> {
    pub fn new(
        local_id: Address,
        transport: T,
        verifier: Arc<dyn MessageVerifier>,
        config: ChannelConfig,
    ) -> Result<Self, ChannelError> {
        let cache_size = NonZeroUsize::new(config.seen_cache_size)
            .ok_or_else(|| ChannelError::InvalidConfig("seen_cache_size must be non-zero".into()))?;
        if config.peer_evict_after <= config.peer_inactive_after {
            return Err(ChannelError::InvalidConfig(
                "peer eviction must come after inactivity".into(),
            ));
        }
        if config.heartbeat_interval.is_zero() {
            return Err(ChannelError::InvalidConfig("heartbeat interval must be non-zero".into()));
        }

        Ok(CoordinationChannel {
            local_id,
            transport,
            verifier,
            peers: PeerTable::new(config.peer_inactive_after, config.peer_evict_after),
            seen: Mutex::new(LruCache::new(cache_size)),
            heartbeat_interval: config.heartbeat_interval,
        })
    }

    pub fn local_id(&self) -> Address {
        self.local_id
    }

    pub fn topic(&self) -> &str {
        self.transport.topic()
    }

    pub fn active_peer_count(&self) -> usize {
        self.peers.active_count()
    }

    pub fn tracked_peer_count(&self) -> usize {
        self.peers.tracked_count()
    }

    pub async fn broadcast_pause_request(&self, request: &SignedPauseRequest) -> Result<(), ChannelError> {
        self.publish(Envelope::new(MessageKind::PauseRequest, self.local_id, unix_now(), request)?)
            .await
    }

    pub async fn broadcast_signature(&self, request_id: RequestId, signature: Signature) -> Result<(), ChannelError> {
        let partial = PartialSignature { request_id, signature };
        self.publish(Envelope::new(MessageKind::Signature, self.local_id, unix_now(), &partial)?)
            .await
    }

    pub async fn broadcast_alert(&self, alert: &Alert) -> Result<(), ChannelError> {
        self.publish(Envelope::new(MessageKind::Alert, self.local_id, unix_now(), alert)?)
            .await
    }

    pub async fn send_heartbeat(&self) -> Result<(), ChannelError> {
        self.publish(Envelope::heartbeat(self.local_id, unix_now())).await
    }

    async fn publish(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let data = envelope.encode()?;
        self.transport.publish(data).await
    }

    /// Authenticate and decode one raw message.
    ///
    /// `Ok(None)` means the message was ignored (our own, or a replay).
    /// Only accepted messages count as seen, so a rejected one can be resent.
    pub fn handle_message(&self, data: &[u8], now: Instant) -> Result<Option<Inbound>, ChannelError> {
        let envelope = Envelope::decode(data)?;
        if envelope.sender == self.local_id {
            return Ok(None);
        }
        let digest = message_digest(data);
        if self.seen.lock().contains(&digest) {
            debug!(sender = %envelope.sender, "dropping replayed message");
            return Ok(None);
        }

        let inbound = self.authenticate(envelope, now)?;
        self.seen.lock().put(digest, ());
        Ok(Some(inbound))
    }

    fn authenticate(&self, envelope: Envelope, now: Instant) -> Result<Inbound, ChannelError> {
        if envelope.kind == MessageKind::Heartbeat {
            self.peers.touch(envelope.sender, now);
            return Ok(Inbound::Heartbeat {
                sender: envelope.sender,
            });
        }

        if !self.verifier.is_active_signer(&envelope.sender) {
            warn!(
                sender = %envelope.sender,
                kind = ?envelope.kind,
                "rejected message from unregistered node"
            );
            return Err(ChannelError::UnregisteredSender(envelope.sender));
        }
        self.peers.touch(envelope.sender, now);

        let inbound = match envelope.kind {
            MessageKind::PauseRequest => {
                let request: SignedPauseRequest = envelope.payload_as()?;
                if !self.verifier.verify_pause_request(&request) {
                    warn!(signer = %request.signer, "rejected pause request with invalid signature");
                    return Err(ChannelError::InvalidPauseRequest(request.signer));
                }
                Inbound::PauseRequest(request)
            }
            MessageKind::Signature => Inbound::PartialSignature {
                signer: envelope.sender,
                partial: envelope.payload_as()?,
            },
            MessageKind::Alert => Inbound::Alert {
                sender: envelope.sender,
                alert: envelope.payload_as()?,
            },
            MessageKind::Heartbeat => Inbound::Heartbeat {
                sender: envelope.sender,
            },
        };
        Ok(inbound)
    }

    pub fn cleanup_peers(&self, now: Instant) -> CleanupReport {
        let report = self.peers.cleanup(now);
        if report.evicted > 0 || report.marked_inactive > 0 {
            debug!(
                evicted = report.evicted,
                inactive = report.marked_inactive,
                active = self.peers.active_count(),
                "peer cleanup"
            );
        }
        report
    }

    /// Drive the inbound loop and the heartbeat ticker until `cancel` fires or
    /// the transport closes. Authenticated messages go to `inbound`.
    pub async fn run(&self, inbound: mpsc::Sender<Inbound>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(node = %self.local_id, topic = %self.topic(), "coordination channel started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                data = self.transport.recv() => {
                    let Some(data) = data else {
                        warn!("transport closed");
                        break;
                    };
                    match self.handle_message(&data, Instant::now()) {
                        Ok(Some(message)) => {
                            if inbound.send(message).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => debug!(error = %e, "message rejected"),
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.send_heartbeat().await {
                        warn!(error = %e, "heartbeat failed");
                    }
                    self.cleanup_peers(Instant::now());
                }
            }
        }
        info!(node = %self.local_id, "coordination channel stopped");
    }
}
