//! Two channels on one in-process hub, driven by their run loops.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sentinel_core::{keccak256, Address};
use sentinel_crypto::{verify_signature, BlsKeyPair, PublicKey};
use sentinel_p2p::*;

struct Registry {
    keys: HashMap<Address, PublicKey>,
    suspended: RwLock<HashSet<Address>>,
}

impl MessageVerifier for Registry {
    fn is_active_signer(&self, id: &Address) -> bool {
        self.keys.contains_key(id) && !self.suspended.read().contains(id)
    }

    fn verify_pause_request(&self, request: &SignedPauseRequest) -> bool {
        self.keys
            .get(&request.signer)
            .map(|pk| verify_signature(&request.signature, &request.request.signing_message(), pk))
            .unwrap_or(false)
    }
}

struct Node {
    id: Address,
    key: BlsKeyPair,
    channel: Arc<CoordinationChannel<LocalTransport>>,
}

fn network(n: usize) -> Vec<Node> {
    network_with_registry(n).0
}

fn network_with_registry(n: usize) -> (Vec<Node>, Arc<Registry>, LocalHub) {
    let hub = LocalHub::new(64);
    let members: Vec<(Address, BlsKeyPair)> = (0..n)
        .map(|i| (Address::derive(format!("node-{}", i).as_bytes()), BlsKeyPair::generate()))
        .collect();
    let registry = Arc::new(Registry {
        keys: members.iter().map(|(id, kp)| (*id, kp.public)).collect(),
        suspended: RwLock::new(HashSet::new()),
    });
    let verifier: Arc<dyn MessageVerifier> = registry.clone();

    let nodes = members
        .into_iter()
        .map(|(id, key)| {
            let channel = CoordinationChannel::new(
                id,
                hub.join(DEFAULT_TOPIC),
                verifier.clone(),
                ChannelConfig {
                    heartbeat_interval: Duration::from_secs(3_600),
                    ..ChannelConfig::default()
                },
            )
            .unwrap();
            Node { id, key, channel: Arc::new(channel) }
        })
        .collect();
    (nodes, registry, hub)
}

fn spawn(node: &Node, cancel: &CancellationToken) -> (mpsc::Receiver<Inbound>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(16);
    let channel = node.channel.clone();
    let cancel = cancel.clone();
    let handle = tokio::spawn(async move { channel.run(tx, cancel).await });
    (rx, handle)
}

#[tokio::test]
async fn test_pause_request_reaches_peer() {
    let nodes = network(2);
    let cancel = CancellationToken::new();
    let (mut rx, handle) = spawn(&nodes[1], &cancel);

    let body = PauseRequestBody {
        target: Address::derive(b"vault"),
        evidence: keccak256(b"exploit"),
        created_at: 1_000,
    };
    let request = SignedPauseRequest {
        request: body,
        signature: nodes[0].key.sign(&body.signing_message()),
        signer: nodes[0].id,
    };
    nodes[0].channel.broadcast_pause_request(&request).await.unwrap();

    // The first tick of the run loop sends a heartbeat of node 1's own, which
    // it ignores; the next delivered message is the request.
    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, Inbound::PauseRequest(request));
    assert_eq!(nodes[1].channel.active_peer_count(), 1);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_partial_signature_and_alert_carry_sender() {
    let nodes = network(2);
    let cancel = CancellationToken::new();
    let (mut rx, handle) = spawn(&nodes[1], &cancel);

    let request_id = keccak256(b"request");
    let signature = nodes[0].key.sign(b"attestation");
    nodes[0].channel.broadcast_signature(request_id, signature).await.unwrap();

    let alert = Alert {
        id: Alert::derive_id(&keccak256(b"tx"), &nodes[0].id),
        level: AlertLevel::High,
        tx_hash: keccak256(b"tx"),
        target: Some(Address::derive(b"vault")),
        message: "flash loan pattern".into(),
        timestamp: 1,
        score: 0.85,
        indicators: vec!["flash_loan_pattern".into()],
    };
    nodes[0].channel.broadcast_alert(&alert).await.unwrap();

    let first = rx.recv().await.unwrap();
    assert_eq!(
        first,
        Inbound::PartialSignature {
            signer: nodes[0].id,
            partial: PartialSignature { request_id, signature },
        }
    );
    let second = rx.recv().await.unwrap();
    assert_eq!(second, Inbound::Alert { sender: nodes[0].id, alert });

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_rejected_message_is_accepted_when_resent() {
    let (nodes, registry, hub) = network_with_registry(3);
    let cancel = CancellationToken::new();
    let (mut rx, handle) = spawn(&nodes[1], &cancel);
    let wire = hub.join(DEFAULT_TOPIC);

    let partial = PartialSignature {
        request_id: keccak256(b"request"),
        signature: nodes[0].key.sign(b"attestation"),
    };
    let data = Envelope::new(MessageKind::Signature, nodes[0].id, 1_000, &partial)
        .unwrap()
        .encode()
        .unwrap();

    registry.suspended.write().insert(nodes[0].id);
    wire.publish(data.clone()).await.unwrap();

    // Messages are handled in order, so once node 2's alert arrives the
    // suspended sender's message has been rejected.
    let alert = Alert {
        id: Alert::derive_id(&keccak256(b"tx"), &nodes[2].id),
        level: AlertLevel::Medium,
        tx_hash: keccak256(b"tx"),
        target: None,
        message: "marker".into(),
        timestamp: 1,
        score: 0.7,
        indicators: vec![],
    };
    nodes[2].channel.broadcast_alert(&alert).await.unwrap();
    let marker = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(marker, Inbound::Alert { sender: nodes[2].id, alert });

    registry.suspended.write().remove(&nodes[0].id);
    wire.publish(data).await.unwrap();
    let resent = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(resent, Inbound::PartialSignature { signer: nodes[0].id, partial });

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let nodes = network(1);
    let cancel = CancellationToken::new();
    let (_rx, handle) = spawn(&nodes[0], &cancel);
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
