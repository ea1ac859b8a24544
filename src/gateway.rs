//! Access to the shared ledger from node runtimes.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sentinel_consensus::{ConsensusError, DefensiveTarget, ShieldLedger, Submission};
use sentinel_core::{unix_now, Address, MembershipRegistry, RequestId, Timestamp};
use sentinel_crypto::{verify_signature, Signature};
use sentinel_p2p::{MessageVerifier, PauseRequestBody, SignedPauseRequest};

/// Submission path from a node into the pause ledger. The ledger side keeps
/// the clock; a request's own `created_at` only names it.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Only protected entities with an escrow account can be paused.
    async fn is_protected(&self, target: &Address) -> bool;

    async fn create_request(
        &self,
        initiator: Address,
        request: &PauseRequestBody,
        signature: Signature,
    ) -> Result<Submission, ConsensusError>;

    async fn attest(
        &self,
        request_id: &RequestId,
        signer: Address,
        signature: Signature,
    ) -> Result<Submission, ConsensusError>;
}

type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// A [`ShieldLedger`] shared by every node of one process.
pub struct InProcessLedger<T: DefensiveTarget> {
    inner: Arc<Mutex<ShieldLedger<T>>>,
    clock: Clock,
}

impl<T: DefensiveTarget> Clone for InProcessLedger<T> {
    fn clone(&self) -> Self {
        InProcessLedger {
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<T: DefensiveTarget> InProcessLedger<T> {
    /// Ledger time is the wall clock.
    pub fn new(ledger: ShieldLedger<T>) -> Self {
        Self::with_clock(ledger, unix_now)
    }

    pub fn with_clock(ledger: ShieldLedger<T>, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        InProcessLedger {
            inner: Arc::new(Mutex::new(ledger)),
            clock: Arc::new(clock),
        }
    }

    pub fn now(&self) -> Timestamp {
        (self.clock)()
    }

    pub fn with<R>(&self, f: impl FnOnce(&ShieldLedger<T>) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut ShieldLedger<T>) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[async_trait]
impl<T> LedgerGateway for InProcessLedger<T>
where
    T: DefensiveTarget + Send + 'static,
{
    async fn is_protected(&self, target: &Address) -> bool {
        self.inner.lock().escrow().is_registered(target)
    }

    async fn create_request(
        &self,
        initiator: Address,
        request: &PauseRequestBody,
        signature: Signature,
    ) -> Result<Submission, ConsensusError> {
        let now = self.now();
        self.inner.lock().create_request(
            initiator,
            request.target,
            request.evidence,
            signature,
            request.created_at,
            now,
        )
    }

    async fn attest(
        &self,
        request_id: &RequestId,
        signer: Address,
        signature: Signature,
    ) -> Result<Submission, ConsensusError> {
        let now = self.now();
        self.inner.lock().attest(request_id, signer, signature, now)
    }
}

impl<T> MessageVerifier for InProcessLedger<T>
where
    T: DefensiveTarget + Send + 'static,
{
    fn is_active_signer(&self, id: &Address) -> bool {
        self.inner.lock().registry().is_active_signer(id)
    }

    fn verify_pause_request(&self, request: &SignedPauseRequest) -> bool {
        let Some(public_key) = self.inner.lock().registry().public_key(&request.signer) else {
            return false;
        };
        verify_signature(&request.signature, &request.request.signing_message(), &public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_consensus::{ConsensusConfig, InMemoryPauseTarget};
    use std::sync::atomic::{AtomicU64, Ordering};

    use sentinel_consensus::DEFAULT_COOLDOWN_SECS;
    use sentinel_core::keccak256;
    use sentinel_crypto::BlsKeyPair;
    use sentinel_economics::{EscrowConfig, TOKEN};

    const NOW: Timestamp = 1_700_000_000;

    fn setup() -> (InProcessLedger<InMemoryPauseTarget>, Address, BlsKeyPair, Address) {
        setup_with_clock(Arc::new(AtomicU64::new(NOW)))
    }

    fn setup_with_clock(
        clock: Arc<AtomicU64>,
    ) -> (InProcessLedger<InMemoryPauseTarget>, Address, BlsKeyPair, Address) {
        let mut ledger = ShieldLedger::new(
            ConsensusConfig { min_signers: 1, ..ConsensusConfig::default() },
            EscrowConfig::default(),
            TOKEN,
            Address::derive(b"admin"),
            Address::derive(b"oracle"),
            InMemoryPauseTarget::new(),
        )
        .unwrap();
        let key = BlsKeyPair::generate();
        let signer = Address::derive(b"signer");
        ledger
            .registry_mut()
            .register(signer, key.public, &key.prove_possession(), TOKEN, 1)
            .unwrap();
        ledger.registry_mut().activate(&signer).unwrap();
        let target = Address::derive(b"vault");
        ledger.escrow_mut().register_protocol(target, 1_000 * TOKEN, 1).unwrap();
        let gateway = InProcessLedger::with_clock(ledger, move || clock.load(Ordering::SeqCst));
        (gateway, signer, key, target)
    }

    fn body(target: Address, created_at: Timestamp) -> PauseRequestBody {
        PauseRequestBody { target, evidence: keccak256(b"tx"), created_at }
    }

    #[tokio::test]
    async fn test_gateway_executes_with_single_signer() {
        let (gateway, signer, key, target) = setup();
        assert!(gateway.is_protected(&target).await);
        assert!(!gateway.is_protected(&Address::derive(b"other")).await);

        let body = body(target, NOW);
        let submission = gateway
            .create_request(signer, &body, key.sign(&body.signing_message()))
            .await
            .unwrap();
        assert_eq!(submission.request_id, body.request_id());
        assert!(submission.execution.is_some());
        assert!(gateway.with(|l| l.target().is_paused(&target)));
    }

    #[tokio::test]
    async fn test_future_timestamp_cannot_skip_cooldown() {
        let clock = Arc::new(AtomicU64::new(NOW));
        let (gateway, signer, key, target) = setup_with_clock(Arc::clone(&clock));
        let first = body(target, NOW);
        gateway
            .create_request(signer, &first, key.sign(&first.signing_message()))
            .await
            .unwrap();

        clock.store(NOW + 5, Ordering::SeqCst);
        let honest = body(target, NOW + 5);
        assert!(matches!(
            gateway.create_request(signer, &honest, key.sign(&honest.signing_message())).await,
            Err(ConsensusError::CooldownActive { .. })
        ));

        let forged = body(target, NOW + DEFAULT_COOLDOWN_SECS);
        assert_eq!(
            gateway.create_request(signer, &forged, key.sign(&forged.signing_message())).await,
            Err(ConsensusError::ClockSkew { created_at: NOW + DEFAULT_COOLDOWN_SECS, now: NOW + 5 })
        );
        assert_eq!(gateway.with(|l| l.stats().pauses_attempted), 1);

        // Once ledger time passes the cooldown the target can be paused again.
        clock.store(NOW + DEFAULT_COOLDOWN_SECS, Ordering::SeqCst);
        let later = body(target, NOW + DEFAULT_COOLDOWN_SECS);
        let submission = gateway
            .create_request(signer, &later, key.sign(&later.signing_message()))
            .await
            .unwrap();
        assert!(submission.execution.is_some());
    }

    #[test]
    fn test_verifier_checks_registered_key() {
        let (gateway, signer, key, target) = setup();
        let body = body(target, NOW);
        let good = SignedPauseRequest { request: body, signature: key.sign(&body.signing_message()), signer };
        assert!(gateway.is_active_signer(&signer));
        assert!(gateway.verify_pause_request(&good));

        let forged = SignedPauseRequest {
            signature: BlsKeyPair::generate().sign(&body.signing_message()),
            ..good.clone()
        };
        assert!(!gateway.verify_pause_request(&forged));

        let stranger = SignedPauseRequest { signer: Address::derive(b"stranger"), ..good };
        assert!(!gateway.is_active_signer(&stranger.signer));
        assert!(!gateway.verify_pause_request(&stranger));
    }
}
