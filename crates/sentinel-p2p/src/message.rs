//! Wire format of the coordination topic.
//!
//! Every message travels in an [`Envelope`] `{type, sender, timestamp,
//! payload}` serialized as JSON. The payload is decoded according to `type`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use sentinel_core::{attestation_message, request_id, Address, EvidenceHash, Hash32, RequestId, Timestamp};
use sentinel_crypto::Signature;

use crate::error::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    PauseRequest,
    Signature,
    Heartbeat,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub sender: Address,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new<P: Serialize>(
        kind: MessageKind,
        sender: Address,
        timestamp: Timestamp,
        payload: &P,
    ) -> Result<Self, ChannelError> {
        let payload = serde_json::to_value(payload).map_err(|e| ChannelError::Encode(e.to_string()))?;
        Ok(Envelope {
            kind,
            sender,
            timestamp,
            payload,
        })
    }

    pub fn heartbeat(sender: Address, timestamp: Timestamp) -> Self {
        Envelope {
            kind: MessageKind::Heartbeat,
            sender,
            timestamp,
            payload: serde_json::Value::Null,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        serde_json::to_vec(self).map_err(|e| ChannelError::Encode(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self, ChannelError> {
        serde_json::from_slice(data).map_err(|e| ChannelError::Malformed(e.to_string()))
    }

    pub fn payload_as<P: for<'de> Deserialize<'de>>(&self) -> Result<P, ChannelError> {
        P::deserialize(&self.payload).map_err(|e| ChannelError::Malformed(e.to_string()))
    }
}

/// Replay key for the seen-message cache.
pub fn message_digest(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseRequestBody {
    pub target: Address,
    pub evidence: EvidenceHash,
    pub created_at: Timestamp,
}

impl PauseRequestBody {
    pub fn request_id(&self) -> RequestId {
        request_id(&self.target, &self.evidence, self.created_at)
    }

    /// Bytes every attester signs for this request.
    pub fn signing_message(&self) -> Vec<u8> {
        attestation_message(&self.request_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPauseRequest {
    pub request: PauseRequestBody,
    pub signature: Signature,
    pub signer: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    pub request_id: RequestId,
    pub signature: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            AlertLevel::Critical
        } else if score >= 0.8 {
            AlertLevel::High
        } else if score >= 0.65 {
            AlertLevel::Medium
        } else {
            AlertLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    pub tx_hash: Hash32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Address>,
    pub message: String,
    pub timestamp: Timestamp,
    pub score: f64,
    #[serde(default)]
    pub indicators: Vec<String>,
}

impl Alert {
    /// Alert ID derived from the flagged transaction and the reporting node.
    pub fn derive_id(tx_hash: &Hash32, reporter: &Address) -> String {
        let mut hasher = Sha256::new();
        hasher.update(tx_hash.as_bytes());
        hasher.update(reporter.as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

/// A message that passed authentication.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    PauseRequest(SignedPauseRequest),
    PartialSignature { signer: Address, partial: PartialSignature },
    Alert { sender: Address, alert: Alert },
    Heartbeat { sender: Address },
}
