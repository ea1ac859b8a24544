use serde::{Deserialize, Serialize};

use sentinel_core::{Address, Hash32};

/// One wei-denominated ether.
pub const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

/// A pending transaction seen before inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub hash: Hash32,
    pub from: Address,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub value: u128,
    pub gas: u64,
    #[serde(with = "hex_bytes")]
    pub input: Vec<u8>,
}

impl PendingAction {
    pub fn is_simple_transfer(&self) -> bool {
        self.input.is_empty() || self.input == [0]
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none() && !self.input.is_empty()
    }

    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).and_then(|s| s.try_into().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Allow,
    Flag,
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub tx_hash: Hash32,
    pub suspicious: bool,
    pub score: f64,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
    pub indicators: Vec<String>,
    pub latency_ms: u64,
}

impl RiskVerdict {
    pub fn has_indicator(&self, indicator: &str) -> bool {
        self.indicators.iter().any(|i| i == indicator)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
