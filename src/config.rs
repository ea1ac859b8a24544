//! Node configuration.
//!
//! Layered as: typed defaults, then an optional YAML file, then
//! `SENTINEL__<SECTION>__<KEY>` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sentinel_ai::BridgeConfig;
use sentinel_consensus::{
    ConsensusConfig, DEFAULT_COOLDOWN_SECS, DEFAULT_MAX_CLOCK_SKEW_SECS, DEFAULT_MAX_REQUESTS_PER_WINDOW,
    DEFAULT_MIN_SIGNERS, DEFAULT_RATE_WINDOW_SECS,
};
use sentinel_economics::{
    BountyTier, EscrowConfig, TierSchedule, DEFAULT_DISPUTE_WINDOW_SECS, DEFAULT_ORACLE_WINDOW_SECS,
    DEFAULT_REJECT_SLASH_BPS, TOKEN,
};
use sentinel_p2p::{ChannelConfig, DEFAULT_TOPIC};

pub const ENV_PREFIX: &str = "SENTINEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub node: NodeSection,
    pub p2p: P2pSection,
    pub inference: InferenceSection,
    pub consensus: ConsensusSection,
    pub escrow: EscrowSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub name: String,
    pub data_dir: PathBuf,
    /// Relative paths resolve under `data_dir`
    pub bls_key_path: PathBuf,
    pub shutdown_timeout_secs: u64,
    /// How long a locally raised alert lets this node co-sign a peer's
    /// pause request against the same target
    pub cosign_window_secs: u64,
}

impl Default for NodeSection {
    fn default() -> Self {
        NodeSection {
            name: "sentinel".into(),
            data_dir: PathBuf::from("./data"),
            bls_key_path: PathBuf::from("bls.key"),
            shutdown_timeout_secs: 10,
            cosign_window_secs: 300,
        }
    }
}

impl NodeSection {
    pub fn key_path(&self) -> PathBuf {
        if self.bls_key_path.is_absolute() {
            self.bls_key_path.clone()
        } else {
            self.data_dir.join(&self.bls_key_path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pSection {
    pub topic_name: String,
    pub heartbeat_interval_secs: u64,
    pub peer_inactive_secs: u64,
    pub peer_evict_secs: u64,
    pub seen_cache_size: usize,
    pub hub_capacity: usize,
}

impl Default for P2pSection {
    fn default() -> Self {
        P2pSection {
            topic_name: DEFAULT_TOPIC.into(),
            heartbeat_interval_secs: 10,
            peer_inactive_secs: 30,
            peer_evict_secs: 300,
            seen_cache_size: 4096,
            hub_capacity: 1024,
        }
    }
}

impl P2pSection {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            peer_inactive_after: Duration::from_secs(self.peer_inactive_secs),
            peer_evict_after: Duration::from_secs(self.peer_evict_secs),
            seen_cache_size: self.seen_cache_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSection {
    pub timeout_ms: u64,
    pub anomaly_threshold: f64,
    /// Score at or above which a suspicious verdict also opens a pause request
    pub pause_threshold: f64,
    pub max_consecutive_failures: u32,
    pub circuit_open_secs: u64,
}

impl Default for InferenceSection {
    fn default() -> Self {
        InferenceSection {
            timeout_ms: 300,
            anomaly_threshold: 0.65,
            pause_threshold: 0.8,
            max_consecutive_failures: 5,
            circuit_open_secs: 60,
        }
    }
}

impl InferenceSection {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            anomaly_threshold: self.anomaly_threshold,
            max_consecutive_failures: self.max_consecutive_failures,
            circuit_open_for: Duration::from_secs(self.circuit_open_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusSection {
    pub min_signers: usize,
    pub cooldown_secs: u64,
    pub max_requests_per_window: u32,
    pub rate_window_secs: u64,
    /// How far a request's `created_at` may drift from the ledger clock
    pub max_clock_skew_secs: u64,
    /// Whole tokens
    pub min_stake_tokens: u64,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        ConsensusSection {
            min_signers: DEFAULT_MIN_SIGNERS,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            max_requests_per_window: DEFAULT_MAX_REQUESTS_PER_WINDOW,
            rate_window_secs: DEFAULT_RATE_WINDOW_SECS,
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW_SECS,
            min_stake_tokens: 10_000,
        }
    }
}

impl ConsensusSection {
    pub fn consensus_config(&self) -> ConsensusConfig {
        ConsensusConfig {
            min_signers: self.min_signers,
            cooldown_secs: self.cooldown_secs,
            max_requests_per_window: self.max_requests_per_window,
            rate_window_secs: self.rate_window_secs,
            max_clock_skew_secs: self.max_clock_skew_secs,
        }
    }

    pub fn min_stake(&self) -> u128 {
        tokens(self.min_stake_tokens)
    }
}

/// One bounty tier, in whole tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierEntry {
    pub tvl_below: u64,
    pub bounty: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowSection {
    pub dispute_window_secs: u64,
    pub oracle_window_secs: u64,
    pub reject_slash_bps: u16,
    pub tiers: Vec<TierEntry>,
    pub top_bounty: u64,
}

impl Default for EscrowSection {
    fn default() -> Self {
        EscrowSection {
            dispute_window_secs: DEFAULT_DISPUTE_WINDOW_SECS,
            oracle_window_secs: DEFAULT_ORACLE_WINDOW_SECS,
            reject_slash_bps: DEFAULT_REJECT_SLASH_BPS,
            tiers: vec![
                TierEntry { tvl_below: 1_000_000, bounty: 1_000 },
                TierEntry { tvl_below: 10_000_000, bounty: 5_000 },
                TierEntry { tvl_below: 100_000_000, bounty: 25_000 },
            ],
            top_bounty: 100_000,
        }
    }
}

impl EscrowSection {
    pub fn tier_schedule(&self) -> TierSchedule {
        TierSchedule {
            tiers: self
                .tiers
                .iter()
                .map(|t| BountyTier {
                    tvl_below: tokens(t.tvl_below),
                    bounty: tokens(t.bounty),
                })
                .collect(),
            top_bounty: tokens(self.top_bounty),
        }
    }

    pub fn escrow_config(&self) -> EscrowConfig {
        EscrowConfig {
            dispute_window_secs: self.dispute_window_secs,
            oracle_window_secs: self.oracle_window_secs,
            reject_slash_bps: self.reject_slash_bps,
            tiers: self.tier_schedule(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

pub fn tokens(whole: u64) -> u128 {
    whole as u128 * TOKEN
}

impl SentinelConfig {
    /// Load from an optional YAML file plus `SENTINEL__*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: SentinelConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.p2p.topic_name.is_empty() {
            return invalid("p2p.topic_name must not be empty");
        }
        if self.p2p.heartbeat_interval_secs == 0 {
            return invalid("p2p.heartbeat_interval_secs must be positive");
        }
        if self.p2p.peer_evict_secs <= self.p2p.peer_inactive_secs {
            return invalid("p2p.peer_evict_secs must exceed p2p.peer_inactive_secs");
        }
        if self.p2p.seen_cache_size == 0 {
            return invalid("p2p.seen_cache_size must be positive");
        }

        if self.inference.timeout_ms == 0 {
            return invalid("inference.timeout_ms must be positive");
        }
        for (name, value) in [
            ("inference.anomaly_threshold", self.inference.anomaly_threshold),
            ("inference.pause_threshold", self.inference.pause_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1]")));
            }
        }
        if self.inference.pause_threshold < self.inference.anomaly_threshold {
            return invalid("inference.pause_threshold must not be below inference.anomaly_threshold");
        }
        if self.inference.max_consecutive_failures == 0 {
            return invalid("inference.max_consecutive_failures must be positive");
        }

        if self.consensus.min_signers == 0 {
            return invalid("consensus.min_signers must be positive");
        }
        if self.consensus.rate_window_secs == 0 {
            return invalid("consensus.rate_window_secs must be positive");
        }
        if self.consensus.max_requests_per_window == 0 {
            return invalid("consensus.max_requests_per_window must be positive");
        }

        self.escrow
            .escrow_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("escrow: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SentinelConfig::default();
        config.validate().unwrap();
        assert_eq!(config.p2p.topic_name, "sentinel/v1/alerts");
        assert_eq!(config.escrow.tier_schedule(), TierSchedule::default());
        assert_eq!(config.consensus.consensus_config(), ConsensusConfig::default());
        assert_eq!(config.inference.bridge_config(), BridgeConfig::default());
        assert_eq!(config.p2p.channel_config(), ChannelConfig::default());
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "node:\n  name: node-7\n  cosign_window_secs: 60\nconsensus:\n  min_signers: 3\nlogging:\n  format: json\n"
        )
        .unwrap();

        let config = SentinelConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.node.name, "node-7");
        assert_eq!(config.node.cosign_window_secs, 60);
        assert_eq!(config.consensus.min_signers, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.consensus.cooldown_secs, DEFAULT_COOLDOWN_SECS);
    }

    #[test]
    fn test_shipped_devnet_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/sentinel.yaml");
        let config = SentinelConfig::load(Some(&path)).unwrap();
        assert_eq!(config.inference.pause_threshold, 0.7);
        assert_eq!(config.escrow.tier_schedule(), TierSchedule::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = SentinelConfig::load(Some(Path::new("/nonexistent/sentinel.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_validation_rejects_impossible_values() {
        let mut config = SentinelConfig::default();
        config.escrow.oracle_window_secs = config.escrow.dispute_window_secs - 1;
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.escrow.reject_slash_bps = 10_001;
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.escrow.tiers.swap(0, 1);
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.escrow.dispute_window_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg)) if msg.starts_with("escrow:")));

        let mut config = SentinelConfig::default();
        config.inference.pause_threshold = 0.5;
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.p2p.peer_evict_secs = config.p2p.peer_inactive_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_key_path_resolves_under_data_dir() {
        let node = NodeSection::default();
        assert_eq!(node.key_path(), PathBuf::from("./data/bls.key"));
        let node = NodeSection {
            bls_key_path: PathBuf::from("/etc/sentinel/bls.key"),
            ..NodeSection::default()
        };
        assert_eq!(node.key_path(), PathBuf::from("/etc/sentinel/bls.key"));
    }
}
