use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::heuristic::heuristic_verdict;
use crate::types::{PendingAction, RiskVerdict};

pub const FALLBACK_INDICATOR: &str = "fallback_analysis";
pub const CIRCUIT_OPEN_INDICATOR: &str = "circuit_breaker_open";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("risk engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("risk engine unavailable: {0}")]
    Unavailable(String),
    #[error("invalid risk engine response: {0}")]
    InvalidResponse(String),
}

/// Remote anomaly scorer.
#[async_trait]
pub trait RiskEngine: Send + Sync {
    async fn analyze(&self, action: &PendingAction) -> Result<RiskVerdict, InferenceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub timeout: Duration,
    pub anomaly_threshold: f64,
    pub max_consecutive_failures: u32,
    pub circuit_open_for: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            timeout: Duration::from_millis(300),
            anomaly_threshold: 0.65,
            max_consecutive_failures: 5,
            circuit_open_for: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct Breaker {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStatus {
    pub open: bool,
    pub consecutive_failures: u32,
    pub open_until: Option<Instant>,
}

/// Calls the remote engine under a timeout and a circuit breaker, and falls
/// back to the local heuristic whenever the engine cannot answer.
pub struct InferenceBridge {
    engine: Option<Arc<dyn RiskEngine>>,
    config: BridgeConfig,
    breaker: Mutex<Breaker>,
}

impl InferenceBridge {
    pub fn new(engine: Arc<dyn RiskEngine>, config: BridgeConfig) -> Self {
        InferenceBridge {
            engine: Some(engine),
            config,
            breaker: Mutex::new(Breaker::default()),
        }
    }

    /// Heuristic only.
    pub fn offline(config: BridgeConfig) -> Self {
        InferenceBridge {
            engine: None,
            config,
            breaker: Mutex::new(Breaker::default()),
        }
    }

    pub fn anomaly_threshold(&self) -> f64 {
        self.config.anomaly_threshold
    }

    pub fn status(&self) -> BreakerStatus {
        let breaker = self.breaker.lock();
        BreakerStatus {
            open: breaker.open_until.is_some_and(|t| Instant::now() < t),
            consecutive_failures: breaker.consecutive_failures,
            open_until: breaker.open_until,
        }
    }

    /// Never fails: an unreachable engine yields a heuristic verdict tagged
    /// with [`FALLBACK_INDICATOR`].
    pub async fn analyze(&self, action: &PendingAction) -> RiskVerdict {
        let start = Instant::now();

        if self.circuit_open(start) {
            debug!(tx = %action.hash, "circuit breaker open, using fallback");
            let mut verdict = self.fallback(action, start);
            verdict.indicators.push(CIRCUIT_OPEN_INDICATOR.to_string());
            return verdict;
        }

        let Some(engine) = &self.engine else {
            return self.fallback(action, start);
        };

        let result = match tokio::time::timeout(self.config.timeout, engine.analyze(action)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(self.config.timeout)),
        };

        match result {
            Ok(mut verdict) => {
                self.record_success();
                verdict.latency_ms = elapsed_ms(start);
                verdict
            }
            Err(e) => {
                warn!(tx = %action.hash, error = %e, "risk engine call failed, using fallback");
                self.record_failure();
                self.fallback(action, start)
            }
        }
    }

    fn fallback(&self, action: &PendingAction, start: Instant) -> RiskVerdict {
        let mut verdict = heuristic_verdict(action, self.config.anomaly_threshold);
        verdict.indicators.push(FALLBACK_INDICATOR.to_string());
        verdict.latency_ms = elapsed_ms(start);
        verdict
    }

    fn circuit_open(&self, now: Instant) -> bool {
        self.breaker.lock().open_until.is_some_and(|until| now < until)
    }

    fn record_failure(&self) {
        let mut breaker = self.breaker.lock();
        breaker.consecutive_failures += 1;
        if breaker.consecutive_failures >= self.config.max_consecutive_failures {
            let until = Instant::now() + self.config.circuit_open_for;
            breaker.open_until = Some(until);
            warn!(
                failures = breaker.consecutive_failures,
                reopen_in_secs = self.config.circuit_open_for.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    fn record_success(&self) {
        let mut breaker = self.breaker.lock();
        if breaker.consecutive_failures > 0 {
            debug!(previous = breaker.consecutive_failures, "risk engine recovered");
        }
        breaker.consecutive_failures = 0;
        breaker.open_until = None;
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
