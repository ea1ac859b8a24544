//! Local scoring used when the remote engine is slow, failing or absent.

use crate::types::{PendingAction, Recommendation, RiskLevel, RiskVerdict, ONE_ETHER};

/// flashLoan, flashLoan (Aave v3), flash, flash (Uniswap v3)
pub const FLASH_LOAN_SELECTORS: [[u8; 4]; 4] = [
    [0x5c, 0xff, 0xe9, 0xde],
    [0xab, 0x9c, 0x4b, 0x5d],
    [0xc1, 0xa8, 0xa1, 0xf5],
    [0x49, 0x0e, 0x6c, 0xbc],
];

const HIGH_GAS: u64 = 1_000_000;
const LARGE_CALLDATA: usize = 10_000;
const QUICK_FILTER_MIN_GAS: u64 = 100_000;

pub fn heuristic_verdict(action: &PendingAction, anomaly_threshold: f64) -> RiskVerdict {
    if action.is_simple_transfer() {
        return RiskVerdict {
            tx_hash: action.hash,
            suspicious: false,
            score: 0.0,
            confidence: 0.99,
            risk_level: RiskLevel::Low,
            recommendation: Recommendation::Allow,
            indicators: Vec::new(),
            latency_ms: 0,
        };
    }

    let mut indicators = Vec::new();
    let mut score: f64 = 0.0;

    if let Some(selector) = action.selector() {
        if FLASH_LOAN_SELECTORS.contains(&selector) {
            indicators.push("flash_loan_detected".to_string());
            score += 0.4;
        }
    }
    if action.gas > HIGH_GAS {
        indicators.push("high_gas_limit".to_string());
        score += 0.1;
    }
    if action.value >= ONE_ETHER {
        indicators.push("large_value_transfer".to_string());
        score += 0.1;
    }
    if action.is_contract_creation() {
        indicators.push("contract_creation".to_string());
        score += 0.2;
    }
    if action.input.len() > LARGE_CALLDATA {
        indicators.push("large_calldata".to_string());
        score += 0.1;
    }
    let score = score.min(1.0);

    let suspicious = score >= anomaly_threshold;
    let (risk_level, recommendation) = if score >= 0.8 {
        (RiskLevel::Critical, Recommendation::Block)
    } else if score >= 0.65 {
        (RiskLevel::High, Recommendation::Block)
    } else if score >= 0.4 {
        (RiskLevel::Medium, Recommendation::Flag)
    } else {
        (RiskLevel::Low, Recommendation::Allow)
    };
    let confidence = if suspicious {
        0.5 + 0.5 * score
    } else {
        0.5 + 0.5 * (1.0 - score)
    };

    RiskVerdict {
        tx_hash: action.hash,
        suspicious,
        score,
        confidence,
        risk_level,
        recommendation,
        indicators,
        latency_ms: 0,
    }
}

/// Cheap pre-check: only non-trivial calls with meaningful gas are worth
/// sending to the engine.
pub fn quick_filter(action: &PendingAction) -> bool {
    !action.is_simple_transfer() && action.gas >= QUICK_FILTER_MIN_GAS
}
