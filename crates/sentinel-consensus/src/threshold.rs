//! Threshold and rate-window arithmetic.

use sentinel_core::Timestamp;

/// `max(floor, ceil(2 * active / 3))`.
pub fn required_signers(active_signers: usize, floor: usize) -> usize {
    let two_thirds = (active_signers.saturating_mul(2)).div_ceil(3);
    two_thirds.max(floor)
}

/// Decide whether a signer's rolling request window has lapsed.
///
/// The window is anchored to the first request inside it and resets once
/// `now >= window_start + window_len`. Returns `(should_reset, window_start)`
/// where `window_start` is the anchor to use for the current request.
pub fn rate_window_reset(window_start: Timestamp, now: Timestamp, window_len: u64) -> (bool, Timestamp) {
    if now >= window_start.saturating_add(window_len) {
        (true, now)
    } else {
        (false, window_start)
    }
}
