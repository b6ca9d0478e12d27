//! Jitter for periodic background tasks
//!
//! Spreads refreshes and sweeps so instances started together do not hit
//! playlist hosts and stream servers in lockstep.

use rand::Rng;
use std::time::Duration;

/// A random jitter between 0 and `max_jitter_ms` (inclusive)
///
/// # Examples
/// ```
/// use iptv_catalog::utils::jitter::generate_jitter_ms;
///
/// let jitter = generate_jitter_ms(100);
/// assert!(jitter <= 100);
/// ```
pub fn generate_jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }
    rand::rng().random_range(0..=max_jitter_ms)
}

/// `base` plus up to `jitter_percent` percent of it
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use iptv_catalog::utils::jitter::jittered;
///
/// let delay = jittered(Duration::from_secs(10), 20);
/// assert!(delay >= Duration::from_secs(10) && delay <= Duration::from_secs(12));
/// ```
pub fn jittered(base: Duration, jitter_percent: u8) -> Duration {
    if jitter_percent == 0 || base.is_zero() {
        return base;
    }
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let max_jitter = base_ms.saturating_mul(jitter_percent as u64) / 100;
    base + Duration::from_millis(generate_jitter_ms(max_jitter))
}
