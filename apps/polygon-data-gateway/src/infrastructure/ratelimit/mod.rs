//! Sliding-Window Rate Limiter
//!
//! Per-key request accounting over a strict 60-second window. Each check
//! prunes the key's timestamp queue before deciding, so correctness never
//! depends on the background sweep; the sweep only reclaims memory from
//! keys that went idle.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::tier::DataTier;

/// Sliding window length.
const WINDOW: Duration = Duration::from_secs(60);

/// Minimum interval between lazy sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// =============================================================================
// Types
// =============================================================================

/// Limiter-wide counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimiterStats {
    /// Keys currently tracked.
    pub tracked_keys: usize,
    /// Timestamps currently held across all keys.
    pub tracked_requests: usize,
}

struct LimiterState {
    windows: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

// =============================================================================
// Rate Limiter
// =============================================================================

/// Per-key sliding-window request limiter with tier-derived quotas.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LimiterState {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Check and record one request against a key.
    ///
    /// Admits only while the key's in-window count is strictly below the
    /// tier quota; denials record nothing.
    pub fn is_allowed(&self, key: &str, tier: DataTier) -> bool {
        let quota = tier.config().rate_limit_per_minute as usize;
        let now = Instant::now();
        let mut state = self.state.lock();
        Self::maybe_sweep(&mut state, now);

        let window = state.windows.entry(key.to_string()).or_default();
        Self::prune(window, now);

        if window.len() < quota {
            window.push_back(now);
            true
        } else {
            warn!(key, tier = %tier, quota, "rate limit exceeded");
            false
        }
    }

    /// Requests the key can still make in the current window.
    #[must_use]
    pub fn get_remaining(&self, key: &str, tier: DataTier) -> u32 {
        let quota = tier.config().rate_limit_per_minute;
        let now = Instant::now();
        let mut state = self.state.lock();
        let Some(window) = state.windows.get_mut(key) else {
            return quota;
        };
        Self::prune(window, now);
        let used = u32::try_from(window.len()).unwrap_or(u32::MAX);
        quota.saturating_sub(used)
    }

    /// Instant at which the key's oldest in-window request ages out, or
    /// `None` when the key has no recent traffic.
    #[must_use]
    pub fn get_reset_time(&self, key: &str) -> Option<Instant> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let window = state.windows.get_mut(key)?;
        Self::prune(window, now);
        window.front().map(|oldest| *oldest + WINDOW)
    }

    /// Forget one key's history.
    pub fn reset_key(&self, key: &str) {
        self.state.lock().windows.remove(key);
    }

    /// Forget all history.
    pub fn reset_all(&self) {
        self.state.lock().windows.clear();
    }

    /// Limiter-wide counts.
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock();
        RateLimiterStats {
            tracked_keys: state.windows.len(),
            tracked_requests: state.windows.values().map(VecDeque::len).sum(),
        }
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Prune every key and drop emptied ones, at most once per
    /// [`SWEEP_INTERVAL`]. Memory reclamation only; admission decisions
    /// already prune their own key.
    fn maybe_sweep(state: &mut LimiterState, now: Instant) {
        if now.duration_since(state.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        state.last_sweep = now;

        let before = state.windows.len();
        state.windows.retain(|_, window| {
            Self::prune(window, now);
            !window.is_empty()
        });
        if state.windows.len() < before {
            debug!(
                removed = before - state.windows.len(),
                "swept idle rate limit keys"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TIER: DataTier = DataTier::Freemium; // quota 10/min

    #[tokio::test(start_paused = true)]
    async fn quota_admits_then_denies_then_recovers() {
        let limiter = RateLimiter::new();

        for _ in 0..10 {
            assert!(limiter.is_allowed("quote:AAPL", TIER));
        }
        assert!(!limiter.is_allowed("quote:AAPL", TIER));

        // Once the window slides past the burst, capacity returns.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.is_allowed("quote:AAPL", TIER));
    }

    #[tokio::test(start_paused = true)]
    async fn denials_do_not_consume_capacity() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            assert!(limiter.is_allowed("k", TIER));
        }
        for _ in 0..5 {
            assert!(!limiter.is_allowed("k", TIER));
        }

        // Only the 10 admitted timestamps age out; the denials left no
        // residue that would extend the lockout.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.get_remaining("k", TIER), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_isolated() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            assert!(limiter.is_allowed("quote:AAPL", TIER));
        }
        assert!(!limiter.is_allowed("quote:AAPL", TIER));
        assert!(limiter.is_allowed("quote:TSLA", TIER));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_reflects_in_window_usage() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.get_remaining("k", TIER), 10);

        for _ in 0..4 {
            limiter.is_allowed("k", TIER);
        }
        assert_eq!(limiter.get_remaining("k", TIER), 6);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.get_remaining("k", TIER), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_time_tracks_oldest_request() {
        let limiter = RateLimiter::new();
        assert!(limiter.get_reset_time("k").is_none());

        let start = Instant::now();
        limiter.is_allowed("k", TIER);
        tokio::time::advance(Duration::from_secs(20)).await;
        limiter.is_allowed("k", TIER);

        assert_eq!(limiter.get_reset_time("k"), Some(start + WINDOW));

        // After the first request ages out, the second becomes oldest.
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(
            limiter.get_reset_time("k"),
            Some(start + Duration::from_secs(20) + WINDOW)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_reclaims_idle_keys() {
        let limiter = RateLimiter::new();
        limiter.is_allowed("idle", TIER);
        limiter.is_allowed("busy", TIER);
        assert_eq!(limiter.stats().tracked_keys, 2);

        // Both keys' requests age out; the next check triggers a sweep
        // that drops the emptied "idle" key.
        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.is_allowed("busy", TIER);

        let stats = limiter.stats();
        assert_eq!(stats.tracked_keys, 1);
        assert_eq!(stats.tracked_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_key_and_reset_all() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            limiter.is_allowed("a", TIER);
            limiter.is_allowed("b", TIER);
        }
        assert!(!limiter.is_allowed("a", TIER));

        limiter.reset_key("a");
        assert!(limiter.is_allowed("a", TIER));
        assert!(!limiter.is_allowed("b", TIER));

        limiter.reset_all();
        assert_eq!(limiter.stats(), RateLimiterStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn higher_tiers_get_wider_quotas() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            assert!(limiter.is_allowed("k", DataTier::InstitutionalElite));
        }
        // Same key, same traffic; the elite quota (1000/min) is nowhere
        // near exhausted.
        assert!(limiter.is_allowed("k", DataTier::InstitutionalElite));
        assert!(!limiter.is_allowed("k", DataTier::Freemium));
    }
}
