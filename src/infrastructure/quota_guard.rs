//! Client-side quota tracking for the text-generation endpoint
//!
//! Calls and tokens are counted in a fixed window that restarts once it is
//! older than `window`. A caller that would push either counter over its
//! limit sleeps until the window ends while holding the lock, so waiting
//! callers are admitted in arrival order.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

pub mod defaults {
    pub const MAX_CALLS_PER_WINDOW: u32 = 15;
    pub const MAX_TOKENS_PER_WINDOW: u64 = 250_000;
    pub const WINDOW_SECS: u64 = 60;
    /// Multiplier applied to the serialized payload length
    pub const TOKEN_ESTIMATE_FACTOR: f64 = 1.5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub max_calls_per_window: u32,
    pub max_tokens_per_window: u64,
    pub window: Duration,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            max_calls_per_window: defaults::MAX_CALLS_PER_WINDOW,
            max_tokens_per_window: defaults::MAX_TOKENS_PER_WINDOW,
            window: Duration::from_secs(defaults::WINDOW_SECS),
        }
    }
}

/// Counters at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub calls: u32,
    pub tokens: u64,
    pub window_elapsed: Duration,
}

#[derive(Debug)]
struct QuotaState {
    calls: u32,
    tokens: u64,
    window_start: Instant,
}

impl QuotaState {
    fn reset(&mut self, now: Instant) {
        self.calls = 0;
        self.tokens = 0;
        self.window_start = now;
    }
}

#[derive(Debug)]
pub struct QuotaGuard {
    limits: QuotaLimits,
    state: Mutex<QuotaState>,
}

impl Default for QuotaGuard {
    fn default() -> Self {
        Self::new(QuotaLimits::default())
    }
}

impl QuotaGuard {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(QuotaState {
                calls: 0,
                tokens: 0,
                window_start: Instant::now(),
            }),
        }
    }

    pub const fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Register one call costing `estimated_tokens`, waiting for the next
    /// window when either limit would be exceeded.
    ///
    /// An estimate larger than the whole token budget is admitted alone in
    /// a fresh window.
    pub async fn acquire(&self, estimated_tokens: u64) {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        if now.duration_since(state.window_start) >= self.limits.window {
            state.reset(now);
        }

        let calls_exceeded = state.calls >= self.limits.max_calls_per_window;
        let tokens_exceeded = state.calls > 0
            && state.tokens.saturating_add(estimated_tokens) > self.limits.max_tokens_per_window;

        if calls_exceeded || tokens_exceeded {
            let elapsed = now.duration_since(state.window_start);
            let wait = self.limits.window.saturating_sub(elapsed);
            warn!(
                calls = state.calls,
                tokens = state.tokens,
                estimated_tokens,
                wait_secs = wait.as_secs_f64(),
                "⏳ Quota window exhausted, waiting for reset"
            );
            tokio::time::sleep(wait).await;
            state.reset(Instant::now());
        }

        state.calls += 1;
        state.tokens = state.tokens.saturating_add(estimated_tokens);
        debug!(
            calls = state.calls,
            tokens = state.tokens,
            "Quota registered call"
        );
    }

    /// Replace an earlier estimate with the real usage reported by the
    /// endpoint. Best-effort: never blocks and never enforces limits.
    pub async fn reconcile(&self, estimated_tokens: u64, actual_tokens: u64) {
        let mut state = self.state.lock().await;
        state.tokens = state
            .tokens
            .saturating_sub(estimated_tokens)
            .saturating_add(actual_tokens);
    }

    pub async fn snapshot(&self) -> QuotaSnapshot {
        let state = self.state.lock().await;
        QuotaSnapshot {
            calls: state.calls,
            tokens: state.tokens,
            window_elapsed: Instant::now().duration_since(state.window_start),
        }
    }
}

/// Rough token cost of a payload: 1.5 tokens per byte, rounded up
pub fn estimate_tokens(payload: &str) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let estimate = (payload.len() as f64 * defaults::TOKEN_ESTIMATE_FACTOR).ceil() as u64;
    estimate
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 6);
        assert_eq!(estimate_tokens("abc"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_within_limit_do_not_wait() {
        let guard = QuotaGuard::default();
        let start = Instant::now();
        for _ in 0..15 {
            guard.acquire(1_000).await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        let snapshot = guard.snapshot().await;
        assert_eq!(snapshot.calls, 15);
        assert_eq!(snapshot.tokens, 15_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixteenth_call_waits_for_window() {
        let guard = QuotaGuard::default();
        let start = Instant::now();
        for _ in 0..16 {
            guard.acquire(10).await;
        }
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(guard.snapshot().await.calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_limit_waits_for_remaining_window() {
        let guard = QuotaGuard::default();
        guard.acquire(200_000).await;
        tokio::time::advance(Duration::from_secs(20)).await;

        let start = Instant::now();
        guard.acquire(60_000).await;
        assert_eq!(start.elapsed(), Duration::from_secs(40));

        let snapshot = guard.snapshot().await;
        assert_eq!((snapshot.calls, snapshot.tokens), (1, 60_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_estimate_admitted_alone() {
        let guard = QuotaGuard::default();
        let start = Instant::now();
        guard.acquire(400_000).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        guard.acquire(1).await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_estimate_waits_after_reconciled_call() {
        let guard = QuotaGuard::default();
        guard.acquire(100).await;
        guard.reconcile(100, 0).await;

        let start = Instant::now();
        guard.acquire(300_000).await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));

        let snapshot = guard.snapshot().await;
        assert_eq!((snapshot.calls, snapshot.tokens), (1, 300_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_resets_counters() {
        let guard = QuotaGuard::default();
        guard.acquire(5_000).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        guard.acquire(7).await;
        let snapshot = guard.snapshot().await;
        assert_eq!((snapshot.calls, snapshot.tokens), (1, 7));
    }

    #[tokio::test]
    async fn test_reconcile_corrects_estimate() {
        let guard = QuotaGuard::default();
        guard.acquire(1_500).await;
        guard.reconcile(1_500, 900).await;
        assert_eq!(guard.snapshot().await.tokens, 900);

        guard.reconcile(10_000, 0).await;
        assert_eq!(guard.snapshot().await.tokens, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_window_never_exceeds_limits(
            steps in proptest::collection::vec(
                (1u64..=400_000, 0u64..30, proptest::option::of(0u64..=100)),
                1..60,
            )
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            runtime.block_on(async {
                let guard = QuotaGuard::default();
                let limits = guard.limits();
                for (estimate, pause, reported_percent) in steps {
                    tokio::time::advance(Duration::from_secs(pause)).await;
                    guard.acquire(estimate).await;

                    let snapshot = guard.snapshot().await;
                    prop_assert!(snapshot.calls <= limits.max_calls_per_window);
                    prop_assert!(snapshot.window_elapsed < limits.window);
                    // Only a lone oversized call may go over the token budget
                    prop_assert!(
                        snapshot.tokens <= limits.max_tokens_per_window
                            || (snapshot.calls == 1 && snapshot.tokens == estimate)
                    );

                    if let Some(percent) = reported_percent {
                        guard.reconcile(estimate, estimate * percent / 100).await;
                    }
                }
                Ok(())
            })?;
        }
    }
}
