//! Wraps every outbound adapter call with a retry policy (exponential
//! backoff, full jitter) and a per-adapter circuit breaker, fronted by a
//! governor-based rate limiter that adapts its pace on 429s.
//!
//! Grounded in this workspace's existing adaptive rate limiter; the circuit
//! breaker and retry loop are new (the module this was lifted from has no
//! breaker — it relies on a pool-level retry queue instead), built in the
//! same style: `ArcSwap` for the hot-swappable state, plain `Mutex` for
//! bookkeeping that changes rarely.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant, SystemTime};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::errors::{AdapterError, CoreError};
use crate::model::ResilienceConfig;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-adapter adaptive rate limiter: doubles its slowdown factor (capped at
/// 16x) on each 429, decaying back to the base rate after 30s without one.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    current_factor: AtomicU32,
    last_throttle: Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    pub fn new(period: Duration) -> Self {
        let quota = Quota::with_period(period).expect("period must be > 0");
        Self {
            limiter: ArcSwap::from_pointee(DirectLimiter::direct(quota)),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_throttle: Mutex::new(None),
        }
    }

    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    pub async fn acquire(&self) {
        self.try_decay();
        self.limiter.load().until_ready().await;
    }

    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_throttle.lock() {
            *last = Some(Instant::now());
        }
        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| Some((f * 2).min(16)));
        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor)
            && let Some(quota) = Quota::with_period(scaled)
        {
            self.limiter.store(std::sync::Arc::new(DirectLimiter::direct(quota)));
        }
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_throttle
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed().as_secs() >= 30))
            .unwrap_or(false);
        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            let quota = Quota::with_period(self.base_period).expect("base period valid");
            self.limiter.store(std::sync::Arc::new(DirectLimiter::direct(quota)));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// One circuit breaker instance per adapter, process-wide, guarded by a
/// mutex (§5: "reads and writes protected by the adapter's mutex").
pub struct CircuitBreaker {
    inner: Mutex<CircuitInner>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold,
            reset_timeout,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Returns `Err` with the next-attempt time if the breaker is open and
    /// the reset timeout hasn't elapsed; otherwise admits the call (flipping
    /// an expired OPEN into the HALF_OPEN probe state).
    fn check_and_admit(&self) -> Result<(), SystemTime> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let opened_at = inner.opened_at.expect("open state always has opened_at");
                if opened_at.elapsed() >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    let remaining = self.reset_timeout - opened_at.elapsed();
                    Err(SystemTime::now() + remaining)
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn record_qualifying_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }
}

/// Full jitter backoff: a uniformly random duration in `[0.5 * cap, cap]`,
/// where `cap = min(max_delay, base_delay * multiplier^attempt)` (§4.2:
/// "full jitter (factor 0.5-1.0)").
fn backoff_delay(config: &ResilienceConfig, attempt: u32) -> Duration {
    let scaled = config
        .base_delay
        .checked_mul(config.backoff_multiplier.saturating_pow(attempt))
        .unwrap_or(config.max_delay);
    let cap = scaled.min(config.max_delay);
    let cap_ms = cap.as_millis().max(1) as u64;
    Duration::from_millis(fastrand::u64((cap_ms / 2)..=cap_ms))
}

/// Per-adapter resilience wrapper combining rate limiting, retry with
/// backoff+jitter, and a circuit breaker.
pub struct ResilienceLayer {
    pub adapter_name: String,
    limiter: AdaptiveLimiter,
    breaker: CircuitBreaker,
    config: ResilienceConfig,
}

impl ResilienceLayer {
    pub fn new(adapter_name: impl Into<String>, period: Duration, config: ResilienceConfig) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            limiter: AdaptiveLimiter::new(period),
            breaker: CircuitBreaker::new(config.failure_threshold, config.reset_timeout),
            config,
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Runs `call` under rate limiting, retry and circuit breaking. `call` is
    /// re-invoked on each attempt; it should be cheap to construct (an async
    /// closure that performs the actual HTTP request).
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AdapterError>>,
    {
        let started = Instant::now();
        if let Err(next_attempt) = self.breaker.check_and_admit() {
            tracing::warn!(
                adapter = %self.adapter_name,
                circuit_state = ?self.breaker.state(),
                "call rejected: circuit open"
            );
            return Err(CoreError::CircuitOpen {
                adapter: self.adapter_name.clone(),
                next_attempt,
            });
        }

        let mut last_err: Option<AdapterError> = None;
        let mut retry_attempts = 0u32;
        for attempt in 0..self.config.max_attempts {
            self.limiter.acquire().await;

            match call().await {
                Ok(value) => {
                    self.breaker.record_success();
                    tracing::debug!(
                        adapter = %self.adapter_name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        retry_attempts = retry_attempts,
                        circuit_state = ?CircuitState::Closed,
                        status = "ok",
                        "adapter call completed"
                    );
                    return Ok(value);
                }
                Err(err) => {
                    if matches!(err, AdapterError::RateLimited { .. }) {
                        self.limiter.on_rate_limited();
                    }
                    if err.counts_against_circuit() {
                        self.breaker.record_qualifying_failure();
                    }
                    if !err.is_retryable() || attempt + 1 == self.config.max_attempts {
                        last_err = Some(err);
                        break;
                    }
                    let mut delay = backoff_delay(&self.config, attempt);
                    if let AdapterError::RateLimited {
                        retry_after: Some(retry_after),
                    } = &err
                    {
                        delay = delay.max(*retry_after).min(self.config.max_delay);
                    }
                    retry_attempts += 1;
                    tracing::debug!(
                        adapter = %self.adapter_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after resilience failure"
                    );
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let circuit_state = self.breaker.state();
        let error = last_err
            .map(CoreError::from)
            .unwrap_or_else(|| CoreError::NetworkError("exhausted retries with no recorded error".into()));
        if circuit_state == CircuitState::Open {
            tracing::warn!(adapter = %self.adapter_name, "retry budget exhausted, circuit now open");
        }
        tracing::debug!(
            adapter = %self.adapter_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            retry_attempts = retry_attempts,
            circuit_state = ?circuit_state,
            status = "error",
            error = %error,
            "adapter call completed"
        );
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_cap() {
        let config = ResilienceConfig {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2,
            ..ResilienceConfig::default()
        };
        for attempt in 0..8 {
            let d = backoff_delay(&config, attempt);
            assert!(d <= config.max_delay);
        }
    }

    #[test]
    fn backoff_never_goes_below_half_the_cap() {
        let config = ResilienceConfig {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2,
            ..ResilienceConfig::default()
        };
        for attempt in 0..8 {
            let cap = config
                .base_delay
                .checked_mul(config.backoff_multiplier.saturating_pow(attempt))
                .unwrap_or(config.max_delay)
                .min(config.max_delay);
            let d = backoff_delay(&config, attempt);
            assert!(d >= cap / 2, "attempt {attempt}: {d:?} < half of cap {cap:?}");
        }
    }

    #[test]
    fn breaker_starts_closed() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.check_and_admit().is_ok());
    }

    #[test]
    fn breaker_opens_after_exactly_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_qualifying_failure();
        breaker.record_qualifying_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_qualifying_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.check_and_admit().is_err());
    }

    #[test]
    fn breaker_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_qualifying_failure();
        breaker.record_qualifying_failure();
        breaker.record_success();
        breaker.record_qualifying_failure();
        breaker.record_qualifying_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn execute_succeeds_without_retry() {
        let layer = ResilienceLayer::new("TestAdapter", Duration::from_millis(1), ResilienceConfig::default());
        let result: Result<u32, CoreError> = layer.execute(|| async { Ok(42u32) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_retries_on_server_error_then_succeeds() {
        let layer = ResilienceLayer::new("TestAdapter", Duration::from_millis(1), ResilienceConfig::default());
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result: Result<u32, CoreError> = layer
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(AdapterError::UpstreamServer(503))
                    } else {
                        Ok(7u32)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn execute_does_not_retry_terminal_client_error() {
        let layer = ResilienceLayer::new("TestAdapter", Duration::from_millis(1), ResilienceConfig::default());
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result: Result<u32, CoreError> = layer
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(AdapterError::UpstreamClient(404)) }
            })
            .await;
        assert!(matches!(result, Err(CoreError::UpstreamClient(404))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_calling() {
        let layer = ResilienceLayer::new("TestAdapter", Duration::from_millis(1), ResilienceConfig {
            failure_threshold: 1,
            max_attempts: 1,
            ..ResilienceConfig::default()
        });
        let calls = std::sync::atomic::AtomicU32::new(0);
        let _: Result<u32, CoreError> = layer
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(AdapterError::UpstreamServer(500)) }
            })
            .await;
        assert_eq!(layer.circuit_state(), CircuitState::Open);

        let result: Result<u32, CoreError> = layer.execute(|| async { Ok(1u32) }).await;
        assert!(matches!(result, Err(CoreError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
