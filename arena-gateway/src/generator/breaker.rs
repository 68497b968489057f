//! Per-endpoint circuit breaker on atomic counters.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive unreachable results that open the circuit.
    pub failure_threshold: u32,
    /// Failures older than this no longer count as consecutive.
    pub window: Duration,
    /// How long the circuit stays open before one probe is allowed.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window: Duration::from_secs(30),
            cooldown: Duration::from_secs(15),
        }
    }
}

/// Short-circuits calls to an endpoint that keeps refusing connections.
///
/// After `failure_threshold` consecutive unreachable results within
/// `window`, calls fail fast for `cooldown`. When the cooldown expires
/// exactly one caller wins the probe slot; its success closes the circuit,
/// its failure extends the cooldown.
pub struct CircuitBreaker {
    config: BreakerConfig,
    origin: Instant,
    consecutive: AtomicU32,
    /// Millis since origin of the first failure in the current streak.
    first_failure_ms: AtomicU64,
    /// Millis since origin until which the circuit is open; 0 = closed.
    open_until_ms: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            origin: Instant::now(),
            consecutive: AtomicU32::new(0),
            first_failure_ms: AtomicU64::new(0),
            open_until_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Whether a call may proceed right now.
    pub fn allow(&self) -> bool {
        let open_until = self.open_until_ms.load(Ordering::Acquire);
        if open_until == 0 {
            return true;
        }
        let now = self.now_ms();
        if now < open_until {
            return false;
        }
        // Cooldown expired. One caller claims the probe by extending the
        // open window; the claim is undone by record_success on a good probe.
        let next = now + self.config.cooldown.as_millis() as u64;
        self.open_until_ms
            .compare_exchange(open_until, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::Release);
        self.first_failure_ms.store(0, Ordering::Release);
        self.open_until_ms.store(0, Ordering::Release);
    }

    pub fn record_unreachable(&self) {
        if self.open_until_ms.load(Ordering::Acquire) != 0 {
            // Failed probe; the extended cooldown from allow() stands.
            return;
        }
        let now = self.now_ms();
        let count = self.consecutive.load(Ordering::Acquire);
        let first = self.first_failure_ms.load(Ordering::Acquire);
        let window_ms = self.config.window.as_millis() as u64;

        if count == 0 || now.saturating_sub(first) > window_ms {
            self.first_failure_ms.store(now, Ordering::Release);
            self.consecutive.store(1, Ordering::Release);
            return;
        }
        let streak = count + 1;
        self.consecutive.store(streak, Ordering::Release);
        if streak >= self.config.failure_threshold {
            self.open_until_ms
                .store(now + self.config.cooldown.as_millis() as u64, Ordering::Release);
            self.consecutive.store(0, Ordering::Release);
            self.first_failure_ms.store(0, Ordering::Release);
        }
    }

    pub fn is_open(&self) -> bool {
        let open_until = self.open_until_ms.load(Ordering::Acquire);
        open_until != 0 && self.now_ms() < open_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            window: Duration::from_millis(200),
            cooldown: Duration::from_millis(50),
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = fast_breaker();
        assert!(breaker.allow());
        breaker.record_unreachable();
        breaker.record_unreachable();
        assert!(breaker.allow());
        breaker.record_unreachable();
        assert!(breaker.is_open());
        assert!(!breaker.allow());
    }

    #[test]
    fn test_success_resets_streak() {
        let breaker = fast_breaker();
        breaker.record_unreachable();
        breaker.record_unreachable();
        breaker.record_success();
        breaker.record_unreachable();
        breaker.record_unreachable();
        assert!(!breaker.is_open());
        assert!(breaker.allow());
    }

    #[test]
    fn test_single_probe_after_cooldown() {
        let breaker = fast_breaker();
        for _ in 0..3 {
            breaker.record_unreachable();
        }
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(60));
        // First caller wins the probe; the next is still short-circuited.
        assert!(breaker.allow());
        assert!(!breaker.allow());
    }

    #[test]
    fn test_failed_probe_keeps_circuit_open() {
        let breaker = fast_breaker();
        for _ in 0..3 {
            breaker.record_unreachable();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.allow());
        breaker.record_unreachable();
        assert!(breaker.is_open());
        assert!(!breaker.allow());
    }

    #[test]
    fn test_successful_probe_closes_circuit() {
        let breaker = fast_breaker();
        for _ in 0..3 {
            breaker.record_unreachable();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.allow());
        breaker.record_success();
        assert!(!breaker.is_open());
        assert!(breaker.allow());
    }

    #[test]
    fn test_stale_failures_fall_out_of_window() {
        let breaker = fast_breaker();
        breaker.record_unreachable();
        breaker.record_unreachable();
        std::thread::sleep(Duration::from_millis(250));
        // The streak restarted, so two more failures do not open it.
        breaker.record_unreachable();
        breaker.record_unreachable();
        assert!(!breaker.is_open());
    }
}
