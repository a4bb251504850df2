//! Circuit breaker guarding the Redis session store
//!
//! After `failure_threshold` consecutive failures the breaker opens and
//! rejects calls for `recovery_timeout`. The next call after that runs as a
//! probe; `success_threshold` probe successes close the breaker again, any
//! probe failure re-opens it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn encode(self) -> u32 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }

    fn decode(raw: u32) -> Self {
        match raw {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

pub struct CircuitBreaker {
    name: String,
    state: AtomicU32,
    consecutive_failures: AtomicU32,
    probe_successes: AtomicU32,
    opened_at: AtomicU64,
    failure_threshold: u32,
    recovery_timeout_secs: u64,
    success_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout_secs: u64,
        success_threshold: u32,
    ) -> Self {
        Self {
            name: name.into(),
            state: AtomicU32::new(BreakerState::Closed.encode()),
            consecutive_failures: AtomicU32::new(0),
            probe_successes: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            failure_threshold,
            recovery_timeout_secs,
            success_threshold,
        }
    }

    /// 5 failures to open, 30s cool-down, 2 probe successes to close
    pub fn for_session_store() -> Self {
        Self::new("session-store", 5, 30, 2)
    }

    pub fn state(&self) -> BreakerState {
        let state = BreakerState::decode(self.state.load(Ordering::SeqCst));
        if state == BreakerState::Open {
            let elapsed = unix_now().saturating_sub(self.opened_at.load(Ordering::SeqCst));
            if elapsed >= self.recovery_timeout_secs {
                self.transition(BreakerState::HalfOpen);
                return BreakerState::HalfOpen;
            }
        }
        state
    }

    pub fn allow_request(&self) -> bool {
        self.state() != BreakerState::Open
    }

    pub fn record_success(&self) {
        match self.state() {
            BreakerState::HalfOpen => {
                let successes = self.probe_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.success_threshold {
                    self.transition(BreakerState::Closed);
                    info!("Circuit breaker '{}' closed", self.name);
                }
            }
            _ => self.consecutive_failures.store(0, Ordering::SeqCst),
        }
    }

    pub fn record_failure(&self) {
        match self.state() {
            BreakerState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.failure_threshold {
                    self.open();
                    warn!(
                        "Circuit breaker '{}' opened after {} consecutive failures",
                        self.name, failures
                    );
                }
            }
            BreakerState::HalfOpen => {
                self.open();
                warn!("Circuit breaker '{}' re-opened by failed probe", self.name);
            }
            BreakerState::Open => {}
        }
    }

    fn open(&self) {
        self.opened_at.store(unix_now(), Ordering::SeqCst);
        self.transition(BreakerState::Open);
    }

    fn transition(&self, to: BreakerState) {
        self.state.store(to.encode(), Ordering::SeqCst);
        self.probe_successes.store(0, Ordering::SeqCst);
        if to == BreakerState::Closed {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
