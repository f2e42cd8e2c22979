//! Per-endpoint three-state circuit breaker.
//!
//! Closed counts failures inside a rolling window; crossing the threshold
//! opens the circuit, which fails calls immediately until the open
//! duration elapses. The next state read then moves to half-open, which
//! admits exactly one trial: success closes the circuit, failure reopens
//! it. Cancellations never count as failures.

use crate::{
    Error,
    Result,
};
use std::future::Future;
use std::sync::{
    Arc,
    Mutex,
};
use std::time::{
    Duration,
    Instant,
};
use tracing::info;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass; failures are counted.
    Closed,
    /// Requests fail immediately.
    Open,
    /// One trial request is admitted.
    HalfOpen,
}

/// Breaker tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Failures within the window that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a trial.
    pub open_duration: Duration,
    /// Rolling window for the failure count.
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            failure_window: Duration::from_secs(60),
        }
    }
}

/// A state transition, delivered to subscribers outside the lock.
#[derive(Debug, Clone, Copy)]
pub struct StateChange {
    /// State before the transition.
    pub from: CircuitState,
    /// State after the transition.
    pub to: CircuitState,
    /// Failure count at the moment of transition.
    pub failure_count: u32,
}

type Listener = Arc<dyn Fn(StateChange) + Send + Sync>;

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    window_started_at: Instant,
    last_state_change_at: Instant,
    trial_in_flight: bool,
}

/// A three-state circuit breaker for one endpoint.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    listeners: Mutex<Vec<Listener>>,
}

impl CircuitBreaker {
    /// Create a breaker with the given tuning.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                window_started_at: now,
                last_state_change_at: now,
                trial_in_flight: false,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to state transitions.
    pub fn on_state_change<F>(&self, listener: F)
    where
        F: Fn(StateChange) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(Arc::new(listener));
    }

    fn notify(&self, change: StateChange) {
        info!(
            from = ?change.from,
            to = ?change.to,
            failures = change.failure_count,
            "circuit state change"
        );
        let listeners =
            self.listeners.lock().expect("listener lock poisoned").clone();
        for listener in listeners {
            listener(change);
        }
    }

    /// Current state, applying the open-to-half-open timeout.
    pub fn state(&self) -> CircuitState {
        let (state, change) = {
            let mut inner =
                self.inner.lock().expect("breaker lock poisoned");
            let change = self.advance(&mut inner);
            (inner.state, change)
        };
        if let Some(change) = change {
            self.notify(change);
        }
        state
    }

    // Open -> HalfOpen once the open duration has elapsed. Called under
    // the lock; the returned event is delivered after it is released.
    fn advance(&self, inner: &mut BreakerInner) -> Option<StateChange> {
        if inner.state == CircuitState::Open
            && inner.last_state_change_at.elapsed()
                >= self.config.open_duration
        {
            inner.state = CircuitState::HalfOpen;
            inner.trial_in_flight = false;
            inner.last_state_change_at = Instant::now();
            return Some(StateChange {
                from: CircuitState::Open,
                to: CircuitState::HalfOpen,
                failure_count: inner.failure_count,
            });
        }
        None
    }

    /// Whether a request may proceed right now. Returns the retry delay
    /// when the circuit is open, and claims the trial slot in half-open.
    fn admit(&self) -> Result<()> {
        let (result, change) = {
            let mut inner =
                self.inner.lock().expect("breaker lock poisoned");
            let change = self.advance(&mut inner);
            let result = match inner.state {
                CircuitState::Closed => Ok(()),
                CircuitState::Open => {
                    let elapsed = inner.last_state_change_at.elapsed();
                    let retry_in = self
                        .config
                        .open_duration
                        .saturating_sub(elapsed);
                    Err(Error::CircuitOpen { retry_in })
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        Err(Error::CircuitOpen {
                            retry_in: Duration::ZERO,
                        })
                    } else {
                        inner.trial_in_flight = true;
                        Ok(())
                    }
                }
            };
            (result, change)
        };
        if let Some(change) = change {
            self.notify(change);
        }
        result
    }

    /// Record a success.
    pub fn record_success(&self) {
        let change = {
            let mut inner =
                self.inner.lock().expect("breaker lock poisoned");
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count = 0;
                    inner.window_started_at = Instant::now();
                    None
                }
                CircuitState::HalfOpen => {
                    let from = inner.state;
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.trial_in_flight = false;
                    inner.window_started_at = Instant::now();
                    inner.last_state_change_at = Instant::now();
                    Some(StateChange {
                        from,
                        to: CircuitState::Closed,
                        failure_count: 0,
                    })
                }
                CircuitState::Open => None,
            }
        };
        if let Some(change) = change {
            self.notify(change);
        }
    }

    /// Record a failure.
    pub fn record_failure(&self) {
        let change = {
            let mut inner =
                self.inner.lock().expect("breaker lock poisoned");
            match inner.state {
                CircuitState::Closed => {
                    if inner.window_started_at.elapsed()
                        > self.config.failure_window
                    {
                        inner.failure_count = 1;
                        inner.window_started_at = Instant::now();
                    } else {
                        inner.failure_count += 1;
                    }
                    if inner.failure_count
                        >= self.config.failure_threshold
                    {
                        inner.state = CircuitState::Open;
                        inner.last_state_change_at = Instant::now();
                        Some(StateChange {
                            from: CircuitState::Closed,
                            to: CircuitState::Open,
                            failure_count: inner.failure_count,
                        })
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.trial_in_flight = false;
                    inner.last_state_change_at = Instant::now();
                    Some(StateChange {
                        from: CircuitState::HalfOpen,
                        to: CircuitState::Open,
                        failure_count: inner.failure_count,
                    })
                }
                CircuitState::Open => None,
            }
        };
        if let Some(change) = change {
            self.notify(change);
        }
    }

    /// Force the circuit closed and reset counters.
    pub fn reset(&self) {
        let change = {
            let mut inner =
                self.inner.lock().expect("breaker lock poisoned");
            let from = inner.state;
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.trial_in_flight = false;
            inner.window_started_at = Instant::now();
            inner.last_state_change_at = Instant::now();
            (from != CircuitState::Closed).then_some(StateChange {
                from,
                to: CircuitState::Closed,
                failure_count: 0,
            })
        };
        if let Some(change) = change {
            self.notify(change);
        }
    }

    /// Run `operation` through the breaker. Cancellation passes through
    /// without touching the failure count.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;
        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(Error::Cancelled) => {
                // Release a claimed half-open trial without judging it
                let mut inner =
                    self.inner.lock().expect("breaker lock poisoned");
                inner.trial_in_flight = false;
                drop(inner);
                Err(Error::Cancelled)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }
}
