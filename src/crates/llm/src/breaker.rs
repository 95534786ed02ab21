//! Per-model circuit breaker
//!
//! Tracks recent call outcomes per model key over a sliding window. When the
//! failure rate crosses the threshold the circuit opens and the fallback
//! chain skips the model; after a cooldown the circuit half-opens, a single
//! probe is allowed, and its outcome closes or re-opens the circuit.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Breaker tuning parameters
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failure rate in [0, 1] that opens the circuit
    pub failure_threshold: f64,

    /// Outcomes required before the rate is meaningful
    pub min_samples: usize,

    /// Sliding window length in outcomes
    pub window: usize,

    /// How long an open circuit waits before half-opening
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            min_samples: 4,
            window: 10,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Observable state of one model's circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct ModelCircuit {
    outcomes: VecDeque<bool>,
    state: CircuitState,
    opened_at: Option<Instant>,
}

impl ModelCircuit {
    fn new() -> Self {
        Self {
            outcomes: VecDeque::new(),
            state: CircuitState::Closed,
            opened_at: None,
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64
    }
}

/// Shared failure tracker for all models in the router
#[derive(Default)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    circuits: Mutex<HashMap<String, ModelCircuit>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the model may be attempted right now.
    ///
    /// An open circuit past its cooldown transitions to half-open and
    /// grants exactly one probe; further calls are refused until the probe
    /// reports back.
    pub fn allows(&self, model_key: &str) -> bool {
        let mut circuits = self.circuits.lock();
        let circuit = circuits
            .entry(model_key.to_string())
            .or_insert_with(ModelCircuit::new);

        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.cooldown {
                    debug!(model = model_key, "circuit half-open, allowing probe");
                    circuit.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, model_key: &str) {
        let mut circuits = self.circuits.lock();
        let circuit = circuits
            .entry(model_key.to_string())
            .or_insert_with(ModelCircuit::new);

        if circuit.state == CircuitState::HalfOpen {
            debug!(model = model_key, "probe succeeded, closing circuit");
            circuit.outcomes.clear();
            circuit.opened_at = None;
            circuit.state = CircuitState::Closed;
        }
        Self::push_outcome(&mut circuit.outcomes, self.config.window, true);
    }

    pub fn record_failure(&self, model_key: &str) {
        let mut circuits = self.circuits.lock();
        let circuit = circuits
            .entry(model_key.to_string())
            .or_insert_with(ModelCircuit::new);

        Self::push_outcome(&mut circuit.outcomes, self.config.window, false);

        let reopen = circuit.state == CircuitState::HalfOpen;
        let trip = circuit.state == CircuitState::Closed
            && circuit.outcomes.len() >= self.config.min_samples
            && circuit.failure_rate() >= self.config.failure_threshold;

        if reopen || trip {
            warn!(
                model = model_key,
                failure_rate = circuit.failure_rate(),
                "circuit opened"
            );
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self, model_key: &str) -> CircuitState {
        self.circuits
            .lock()
            .get(model_key)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    fn push_outcome(outcomes: &mut VecDeque<bool>, window: usize, ok: bool) {
        outcomes.push_back(ok);
        while outcomes.len() > window {
            outcomes.pop_front();
        }
    }
}
