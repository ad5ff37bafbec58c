//! Per-agent circuit breakers.
//!
//! A breaker stops dispatch to an agent after repeated failures and lets a
//! single trial call through once the cooldown has passed. The cooldown is
//! checked lazily, at the next admission for that agent.

use crate::agent::AgentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Breaker thresholds, read from the `[circuit_breaker]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before allowing a trial call.
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 60_000,
        }
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of asking a breaker whether a task may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; run normally.
    Allowed,
    /// Circuit half-open; this call is the single trial.
    Trial,
    /// Circuit open; fail the task without calling the handler.
    Rejected,
    /// A trial is already in flight; hold the task back.
    Deferred,
}

/// A state change, reported so the caller can log and publish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BreakerState,
    pub to: BreakerState,
}

/// Point-in-time view of one agent's breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent: AgentKind,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Failure gate for a single agent kind.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    agent: AgentKind,
    config: BreakerConfig,
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_utc: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(agent: AgentKind, config: BreakerConfig) -> Self {
        Self {
            agent,
            config,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            opened_at_utc: None,
            trial_in_flight: false,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Decide whether a task for this agent may be dispatched now.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open here
    /// and the caller receives the trial.
    pub fn admit(&mut self) -> (Admission, Option<Transition>) {
        match self.state {
            BreakerState::Closed => (Admission::Allowed, None),
            BreakerState::Open => {
                let cooled = self
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cooldown());
                if !cooled {
                    return (Admission::Rejected, None);
                }
                let transition = self.set_state(BreakerState::HalfOpen);
                self.trial_in_flight = true;
                (Admission::Trial, transition)
            }
            BreakerState::HalfOpen if self.trial_in_flight => (Admission::Deferred, None),
            BreakerState::HalfOpen => {
                self.trial_in_flight = true;
                (Admission::Trial, None)
            }
        }
    }

    /// Record a handler success.
    ///
    /// While the circuit is open or half-open only the trial's result moves
    /// it; a late success from a call admitted while closed changes nothing.
    pub fn record_success(&mut self, trial: bool) -> Option<Transition> {
        if self.state != BreakerState::Closed && !trial {
            return None;
        }
        self.consecutive_failures = 0;
        self.trial_in_flight = false;
        let transition = self.set_state(BreakerState::Closed);
        self.opened_at = None;
        self.opened_at_utc = None;
        transition
    }

    /// Record a handler failure, opening the circuit when warranted.
    ///
    /// Late failures from non-trial calls only add to the count once the
    /// circuit has left the closed state.
    pub fn record_failure(&mut self, trial: bool) -> Option<Transition> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            BreakerState::Closed if self.consecutive_failures >= self.config.failure_threshold => {
                self.open()
            }
            // Failed trial: reopen and restart the cooldown.
            BreakerState::HalfOpen if trial => {
                self.trial_in_flight = false;
                self.open()
            }
            _ => None,
        }
    }

    /// Give the trial slot back without a verdict, e.g. when the trial
    /// was cancelled. The next admission becomes the trial.
    pub fn release_trial(&mut self) {
        self.trial_in_flight = false;
    }

    fn open(&mut self) -> Option<Transition> {
        self.opened_at = Some(Instant::now());
        self.opened_at_utc = Some(Utc::now());
        self.set_state(BreakerState::Open)
    }

    fn set_state(&mut self, next: BreakerState) -> Option<Transition> {
        if self.state == next {
            return None;
        }
        let transition = Transition {
            from: self.state,
            to: next,
        };
        self.state = next;
        Some(transition)
    }

    pub fn health(&self) -> AgentHealth {
        AgentHealth {
            agent: self.agent,
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            opened_at: self.opened_at_utc,
        }
    }
}

/// Breakers for every agent kind, created lazily on first use.
#[derive(Debug, Clone, Default)]
pub struct BreakerBoard {
    config: BreakerConfig,
    breakers: HashMap<AgentKind, CircuitBreaker>,
}

impl BreakerBoard {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: HashMap::new(),
        }
    }

    fn breaker(&mut self, agent: AgentKind) -> &mut CircuitBreaker {
        let config = self.config;
        self.breakers
            .entry(agent)
            .or_insert_with(|| CircuitBreaker::new(agent, config))
    }

    pub fn admit(&mut self, agent: AgentKind) -> (Admission, Option<Transition>) {
        self.breaker(agent).admit()
    }

    pub fn record_success(&mut self, agent: AgentKind, trial: bool) -> Option<Transition> {
        self.breaker(agent).record_success(trial)
    }

    pub fn record_failure(&mut self, agent: AgentKind, trial: bool) -> Option<Transition> {
        self.breaker(agent).record_failure(trial)
    }

    pub fn release_trial(&mut self, agent: AgentKind) {
        self.breaker(agent).release_trial();
    }

    /// Current state; agents never dispatched to count as closed.
    pub fn state(&self, agent: AgentKind) -> BreakerState {
        self.breakers
            .get(&agent)
            .map(CircuitBreaker::state)
            .unwrap_or_default()
    }

    pub fn get(&self, agent: AgentKind) -> Option<&CircuitBreaker> {
        self.breakers.get(&agent)
    }

    /// Health of every breaker created so far, ordered by agent kind.
    pub fn health(&self) -> Vec<AgentHealth> {
        let mut health: Vec<AgentHealth> =
            self.breakers.values().map(CircuitBreaker::health).collect();
        health.sort_by_key(|h| h.agent);
        health
    }

    /// Whether every breaker is closed.
    pub fn all_closed(&self) -> bool {
        self.breakers
            .values()
            .all(|b| b.state() == BreakerState::Closed)
    }
}
