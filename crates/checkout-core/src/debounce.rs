//! # Client Update Debouncer
//!
//! Payment widgets report a method change on every selection, including
//! transient ones while they initialise. This state machine turns that stream
//! into as few revision calls as possible:
//!
//! - a selection equal to the last applied method is dropped;
//! - rapid changes inside the debounce window collapse into one call;
//! - while a call is in flight only the latest selection is queued;
//! - rate-limit and lock-timeout failures retry with doubling backoff.
//!
//! ```text
//!            select                 window elapsed
//!   Idle ───────────► Pending ─────────────────────► InFlight ──► Idle
//!                        ▲                            │   ▲
//!                        │ select                     │   │ retry_at
//!                        └────────────────────────────┤   │
//!                                       select        ▼   │
//!                              InFlightWithQueued   Backoff
//! ```
//!
//! Time is passed in explicitly as milliseconds, so the machine runs the same
//! under a tokio clock, a browser clock or a test.

use crate::surcharge::MethodKind;
use serde::{Deserialize, Serialize};

pub const DEBOUNCE_WINDOW_MS: u64 = 800;
pub const RETRY_BASE_MS: u64 = 500;
pub const RETRY_CAP_MS: u64 = 4_000;
pub const MAX_ATTEMPTS: u32 = 3;
pub const DRAIN_TIMEOUT_MS: u64 = 2_000;

/// Timing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceConfig {
    pub window_ms: u64,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    /// Attempts per selection, first call included
    pub max_attempts: u32,
    pub drain_timeout_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window_ms: DEBOUNCE_WINDOW_MS,
            retry_base_ms: RETRY_BASE_MS,
            retry_cap_ms: RETRY_CAP_MS,
            max_attempts: MAX_ATTEMPTS,
            drain_timeout_ms: DRAIN_TIMEOUT_MS,
        }
    }
}

impl DebounceConfig {
    /// Wait before retry number `attempt + 1`
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1).min(16);
        self.retry_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.retry_cap_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DebounceState {
    Idle,
    Pending {
        method: MethodKind,
        deadline: u64,
    },
    InFlight {
        method: MethodKind,
        attempt: u32,
    },
    InFlightWithQueued {
        method: MethodKind,
        attempt: u32,
        queued: MethodKind,
    },
    Backoff {
        method: MethodKind,
        attempt: u32,
        retry_at: u64,
    },
}

/// A revision call the driver must issue now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub method: MethodKind,
    pub attempt: u32,
}

/// How a revision call ended, as seen by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Server applied the new amount
    Applied,
    /// Charge already past the revisable states; stop sending
    NotRevisable,
    /// Rate limit or lock timeout; worth retrying
    Transient,
    /// Anything else
    Failed,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    config: DebounceConfig,
    state: DebounceState,
    last_applied: Option<MethodKind>,
    last_failed: Option<MethodKind>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            state: DebounceState::Idle,
            last_applied: None,
            last_failed: None,
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn last_applied(&self) -> Option<MethodKind> {
        self.last_applied
    }

    /// Method whose call gave up most recently, cleared by the next success
    pub fn last_failed(&self) -> Option<MethodKind> {
        self.last_failed
    }

    pub fn is_idle(&self) -> bool {
        self.state == DebounceState::Idle
    }

    /// When `tick` next has something to do
    pub fn next_deadline(&self) -> Option<u64> {
        match self.state {
            DebounceState::Pending { deadline, .. } => Some(deadline),
            DebounceState::Backoff { retry_at, .. } => Some(retry_at),
            _ => None,
        }
    }

    /// The customer picked `method` at time `now`
    pub fn select(&mut self, method: MethodKind, now: u64) {
        let window = now + self.config.window_ms;
        self.state = match self.state {
            DebounceState::Idle | DebounceState::Pending { .. }
                if Some(method) == self.last_applied =>
            {
                DebounceState::Idle
            }
            DebounceState::Idle | DebounceState::Pending { .. } => DebounceState::Pending {
                method,
                deadline: window,
            },
            DebounceState::InFlight { method: current, attempt }
            | DebounceState::InFlightWithQueued {
                method: current,
                attempt,
                ..
            } => {
                if method == current {
                    DebounceState::InFlight {
                        method: current,
                        attempt,
                    }
                } else {
                    DebounceState::InFlightWithQueued {
                        method: current,
                        attempt,
                        queued: method,
                    }
                }
            }
            DebounceState::Backoff { .. } if Some(method) == self.last_applied => {
                DebounceState::Idle
            }
            DebounceState::Backoff { retry_at, .. } => DebounceState::Pending {
                method,
                deadline: window.max(retry_at),
            },
        };
    }

    /// Advance the clock; returns a call to issue when a timer fired
    pub fn tick(&mut self, now: u64) -> Option<Dispatch> {
        match self.state {
            DebounceState::Pending { method, deadline } if now >= deadline => {
                Some(self.start(method, 1))
            }
            DebounceState::Backoff {
                method,
                attempt,
                retry_at,
            } if now >= retry_at => Some(self.start(method, attempt + 1)),
            _ => None,
        }
    }

    /// Issue whatever is waiting on a timer right away (used before submit)
    pub fn flush(&mut self) -> Option<Dispatch> {
        match self.state {
            DebounceState::Pending { method, .. } => Some(self.start(method, 1)),
            DebounceState::Backoff {
                method, attempt, ..
            } => Some(self.start(method, attempt + 1)),
            _ => None,
        }
    }

    /// The in-flight call finished at `now`
    pub fn complete(&mut self, outcome: CallOutcome, now: u64) -> Option<Dispatch> {
        let (method, attempt, queued) = match self.state {
            DebounceState::InFlight { method, attempt } => (method, attempt, None),
            DebounceState::InFlightWithQueued {
                method,
                attempt,
                queued,
            } => (method, attempt, Some(queued)),
            _ => return None,
        };

        match outcome {
            CallOutcome::Applied => {
                self.last_applied = Some(method);
                self.last_failed = None;
                self.next_queued(queued)
            }
            CallOutcome::NotRevisable => {
                self.state = DebounceState::Idle;
                None
            }
            CallOutcome::Transient if attempt < self.config.max_attempts => {
                self.state = DebounceState::Backoff {
                    method: queued.unwrap_or(method),
                    attempt,
                    retry_at: now + self.config.backoff_ms(attempt),
                };
                None
            }
            CallOutcome::Transient | CallOutcome::Failed => {
                self.last_failed = Some(method);
                self.next_queued(queued)
            }
        }
    }

    fn next_queued(&mut self, queued: Option<MethodKind>) -> Option<Dispatch> {
        match queued {
            Some(next) if Some(next) != self.last_applied => Some(self.start(next, 1)),
            _ => {
                self.state = DebounceState::Idle;
                None
            }
        }
    }

    fn start(&mut self, method: MethodKind, attempt: u32) -> Dispatch {
        self.state = DebounceState::InFlight { method, attempt };
        Dispatch { method, attempt }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DebounceConfig::default())
    }
}
