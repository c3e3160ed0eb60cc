//! # Debounced Reviser
//!
//! Tokio driver for the [`Debouncer`] state machine. A `RevisionActor` owns the
//! machine and its timers; callers talk to it through the cloneable
//! [`DebouncedReviser`] handle.
//!
//! ```text
//! DebouncedReviser ──mpsc──► RevisionActor ──spawn──► RevisionTransport::revise
//!        ▲                        │  ▲                         │
//!        └──────oneshot───────────┘  └──────── outcome ────────┘
//! ```

use crate::debounce::{CallOutcome, DebounceConfig, DebounceState, Debouncer, Dispatch};
use crate::error::{PaymentError, PaymentResult};
use crate::intent::{PaymentIntentManager, Revision};
use crate::surcharge::MethodKind;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument, warn, Instrument};

/// Anything that can apply a method change to a charge
#[async_trait]
pub trait RevisionTransport: Send + Sync {
    async fn revise(&self, charge_id: &str, method: MethodKind) -> PaymentResult<Revision>;
}

/// In-process transport straight to the intent manager
#[async_trait]
impl RevisionTransport for PaymentIntentManager {
    async fn revise(&self, charge_id: &str, method: MethodKind) -> PaymentResult<Revision> {
        self.revise_charge_amount(charge_id, method).await
    }
}

/// Result of waiting for outstanding work before submit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// True when the wait hit its bound with work still outstanding
    pub timed_out: bool,
    pub last_applied: Option<MethodKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviserSnapshot {
    pub state: DebounceState,
    pub last_applied: Option<MethodKind>,
    pub last_failed: Option<MethodKind>,
}

#[derive(Debug)]
enum ReviserRequest {
    Select {
        method: MethodKind,
    },
    Drain {
        respond_to: oneshot::Sender<DrainReport>,
    },
    Snapshot {
        respond_to: oneshot::Sender<ReviserSnapshot>,
    },
}

/// Handle to a running revision actor for one charge
#[derive(Clone)]
pub struct DebouncedReviser {
    sender: mpsc::Sender<ReviserRequest>,
}

impl DebouncedReviser {
    /// Spawn an actor for `charge_id` on the current runtime
    pub fn spawn(
        charge_id: impl Into<String>,
        transport: Arc<dyn RevisionTransport>,
        config: DebounceConfig,
    ) -> Self {
        let (actor, handle) = RevisionActor::new(charge_id.into(), transport, config, 32);
        tokio::spawn(actor.run());
        handle
    }

    /// Report a method selection. Returns once the actor has it queued.
    pub async fn select(&self, method: MethodKind) -> PaymentResult<()> {
        self.sender
            .send(ReviserRequest::Select { method })
            .await
            .map_err(|_| stopped())
    }

    /// Flush pending work and wait (bounded) for in-flight calls
    #[instrument(skip(self))]
    pub async fn drain(&self) -> PaymentResult<DrainReport> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ReviserRequest::Drain { respond_to })
            .await
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }

    pub async fn snapshot(&self) -> PaymentResult<ReviserSnapshot> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ReviserRequest::Snapshot { respond_to })
            .await
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }
}

fn stopped() -> PaymentError {
    PaymentError::Internal("revision actor stopped".to_string())
}

struct RevisionActor {
    charge_id: String,
    transport: Arc<dyn RevisionTransport>,
    machine: Debouncer,
    receiver: mpsc::Receiver<ReviserRequest>,
    done_tx: mpsc::Sender<CallOutcome>,
    done_rx: mpsc::Receiver<CallOutcome>,
    origin: Instant,
    drain_waiters: Vec<oneshot::Sender<DrainReport>>,
    drain_deadline: Option<Instant>,
}

impl RevisionActor {
    fn new(
        charge_id: String,
        transport: Arc<dyn RevisionTransport>,
        config: DebounceConfig,
        buffer_size: usize,
    ) -> (Self, DebouncedReviser) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let (done_tx, done_rx) = mpsc::channel(4);
        let actor = Self {
            charge_id,
            transport,
            machine: Debouncer::new(config),
            receiver,
            done_tx,
            done_rx,
            origin: Instant::now(),
            drain_waiters: Vec::new(),
            drain_deadline: None,
        };
        (actor, DebouncedReviser { sender })
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn next_wake(&self) -> Option<Instant> {
        let timer = self
            .machine
            .next_deadline()
            .map(|ms| self.origin + Duration::from_millis(ms));
        match (timer, self.drain_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    #[instrument(name = "revision_actor", skip(self), fields(charge_id = %self.charge_id))]
    async fn run(mut self) {
        debug!("Revision actor starting");
        loop {
            let wake = self.next_wake();
            let sleep_target = wake.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                request = self.receiver.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                Some(outcome) = self.done_rx.recv() => {
                    let next = self.machine.complete(outcome, self.now_ms());
                    self.dispatch(next);
                    self.settle_drains(false);
                }
                _ = sleep_until(sleep_target), if wake.is_some() => {
                    let next = self.machine.tick(self.now_ms());
                    self.dispatch(next);
                    if self.drain_deadline.is_some_and(|d| Instant::now() >= d) {
                        self.settle_drains(true);
                    }
                }
            }
        }
        debug!("Revision actor stopped");
    }

    fn handle_request(&mut self, request: ReviserRequest) {
        match request {
            ReviserRequest::Select { method } => {
                debug!(%method, "Method selected");
                self.machine.select(method, self.now_ms());
            }
            ReviserRequest::Drain { respond_to } => {
                let next = self.machine.flush();
                self.dispatch(next);
                self.drain_waiters.push(respond_to);
                if self.drain_deadline.is_none() {
                    let bound = Duration::from_millis(self.machine.config().drain_timeout_ms);
                    self.drain_deadline = Some(Instant::now() + bound);
                }
                self.settle_drains(false);
            }
            ReviserRequest::Snapshot { respond_to } => {
                let _ = respond_to.send(ReviserSnapshot {
                    state: self.machine.state(),
                    last_applied: self.machine.last_applied(),
                    last_failed: self.machine.last_failed(),
                });
            }
        }
    }

    /// Answer drain waiters once idle, or unconditionally on timeout
    fn settle_drains(&mut self, timed_out: bool) {
        if self.drain_waiters.is_empty() || !(timed_out || self.machine.is_idle()) {
            return;
        }
        if timed_out {
            warn!(state = ?self.machine.state(), "Drain timed out, proceeding best-effort");
        }
        let report = DrainReport {
            timed_out,
            last_applied: self.machine.last_applied(),
        };
        for waiter in self.drain_waiters.drain(..) {
            let _ = waiter.send(report);
        }
        self.drain_deadline = None;
    }

    fn dispatch(&self, next: Option<Dispatch>) {
        let Some(Dispatch { method, attempt }) = next else {
            return;
        };
        info!(%method, attempt, "Sending revision");

        let transport = self.transport.clone();
        let charge_id = self.charge_id.clone();
        let done = self.done_tx.clone();
        tokio::spawn(
            async move {
                let outcome = match transport.revise(&charge_id, method).await {
                    Ok(Revision::Applied { .. }) => CallOutcome::Applied,
                    Ok(Revision::NotRevisable { status }) => {
                        info!(%status, "Charge no longer revisable");
                        CallOutcome::NotRevisable
                    }
                    Err(e) if e.is_transient_contention() => {
                        warn!(attempt, "Transient revision failure: {}", e);
                        CallOutcome::Transient
                    }
                    Err(e) => {
                        warn!(attempt, "Revision failed: {}", e);
                        CallOutcome::Failed
                    }
                };
                let _ = done.send(outcome).await;
            }
            .in_current_span(),
        );
    }
}
