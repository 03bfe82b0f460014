//! State machine backing every lifecycle object.
//!
//! Holds the current [`LifecycleState`], a table of pending one-shot
//! continuations keyed by the state they wait for, and a broadcast channel
//! for persistent listeners. Continuations for a state are resolved
//! atomically with the transition that reaches or passes it.

use super::{LifecycleError, LifecycleState};
use crate::error::{IocError, Result};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};
use tracing::Instrument;

/// Emitted on every successful state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub name: String,
    pub state: LifecycleState,
}

type Continuation = oneshot::Sender<std::result::Result<(), String>>;

struct Inner {
    status: LifecycleState,
    failure: Option<String>,
    pending: BTreeMap<LifecycleState, Vec<Continuation>>,
}

pub struct StateMachine {
    name: String,
    span: tracing::Span,
    inner: Mutex<Inner>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl StateMachine {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let span = tracing::info_span!("lifecycle", name = %name);
        let (events, _) = broadcast::channel(32);
        Self {
            name,
            span,
            inner: Mutex::new(Inner {
                status: LifecycleState::NotStarted,
                failure: None,
                pending: BTreeMap::new(),
            }),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Span all diagnostics of this object are recorded in
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> LifecycleState {
        self.lock().status
    }

    /// The failure recorded by [`StateMachine::fail`], if any
    pub fn failure(&self) -> Option<String> {
        self.lock().failure.clone()
    }

    /// Move to `next`.
    ///
    /// Returns `Ok(false)` without notifying anyone when `next` has the same
    /// rank as the current state, and fails when it has a lower rank.
    pub fn set_status(&self, next: LifecycleState) -> std::result::Result<bool, LifecycleError> {
        let mut inner = self.lock();
        match next.cmp(&inner.status) {
            Ordering::Less => Err(LifecycleError::invalid_transition(
                &self.name,
                inner.status,
                next,
            )),
            Ordering::Equal => Ok(false),
            Ordering::Greater => {
                self.transition(&mut inner, next);
                Ok(true)
            }
        }
    }

    /// Move to `next` only if the current state is strictly below it.
    ///
    /// Used to claim a phase: exactly one caller observes `true`.
    pub fn advance_if_below(&self, next: LifecycleState) -> bool {
        let mut inner = self.lock();
        if inner.status < next {
            self.transition(&mut inner, next);
            true
        } else {
            false
        }
    }

    /// Claim a phase like [`StateMachine::advance_if_below`], holding it until
    /// the returned guard is released.
    ///
    /// Dropping the guard without releasing it records a failure, so callers
    /// waiting on a later state are woken instead of waiting forever.
    pub fn claim(&self, next: LifecycleState) -> Option<PhaseClaim<'_>> {
        self.advance_if_below(next).then(|| PhaseClaim {
            machine: self,
            phase: next,
            armed: true,
        })
    }

    fn transition(&self, inner: &mut Inner, next: LifecycleState) {
        let previous = inner.status;
        inner.status = next;

        let mut reached = std::mem::take(&mut inner.pending);
        inner.pending = reached.split_off(&next);
        if let Some(waiting) = inner.pending.remove(&next) {
            reached.insert(next, waiting);
        }
        for continuation in reached.into_values().flatten() {
            let _ = continuation.send(Ok(()));
        }

        tracing::trace!(parent: &self.span, from = %previous, to = %next, "state changed");
        let _ = self.events.send(LifecycleEvent {
            name: self.name.clone(),
            state: next,
        });
    }

    /// Record a terminal failure and wake every pending continuation with it.
    ///
    /// The state itself is left where it was.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut inner = self.lock();
        for continuation in std::mem::take(&mut inner.pending).into_values().flatten() {
            let _ = continuation.send(Err(reason.clone()));
        }
        inner.failure = Some(reason);
    }

    /// Wait until `state` has been reached or passed
    pub async fn wait_for(&self, state: LifecycleState) -> std::result::Result<(), LifecycleError> {
        let receiver = {
            let mut inner = self.lock();
            if inner.status >= state {
                return Ok(());
            }
            if let Some(reason) = &inner.failure {
                return Err(LifecycleError::aborted(&self.name, state, reason.clone()));
            }
            let (sender, receiver) = oneshot::channel();
            inner.pending.entry(state).or_default().push(sender);
            receiver
        };

        match receiver.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(LifecycleError::aborted(&self.name, state, reason)),
            Err(_) => Err(LifecycleError::aborted(
                &self.name,
                state,
                "state machine dropped",
            )),
        }
    }

    /// Subscribe to every future state change
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Run `hook` between the STARTING and STARTED transitions.
    ///
    /// On failure the error is logged, recorded and returned; the state stays
    /// at whatever was reached (normally STARTING).
    pub async fn start_with<F>(&self, hook: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        let outcome = async {
            if !self.set_status(LifecycleState::Starting)? {
                return Err(IocError::from(LifecycleError::AlreadyInState {
                    name: self.name.clone(),
                    state: LifecycleState::Starting,
                }));
            }
            tracing::debug!("starting");
            hook.await?;
            self.set_status(LifecycleState::Started)?;
            tracing::debug!("started");
            Ok(())
        }
        .instrument(self.span.clone())
        .await;

        if let Err(e) = &outcome {
            tracing::error!(parent: &self.span, error = %e, "start failed");
            self.fail(e.to_string());
        }
        outcome
    }

    /// Run `hook` between the STOPPING and STOPPED transitions.
    ///
    /// Stopping an object that is already stopping or stopped is a no-op.
    pub async fn stop_with<F>(&self, hook: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        if self.status() >= LifecycleState::Stopping {
            tracing::debug!(parent: &self.span, "already stopping, ignoring stop request");
            return Ok(());
        }

        let outcome = async {
            self.set_status(LifecycleState::Stopping)?;
            tracing::debug!("stopping");
            hook.await?;
            self.set_status(LifecycleState::Stopped)?;
            tracing::debug!("stopped");
            Ok(())
        }
        .instrument(self.span.clone())
        .await;

        if let Err(e) = &outcome {
            tracing::error!(parent: &self.span, error = %e, "stop failed");
        }
        outcome
    }
}

/// A phase claimed through [`StateMachine::claim`]
#[must_use = "dropping the claim fails the state machine"]
pub struct PhaseClaim<'a> {
    machine: &'a StateMachine,
    phase: LifecycleState,
    armed: bool,
}

impl PhaseClaim<'_> {
    /// The phase finished, successfully or with a failure already recorded
    pub fn release(mut self) {
        self.armed = false;
    }

    /// Record `reason` as the failure of the claimed phase
    pub fn fail(mut self, reason: impl Into<String>) {
        self.armed = false;
        self.machine.fail(reason);
    }
}

impl Drop for PhaseClaim<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(parent: self.machine.span(), phase = %self.phase, "resolution cancelled");
            self.machine.fail(format!("resolution cancelled during {}", self.phase));
        }
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}
