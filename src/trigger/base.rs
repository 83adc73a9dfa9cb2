//! # TriggerBase: the submission pipeline shared by every event source.
//!
//! Trigger implementations hold a [`TriggerBase`] and route every event through it.
//!
//! ```text
//! allocate_worker_and_submit_event(event, span, timeout)
//!   ├─ allocator.allocate(timeout) ── ✗ ──► failure++ ─► Err(Allocation)
//!   ├─ catch_unwind {
//!   │     prepare_event: cloud event envelope? wrap in place
//!   │                    otherwise fresh id + trigger info
//!   │     worker.process_event(event)   (instrumented with span)
//!   │  } ── panic ──► reset worker marker ─► SubmitPanicked ─► Err(Panicked)
//!   ├─ allocator.release(worker)        (always, exactly once)
//!   └─ success++ / failure++
//! ```
//!
//! A dispatch never strands a worker: the panic boundary sits between the
//! allocation and the release.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{Instrument, Span};

use crate::allocator::{Allocator, broadcast_signal};
use crate::error::{CloudEventError, SubmitError, TriggerError, panic_message};
use crate::event::{Event, EventId, TriggerInfo, cloud};
use crate::notices::{Bus, Notice, NoticeKind};
use crate::trigger::{TimeoutOutcome, TriggerConfig, TriggerStatistics, TriggerStatisticsSnapshot};
use crate::worker::{ControlMessageKind, ControlMessageQueue, Submission, Worker};

/// Request to restart a trigger, consumed by the owning processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestartRequest {
    /// Identifier of the trigger to restart.
    pub trigger_id: String,
}

/// Sending half of the restart-request queue.
pub type RestartQueue = mpsc::UnboundedSender<RestartRequest>;

/// How plain events are identified before dispatch.
#[derive(Clone, Copy)]
enum IdPolicy {
    /// Always a new identifier.
    Fresh,
    /// Keep an existing identifier, assign one only when absent.
    Keep,
}

/// Shared dispatch logic and bookkeeping of one trigger.
pub struct TriggerBase {
    info: TriggerInfo,
    config: TriggerConfig,
    allocator: Arc<dyn Allocator>,
    stats: TriggerStatistics,
    restart_queue: Option<RestartQueue>,
    bus: Option<Bus>,
    span: Span,
}

impl TriggerBase {
    /// Starts building a base for `config` dispatching to `allocator`.
    pub fn builder(config: TriggerConfig, allocator: Arc<dyn Allocator>) -> TriggerBaseBuilder {
        TriggerBaseBuilder::new(config, allocator)
    }

    /// Trigger identifier.
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Trigger kind.
    pub fn kind(&self) -> &str {
        &self.info.kind
    }

    /// Source metadata attached to dispatched events.
    pub fn info(&self) -> &TriggerInfo {
        &self.info
    }

    /// Configuration the trigger was built with.
    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// The allocator workers come from.
    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    /// Allocates a worker, dispatches `event` to it and releases it.
    ///
    /// `span` instruments the runtime call; the trigger's own span is used when `None`.
    pub async fn allocate_worker_and_submit_event(
        &self,
        event: Event,
        span: Option<&Span>,
        timeout: Duration,
    ) -> Submission {
        let worker = self.allocate(timeout).await?;
        let outcome = self.submit_event_to_worker(&worker, event, span).await;
        self.allocator.release(worker);
        outcome
    }

    /// Allocates one worker and dispatches every event to it in order.
    ///
    /// The outer error is an allocation failure (nothing was dispatched);
    /// otherwise there is one outcome per event, in input order.
    ///
    /// Events keep the identifiers they arrive with (a [`Batcher`](crate::Batcher)
    /// keys caller handles by them); only events without one get a fresh id.
    pub async fn allocate_worker_and_submit_events(
        &self,
        events: Vec<Event>,
        span: Option<&Span>,
        timeout: Duration,
    ) -> Result<Vec<Submission>, SubmitError> {
        let worker = self.allocate(timeout).await?;
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.submit(&worker, event, span, IdPolicy::Keep).await);
        }
        self.allocator.release(worker);
        Ok(outcomes)
    }

    /// Dispatches `event` to a worker the caller already holds.
    ///
    /// Panics raised while preparing or running the event are caught here and
    /// reported as [`SubmitError::Panicked`]; the worker's in-flight marker is cleared.
    pub async fn submit_event_to_worker(
        &self,
        worker: &Worker,
        event: Event,
        span: Option<&Span>,
    ) -> Submission {
        self.submit(worker, event, span, IdPolicy::Fresh).await
    }

    async fn submit(
        &self,
        worker: &Worker,
        mut event: Event,
        span: Option<&Span>,
        ids: IdPolicy,
    ) -> Submission {
        let span = span.cloned().unwrap_or_else(|| self.span.clone());
        let dispatch = self.dispatch(worker, &mut event, ids).instrument(span);

        let outcome = match AssertUnwindSafe(dispatch).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(&*panic);
                worker.reset_event_time();
                tracing::error!(
                    trigger = %self.info.id,
                    worker = worker.index(),
                    panic = %message,
                    "caught panic while submitting event"
                );
                self.notify(
                    Notice::new(NoticeKind::SubmitPanicked)
                        .with_trigger(self.info.id.clone())
                        .with_worker(worker.index())
                        .with_reason(message.clone()),
                );
                Err(SubmitError::Panicked { message })
            }
        };

        self.update_statistics(&outcome);
        outcome
    }

    async fn dispatch(&self, worker: &Worker, event: &mut Event, ids: IdPolicy) -> Submission {
        self.prepare(event, ids)?;
        worker.process_event(event).await
    }

    /// Unwraps a cloud event envelope in place, or gives a plain event a fresh id.
    ///
    /// Any identifier a plain event arrived with is replaced. Trigger metadata
    /// is attached either way.
    pub fn prepare_event(&self, event: &mut Event) -> Result<(), CloudEventError> {
        self.prepare(event, IdPolicy::Fresh)
    }

    fn prepare(&self, event: &mut Event, ids: IdPolicy) -> Result<(), CloudEventError> {
        if !cloud::wrap(event)? {
            match ids {
                IdPolicy::Fresh => event.id = Some(EventId::generate()),
                IdPolicy::Keep => {
                    event.ensure_id();
                }
            }
        }
        event.trigger = Some(self.info.clone());
        Ok(())
    }

    /// Records the outcome of one event.
    pub fn update_statistics(&self, outcome: &Submission) {
        match outcome {
            Ok(Ok(_)) => self.stats.record_success(),
            Ok(Err(error)) => {
                tracing::debug!(trigger = %self.info.id, %error, "user code returned an error");
                self.stats.record_failure();
            }
            Err(_) => self.stats.record_failure(),
        }
    }

    async fn allocate(&self, timeout: Duration) -> Result<Arc<Worker>, SubmitError> {
        self.allocator.allocate(timeout).await.map_err(|error| {
            if error.is_backpressure() {
                tracing::debug!(trigger = %self.info.id, ?timeout, "no worker available");
            } else {
                tracing::warn!(trigger = %self.info.id, %error, "failed to allocate worker");
            }
            self.stats.record_failure();
            SubmitError::from(error)
        })
    }

    /// Workers this trigger dispatches to.
    pub fn workers(&self) -> &[Arc<Worker>] {
        self.allocator.workers()
    }

    /// Current counters, including the allocator's.
    pub fn statistics(&self) -> TriggerStatisticsSnapshot {
        self.stats.snapshot(self.allocator.statistics())
    }

    /// Routes control messages of `kind` from every worker to `queue`.
    pub async fn subscribe_to_control_message_kind(
        &self,
        kind: ControlMessageKind,
        queue: ControlMessageQueue,
    ) -> Result<(), TriggerError> {
        broadcast_signal("subscribe_control_message", self.workers(), |w| {
            let queue = queue.clone();
            async move { w.subscribe_to_control_message_kind(kind, queue).await }
        })
        .await
        .map_err(TriggerError::from)
    }

    /// Stops routing control messages of `kind` from every worker to `queue`.
    pub async fn unsubscribe_from_control_message_kind(
        &self,
        kind: ControlMessageKind,
        queue: &ControlMessageQueue,
    ) -> Result<(), TriggerError> {
        broadcast_signal("unsubscribe_control_message", self.workers(), |w| {
            let queue = queue.clone();
            async move { w.unsubscribe_from_control_message_kind(kind, &queue).await }
        })
        .await
        .map_err(TriggerError::from)
    }

    /// Asks every worker to drain; returns once all of them were signaled.
    pub async fn signal_worker_draining(&self) -> Result<(), TriggerError> {
        Ok(self.allocator.signal_draining().await?)
    }

    /// Tells every worker to resume after a drain.
    pub async fn signal_worker_continue(&self) -> Result<(), TriggerError> {
        Ok(self.allocator.signal_continue().await?)
    }

    /// Terminates every worker; the allocator refuses allocations afterwards.
    pub async fn signal_worker_termination(&self) -> Result<(), TriggerError> {
        Ok(self.allocator.signal_termination().await?)
    }

    /// Forgets earlier termination signals on every worker.
    pub fn reset_worker_termination_state(&self) {
        for worker in self.workers() {
            worker.reset_termination_state();
        }
    }

    /// Asks the owning processor to restart this trigger.
    pub fn restart(&self) -> Result<(), TriggerError> {
        let queue = self
            .restart_queue
            .as_ref()
            .ok_or(TriggerError::RestartQueueClosed)?;
        queue
            .send(RestartRequest {
                trigger_id: self.info.id.to_string(),
            })
            .map_err(|_| TriggerError::RestartQueueClosed)?;
        tracing::info!(trigger = %self.info.id, "restart requested");
        Ok(())
    }

    /// Aborts the event in flight on `worker`, if any.
    pub fn timeout_worker(&self, worker: &Worker) -> TimeoutOutcome {
        match worker.abort_event() {
            Some(elapsed) => {
                tracing::warn!(
                    trigger = %self.info.id,
                    worker = worker.index(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "aborted timed out event"
                );
                TimeoutOutcome::Aborted { elapsed }
            }
            None => TimeoutOutcome::AlreadyResponded,
        }
    }

    fn notify(&self, notice: Notice) {
        if let Some(bus) = &self.bus {
            bus.publish(notice);
        }
    }
}

/// Builder for [`TriggerBase`].
pub struct TriggerBaseBuilder {
    config: TriggerConfig,
    allocator: Arc<dyn Allocator>,
    require_shareable: bool,
    restart_queue: Option<RestartQueue>,
    bus: Option<Bus>,
    span: Option<Span>,
}

impl TriggerBaseBuilder {
    fn new(config: TriggerConfig, allocator: Arc<dyn Allocator>) -> Self {
        Self {
            config,
            allocator,
            require_shareable: false,
            restart_queue: None,
            bus: None,
            span: None,
        }
    }

    /// Rejects non-shareable allocators; for sources that dispatch concurrently.
    pub fn require_shareable(mut self) -> Self {
        self.require_shareable = true;
        self
    }

    /// Queue that [`TriggerBase::restart`] posts to.
    pub fn with_restart_queue(mut self, queue: RestartQueue) -> Self {
        self.restart_queue = Some(queue);
        self
    }

    /// Bus that dispatch notices are published to.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Default span for dispatches without their own.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Builds the base.
    pub fn build(self) -> Result<TriggerBase, TriggerError> {
        if self.require_shareable && !self.allocator.shareable() {
            return Err(TriggerError::NotShareable {
                trigger: self.config.id,
            });
        }

        let info = TriggerInfo {
            id: self.config.id.as_str().into(),
            kind: self.config.kind.as_str().into(),
            class: self.config.class.as_str().into(),
        };
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!("trigger", id = %self.config.id, kind = %self.config.kind)
        });

        Ok(TriggerBase {
            info,
            config: self.config,
            allocator: self.allocator,
            stats: TriggerStatistics::default(),
            restart_queue: self.restart_queue,
            bus: self.bus,
            span,
        })
    }
}
