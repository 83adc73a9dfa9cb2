//! # Worker: an execution slot that runs one event at a time.
//!
//! A [`Worker`] pairs a stable index with a [`Runtime`] and tracks the event
//! currently in flight. The marker is set right before user code is invoked and
//! cleared when it returns; the timeout watcher reads it to find stuck workers.
//!
//! ```text
//! process_event(ev)
//!   ├─ gate.lock()                        (one event or restart at a time)
//!   ├─ in_flight = { started_at: now, abort }
//!   ├─ select! {
//!   │     abort.cancelled()      → Err(EventAborted { elapsed })
//!   │     runtime.process_event  → Ok(application outcome)
//!   │  }
//!   └─ in_flight = None
//! ```
//!
//! Ownership is enforced by the allocator, not by the worker: the `gate` only
//! keeps a restart from overlapping an event.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ProcessError, RuntimeError, SubmitError};
use crate::event::{Event, Response};
use crate::worker::control::{ControlMessageKind, ControlMessageQueue};
use crate::worker::runtime::Runtime;

/// Outcome of dispatching one event.
///
/// The outer error is an infrastructure failure or backpressure; the inner
/// result is what user code produced.
pub type Submission = Result<Result<Response, ProcessError>, SubmitError>;

struct InFlight {
    started_at: Instant,
    abort: CancellationToken,
}

/// An execution slot owned by exactly one allocator.
pub struct Worker {
    index: usize,
    runtime: Arc<dyn Runtime>,
    in_flight: Mutex<Option<InFlight>>,
    gate: tokio::sync::Mutex<()>,
    checked_out: AtomicBool,
    termination_signaled: AtomicBool,
}

impl Worker {
    /// Creates a worker with the given index.
    pub fn new(index: usize, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            index,
            runtime,
            in_flight: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
            checked_out: AtomicBool::new(false),
            termination_signaled: AtomicBool::new(false),
        }
    }

    /// Index, unique within the owning pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The runtime behind this worker.
    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    /// When the in-flight event started, if any.
    pub fn event_start_time(&self) -> Option<Instant> {
        self.lock_in_flight().as_ref().map(|f| f.started_at)
    }

    /// How long the in-flight event has been running, if any.
    pub fn event_elapsed(&self) -> Option<Duration> {
        self.event_start_time().map(|t| t.elapsed())
    }

    /// True while an event is in flight.
    pub fn is_busy(&self) -> bool {
        self.lock_in_flight().is_some()
    }

    /// Runs one event through the runtime.
    ///
    /// Returns `Err(SubmitError::EventAborted)` when [`abort_event`](Self::abort_event)
    /// fires while the runtime is still working on it.
    pub async fn process_event(&self, event: &Event) -> Submission {
        let _gate = self.gate.lock().await;

        let started_at = Instant::now();
        let abort = CancellationToken::new();
        self.set_in_flight(Some(InFlight {
            started_at,
            abort: abort.clone(),
        }));

        let outcome = tokio::select! {
            biased;
            _ = abort.cancelled() => Err(SubmitError::EventAborted {
                elapsed: started_at.elapsed(),
            }),
            res = self.runtime.process_event(event) => Ok(res),
        };

        self.reset_event_time();
        outcome
    }

    /// Aborts the in-flight event, if any, returning how long it had been running.
    pub fn abort_event(&self) -> Option<Duration> {
        let guard = self.lock_in_flight();
        let in_flight = guard.as_ref()?;
        in_flight.abort.cancel();
        Some(in_flight.started_at.elapsed())
    }

    /// Clears the in-flight marker.
    pub fn reset_event_time(&self) {
        self.set_in_flight(None);
    }

    /// Whether the runtime can be restarted in place.
    pub fn supports_restart(&self) -> bool {
        self.runtime.supports_restart()
    }

    /// Restarts the runtime once no event is running on it.
    pub async fn restart(&self) -> Result<(), RuntimeError> {
        if !self.runtime.supports_restart() {
            return Err(RuntimeError::RestartUnsupported);
        }
        let _gate = self.gate.lock().await;
        self.runtime.restart().await
    }

    /// Forwards a drain signal to the runtime.
    pub async fn drain(&self) -> Result<(), RuntimeError> {
        self.runtime.drain().await
    }

    /// Forwards a continue signal to the runtime.
    pub async fn continue_processing(&self) -> Result<(), RuntimeError> {
        self.runtime.continue_processing().await
    }

    /// Forwards a termination signal to the runtime and remembers it was sent.
    pub async fn terminate(&self) -> Result<(), RuntimeError> {
        self.termination_signaled.store(true, Ordering::Release);
        self.runtime.terminate().await
    }

    /// True once [`terminate`](Self::terminate) has been called and not reset since.
    pub fn is_termination_signaled(&self) -> bool {
        self.termination_signaled.load(Ordering::Acquire)
    }

    /// Forgets a previous termination signal.
    pub fn reset_termination_state(&self) {
        self.termination_signaled.store(false, Ordering::Release);
    }

    /// Routes control messages of `kind` to `queue`.
    pub async fn subscribe_to_control_message_kind(
        &self,
        kind: ControlMessageKind,
        queue: ControlMessageQueue,
    ) -> Result<(), RuntimeError> {
        self.runtime
            .subscribe_to_control_message_kind(kind, queue)
            .await
    }

    /// Stops routing control messages of `kind` to `queue`.
    pub async fn unsubscribe_from_control_message_kind(
        &self,
        kind: ControlMessageKind,
        queue: &ControlMessageQueue,
    ) -> Result<(), RuntimeError> {
        self.runtime
            .unsubscribe_from_control_message_kind(kind, queue)
            .await
    }

    /// Marks the worker as handed out. Returns false if it already was.
    pub(crate) fn check_out(&self) -> bool {
        !self.checked_out.swap(true, Ordering::AcqRel)
    }

    /// Marks the worker as returned. Returns false if it was not handed out.
    pub(crate) fn check_in(&self) -> bool {
        self.checked_out.swap(false, Ordering::AcqRel)
    }

    fn set_in_flight(&self, value: Option<InFlight>) {
        *self.lock_in_flight() = value;
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("busy", &self.is_busy())
            .field("checked_out", &self.checked_out.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::worker::RuntimeFn;

    fn echo() -> Arc<dyn Runtime> {
        RuntimeFn::arc(|ev: Event| async move {
            Ok::<_, ProcessError>(Response::text(String::from_utf8_lossy(&ev.body).into_owned()))
        })
    }

    fn sleepy(d: Duration) -> Arc<dyn Runtime> {
        RuntimeFn::arc(move |_ev: Event| async move {
            tokio::time::sleep(d).await;
            Ok::<_, ProcessError>(Response::default())
        })
    }

    #[tokio::test]
    async fn marker_is_cleared_after_the_event() {
        let w = Worker::new(0, echo());
        let resp = w.process_event(&Event::new("x")).await.unwrap().unwrap();
        assert_eq!(resp.body, b"x");
        assert!(w.event_start_time().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn marker_is_visible_while_running() {
        let w = Arc::new(Worker::new(0, sleepy(Duration::from_secs(5))));
        let running = {
            let w = Arc::clone(&w);
            tokio::spawn(async move { w.process_event(&Event::new("x")).await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(w.event_elapsed(), Some(Duration::from_secs(2)));

        running.await.unwrap().unwrap().unwrap();
        assert!(!w.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_ends_the_event_with_a_definitive_outcome() {
        let w = Arc::new(Worker::new(3, sleepy(Duration::from_secs(3600))));
        let running = {
            let w = Arc::clone(&w);
            tokio::spawn(async move { w.process_event(&Event::new("x")).await })
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(w.abort_event(), Some(Duration::from_secs(10)));

        let err = running.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            SubmitError::EventAborted {
                elapsed: Duration::from_secs(10)
            }
        );
        assert!(!w.is_busy());
        assert_eq!(w.abort_event(), None);
    }

    #[test]
    fn check_out_is_exclusive() {
        let w = Worker::new(0, echo());
        assert!(w.check_out());
        assert!(!w.check_out());
        assert!(w.check_in());
        assert!(!w.check_in());
    }

    struct Restartable {
        restarts: AtomicUsize,
    }

    #[async_trait]
    impl Runtime for Restartable {
        async fn process_event(&self, _event: &Event) -> Result<Response, ProcessError> {
            Ok(Response::default())
        }

        fn supports_restart(&self) -> bool {
            true
        }

        async fn restart(&self) -> Result<(), RuntimeError> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn restart_is_forwarded_only_when_supported() {
        let plain = Worker::new(0, echo());
        assert_eq!(plain.restart().await, Err(RuntimeError::RestartUnsupported));

        let rt = Arc::new(Restartable {
            restarts: AtomicUsize::new(0),
        });
        let w = Worker::new(1, rt.clone());
        w.restart().await.unwrap();
        assert_eq!(rt.restarts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn termination_state_can_be_reset() {
        let w = Worker::new(0, echo());
        w.terminate().await.unwrap();
        assert!(w.is_termination_signaled());
        w.reset_termination_state();
        assert!(!w.is_termination_signaled());
    }
}
