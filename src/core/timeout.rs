//! # EventTimeoutWatcher: detects workers stuck on one event.
//!
//! ```text
//! loop {
//!   sleep(timeout)                        (cancellable)
//!   for every trigger, for every worker   (concurrently, joined per tick)
//!     elapsed = now - event start         (skip idle workers)
//!     elapsed <= timeout ─► nothing
//!     elapsed >  timeout ─► trigger.timeout_worker(worker)
//!        ├─ AlreadyResponded         ─► nothing
//!        ├─ worker supports restart  ─► worker.restart()  (failure logged)
//!        └─ otherwise                ─► graceful shutdown
//! }
//!
//! graceful shutdown (first escalation only):
//!   1. mark shutting down, cancel the watch loop
//!   2. stop(false) every other trigger, collect their busy workers
//!      (the offending worker excluded)
//!   3. every poll interval drop workers that went idle or ran past the
//!      timeout (abandoned), until none is left or the deadline passes
//!   4. process.stop()
//! ```
//!
//! No lock is held across a sleep; each tick reads worker state through
//! short-lived accessors only.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::Process;
use crate::notices::{Bus, Notice, NoticeKind};
use crate::trigger::{TimeoutOutcome, Trigger};
use crate::worker::Worker;

/// Periodic supervisor of in-flight events.
pub struct EventTimeoutWatcher {
    timeout: Duration,
    poll_interval: Duration,
    deadline: Duration,
    shutting_down: AtomicBool,
    token: CancellationToken,
    bus: Option<Bus>,
}

impl EventTimeoutWatcher {
    /// Creates a watcher that times out events running longer than `timeout`.
    ///
    /// Uses the default shutdown poll interval and deadline factor of [`Config`].
    pub fn new(timeout: Duration) -> Self {
        let cfg = Config {
            event_timeout: timeout,
            ..Config::default()
        };
        Self::with_config(timeout, &cfg)
    }

    /// Creates the watcher configured by `cfg`, or `None` when `cfg` disables it.
    pub fn from_config(cfg: &Config) -> Option<Self> {
        cfg.event_timeout()
            .map(|timeout| Self::with_config(timeout, cfg))
    }

    fn with_config(timeout: Duration, cfg: &Config) -> Self {
        Self {
            timeout,
            poll_interval: cfg.shutdown_poll_interval,
            deadline: cfg.shutdown_deadline(timeout),
            shutting_down: AtomicBool::new(false),
            token: CancellationToken::new(),
            bus: None,
        }
    }

    /// Publishes watcher notices to `bus`.
    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The configured event timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True once a graceful shutdown has been started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stops the watch loop after the current tick.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Runs [`watch`](Self::watch) on a new task.
    pub fn spawn(self: Arc<Self>, process: Arc<dyn Process>) -> JoinHandle<()> {
        tokio::spawn(async move { self.watch(process).await })
    }

    /// Ticks every `timeout` until stopped or a graceful shutdown begins.
    pub async fn watch(&self, process: Arc<dyn Process>) {
        tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "event timeout watcher started");
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.timeout) => {}
            }
            self.tick(&process).await;
        }
        tracing::debug!("event timeout watcher stopped");
    }

    /// Inspects every worker of every trigger once.
    pub async fn tick(&self, process: &Arc<dyn Process>) {
        if self.is_shutting_down() {
            return;
        }
        let triggers = process.triggers();
        join_all(triggers.iter().map(|trigger| async move {
            join_all(
                trigger
                    .workers()
                    .iter()
                    .map(|worker| self.check_worker(process, trigger, worker)),
            )
            .await
        }))
        .await;
    }

    async fn check_worker(
        &self,
        process: &Arc<dyn Process>,
        trigger: &Arc<dyn Trigger>,
        worker: &Arc<Worker>,
    ) {
        if self.is_shutting_down() {
            return;
        }
        let Some(elapsed) = worker.event_elapsed() else {
            return;
        };
        if elapsed <= self.timeout {
            return;
        }

        tracing::warn!(
            trigger = trigger.id(),
            worker = worker.index(),
            elapsed_ms = elapsed.as_millis() as u64,
            timeout_ms = self.timeout.as_millis() as u64,
            "worker timed out"
        );
        self.notify(
            Notice::new(NoticeKind::WorkerTimedOut)
                .with_trigger(trigger.id())
                .with_worker(worker.index())
                .with_elapsed(elapsed)
                .with_timeout(self.timeout),
        );

        if trigger.timeout_worker(worker) == TimeoutOutcome::AlreadyResponded {
            tracing::debug!(trigger = trigger.id(), worker = worker.index(), "worker responded in time");
            return;
        }

        if worker.supports_restart() {
            self.restart_worker(trigger, worker).await;
            return;
        }

        self.graceful_shutdown(process, trigger, worker).await;
    }

    async fn restart_worker(&self, trigger: &Arc<dyn Trigger>, worker: &Worker) {
        match worker.restart().await {
            Ok(()) => {
                tracing::info!(trigger = trigger.id(), worker = worker.index(), "worker restarted");
                self.notify(
                    Notice::new(NoticeKind::WorkerRestarted)
                        .with_trigger(trigger.id())
                        .with_worker(worker.index()),
                );
            }
            Err(error) => {
                tracing::warn!(
                    trigger = trigger.id(),
                    worker = worker.index(),
                    error = %error,
                    "failed to restart timed out worker"
                );
                self.notify(
                    Notice::new(NoticeKind::WorkerRestartFailed)
                        .with_trigger(trigger.id())
                        .with_worker(worker.index())
                        .with_reason(error.as_message()),
                );
            }
        }
    }

    async fn graceful_shutdown(
        &self,
        process: &Arc<dyn Process>,
        trigger: &Arc<dyn Trigger>,
        offender: &Arc<Worker>,
    ) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.token.cancel();
        let started = Instant::now();

        tracing::error!(
            trigger = trigger.id(),
            worker = offender.index(),
            "timed out worker cannot be restarted, shutting down gracefully"
        );
        self.notify(
            Notice::new(NoticeKind::GracefulShutdownStarted)
                .with_trigger(trigger.id())
                .with_worker(offender.index()),
        );

        let others: Vec<Arc<dyn Trigger>> = process
            .triggers()
            .into_iter()
            .filter(|t| t.id() != trigger.id())
            .collect();
        let busy = join_all(others.iter().map(|t| self.stop_trigger(t, offender))).await;

        let mut tracked: Vec<(Arc<str>, Arc<Worker>)> = Vec::new();
        for (id, workers) in busy {
            for worker in workers {
                if !tracked.iter().any(|(_, w)| Arc::ptr_eq(w, &worker)) {
                    tracked.push((Arc::clone(&id), worker));
                }
            }
        }
        self.wait_for_in_flight(tracked, started).await;

        process.stop().await;
    }

    /// Stops `trigger` and returns its workers that still have an event in flight.
    async fn stop_trigger(
        &self,
        trigger: &Arc<dyn Trigger>,
        offender: &Arc<Worker>,
    ) -> (Arc<str>, Vec<Arc<Worker>>) {
        let id: Arc<str> = trigger.id().into();
        if let Err(error) = trigger.stop(false).await {
            tracing::warn!(trigger = %id, error = %error, "failed to stop trigger");
            self.notify(
                Notice::new(NoticeKind::TriggerStopFailed)
                    .with_trigger(Arc::clone(&id))
                    .with_reason(error.to_string()),
            );
        }

        let busy = trigger
            .workers()
            .iter()
            .filter(|w| !Arc::ptr_eq(w, offender) && w.is_busy())
            .cloned()
            .collect();
        (id, busy)
    }

    async fn wait_for_in_flight(&self, mut tracked: Vec<(Arc<str>, Arc<Worker>)>, started: Instant) {
        loop {
            tracked.retain(|(trigger, worker)| match worker.event_elapsed() {
                None => false,
                Some(elapsed) if elapsed > self.timeout => {
                    tracing::warn!(
                        trigger = %trigger,
                        worker = worker.index(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "abandoning worker still busy past the timeout"
                    );
                    self.notify(
                        Notice::new(NoticeKind::WorkerAbandoned)
                            .with_trigger(Arc::clone(trigger))
                            .with_worker(worker.index())
                            .with_elapsed(elapsed),
                    );
                    false
                }
                Some(_) => true,
            });

            if tracked.is_empty() {
                tracing::info!(
                    waited_ms = started.elapsed().as_millis() as u64,
                    "all in-flight events finished"
                );
                self.notify(Notice::new(NoticeKind::AllDrainedWithin));
                return;
            }
            if started.elapsed() >= self.deadline {
                let remaining: Vec<usize> = tracked.iter().map(|(_, w)| w.index()).collect();
                tracing::error!(
                    remaining = ?remaining,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "graceful shutdown deadline passed with events in flight"
                );
                self.notify(
                    Notice::new(NoticeKind::DrainDeadlineExceeded)
                        .with_timeout(self.deadline)
                        .with_reason(format!("workers still busy: {remaining:?}")),
                );
                return;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn notify(&self, notice: Notice) {
        if let Some(bus) = &self.bus {
            bus.publish(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubmitError;
    use crate::testing::{RecordingProcess, RecordingTrigger, ScriptedRuntime, drain_notices, pool_of};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn watcher(bus: &Bus) -> EventTimeoutWatcher {
        EventTimeoutWatcher::new(TIMEOUT).with_bus(bus.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn restartable_worker_is_restarted_in_place() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let rt = ScriptedRuntime::new(true);
        let trigger = RecordingTrigger::new("a", pool_of(&[rt.clone()]));
        let process: Arc<dyn Process> = RecordingProcess::new(vec![trigger.clone()]);
        let watcher = watcher(&bus);

        let caller = trigger.submit("sleep:600000");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        watcher.tick(&process).await;

        assert_eq!(rt.restarts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            caller.await.unwrap(),
            Err(SubmitError::EventAborted { .. })
        ));
        assert!(!watcher.is_shutting_down());
        assert!(trigger.stops().is_empty());
        assert_eq!(
            drain_notices(&mut rx),
            vec![NoticeKind::WorkerTimedOut, NoticeKind::WorkerRestarted]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn events_within_the_timeout_are_left_alone() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let trigger = RecordingTrigger::new("a", pool_of(&[ScriptedRuntime::new(false)]));
        let process: Arc<dyn Process> = RecordingProcess::new(vec![trigger.clone()]);
        let watcher = watcher(&bus);

        let caller = trigger.submit("sleep:1500");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        watcher.tick(&process).await;

        assert!(caller.await.unwrap().unwrap().is_ok());
        assert!(drain_notices(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn already_responded_worker_is_not_escalated() {
        let bus = Bus::new(64);
        let trigger = RecordingTrigger::new("a", pool_of(&[ScriptedRuntime::new(false)]));
        trigger.already_responded.store(true, Ordering::SeqCst);
        let recording = RecordingProcess::new(vec![trigger.clone()]);
        let process: Arc<dyn Process> = recording.clone();
        let watcher = watcher(&bus);

        let caller = trigger.submit("sleep:3000");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        watcher.tick(&process).await;

        assert!(!watcher.is_shutting_down());
        assert_eq!(recording.stop_count(), 0);
        assert!(caller.await.unwrap().unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_worker_escalates_to_graceful_shutdown() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let offender = RecordingTrigger::new("a", pool_of(&[ScriptedRuntime::new(false)]));
        let other = RecordingTrigger::new("b", pool_of(&[ScriptedRuntime::new(false)]));
        let recording = RecordingProcess::new(vec![offender.clone(), other.clone()]);
        let process: Arc<dyn Process> = recording.clone();
        let watcher = watcher(&bus);

        let stuck = offender.submit("sleep:600000");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let finishing = other.submit("sleep:500");
        tokio::time::sleep(Duration::from_millis(100)).await;

        watcher.tick(&process).await;

        assert!(watcher.is_shutting_down());
        assert_eq!(recording.stop_count(), 1);
        assert_eq!(other.stops(), vec![false]);
        assert!(offender.stops().is_empty());
        assert!(matches!(
            stuck.await.unwrap(),
            Err(SubmitError::EventAborted { .. })
        ));
        assert!(finishing.await.unwrap().unwrap().is_ok());
        assert_eq!(
            drain_notices(&mut rx),
            vec![
                NoticeKind::WorkerTimedOut,
                NoticeKind::GracefulShutdownStarted,
                NoticeKind::AllDrainedWithin,
            ]
        );

        // later ticks do nothing
        watcher.tick(&process).await;
        assert_eq!(recording.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn workers_busy_past_the_timeout_are_abandoned() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let offender = RecordingTrigger::new("a", pool_of(&[ScriptedRuntime::new(false)]));
        let other = RecordingTrigger::new("b", pool_of(&[ScriptedRuntime::new(false)]));
        let recording = RecordingProcess::new(vec![offender.clone(), other.clone()]);
        let process: Arc<dyn Process> = recording.clone();
        let watcher = watcher(&bus);

        let _stuck = offender.submit("sleep:600000");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let _also_stuck = other.submit("sleep:600000");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        watcher.tick(&process).await;

        assert!(started.elapsed() < TIMEOUT * 10);
        assert_eq!(recording.stop_count(), 1);
        let kinds = drain_notices(&mut rx);
        assert!(kinds.contains(&NoticeKind::WorkerAbandoned));
        assert!(!kinds.contains(&NoticeKind::DrainDeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn workers_that_never_go_idle_hit_the_drain_deadline() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let offender = RecordingTrigger::new("a", pool_of(&[ScriptedRuntime::new(false)]));
        let other = RecordingTrigger::new("b", pool_of(&[ScriptedRuntime::new(false)]));
        let recording = RecordingProcess::new(vec![offender.clone(), other.clone()]);
        let process: Arc<dyn Process> = recording.clone();
        let watcher = watcher(&bus);

        let _stuck = offender.submit("sleep:600000");
        tokio::time::sleep(Duration::from_millis(1450)).await;

        // back-to-back short events: busy at every poll, never past the timeout
        let busy = other.clone();
        let feeder = tokio::spawn(async move {
            loop {
                let _ = busy.submit("sleep:333").await;
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        watcher.tick(&process).await;

        assert!(started.elapsed() >= TIMEOUT * 10);
        assert_eq!(recording.stop_count(), 1);
        assert_eq!(
            drain_notices(&mut rx),
            vec![
                NoticeKind::WorkerTimedOut,
                NoticeKind::GracefulShutdownStarted,
                NoticeKind::DrainDeadlineExceeded,
            ]
        );
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn watch_loop_stops_the_process_on_escalation() {
        let trigger = RecordingTrigger::new("a", pool_of(&[ScriptedRuntime::new(false)]));
        let recording = RecordingProcess::new(vec![trigger.clone()]);
        let watcher = Arc::new(EventTimeoutWatcher::new(TIMEOUT));
        let handle = Arc::clone(&watcher).spawn(recording.clone());

        let _stuck = trigger.submit("sleep:600000");
        tokio::time::timeout(Duration::from_secs(10), recording.stopped.notified())
            .await
            .unwrap();
        handle.await.unwrap();
        assert_eq!(recording.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_watch_loop() {
        let recording = RecordingProcess::new(Vec::new());
        let watcher = Arc::new(EventTimeoutWatcher::new(TIMEOUT));
        let handle = Arc::clone(&watcher).spawn(recording.clone());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        watcher.stop();
        handle.await.unwrap();
        assert_eq!(recording.stop_count(), 0);
    }

    #[test]
    fn disabled_by_zero_timeout() {
        assert!(EventTimeoutWatcher::from_config(&Config::default()).is_none());
        let cfg = Config {
            event_timeout: TIMEOUT,
            ..Config::default()
        };
        let watcher = EventTimeoutWatcher::from_config(&cfg).unwrap();
        assert_eq!(watcher.deadline, TIMEOUT * 10);
    }
}
