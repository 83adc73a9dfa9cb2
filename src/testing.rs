//! Test doubles shared by the watcher and processor tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::allocator::{Allocator, FixedPool};
use crate::core::Process;
use crate::error::{ProcessError, RuntimeError, TriggerError};
use crate::event::{Event, Response};
use crate::notices::{Bus, Notice, NoticeKind};
use crate::trigger::{
    Checkpoint, RestartQueue, TimeoutOutcome, Trigger, TriggerBase, TriggerConfig,
    TriggerStatisticsSnapshot,
};
use crate::worker::{Runtime, Worker};

/// Runtime driven by the event body: `sleep:<ms>` sleeps, anything else echoes.
pub(crate) struct ScriptedRuntime {
    restartable: bool,
    pub(crate) restarts: AtomicUsize,
}

impl ScriptedRuntime {
    pub(crate) fn new(restartable: bool) -> Arc<Self> {
        Arc::new(Self {
            restartable,
            restarts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Runtime for ScriptedRuntime {
    async fn process_event(&self, event: &Event) -> Result<Response, ProcessError> {
        let body = String::from_utf8_lossy(&event.body).into_owned();
        if let Some(ms) = body.strip_prefix("sleep:") {
            let ms: u64 = ms.parse().map_err(|_| ProcessError::new("bad sleep"))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        Ok(Response::text(body))
    }

    fn supports_restart(&self) -> bool {
        self.restartable
    }

    async fn restart(&self) -> Result<(), RuntimeError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn pool_of(runtimes: &[Arc<ScriptedRuntime>]) -> Arc<dyn Allocator> {
    let workers = runtimes
        .iter()
        .enumerate()
        .map(|(i, rt)| Arc::new(Worker::new(i, rt.clone() as Arc<dyn Runtime>)))
        .collect();
    match FixedPool::new(workers) {
        Ok(pool) => Arc::new(pool),
        Err(e) => panic!("test pool: {e}"),
    }
}

/// Trigger that records lifecycle calls and delegates dispatch to its base.
pub(crate) struct RecordingTrigger {
    pub(crate) base: TriggerBase,
    pub(crate) starts: Mutex<Vec<Option<Checkpoint>>>,
    pub(crate) stops: Mutex<Vec<bool>>,
    pub(crate) already_responded: AtomicBool,
    pub(crate) fail_start: AtomicBool,
}

impl RecordingTrigger {
    pub(crate) fn new(id: &str, allocator: Arc<dyn Allocator>) -> Arc<Self> {
        Self::with(id, allocator, None, None)
    }

    pub(crate) fn with(
        id: &str,
        allocator: Arc<dyn Allocator>,
        bus: Option<Bus>,
        restart_queue: Option<RestartQueue>,
    ) -> Arc<Self> {
        let mut builder = TriggerBase::builder(TriggerConfig::new(id, "test"), allocator);
        if let Some(bus) = bus {
            builder = builder.with_bus(bus);
        }
        if let Some(queue) = restart_queue {
            builder = builder.with_restart_queue(queue);
        }
        let base = match builder.build() {
            Ok(base) => base,
            Err(e) => panic!("test trigger: {e}"),
        };
        Arc::new(Self {
            base,
            starts: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            already_responded: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
        })
    }

    pub(crate) fn stops(&self) -> Vec<bool> {
        self.stops.lock().unwrap().clone()
    }

    pub(crate) fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    /// Dispatches `body` in the background.
    pub(crate) fn submit(
        self: &Arc<Self>,
        body: &str,
    ) -> tokio::task::JoinHandle<crate::worker::Submission> {
        let this = Arc::clone(self);
        let event = Event::new(body);
        tokio::spawn(async move {
            this.base
                .allocate_worker_and_submit_event(event, None, Duration::from_secs(60))
                .await
        })
    }
}

#[async_trait]
impl Trigger for RecordingTrigger {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn kind(&self) -> &str {
        self.base.kind()
    }

    async fn start(&self, checkpoint: Option<Checkpoint>) -> Result<(), TriggerError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TriggerError::Start {
                error: "port in use".to_string(),
            });
        }
        self.starts.lock().unwrap().push(checkpoint);
        Ok(())
    }

    async fn stop(&self, force: bool) -> Result<Option<Checkpoint>, TriggerError> {
        self.stops.lock().unwrap().push(force);
        Ok(Some(format!("{}@{}", self.id(), self.stops.lock().unwrap().len())))
    }

    fn workers(&self) -> &[Arc<Worker>] {
        self.base.workers()
    }

    fn timeout_worker(&self, worker: &Worker) -> TimeoutOutcome {
        if self.already_responded.load(Ordering::SeqCst) {
            return TimeoutOutcome::AlreadyResponded;
        }
        self.base.timeout_worker(worker)
    }

    fn config(&self) -> &TriggerConfig {
        self.base.config()
    }

    fn statistics(&self) -> TriggerStatisticsSnapshot {
        self.base.statistics()
    }
}

/// Process that only records stop requests.
pub(crate) struct RecordingProcess {
    triggers: Vec<Arc<dyn Trigger>>,
    pub(crate) stops: AtomicUsize,
    pub(crate) stopped: Notify,
}

impl RecordingProcess {
    pub(crate) fn new(triggers: Vec<Arc<dyn Trigger>>) -> Arc<Self> {
        Arc::new(Self {
            triggers,
            stops: AtomicUsize::new(0),
            stopped: Notify::new(),
        })
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Process for RecordingProcess {
    fn triggers(&self) -> Vec<Arc<dyn Trigger>> {
        self.triggers.clone()
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.notify_one();
    }
}

/// Every notice currently buffered in `rx`.
pub(crate) fn drain_notices(rx: &mut tokio::sync::broadcast::Receiver<Notice>) -> Vec<NoticeKind> {
    let mut kinds = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        kinds.push(notice.kind);
    }
    kinds
}
