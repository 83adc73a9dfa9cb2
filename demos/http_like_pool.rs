//! # Example: http_like_pool
//!
//! A request/response trigger served by a shared pool of four workers.
//!
//! Shows how to:
//! - Build a [`FixedPool`] from a handler closure.
//! - Wrap a [`TriggerBase`] in a [`Trigger`] implementation.
//! - Run it under a [`Processor`] with the built-in [`LogWriter`] and a
//!   subscriber scoped to this trigger.
//! - Map every [`Submission`] to a status code the way an HTTP source would.
//!
//! ## Flow
//! ```text
//! clients (20 requests) ──► TriggerBase::allocate_worker_and_submit_event
//!                               ├─ FixedPool: wait for a free worker (bounded)
//!                               ├─ Runtime: /slow sleeps, /fail errors, else echoes
//!                               └─ Submission ──► status code
//! Processor::run() ── notices ──► LogWriter, StatusBoard
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example http_like_pool
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eventvisor::{
    Allocator, Checkpoint, Config, Event, FixedPool, LogWriter, Notice, NoticeKind, NoticeScope,
    ProcessError, Processor, Response, Runtime, RuntimeFn, Submission, Subscribe, TimeoutOutcome,
    Trigger, TriggerBase, TriggerConfig, TriggerError, TriggerStatisticsSnapshot, Worker,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const REQUESTS: usize = 20;

/// Serves a fixed burst of simulated requests.
struct HttpLikeTrigger {
    base: Arc<TriggerBase>,
    clients: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    done: Arc<tokio::sync::Notify>,
}

impl HttpLikeTrigger {
    fn new(base: TriggerBase) -> Self {
        Self {
            base: Arc::new(base),
            clients: Mutex::new(None),
            done: Arc::new(tokio::sync::Notify::new()),
        }
    }
}

fn status_of(outcome: &Submission) -> u16 {
    match outcome {
        Ok(Ok(response)) => response.status_code,
        Ok(Err(err)) => err.status_code.unwrap_or(500),
        Err(err) if err.is_backpressure() => 503,
        Err(_) => 500,
    }
}

#[async_trait]
impl Trigger for HttpLikeTrigger {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn kind(&self) -> &str {
        self.base.kind()
    }

    async fn start(&self, _checkpoint: Option<Checkpoint>) -> Result<(), TriggerError> {
        let token = CancellationToken::new();
        let base = Arc::clone(&self.base);
        let done = Arc::clone(&self.done);
        let stop = token.clone();

        let clients = tokio::spawn(async move {
            let requests = (0..REQUESTS).map(|i| {
                let base = Arc::clone(&base);
                let path = match i % 5 {
                    0 => "/slow",
                    3 => "/fail",
                    _ => "/echo",
                };
                async move {
                    let event = Event::new(format!("request {i}")).with_request("GET", path);
                    let timeout = base.config().worker_availability_timeout;
                    let outcome = base.allocate_worker_and_submit_event(event, None, timeout).await;
                    tracing::info!(request = i, path, status = status_of(&outcome), "served");
                }
            });
            tokio::select! {
                _ = futures::future::join_all(requests) => done.notify_one(),
                _ = stop.cancelled() => {}
            }
        });

        *self.clients.lock().unwrap_or_else(|p| p.into_inner()) = Some((token, clients));
        Ok(())
    }

    async fn stop(&self, _force: bool) -> Result<Option<Checkpoint>, TriggerError> {
        let clients = self.clients.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some((token, handle)) = clients {
            token.cancel();
            let _ = handle.await;
        }
        Ok(None)
    }

    fn workers(&self) -> &[Arc<Worker>] {
        self.base.workers()
    }

    fn timeout_worker(&self, worker: &Worker) -> TimeoutOutcome {
        self.base.timeout_worker(worker)
    }

    fn config(&self) -> &TriggerConfig {
        self.base.config()
    }

    fn statistics(&self) -> TriggerStatisticsSnapshot {
        self.base.statistics()
    }
}

/// Counts lifecycle notices about the `http` trigger.
#[derive(Default)]
struct StatusBoard {
    seen: Mutex<Vec<NoticeKind>>,
}

#[async_trait]
impl Subscribe for StatusBoard {
    async fn on_notice(&self, notice: &Notice) {
        self.seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notice.kind);
    }

    fn name(&self) -> &'static str {
        "status_board"
    }

    fn scope(&self) -> NoticeScope {
        NoticeScope::all().triggers(["http"])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let pool = FixedPool::with_runtimes(4, |_| {
        let rt: Arc<dyn Runtime> = RuntimeFn::arc(|event: Event| async move {
            match event.path.as_deref() {
                Some("/slow") => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(Response::text("finally"))
                }
                Some("/fail") => Err(ProcessError::new("bad request").with_status(400)),
                _ => Ok(Response::text(String::from_utf8_lossy(&event.body))),
            }
        });
        Ok(rt)
    })?;
    let pool: Arc<dyn Allocator> = Arc::new(pool);

    let cfg = Config {
        event_timeout: Duration::from_secs(5),
        ..Config::default()
    };
    let builder = Processor::builder(cfg).with_signal_handling(false);

    let base = TriggerBase::builder(
        TriggerConfig::new("http", "http")
            .with_max_workers(4)
            .with_worker_availability_timeout(Duration::from_secs(1)),
        pool,
    )
    .require_shareable()
    .with_bus(builder.bus())
    .with_restart_queue(builder.restart_queue())
    .build()?;
    let trigger = Arc::new(HttpLikeTrigger::new(base));
    let done = Arc::clone(&trigger.done);

    let board = Arc::new(StatusBoard::default());
    let processor = builder
        .with_subscribers(vec![Arc::new(LogWriter::new()) as Arc<dyn Subscribe>, board.clone()])
        .with_trigger(trigger)
        .build();

    let running = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.run().await })
    };

    done.notified().await;
    processor.request_stop();
    running.await??;

    for (id, stats) in processor.statistics() {
        println!(
            "{id}: {} succeeded, {} failed",
            stats.events_handled_success_total, stats.events_handled_failure_total
        );
    }
    println!(
        "notices about http: {:?}",
        board.seen.lock().unwrap_or_else(|p| p.into_inner())
    );
    Ok(())
}
