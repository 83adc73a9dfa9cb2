//! # Processor: owns the triggers, the timeout watcher and notice delivery.
//!
//! ## Lifecycle
//! ```text
//! Processor::builder(cfg)
//!   .with_subscribers(..)      (notice consumers, e.g. LogWriter)
//!   .with_trigger(..)          (event sources wired to builder.bus() / restart_queue())
//!   .build()
//!
//! run():
//!   1. subscriber listener:  Bus.subscribe() ─► NoticeRouter::route(&Notice)
//!   2. start triggers in order ─► TriggerStarted
//!        └─ first failure: stop the started ones, return ProcessorError::Trigger
//!   3. spawn EventTimeoutWatcher (when cfg.event_timeout > 0)
//!   4. select! {
//!        OS signal           ─► StopRequested, leave loop
//!        stop() / watcher    ─► leave loop
//!        RestartRequest{id}  ─► trigger.stop(false) + trigger.start(checkpoint)
//!                                ├─ Ok  ─► TriggerRestarted
//!                                └─ Err ─► TriggerRestartFailed
//!      }
//!   5. stop watcher, stop every trigger (TriggerStopped / TriggerStopFailed),
//!      flush the listener
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::builder::ProcessorBuilder;
use super::{EventTimeoutWatcher, Process, shutdown};
use crate::{
    config::Config,
    error::{ProcessorError, TriggerError},
    notices::{Bus, Notice, NoticeKind},
    subscribers::{NoticeRouter, Subscribe},
    trigger::{RestartQueue, RestartRequest, Trigger, TriggerStatisticsSnapshot},
};

/// The owning process of a set of triggers.
pub struct Processor {
    pub(super) cfg: Config,
    pub(super) bus: Bus,
    pub(super) triggers: Vec<Arc<dyn Trigger>>,
    pub(super) subscribers: Mutex<Vec<Arc<dyn Subscribe>>>,
    pub(super) restart_rx: Mutex<Option<mpsc::UnboundedReceiver<RestartRequest>>>,
    pub(super) _restart_tx: RestartQueue,
    pub(super) stop_token: CancellationToken,
    pub(super) running: AtomicBool,
    pub(super) handle_signals: bool,
}

impl Processor {
    /// Creates a builder for a processor configured by `cfg`.
    pub fn builder(cfg: Config) -> ProcessorBuilder {
        ProcessorBuilder::new(cfg)
    }

    /// Process configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Notice bus shared with the triggers and the watcher.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Current counters of every trigger, keyed by trigger id.
    pub fn statistics(&self) -> Vec<(String, TriggerStatisticsSnapshot)> {
        self.triggers
            .iter()
            .map(|t| (t.id().to_string(), t.statistics()))
            .collect()
    }

    /// Asks a running processor to shut down. Idempotent.
    pub fn request_stop(&self) {
        self.stop_with("stop requested");
    }

    /// Runs until an OS signal, [`request_stop`](Self::request_stop) or a timeout escalation.
    ///
    /// Returns once every trigger has been stopped and all notices were handed
    /// to the subscribers.
    pub async fn run(self: &Arc<Self>) -> Result<(), ProcessorError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ProcessorError::AlreadyRunning);
        }
        let Some(mut restarts) = self
            .restart_rx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        else {
            return Err(ProcessorError::AlreadyRunning);
        };

        let listener_token = CancellationToken::new();
        let listener = self.subscriber_listener(listener_token.clone());

        if let Err(err) = self.start_triggers().await {
            listener_token.cancel();
            let _ = listener.await;
            return Err(err);
        }

        let watcher = EventTimeoutWatcher::from_config(&self.cfg).map(|w| {
            let w = Arc::new(w.with_bus(self.bus.clone()));
            let process: Arc<dyn Process> = Arc::clone(self) as Arc<dyn Process>;
            let handle = Arc::clone(&w).spawn(process);
            (w, handle)
        });

        let result = self.drive(&mut restarts).await;

        if let Some((w, handle)) = watcher {
            w.stop();
            handle.abort();
            let _ = handle.await;
        }
        join_all(self.triggers.iter().map(|t| self.stop_trigger(t))).await;
        tracing::info!("processor stopped");

        listener_token.cancel();
        let _ = listener.await;
        result
    }

    async fn drive(
        &self,
        restarts: &mut mpsc::UnboundedReceiver<RestartRequest>,
    ) -> Result<(), ProcessorError> {
        let handle_signals = self.handle_signals;
        let signal = async move {
            if handle_signals {
                shutdown::wait_for_shutdown_signal().await
            } else {
                futures::future::pending::<std::io::Result<()>>().await
            }
        };
        tokio::pin!(signal);

        loop {
            tokio::select! {
                res = &mut signal => {
                    res?;
                    self.stop_with("shutdown signal");
                    return Ok(());
                }
                _ = self.stop_token.cancelled() => return Ok(()),
                Some(request) = restarts.recv() => {
                    self.restart_trigger(&request.trigger_id).await;
                }
            }
        }
    }

    fn stop_with(&self, reason: &'static str) {
        if self.stop_token.is_cancelled() {
            return;
        }
        tracing::info!(reason, "processor stop requested");
        self.bus
            .publish(Notice::new(NoticeKind::StopRequested).with_reason(reason));
        self.stop_token.cancel();
    }

    /// Subscribes to the bus and routes notices to the subscribers until cancelled.
    ///
    /// Notices already buffered when `token` fires are still delivered.
    fn subscriber_listener(&self, token: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let subs = std::mem::take(&mut *self.subscribers.lock().unwrap_or_else(|p| p.into_inner()));
        let router = NoticeRouter::new(subs, self.bus.clone());
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(notice) => router.route(&notice),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "notice listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
            for stats in router.shutdown().await {
                if stats.dropped > 0 {
                    tracing::warn!(
                        subscriber = stats.name,
                        queued = stats.queued,
                        dropped = stats.dropped,
                        "subscriber dropped notices"
                    );
                }
            }
        })
    }

    async fn start_triggers(&self) -> Result<(), ProcessorError> {
        for (started, trigger) in self.triggers.iter().enumerate() {
            if let Err(error) = trigger.start(None).await {
                tracing::error!(trigger = trigger.id(), error = %error, "failed to start trigger");
                join_all(self.triggers[..started].iter().map(|t| self.stop_trigger(t))).await;
                return Err(ProcessorError::Trigger {
                    trigger: trigger.id().to_string(),
                    error,
                });
            }
            tracing::info!(trigger = trigger.id(), kind = trigger.kind(), "trigger started");
            self.bus
                .publish(Notice::new(NoticeKind::TriggerStarted).with_trigger(trigger.id()));
        }
        Ok(())
    }

    async fn stop_trigger(&self, trigger: &Arc<dyn Trigger>) {
        match trigger.stop(false).await {
            Ok(_) => {
                tracing::info!(trigger = trigger.id(), "trigger stopped");
                self.bus
                    .publish(Notice::new(NoticeKind::TriggerStopped).with_trigger(trigger.id()));
            }
            Err(error) => {
                tracing::warn!(trigger = trigger.id(), error = %error, "failed to stop trigger");
                self.bus.publish(
                    Notice::new(NoticeKind::TriggerStopFailed)
                        .with_trigger(trigger.id())
                        .with_reason(error.to_string()),
                );
            }
        }
    }

    async fn restart_trigger(&self, id: &str) {
        self.bus
            .publish(Notice::new(NoticeKind::RestartRequested).with_trigger(id));

        let Some(trigger) = self.triggers.iter().find(|t| t.id() == id) else {
            tracing::warn!(trigger = id, "restart requested for unknown trigger");
            self.bus.publish(
                Notice::new(NoticeKind::TriggerRestartFailed)
                    .with_trigger(id)
                    .with_reason("unknown trigger"),
            );
            return;
        };

        match cycle(trigger.as_ref()).await {
            Ok(()) => {
                tracing::info!(trigger = id, "trigger restarted");
                self.bus
                    .publish(Notice::new(NoticeKind::TriggerRestarted).with_trigger(id));
            }
            Err(error) => {
                tracing::error!(trigger = id, error = %error, "failed to restart trigger");
                self.bus.publish(
                    Notice::new(NoticeKind::TriggerRestartFailed)
                        .with_trigger(id)
                        .with_reason(error.to_string()),
                );
            }
        }
    }
}

/// Stops `trigger` and starts it again from the checkpoint it returned.
async fn cycle(trigger: &dyn Trigger) -> Result<(), TriggerError> {
    let checkpoint = trigger.stop(false).await?;
    trigger.start(checkpoint).await
}

#[async_trait]
impl Process for Processor {
    fn triggers(&self) -> Vec<Arc<dyn Trigger>> {
        self.triggers.clone()
    }

    async fn stop(&self) {
        self.request_stop();
    }
}
