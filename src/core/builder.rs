use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::processor::Processor;
use crate::{
    config::Config,
    notices::Bus,
    subscribers::Subscribe,
    trigger::{RestartQueue, RestartRequest, Trigger},
};

/// Builder for constructing a [`Processor`].
///
/// The notice bus and the restart queue exist as soon as the builder does, so
/// triggers can be wired to them before they are handed over:
///
/// ```rust
/// use std::sync::Arc;
/// use eventvisor::{
///     Allocator, Config, Event, FixedPool, ProcessError, Processor, Response, Runtime, RuntimeFn,
///     TriggerBase, TriggerConfig,
/// };
///
/// let pool = FixedPool::with_runtimes(2, |_| {
///     let rt: Arc<dyn Runtime> =
///         RuntimeFn::arc(|_ev: Event| async { Ok::<_, ProcessError>(Response::text("ok")) });
///     Ok(rt)
/// })
/// .unwrap();
/// let pool: Arc<dyn Allocator> = Arc::new(pool);
///
/// let builder = Processor::builder(Config::default());
/// let base = TriggerBase::builder(TriggerConfig::new("http", "http"), pool)
///     .with_bus(builder.bus())
///     .with_restart_queue(builder.restart_queue())
///     .build()
///     .unwrap();
/// assert_eq!(base.id(), "http");
/// /// ```
pub struct ProcessorBuilder {
    cfg: Config,
    bus: Bus,
    restart_tx: RestartQueue,
    restart_rx: mpsc::UnboundedReceiver<RestartRequest>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    triggers: Vec<Arc<dyn Trigger>>,
    handle_signals: bool,
}

impl ProcessorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            bus,
            restart_tx,
            restart_rx,
            subscribers: Vec::new(),
            triggers: Vec::new(),
            handle_signals: true,
        }
    }

    /// The bus the processor and its watcher publish to.
    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    /// A sender triggers post restart requests to.
    pub fn restart_queue(&self) -> RestartQueue {
        self.restart_tx.clone()
    }

    /// Sets notice subscribers.
    ///
    /// Subscribers receive runtime notices through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds a trigger.
    pub fn with_trigger(mut self, trigger: Arc<dyn Trigger>) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Whether `run` stops on SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere). On by default.
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Builds the processor. Nothing runs until [`Processor::run`].
    pub fn build(self) -> Arc<Processor> {
        Arc::new(Processor {
            cfg: self.cfg,
            bus: self.bus,
            triggers: self.triggers,
            subscribers: Mutex::new(self.subscribers),
            restart_rx: Mutex::new(Some(self.restart_rx)),
            _restart_tx: self.restart_tx,
            stop_token: CancellationToken::new(),
            running: AtomicBool::new(false),
            handle_signals: self.handle_signals,
        })
    }
}
