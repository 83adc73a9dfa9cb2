//! # Control messages exchanged between user code and its event source.
//!
//! Stream sources need to hear back from user code out of band, for example to
//! commit an offset once a message is acknowledged, or to learn that a worker
//! finished draining. Workers forward such messages to every queue subscribed
//! to the message's kind.

use std::collections::HashMap;

use tokio::sync::mpsc;

/// Kind of a control message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlMessageKind {
    /// User code explicitly acknowledged a stream message.
    StreamMessageAck,
    /// A worker finished draining.
    DrainDone,
}

impl ControlMessageKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMessageKind::StreamMessageAck => "streamMessageAck",
            ControlMessageKind::DrainDone => "drainDone",
        }
    }
}

/// A control message with free-form attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlMessage {
    /// Message kind.
    pub kind: ControlMessageKind,
    /// Attributes (partition, offset, topic, ...).
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ControlMessage {
    /// Creates a message without attributes.
    pub fn new(kind: ControlMessageKind) -> Self {
        Self {
            kind,
            attributes: HashMap::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Queue a subscriber receives control messages on.
pub type ControlMessageQueue = mpsc::UnboundedSender<ControlMessage>;

/// Per-kind set of subscribed queues.
///
/// Runtimes that emit control messages can embed this to keep track of their subscribers.
#[derive(Default, Debug)]
pub struct ControlMessageBroker {
    queues: std::sync::Mutex<HashMap<ControlMessageKind, Vec<ControlMessageQueue>>>,
}

impl ControlMessageBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `queue` to the subscribers of `kind`.
    pub fn subscribe(&self, kind: ControlMessageKind, queue: ControlMessageQueue) {
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        queues.entry(kind).or_default().push(queue);
    }

    /// Removes `queue` from the subscribers of `kind`.
    pub fn unsubscribe(&self, kind: ControlMessageKind, queue: &ControlMessageQueue) {
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(list) = queues.get_mut(&kind) {
            list.retain(|q| !q.same_channel(queue));
        }
    }

    /// Delivers `message` to every queue subscribed to its kind.
    ///
    /// Returns the number of queues that accepted it; closed queues are dropped.
    pub fn send(&self, message: &ControlMessage) -> usize {
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        let Some(list) = queues.get_mut(&message.kind) else {
            return 0;
        };
        list.retain(|q| q.send(message.clone()).is_ok());
        list.len()
    }
}
