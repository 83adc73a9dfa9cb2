//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for plugging custom notice handlers into
//! the processor. Each subscriber is fed by its own route in the
//! [`NoticeRouter`](crate::NoticeRouter): a bounded queue, a delivery task and a
//! [`NoticeScope`] picking the notices it cares about.
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching, retries); they do **not** block
//!   the publisher nor other subscribers.
//! - Each subscriber **declares** its preferred queue capacity via
//!   [`Subscribe::queue_capacity`]. If a queue overflows, notices for that
//!   subscriber are **dropped**.
//! - A subscriber only receives notices inside its [`Subscribe::scope`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::notices::{Notice, NoticeKind};

/// Contract for notice subscribers.
///
/// Called from a subscriber-dedicated delivery task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single notice for this subscriber.
    async fn on_notice(&self, notice: &Notice);

    /// Human-readable name (for logs/metrics).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }

    /// Notices this subscriber wants. Read once, when the processor starts.
    fn scope(&self) -> NoticeScope {
        NoticeScope::all()
    }
}

/// Which notices reach a subscriber.
///
/// Both filters must accept. A notice that names no trigger passes the trigger
/// filter, so scoped subscribers still see processor-wide notices.
///
/// ```
/// use eventvisor::{NoticeKind, NoticeScope};
///
/// let scope = NoticeScope::all()
///     .triggers(["http"])
///     .kinds([NoticeKind::WorkerTimedOut, NoticeKind::WorkerAbandoned]);
/// # let _ = scope;
/// ```
#[derive(Clone, Debug, Default)]
pub struct NoticeScope {
    triggers: Option<Vec<Arc<str>>>,
    kinds: Option<Vec<NoticeKind>>,
}

impl NoticeScope {
    /// Every notice.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only notices about the given triggers (or about no trigger at all).
    pub fn triggers<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.triggers = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Only notices of the given kinds.
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = NoticeKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// True when `notice` falls inside this scope.
    pub fn matches(&self, notice: &Notice) -> bool {
        let kind_ok = self
            .kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&notice.kind));
        let trigger_ok = match (&self.triggers, &notice.trigger) {
            (Some(ids), Some(trigger)) => ids.iter().any(|id| id == trigger),
            _ => true,
        };
        kind_ok && trigger_ok
    }
}
