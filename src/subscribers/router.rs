//! # NoticeRouter: per-subscriber delivery of bus notices.
//!
//! The processor's listener hands every bus notice to [`NoticeRouter::route`].
//! Each subscriber owns a route: its [`NoticeScope`], a bounded queue and a
//! delivery task.
//!
//! ```text
//! route(notice)
//!   for each route:
//!     ├─ about this subscriber itself (its own overflow/panic)? skip
//!     ├─ outside the subscriber's scope? skip
//!     └─ try_send ──ok──► delivery task ──► on_notice()
//!            │                                 └─ panic → SubscriberPanicked
//!            └─ full/closed ──► dropped += 1
//!                               first drop since the last delivery → SubscriberOverflow
//! ```
//!
//! Notices reach one subscriber in publish order. Nothing orders delivery across
//! subscribers. A notice is cloned at most once, and only if some route takes it.
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if a subscriber panics while holding a lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::panic_message;
use crate::notices::{Bus, Notice, NoticeKind};
use crate::subscribers::{NoticeScope, Subscribe};

struct Route {
    name: &'static str,
    scope: NoticeScope,
    sender: mpsc::Sender<Arc<Notice>>,
    delivery: JoinHandle<()>,
    queued: AtomicU64,
    dropped: AtomicU64,
    overflowing: AtomicBool,
}

/// Delivery totals of one subscriber, reported at shutdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteStats {
    /// Subscriber name.
    pub name: &'static str,
    /// Notices accepted into the subscriber's queue.
    pub queued: u64,
    /// Notices dropped because the queue was full or closed.
    pub dropped: u64,
}

/// Routes bus notices to subscribers.
pub struct NoticeRouter {
    routes: Vec<Route>,
    bus: Bus,
}

impl NoticeRouter {
    /// Builds one route per subscriber and spawns its delivery task.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let routes = subs
            .into_iter()
            .map(|sub| {
                let (sender, rx) = mpsc::channel(sub.queue_capacity().max(1));
                Route {
                    name: sub.name(),
                    scope: sub.scope(),
                    sender,
                    queued: AtomicU64::new(0),
                    dropped: AtomicU64::new(0),
                    overflowing: AtomicBool::new(false),
                    delivery: tokio::spawn(deliver(sub, rx, bus.clone())),
                }
            })
            .collect();
        Self { routes, bus }
    }

    /// Queues `notice` for every subscriber whose scope accepts it. Never blocks.
    pub fn route(&self, notice: &Notice) {
        let mut shared: Option<Arc<Notice>> = None;

        for route in &self.routes {
            if is_about(notice, route.name) || !route.scope.matches(notice) {
                continue;
            }
            let item = Arc::clone(shared.get_or_insert_with(|| Arc::new(notice.clone())));
            match route.sender.try_send(item) {
                Ok(()) => {
                    route.queued.fetch_add(1, Ordering::Relaxed);
                    route.overflowing.store(false, Ordering::Relaxed);
                }
                Err(err) => {
                    route.dropped.fetch_add(1, Ordering::Relaxed);
                    let reason = match err {
                        mpsc::error::TrySendError::Full(_) => "full",
                        mpsc::error::TrySendError::Closed(_) => "closed",
                    };
                    if !route.overflowing.swap(true, Ordering::Relaxed) {
                        self.bus
                            .publish(Notice::subscriber_overflow(route.name, reason));
                    }
                }
            }
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Closes every queue, waits for the delivery tasks to drain them and
    /// returns the per-subscriber totals.
    pub async fn shutdown(self) -> Vec<RouteStats> {
        let mut stats = Vec::with_capacity(self.routes.len());
        for route in self.routes {
            drop(route.sender);
            let _ = route.delivery.await;
            stats.push(RouteStats {
                name: route.name,
                queued: route.queued.into_inner(),
                dropped: route.dropped.into_inner(),
            });
        }
        stats
    }
}

/// Subscriber notices name the subscriber in their trigger field.
fn is_about(notice: &Notice, subscriber: &str) -> bool {
    matches!(
        notice.kind,
        NoticeKind::SubscriberOverflow | NoticeKind::SubscriberPanicked
    ) && notice.trigger.as_deref() == Some(subscriber)
}

async fn deliver(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Notice>>, bus: Bus) {
    while let Some(notice) = rx.recv().await {
        let fut = sub.on_notice(notice.as_ref());
        if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            bus.publish(Notice::subscriber_panicked(
                sub.name(),
                panic_message(&*panic),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    struct Recorder {
        name: &'static str,
        scope: NoticeScope,
        capacity: usize,
        seen: Mutex<Vec<Notice>>,
    }

    impl Recorder {
        fn new(name: &'static str) -> Arc<Self> {
            Self::scoped(name, NoticeScope::all())
        }

        fn scoped(name: &'static str, scope: NoticeScope) -> Arc<Self> {
            Arc::new(Self {
                name,
                scope,
                capacity: 64,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn with_capacity(name: &'static str, capacity: usize) -> Arc<Self> {
            Arc::new(Self {
                name,
                scope: NoticeScope::all(),
                capacity,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn kinds(&self) -> Vec<NoticeKind> {
            self.seen.lock().unwrap().iter().map(|n| n.kind).collect()
        }

        fn triggers(&self) -> Vec<Option<String>> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|n| n.trigger.as_deref().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_notice(&self, notice: &Notice) {
            self.seen.lock().unwrap().push(notice.clone());
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn queue_capacity(&self) -> usize {
            self.capacity
        }

        fn scope(&self) -> NoticeScope {
            self.scope.clone()
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_notice(&self, _notice: &Notice) {
            panic!("boom");
        }

        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    fn overflow_count(rx: &mut tokio::sync::broadcast::Receiver<Notice>) -> usize {
        let mut count = 0;
        while let Ok(notice) = rx.try_recv() {
            if notice.kind == NoticeKind::SubscriberOverflow {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn every_subscriber_sees_notices_in_order() {
        let rec = Recorder::new("recorder");
        let router = NoticeRouter::new(vec![rec.clone() as Arc<dyn Subscribe>], Bus::new(16));
        assert_eq!(router.len(), 1);

        router.route(&Notice::new(NoticeKind::TriggerStarted));
        router.route(&Notice::new(NoticeKind::TriggerStopped));
        let stats = router.shutdown().await;

        assert_eq!(
            rec.kinds(),
            vec![NoticeKind::TriggerStarted, NoticeKind::TriggerStopped]
        );
        assert_eq!(
            stats,
            vec![RouteStats {
                name: "recorder",
                queued: 2,
                dropped: 0
            }]
        );
    }

    #[tokio::test]
    async fn scoped_subscribers_only_see_their_triggers() {
        let http = Recorder::scoped("http-alerts", NoticeScope::all().triggers(["http"]));
        let all = Recorder::new("everything");
        let router = NoticeRouter::new(
            vec![http.clone() as Arc<dyn Subscribe>, all.clone()],
            Bus::new(16),
        );

        router.route(&Notice::new(NoticeKind::WorkerTimedOut).with_trigger("http"));
        router.route(&Notice::new(NoticeKind::WorkerTimedOut).with_trigger("kafka"));
        router.route(&Notice::new(NoticeKind::StopRequested));
        let stats = router.shutdown().await;

        assert_eq!(http.triggers(), vec![Some("http".to_string()), None]);
        assert_eq!(all.kinds().len(), 3);
        assert_eq!(stats[0].queued, 2);
        assert_eq!(stats[1].queued, 3);
    }

    #[tokio::test]
    async fn subscribers_do_not_receive_notices_about_themselves() {
        let slow = Recorder::new("slow");
        let other = Recorder::new("other");
        let router = NoticeRouter::new(
            vec![slow.clone() as Arc<dyn Subscribe>, other.clone()],
            Bus::new(16),
        );

        router.route(&Notice::subscriber_overflow("slow", "full"));
        router.shutdown().await;

        assert!(slow.kinds().is_empty());
        assert_eq!(other.triggers(), vec![Some("slow".to_string())]);
    }

    #[tokio::test]
    async fn overflow_is_reported_once_per_streak() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let rec = Recorder::with_capacity("tiny", 1);
        let router = NoticeRouter::new(vec![rec.clone() as Arc<dyn Subscribe>], bus);

        // The delivery task has not run yet, so only the first notice fits.
        for _ in 0..3 {
            router.route(&Notice::new(NoticeKind::TriggerStarted));
        }
        assert_eq!(overflow_count(&mut rx), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        router.route(&Notice::new(NoticeKind::TriggerStopped));
        router.route(&Notice::new(NoticeKind::TriggerStopped));
        assert_eq!(overflow_count(&mut rx), 1);

        let stats = router.shutdown().await;
        assert_eq!(stats[0].queued, 2);
        assert_eq!(stats[0].dropped, 3);
        assert_eq!(
            rec.kinds(),
            vec![NoticeKind::TriggerStarted, NoticeKind::TriggerStopped]
        );
    }

    #[tokio::test]
    async fn panics_are_reported_on_the_bus() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let rec = Recorder::new("recorder");
        let router = NoticeRouter::new(
            vec![Arc::new(Panicky) as Arc<dyn Subscribe>, rec.clone()],
            bus,
        );

        router.route(&Notice::new(NoticeKind::StopRequested));
        let notice = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.kind, NoticeKind::SubscriberPanicked);
        assert_eq!(notice.trigger.as_deref(), Some("panicky"));
        assert_eq!(notice.reason.as_deref(), Some("boom"));

        router.shutdown().await;
        assert_eq!(rec.kinds(), vec![NoticeKind::StopRequested]);
    }
}
