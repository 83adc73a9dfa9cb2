//! # LogWriter: renders notices through `tracing`.
//!
//! A subscriber that turns every [`Notice`] into one `tracing` record under the
//! `eventvisor::notice` target. Levels follow how much attention a notice needs:
//!
//! ```text
//! [error] graceful-shutdown-started trigger=http worker=3
//! [error] submit-panicked trigger=http worker=1 reason="boom"
//! [warn]  worker-timed-out trigger=http worker=3 elapsed_ms=31000 timeout_ms=30000
//! [warn]  worker-abandoned trigger=kafka worker=0 elapsed_ms=45000
//! [info]  trigger-restarted trigger=kafka
//! [debug] subscriber-overflow trigger=metrics reason="full"
//! ```

use async_trait::async_trait;

use crate::notices::{Notice, NoticeKind};
use crate::subscribers::Subscribe;

/// Notice writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Stable kebab-case name of a notice kind.
pub(crate) fn kind_name(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::SubmitPanicked => "submit-panicked",
        NoticeKind::WorkerTimedOut => "worker-timed-out",
        NoticeKind::WorkerRestarted => "worker-restarted",
        NoticeKind::WorkerRestartFailed => "worker-restart-failed",
        NoticeKind::GracefulShutdownStarted => "graceful-shutdown-started",
        NoticeKind::WorkerAbandoned => "worker-abandoned",
        NoticeKind::AllDrainedWithin => "all-drained-within",
        NoticeKind::DrainDeadlineExceeded => "drain-deadline-exceeded",
        NoticeKind::StopRequested => "stop-requested",
        NoticeKind::TriggerStarted => "trigger-started",
        NoticeKind::TriggerStopped => "trigger-stopped",
        NoticeKind::TriggerStopFailed => "trigger-stop-failed",
        NoticeKind::RestartRequested => "restart-requested",
        NoticeKind::TriggerRestarted => "trigger-restarted",
        NoticeKind::TriggerRestartFailed => "trigger-restart-failed",
        NoticeKind::SubscriberPanicked => "subscriber-panicked",
        NoticeKind::SubscriberOverflow => "subscriber-overflow",
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_notice(&self, n: &Notice) {
        let kind = kind_name(n.kind);
        let trigger = n.trigger.as_deref().unwrap_or("-");
        let reason = n.reason.as_deref().unwrap_or("");

        match n.kind {
            NoticeKind::SubmitPanicked
            | NoticeKind::GracefulShutdownStarted
            | NoticeKind::DrainDeadlineExceeded
            | NoticeKind::TriggerStopFailed
            | NoticeKind::TriggerRestartFailed
            | NoticeKind::SubscriberPanicked => {
                tracing::error!(
                    target: "eventvisor::notice",
                    kind,
                    trigger,
                    worker = ?n.worker,
                    timeout_ms = ?n.timeout_ms,
                    reason,
                    "[{kind}]"
                );
            }
            NoticeKind::WorkerTimedOut
            | NoticeKind::WorkerAbandoned
            | NoticeKind::WorkerRestartFailed => {
                tracing::warn!(
                    target: "eventvisor::notice",
                    kind,
                    trigger,
                    worker = ?n.worker,
                    elapsed_ms = ?n.elapsed_ms,
                    timeout_ms = ?n.timeout_ms,
                    reason,
                    "[{kind}]"
                );
            }
            NoticeKind::SubscriberOverflow => {
                tracing::debug!(target: "eventvisor::notice", kind, trigger, reason, "[{kind}]");
            }
            _ => {
                tracing::info!(
                    target: "eventvisor::notice",
                    kind,
                    trigger,
                    worker = ?n.worker,
                    "[{kind}]"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_distinct() {
        let kinds = [
            NoticeKind::SubmitPanicked,
            NoticeKind::WorkerTimedOut,
            NoticeKind::WorkerRestarted,
            NoticeKind::WorkerRestartFailed,
            NoticeKind::GracefulShutdownStarted,
            NoticeKind::WorkerAbandoned,
            NoticeKind::AllDrainedWithin,
            NoticeKind::DrainDeadlineExceeded,
            NoticeKind::StopRequested,
            NoticeKind::TriggerStarted,
            NoticeKind::TriggerStopped,
            NoticeKind::TriggerStopFailed,
            NoticeKind::RestartRequested,
            NoticeKind::TriggerRestarted,
            NoticeKind::TriggerRestartFailed,
            NoticeKind::SubscriberPanicked,
            NoticeKind::SubscriberOverflow,
        ];
        let mut names: Vec<_> = kinds.iter().map(|k| kind_name(*k)).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), kinds.len());
    }

    #[tokio::test]
    async fn renders_under_an_env_filter() {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("eventvisor::notice=debug"))
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let writer = LogWriter::new();
        writer
            .on_notice(
                &Notice::new(NoticeKind::DrainDeadlineExceeded)
                    .with_timeout(std::time::Duration::from_secs(10))
                    .with_reason("workers still busy: [2]"),
            )
            .await;
        writer
            .on_notice(&Notice::subscriber_overflow("metrics", "full"))
            .await;
    }

    #[tokio::test]
    async fn writes_without_a_subscriber_installed() {
        LogWriter::new()
            .on_notice(&Notice::new(NoticeKind::WorkerTimedOut).with_worker(1))
            .await;
    }
}
