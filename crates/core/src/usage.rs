use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::provider::ProviderKind;

/// Outcome of one adapter attempt, handed to analytics and then discarded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UsageLogEntry {
    pub provider: ProviderKind,
    pub success: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl UsageLogEntry {
    pub fn success(provider: ProviderKind, elapsed: Duration) -> Self {
        Self {
            provider,
            success: true,
            elapsed_ms: elapsed.as_millis() as u64,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(provider: ProviderKind, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            provider,
            success: false,
            elapsed_ms: elapsed.as_millis() as u64,
            error: Some(error.into()),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
#[error("usage sink failed: {0}")]
pub struct UsageSinkError(pub String);

/// Where usage entries end up. Runs on the observer task, never on the
/// request path.
pub trait UsageSink: Send + Sync {
    fn consume(&self, entry: UsageLogEntry) -> Result<(), UsageSinkError>;
}

/// Emits one structured `analytics.provider_usage` event per entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn consume(&self, entry: UsageLogEntry) -> Result<(), UsageSinkError> {
        info!(
            event_name = "analytics.provider_usage",
            provider = %entry.provider,
            success = entry.success,
            elapsed_ms = entry.elapsed_ms,
            error = entry.error.as_deref().unwrap_or(""),
            recorded_at = %entry.recorded_at.to_rfc3339(),
            "provider usage recorded"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUsageSink {
    entries: Arc<Mutex<Vec<UsageLogEntry>>>,
}

impl InMemoryUsageSink {
    pub fn entries(&self) -> Vec<UsageLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl UsageSink for InMemoryUsageSink {
    fn consume(&self, entry: UsageLogEntry) -> Result<(), UsageSinkError> {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
        Ok(())
    }
}

/// Fire-and-forget front of the usage queue.
///
/// `record` never awaits: a full or closed queue drops the entry.
#[derive(Clone, Debug)]
pub struct UsageRecorder {
    sender: Option<mpsc::Sender<UsageLogEntry>>,
}

impl UsageRecorder {
    /// Starts the observer task. It ends once every recorder clone is dropped
    /// and the queue is drained.
    pub fn spawn(sink: Arc<dyn UsageSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<UsageLogEntry>(capacity.max(1));

        let observer = tokio::spawn(async move {
            while let Some(entry) = receiver.recv().await {
                let provider = entry.provider;
                if let Err(error) = sink.consume(entry) {
                    warn!(
                        event_name = "chatgate.usage.sink_failed",
                        provider = %provider,
                        error = %error,
                        "usage entry dropped by sink"
                    );
                }
            }
            debug!(event_name = "chatgate.usage.observer_stopped", "usage observer drained");
        });

        (Self { sender: Some(sender) }, observer)
    }

    /// A recorder that discards everything.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn record(&self, entry: UsageLogEntry) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(error) = sender.try_send(entry) {
            debug!(
                event_name = "chatgate.usage.dropped",
                reason = match error {
                    mpsc::error::TrySendError::Full(_) => "queue_full",
                    mpsc::error::TrySendError::Closed(_) => "observer_closed",
                },
                "usage entry dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{
        InMemoryUsageSink, UsageLogEntry, UsageRecorder, UsageSink, UsageSinkError,
    };
    use crate::provider::ProviderKind;

    struct FailingSink;

    impl UsageSink for FailingSink {
        fn consume(&self, _entry: UsageLogEntry) -> Result<(), UsageSinkError> {
            Err(UsageSinkError("analytics endpoint unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn entries_reach_the_sink_in_order() {
        let sink = InMemoryUsageSink::default();
        let (recorder, observer) = UsageRecorder::spawn(Arc::new(sink.clone()), 16);

        recorder.record(UsageLogEntry::failure(
            ProviderKind::Claude,
            Duration::from_millis(12),
            "Claude API key not configured",
        ));
        recorder.record(UsageLogEntry::success(ProviderKind::OpenAi, Duration::from_millis(840)));
        drop(recorder);
        observer.await.expect("observer should finish cleanly");

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].provider, ProviderKind::Claude);
        assert!(!entries[0].success);
        assert_eq!(entries[0].error.as_deref(), Some("Claude API key not configured"));
        assert_eq!(entries[1].provider, ProviderKind::OpenAi);
        assert!(entries[1].success);
        assert_eq!(entries[1].elapsed_ms, 840);
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        let (recorder, observer) = UsageRecorder::spawn(Arc::new(FailingSink), 4);

        recorder.record(UsageLogEntry::success(ProviderKind::Gemini, Duration::from_millis(5)));
        recorder.record(UsageLogEntry::success(ProviderKind::Gemini, Duration::from_millis(6)));
        drop(recorder);

        observer.await.expect("observer must survive sink errors");
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let sink = InMemoryUsageSink::default();
        let (recorder, observer) = UsageRecorder::spawn(Arc::new(sink.clone()), 1);

        // Current-thread runtime: the observer cannot run until we yield.
        for _ in 0..10 {
            recorder.record(UsageLogEntry::success(ProviderKind::Claude, Duration::ZERO));
        }
        drop(recorder);
        observer.await.expect("observer should finish cleanly");

        assert_eq!(sink.entries().len(), 1);
    }

    #[test]
    fn disabled_recorder_is_a_no_op() {
        let recorder = UsageRecorder::disabled();
        recorder.record(UsageLogEntry::success(ProviderKind::Claude, Duration::ZERO));
    }
}
