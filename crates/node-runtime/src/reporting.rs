//! The error-reporting channel: failures that must not propagate are
//! logged, counted and published as [`NodeEvent::Error`].

use std::fmt::Display;
use std::sync::Arc;

use shared_bus::{ErrorReport, EventPublisher, EventSource, InMemoryEventBus, NodeEvent};
use tracing::error;

use crate::metrics::ReconcilerMetrics;

#[derive(Clone)]
pub struct ErrorReporter {
    bus: Arc<InMemoryEventBus>,
    metrics: Arc<ReconcilerMetrics>,
}

impl ErrorReporter {
    pub fn new(bus: Arc<InMemoryEventBus>, metrics: Arc<ReconcilerMetrics>) -> Self {
        Self { bus, metrics }
    }

    pub async fn report(&self, source: EventSource, context: &str, err: &(dyn Display + Sync)) {
        let message = err.to_string();
        error!(?source, context, error = %message, "[node] Error reported");
        self.metrics.record_error_report(source);
        self.bus
            .publish(NodeEvent::Error(ErrorReport::new(source, context, message)))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventFilter, EventTopic};

    #[tokio::test]
    async fn test_report_reaches_error_topic() {
        let bus = Arc::new(InMemoryEventBus::new());
        let metrics = Arc::new(ReconcilerMetrics::new());
        let reporter = ErrorReporter::new(bus.clone(), metrics.clone());
        let mut errors = bus.subscribe(EventFilter::topics(vec![EventTopic::Errors]));

        reporter.report(EventSource::Chain, "connect", &"disk full").await;

        match errors.recv().await.unwrap() {
            NodeEvent::Error(report) => {
                assert_eq!(report.source, EventSource::Chain);
                assert_eq!(report.context, "connect");
                assert_eq!(report.message, "disk full");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(metrics.snapshot().errors_reported, 1);
    }

    #[test]
    fn test_report_can_run_on_spawned_tasks() {
        fn assert_send<T: Send>(_: &T) {}

        let bus = Arc::new(InMemoryEventBus::new());
        let reporter = ErrorReporter::new(bus, Arc::new(ReconcilerMetrics::new()));
        let err = crate::error::NodeError::ReconcilerStopped;
        let report = reporter.report(EventSource::Reconciler, "connect", &err);
        assert_send(&report);
    }
}
