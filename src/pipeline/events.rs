//! Progress events emitted while a run executes, and the sink abstraction
//! consumers attach through. Events are serde-tagged so they can go over a
//! wire or into a log verbatim.

use crate::roster::{BuildStatus, RosterSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One stage inside a single student's processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    Cloning,
    Verifying,
    Installing,
    Building,
    Testing,
    Evaluating,
    Grading,
}

impl std::fmt::Display for ProcessingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Cloning => "Cloning repository",
            Self::Verifying => "Verifying project",
            Self::Installing => "Installing dependencies",
            Self::Building => "Building project",
            Self::Testing => "Running functional tests",
            Self::Evaluating => "Evaluating requirements",
            Self::Grading => "Calculating grade",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted {
        total: usize,
        batch_count: usize,
    },
    BatchStarted {
        batch_index: usize,
        batch_count: usize,
        size: usize,
    },
    StudentStarted {
        index: usize,
        name: String,
    },
    StudentStep {
        index: usize,
        name: String,
        step: ProcessingStep,
    },
    StudentCompleted {
        index: usize,
        name: String,
        status: BuildStatus,
        grade: u32,
    },
    BatchCleanup {
        batch_index: usize,
        released: usize,
        failed: usize,
    },
    RunStopped {
        processed: usize,
        total: usize,
    },
    RunCompleted {
        summary: RosterSummary,
    },
}

/// Where progress events go. Implementations must not block; the pipeline
/// emits from its hot path.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Forwards events over an unbounded channel; send failures mean the
/// consumer went away and are ignored.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Discards everything. For headless runs and tests.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = ProgressEvent::StudentCompleted {
            index: 3,
            name: "Ada".to_string(),
            status: BuildStatus::Success,
            grade: 95,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"student_completed""#));
        assert!(json.contains(r#""grade":95"#));

        let back: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ProgressEvent::StudentCompleted { index: 3, .. }));
    }

    #[test]
    fn test_step_labels_are_human_readable() {
        assert_eq!(ProcessingStep::Cloning.to_string(), "Cloning repository");
        assert_eq!(
            ProcessingStep::Testing.to_string(),
            "Running functional tests"
        );
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_and_tolerates_closed_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.emit(ProgressEvent::RunStarted {
            total: 2,
            batch_count: 1,
        });
        assert!(matches!(
            rx.recv().await,
            Some(ProgressEvent::RunStarted { total: 2, .. })
        ));

        drop(rx);
        // Must not panic once the consumer is gone.
        sink.emit(ProgressEvent::RunStopped {
            processed: 1,
            total: 2,
        });
    }
}
