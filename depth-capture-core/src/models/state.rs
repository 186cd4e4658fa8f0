use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection state of a `DeviceHandle`.
///
/// ```text
/// closed → open ⇄ recording
///            ↓        ↓
///          closed ← closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Closed,
    Open,
    Recording,
}

/// Capture worker state machine.
///
/// State transitions:
/// ```text
/// idle → recording → draining → stopped
///   ↓                   ↑
///   └───────────────────┘   (setup failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Recording,
    Draining,
    Stopped,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Why a worker stopped before the external stop signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum WorkerFailure {
    RecordingSetup(String),
    PublishingSetup(String),
    Disconnected { consecutive_misses: u32 },
    Panicked(String),
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordingSetup(msg) => write!(f, "recording setup failed: {}", msg),
            Self::PublishingSetup(msg) => write!(f, "publishing setup failed: {}", msg),
            Self::Disconnected { consecutive_misses } => {
                write!(f, "disconnected ({} consecutive misses)", consecutive_misses)
            }
            Self::Panicked(msg) => write!(f, "worker panicked: {}", msg),
        }
    }
}

/// Final status of a stopped worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "failure", rename_all = "lowercase")]
pub enum WorkerStatus {
    Completed,
    Fatal(WorkerFailure),
}

impl WorkerStatus {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Fatal(failure) => write!(f, "fatal: {}", failure),
        }
    }
}

/// What ended a capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Operator interrupt (Ctrl+C).
    Interrupt,
    /// The configured maximum duration elapsed.
    DurationElapsed,
    /// Every worker stopped on its own.
    WorkersFinished,
    /// Stop requested programmatically.
    Requested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Interrupt => "interrupted",
            Self::DurationElapsed => "duration elapsed",
            Self::WorkersFinished => "all workers finished",
            Self::Requested => "stop requested",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_status_serializes_with_reason() {
        let status = WorkerStatus::Fatal(WorkerFailure::Disconnected {
            consecutive_misses: 30,
        });
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "fatal");
        assert_eq!(json["failure"]["kind"], "disconnected");
        assert_eq!(json["failure"]["detail"]["consecutive_misses"], 30);
        assert_eq!(status.to_string(), "fatal: disconnected (30 consecutive misses)");
    }

    #[test]
    fn completed_is_not_fatal() {
        assert!(!WorkerStatus::Completed.is_fatal());
        assert!(WorkerState::Stopped.is_terminal());
        assert!(!WorkerState::Draining.is_terminal());
    }
}
