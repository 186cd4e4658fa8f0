use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::{StopReason, WorkerStatus};

/// Counters and outcome of one worker, read out after join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    pub device_id: String,
    pub device_name: String,
    pub output_target: Option<PathBuf>,
    pub publish_port: Option<u16>,
    pub frames_captured: u64,
    pub frames_missed: u64,
    pub status: WorkerStatus,
}

impl DeviceReport {
    /// Every grab attempt the worker made.
    pub fn grab_attempts(&self) -> u64 {
        self.frames_captured + self.frames_missed
    }
}

/// A device excluded from the run because it could not be opened or started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenFailure {
    pub device_id: String,
    pub reason: String,
}

/// Outcome of a whole run. Always contains every worker that ran,
/// including ones that captured nothing or stopped with a fatal status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stop_reason: Option<StopReason>,
    pub devices: Vec<DeviceReport>,
    pub open_failures: Vec<OpenFailure>,
}

impl AggregateReport {
    pub fn total_captured(&self) -> u64 {
        self.devices.iter().map(|d| d.frames_captured).sum()
    }

    pub fn total_missed(&self) -> u64 {
        self.devices.iter().map(|d| d.frames_missed).sum()
    }

    pub fn fatal_count(&self) -> usize {
        self.devices.iter().filter(|d| d.status.is_fatal()).count()
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceReport> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        writeln!(f, "Run {} ({:.1}s)", self.run_id, elapsed)?;
        if let Some(reason) = self.stop_reason {
            writeln!(f, "Stopped: {}", reason)?;
        }
        for device in &self.devices {
            writeln!(
                f,
                "  {} has {}/{} missed frames [{}]",
                device.device_name, device.frames_missed, device.frames_captured, device.status
            )?;
            if let Some(target) = &device.output_target {
                writeln!(f, "      recording: {}", target.display())?;
            }
            if let Some(port) = device.publish_port {
                writeln!(f, "      publishing on port {}", port)?;
            }
        }
        for failure in &self.open_failures {
            writeln!(f, "  {} excluded: {}", failure.device_id, failure.reason)?;
        }
        write!(
            f,
            "Total: {} captured, {} missed across {} device(s)",
            self.total_captured(),
            self.total_missed(),
            self.devices.len()
        )
    }
}
