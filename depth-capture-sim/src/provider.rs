use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depth_capture_core::models::device::{DeviceDescriptor, Resolution, StreamConfiguration};
use depth_capture_core::models::error::{EnumerationError, OpenError};
use depth_capture_core::traits::capture_provider::CaptureProvider;

use crate::device::SimulatedConnection;

const DEFAULT_MODEL: &str = "ZED X";
const FIRST_SERIAL: u64 = 41_000_001;

/// Scripted behaviour of one simulated camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedDeviceSpec {
    pub serial: String,
    pub model: String,
    /// Listed by enumeration but fails to open.
    pub unreachable: bool,
    /// Deliver this many frames, then report `Disconnected` forever.
    pub disconnect_after: Option<u64>,
    /// Every n-th grab times out.
    pub miss_every: Option<u64>,
    /// Refuse to start a recording.
    pub fail_recording: bool,
    pub publishing: bool,
}

impl SimulatedDeviceSpec {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            ..Default::default()
        }
    }

    fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor::new(
            &self.serial,
            format!("{} {}", self.model, self.serial),
            StreamConfiguration::default(),
        )
    }
}

impl Default for SimulatedDeviceSpec {
    fn default() -> Self {
        Self {
            serial: String::new(),
            model: DEFAULT_MODEL.into(),
            unreachable: false,
            disconnect_after: None,
            miss_every: None,
            fail_recording: false,
            publishing: true,
        }
    }
}

/// A set of simulated cameras, as loaded from a rig file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedRig {
    pub devices: Vec<SimulatedDeviceSpec>,
}

#[derive(Debug, Error)]
pub enum RigError {
    #[error("failed to read rig file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rig file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rig file {0} has a device without a serial")]
    MissingSerial(String),

    #[error("serial {0} appears more than once")]
    DuplicateSerial(String),
}

impl SimulatedRig {
    pub fn from_json_file(path: &Path) -> Result<Self, RigError> {
        let display = path.display().to_string();
        let json = fs::read_to_string(path).map_err(|source| RigError::Io {
            path: display.clone(),
            source,
        })?;
        let rig: SimulatedRig = serde_json::from_str(&json).map_err(|source| RigError::Parse {
            path: display.clone(),
            source,
        })?;

        let mut seen = HashSet::new();
        for device in &rig.devices {
            if device.serial.is_empty() {
                return Err(RigError::MissingSerial(display));
            }
            if !seen.insert(device.serial.as_str()) {
                return Err(RigError::DuplicateSerial(device.serial.clone()));
            }
        }
        Ok(rig)
    }
}

/// Capture backend backed by simulated cameras.
///
/// Clones share the same device lock table, so a clone kept by the caller
/// can observe what a running session still holds.
#[derive(Clone)]
pub struct SimulatedProvider {
    devices: Arc<Vec<SimulatedDeviceSpec>>,
    claimed: Arc<Mutex<HashSet<String>>>,
    probe_delay: Duration,
}

impl SimulatedProvider {
    pub fn new(devices: Vec<SimulatedDeviceSpec>) -> Self {
        Self {
            devices: Arc::new(devices),
            claimed: Arc::new(Mutex::new(HashSet::new())),
            probe_delay: Duration::ZERO,
        }
    }

    /// `count` healthy cameras with consecutive serials.
    pub fn with_count(count: usize) -> Self {
        Self::new(
            (0..count as u64)
                .map(|i| SimulatedDeviceSpec::new((FIRST_SERIAL + i).to_string()))
                .collect(),
        )
    }

    pub fn from_rig(rig: SimulatedRig) -> Self {
        Self::new(rig.devices)
    }

    /// Time a probe of the bus takes.
    pub fn with_probe_delay(mut self, probe_delay: Duration) -> Self {
        self.probe_delay = probe_delay;
        self
    }

    pub fn devices(&self) -> &[SimulatedDeviceSpec] {
        &self.devices
    }

    /// Serials with a live connection.
    pub fn claimed(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.claimed.lock().iter().cloned().collect();
        serials.sort();
        serials
    }
}

/// Highest frame rate each resolution supports.
pub fn max_fps(resolution: Resolution) -> u32 {
    match resolution {
        Resolution::Hd2k => 15,
        Resolution::Hd1080 => 30,
        Resolution::Hd720 => 60,
        Resolution::Vga => 100,
    }
}

impl CaptureProvider for SimulatedProvider {
    type Connection = SimulatedConnection;

    fn name(&self) -> &str {
        "simulated"
    }

    fn list_devices(&self, probe_timeout: Duration) -> Result<Vec<DeviceDescriptor>, EnumerationError> {
        if self.probe_delay > probe_timeout {
            thread::sleep(probe_timeout);
            return Err(EnumerationError::ProbeTimeout);
        }
        thread::sleep(self.probe_delay);
        Ok(self.devices.iter().map(SimulatedDeviceSpec::descriptor).collect())
    }

    fn connect(
        &self,
        descriptor: &DeviceDescriptor,
        stream: &StreamConfiguration,
    ) -> Result<SimulatedConnection, OpenError> {
        let spec = self
            .devices
            .iter()
            .find(|d| d.serial == descriptor.id)
            .ok_or_else(|| OpenError::DeviceUnreachable(descriptor.id.clone()))?;

        if spec.unreachable {
            return Err(OpenError::DeviceUnreachable(format!("{}: camera not detected", spec.serial)));
        }
        if stream.fps == 0 || stream.fps > max_fps(stream.resolution) {
            return Err(OpenError::UnsupportedConfiguration(format!(
                "{} supports at most {} fps",
                stream.resolution,
                max_fps(stream.resolution)
            )));
        }

        // Another process (or a leaked connection) holding the camera.
        if !self.claimed.lock().insert(spec.serial.clone()) {
            return Err(OpenError::DeviceUnreachable(format!("{}: camera in use", spec.serial)));
        }

        log::debug!("{}: connected ({})", spec.serial, stream);
        Ok(SimulatedConnection::new(spec.clone(), *stream, Arc::clone(&self.claimed)))
    }
}
