//! Scripted in-memory provider for unit tests.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::config::{CodecConfiguration, PublishEndpoint};
use crate::models::device::{DeviceDescriptor, FrameInfo, StreamConfiguration};
use crate::models::error::{EnumerationError, GrabError, OpenError, PublishError, RecordingError};
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::device_connection::DeviceConnection;

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    releases: AtomicUsize,
    grabs: AtomicUsize,
    recordings_started: AtomicUsize,
    recordings_stopped: AtomicUsize,
    publishing_started: AtomicUsize,
}

/// Read-only view of what happened to one mock device.
#[derive(Clone)]
pub struct MockProbe(Arc<Counters>);

impl MockProbe {
    pub fn connects(&self) -> usize {
        self.0.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.0.releases.load(Ordering::SeqCst)
    }

    pub fn grabs(&self) -> usize {
        self.0.grabs.load(Ordering::SeqCst)
    }

    pub fn recordings_started(&self) -> usize {
        self.0.recordings_started.load(Ordering::SeqCst)
    }

    pub fn recordings_stopped(&self) -> usize {
        self.0.recordings_stopped.load(Ordering::SeqCst)
    }

    pub fn publishing_started(&self) -> usize {
        self.0.publishing_started.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct MockDevice {
    id: String,
    open_error: Option<OpenError>,
    recording_error: Option<RecordingError>,
    publishing: bool,
    script: VecDeque<Result<(), GrabError>>,
    steady: Option<GrabError>,
    frame_delay: Duration,
}

impl MockDevice {
    /// A device that delivers a frame every millisecond.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            open_error: None,
            recording_error: None,
            publishing: true,
            script: VecDeque::new(),
            steady: None,
            frame_delay: Duration::from_millis(1),
        }
    }

    pub fn with_open_error(mut self, error: OpenError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn with_recording_error(mut self, error: RecordingError) -> Self {
        self.recording_error = Some(error);
        self
    }

    pub fn without_publishing(mut self) -> Self {
        self.publishing = false;
        self
    }

    /// Results returned, in order, before the steady behaviour.
    pub fn with_script(mut self, script: Vec<Result<(), GrabError>>) -> Self {
        self.script = script.into();
        self
    }

    /// Deliver `frames` frames, then report `Disconnected` forever.
    pub fn disconnect_after(mut self, frames: usize) -> Self {
        self.script = std::iter::repeat(Ok(())).take(frames).collect();
        self.steady = Some(GrabError::Disconnected);
        self
    }

    /// Time each grab takes; a delay beyond the grab timeout yields `Timeout`.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }
}

pub struct MockConnection {
    device: MockDevice,
    stream: StreamConfiguration,
    counters: Arc<Counters>,
    sequence: u64,
    recording: Option<File>,
}

impl DeviceConnection for MockConnection {
    fn negotiated(&self) -> StreamConfiguration {
        self.stream
    }

    fn grab(&mut self, timeout: Duration) -> Result<FrameInfo, GrabError> {
        self.counters.grabs.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.device.frame_delay.min(timeout));
        if self.device.frame_delay > timeout {
            return Err(GrabError::Timeout);
        }

        let result = match self.device.script.pop_front() {
            Some(result) => result,
            None => self.device.steady.map_or(Ok(()), Err),
        };
        result?;

        self.sequence += 1;
        if let Some(file) = self.recording.as_mut() {
            let _ = file.write_all(&self.sequence.to_le_bytes());
        }
        Ok(FrameInfo {
            sequence: self.sequence,
            timestamp_us: self.sequence * 1000,
        })
    }

    fn start_recording(&mut self, target: &Path, _codec: &CodecConfiguration) -> Result<(), RecordingError> {
        if let Some(error) = self.device.recording_error.clone() {
            return Err(error);
        }
        let file = File::create(target).map_err(|e| RecordingError::Setup(e.to_string()))?;
        self.recording = Some(file);
        self.counters.recordings_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_recording(&mut self) {
        if let Some(mut file) = self.recording.take() {
            let _ = file.flush();
        }
        self.counters.recordings_stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn start_publishing(&mut self, _endpoint: &PublishEndpoint) -> Result<(), PublishError> {
        if !self.device.publishing {
            return Err(PublishError::NotSupported);
        }
        self.counters.publishing_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockProvider {
    devices: Vec<MockDevice>,
    counters: HashMap<String, Arc<Counters>>,
    enumeration_error: Option<EnumerationError>,
}

impl MockProvider {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        let counters = devices
            .iter()
            .map(|d| (d.id.clone(), Arc::new(Counters::default())))
            .collect();
        Self {
            devices,
            counters,
            enumeration_error: None,
        }
    }

    pub fn with_enumeration_error(mut self, error: EnumerationError) -> Self {
        self.enumeration_error = Some(error);
        self
    }

    pub fn probe(&self, id: &str) -> MockProbe {
        MockProbe(Arc::clone(&self.counters[id]))
    }
}

impl CaptureProvider for MockProvider {
    type Connection = MockConnection;

    fn name(&self) -> &str {
        "mock"
    }

    fn list_devices(&self, _probe_timeout: Duration) -> Result<Vec<DeviceDescriptor>, EnumerationError> {
        if let Some(error) = self.enumeration_error.clone() {
            return Err(error);
        }
        Ok(self
            .devices
            .iter()
            .map(|d| DeviceDescriptor::new(&d.id, format!("ZED {}", d.id), StreamConfiguration::default()))
            .collect())
    }

    fn connect(
        &self,
        descriptor: &DeviceDescriptor,
        stream: &StreamConfiguration,
    ) -> Result<MockConnection, OpenError> {
        let device = self
            .devices
            .iter()
            .find(|d| d.id == descriptor.id)
            .ok_or_else(|| OpenError::DeviceUnreachable(descriptor.id.clone()))?;
        let counters = Arc::clone(&self.counters[&device.id]);
        counters.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = device.open_error.clone() {
            return Err(error);
        }
        Ok(MockConnection {
            device: device.clone(),
            stream: *stream,
            counters,
            sequence: 0,
            recording: None,
        })
    }
}
