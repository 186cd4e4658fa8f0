use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use depth_capture_core::models::config::{CodecConfiguration, PublishEndpoint};
use depth_capture_core::models::device::{FrameInfo, StreamConfiguration};
use depth_capture_core::models::error::{GrabError, PublishError, RecordingError};
use depth_capture_core::traits::device_connection::DeviceConnection;

use crate::container::ContainerWriter;
use crate::provider::SimulatedDeviceSpec;

/// How long a grab on an unplugged device takes to report it.
const DISCONNECT_LATENCY: Duration = Duration::from_millis(2);

/// One open simulated device.
///
/// Frames arrive at the negotiated frame rate. The device script decides
/// when the device drops frames or disappears.
pub struct SimulatedConnection {
    spec: SimulatedDeviceSpec,
    stream: StreamConfiguration,
    frame_interval: Duration,
    opened_at: Instant,
    next_frame: Instant,
    sequence: u64,
    grabs: u64,
    recorder: Option<ContainerWriter>,
    publishing: Option<PublishEndpoint>,
    claimed: Arc<Mutex<HashSet<String>>>,
    released: bool,
}

impl SimulatedConnection {
    pub(crate) fn new(
        spec: SimulatedDeviceSpec,
        stream: StreamConfiguration,
        claimed: Arc<Mutex<HashSet<String>>>,
    ) -> Self {
        let frame_interval = Duration::from_secs(1) / stream.fps.max(1);
        let opened_at = Instant::now();
        Self {
            spec,
            stream,
            frame_interval,
            opened_at,
            next_frame: opened_at + frame_interval,
            sequence: 0,
            grabs: 0,
            recorder: None,
            publishing: None,
            claimed,
            released: false,
        }
    }

    pub fn serial(&self) -> &str {
        &self.spec.serial
    }

    pub fn frames_delivered(&self) -> u64 {
        self.sequence
    }

    pub fn publishing_endpoint(&self) -> Option<&PublishEndpoint> {
        self.publishing.as_ref()
    }

    fn unplugged(&self) -> bool {
        self.released
            || self
                .spec
                .disconnect_after
                .is_some_and(|frames| self.sequence >= frames)
    }

    fn drops_this_grab(&self) -> bool {
        self.spec.miss_every.is_some_and(|n| n > 0 && self.grabs % n == 0)
    }

    /// Sleep until the next frame is due, or `timeout`, whichever is first.
    /// Returns whether a frame became available.
    fn wait_for_frame(&mut self, timeout: Duration) -> bool {
        let now = Instant::now();
        if self.next_frame > now {
            let wait = self.next_frame - now;
            if wait > timeout {
                thread::sleep(timeout);
                return false;
            }
            thread::sleep(wait);
        }

        self.next_frame += self.frame_interval;
        // A slow consumer skips frames instead of bursting through a backlog.
        let now = Instant::now();
        if self.next_frame < now {
            self.next_frame = now + self.frame_interval;
        }
        true
    }
}

impl DeviceConnection for SimulatedConnection {
    fn negotiated(&self) -> StreamConfiguration {
        self.stream
    }

    fn grab(&mut self, timeout: Duration) -> Result<FrameInfo, GrabError> {
        self.grabs += 1;

        if self.unplugged() {
            thread::sleep(DISCONNECT_LATENCY.min(timeout));
            return Err(GrabError::Disconnected);
        }
        if self.drops_this_grab() {
            thread::sleep(timeout);
            return Err(GrabError::Timeout);
        }
        if !self.wait_for_frame(timeout) {
            return Err(GrabError::Timeout);
        }

        self.sequence += 1;
        let frame = FrameInfo {
            sequence: self.sequence,
            timestamp_us: self.opened_at.elapsed().as_micros() as u64,
        };

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.write_frame(&frame) {
                log::warn!("{}: failed to write frame {}: {}", self.spec.serial, frame.sequence, e);
            }
        }
        Ok(frame)
    }

    fn start_recording(&mut self, target: &Path, codec: &CodecConfiguration) -> Result<(), RecordingError> {
        if self.spec.fail_recording {
            return Err(RecordingError::Setup(format!(
                "{}: recording module unavailable",
                self.spec.serial
            )));
        }
        let writer = ContainerWriter::create(target, &self.stream, codec)
            .map_err(|e| RecordingError::Setup(format!("{}: {}", target.display(), e)))?;
        self.recorder = Some(writer);
        Ok(())
    }

    fn stop_recording(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            match recorder.finish() {
                Ok(frames) => log::debug!(
                    "{}: finalized {} ({} frames)",
                    self.spec.serial,
                    recorder.file_path().display(),
                    frames
                ),
                Err(e) => log::warn!(
                    "{}: failed to finalize {}: {}",
                    self.spec.serial,
                    recorder.file_path().display(),
                    e
                ),
            }
        }
    }

    fn start_publishing(&mut self, endpoint: &PublishEndpoint) -> Result<(), PublishError> {
        if !self.spec.publishing {
            return Err(PublishError::NotSupported);
        }
        self.publishing = Some(endpoint.clone());
        Ok(())
    }

    fn stop_publishing(&mut self) {
        self.publishing = None;
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.stop_recording();
        self.stop_publishing();
        self.claimed.lock().remove(&self.spec.serial);
        self.released = true;
    }
}

impl Drop for SimulatedConnection {
    fn drop(&mut self) {
        self.release();
    }
}
