use std::path::Path;
use std::time::Duration;

use crate::models::config::{CodecConfiguration, PublishEndpoint};
use crate::models::device::{FrameInfo, StreamConfiguration};
use crate::models::error::{GrabError, PublishError, RecordingError};

/// Raw capability surface of one open device connection.
///
/// Callers go through `DeviceHandle`, which enforces ordering,
/// idempotency and destination checks; implementations only talk to
/// the hardware.
pub trait DeviceConnection: Send {
    /// Stream configuration the device actually negotiated.
    fn negotiated(&self) -> StreamConfiguration;

    /// Wait at most `timeout` for the next frame.
    fn grab(&mut self, timeout: Duration) -> Result<FrameInfo, GrabError>;

    /// Begin writing grabbed frames to `target`.
    fn start_recording(&mut self, target: &Path, codec: &CodecConfiguration) -> Result<(), RecordingError>;

    /// Finalize the recording container.
    fn stop_recording(&mut self);

    fn start_publishing(&mut self, _endpoint: &PublishEndpoint) -> Result<(), PublishError> {
        Err(PublishError::NotSupported)
    }

    fn stop_publishing(&mut self) {}

    /// Release the device. Called exactly once by the owning handle.
    fn release(&mut self);
}
