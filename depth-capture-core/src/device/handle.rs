use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::registry::DeviceLease;
use crate::models::config::{CodecConfiguration, PublishEndpoint};
use crate::models::device::{DeviceDescriptor, FrameInfo, StreamConfiguration};
use crate::models::error::{GrabError, PublishError, RecordingError};
use crate::models::state::HandleState;
use crate::traits::device_connection::DeviceConnection;

/// Exclusive owner of one open device connection.
///
/// Only `DeviceRegistry::open` creates handles. Closing (explicitly or on
/// drop) stops recording and publishing, releases the connection and returns
/// the registry lease, after which the same device may be opened again.
pub struct DeviceHandle<C: DeviceConnection> {
    descriptor: DeviceDescriptor,
    negotiated: StreamConfiguration,
    connection: Option<C>,
    state: HandleState,
    recording_target: Option<PathBuf>,
    publishing: Option<PublishEndpoint>,
    lease: Option<DeviceLease>,
}

impl<C: DeviceConnection> DeviceHandle<C> {
    pub(crate) fn new(descriptor: DeviceDescriptor, connection: C, lease: DeviceLease) -> Self {
        let negotiated = connection.negotiated();
        Self {
            descriptor,
            negotiated,
            connection: Some(connection),
            state: HandleState::Open,
            recording_target: None,
            publishing: None,
            lease: Some(lease),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn negotiated(&self) -> StreamConfiguration {
        self.negotiated
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != HandleState::Closed
    }

    pub fn recording_target(&self) -> Option<&Path> {
        self.recording_target.as_deref()
    }

    pub fn publishing_endpoint(&self) -> Option<&PublishEndpoint> {
        self.publishing.as_ref()
    }

    /// Wait at most `timeout` for the next frame.
    ///
    /// A closed handle reports `Disconnected`.
    pub fn grab(&mut self, timeout: Duration) -> Result<FrameInfo, GrabError> {
        match self.connection.as_mut() {
            Some(connection) => connection.grab(timeout),
            None => Err(GrabError::Disconnected),
        }
    }

    /// Start persisting grabbed frames to `target`.
    ///
    /// Refuses an existing destination unless `force` is set.
    pub fn enable_recording(
        &mut self,
        target: &Path,
        codec: &CodecConfiguration,
        force: bool,
    ) -> Result<(), RecordingError> {
        if let Some(current) = &self.recording_target {
            return Err(RecordingError::AlreadyRecording(current.clone()));
        }
        let connection = self.connection.as_mut().ok_or(RecordingError::NotOpen)?;
        if !force && target.exists() {
            return Err(RecordingError::DestinationExists(target.to_path_buf()));
        }

        connection.start_recording(target, codec)?;
        log::info!(
            "{}: recording to {} ({})",
            self.descriptor.name,
            target.display(),
            codec.compression
        );
        self.recording_target = Some(target.to_path_buf());
        self.state = HandleState::Recording;
        Ok(())
    }

    /// Stop recording. Safe to call when recording was never enabled.
    pub fn disable_recording(&mut self) {
        if self.recording_target.take().is_none() {
            return;
        }
        if let Some(connection) = self.connection.as_mut() {
            connection.stop_recording();
            self.state = HandleState::Open;
        }
    }

    pub fn enable_publishing(&mut self, endpoint: &PublishEndpoint) -> Result<(), PublishError> {
        let connection = self.connection.as_mut().ok_or(PublishError::NotOpen)?;
        if self.publishing.as_ref() == Some(endpoint) {
            return Ok(());
        }
        connection.start_publishing(endpoint)?;
        log::info!("{}: publishing on {}", self.descriptor.name, endpoint);
        self.publishing = Some(endpoint.clone());
        Ok(())
    }

    /// Stop publishing. Safe to call when publishing was never enabled.
    pub fn disable_publishing(&mut self) {
        if self.publishing.take().is_none() {
            return;
        }
        if let Some(connection) = self.connection.as_mut() {
            connection.stop_publishing();
        }
    }

    /// Release the device. Subsequent calls are no-ops.
    pub fn close(&mut self) {
        self.disable_recording();
        self.disable_publishing();
        if let Some(mut connection) = self.connection.take() {
            connection.release();
            log::debug!("{}: closed", self.descriptor.name);
        }
        self.state = HandleState::Closed;
        self.lease.take();
    }
}

impl<C: DeviceConnection> Drop for DeviceHandle<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: DeviceConnection> std::fmt::Debug for DeviceHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.descriptor.id)
            .field("state", &self.state)
            .field("recording_target", &self.recording_target)
            .field("publishing", &self.publishing)
            .finish()
    }
}
