use std::time::Duration;

use crate::models::device::{DeviceDescriptor, StreamConfiguration};
use crate::models::error::{EnumerationError, OpenError};
use crate::traits::device_connection::DeviceConnection;

/// Interface to the capture-and-encode SDK behind a family of devices.
///
/// Implemented by:
/// - `SimulatedProvider` (depth-capture-sim)
/// - Future: vendor SDK bindings
pub trait CaptureProvider: Send + Sync {
    type Connection: DeviceConnection + 'static;

    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Enumerate currently attached devices.
    ///
    /// Must return within `probe_timeout`. An empty list is not an error.
    fn list_devices(&self, probe_timeout: Duration) -> Result<Vec<DeviceDescriptor>, EnumerationError>;

    /// Open a connection to one device.
    ///
    /// On failure the provider must have released anything it acquired.
    fn connect(
        &self,
        descriptor: &DeviceDescriptor,
        stream: &StreamConfiguration,
    ) -> Result<Self::Connection, OpenError>;
}
