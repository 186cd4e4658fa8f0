use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::device::handle::DeviceHandle;
use crate::models::device::{DeviceDescriptor, StreamConfiguration};
use crate::models::error::OpenError;
use crate::traits::capture_provider::CaptureProvider;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

type OpenSet = Arc<Mutex<HashSet<String>>>;

/// Claim on a device id, held by exactly one `DeviceHandle`.
///
/// Dropping the lease makes the id available to `open` again.
pub(crate) struct DeviceLease {
    id: String,
    open: OpenSet,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.open.lock().remove(&self.id);
    }
}

/// Enumerates devices through a provider and hands out exclusive handles.
///
/// At most one handle per device id exists at any time; a second `open`
/// of the same id fails with `AlreadyOpen` until the first handle closes.
pub struct DeviceRegistry<P: CaptureProvider> {
    provider: P,
    open: OpenSet,
    probe_timeout: Duration,
}

impl<P: CaptureProvider> DeviceRegistry<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            open: Arc::new(Mutex::new(HashSet::new())),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Currently attached devices. Probe failures are logged and yield an empty list.
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        match self.provider.list_devices(self.probe_timeout) {
            Ok(devices) => {
                log::info!("{}: found {} device(s)", self.provider.name(), devices.len());
                devices
            }
            Err(e) => {
                log::warn!("{}: device enumeration failed: {}", self.provider.name(), e);
                Vec::new()
            }
        }
    }

    /// Open `descriptor` with the requested stream configuration.
    ///
    /// Ownership of the connection passes to the caller only on success.
    pub fn open(
        &self,
        descriptor: &DeviceDescriptor,
        stream: &StreamConfiguration,
    ) -> Result<DeviceHandle<P::Connection>, OpenError> {
        let lease = self.acquire(&descriptor.id)?;
        log::info!("Opening {} ({})", descriptor.name, stream);

        // On error the lease drops here and the id becomes free again.
        let connection = self.provider.connect(descriptor, stream)?;
        Ok(DeviceHandle::new(descriptor.clone(), connection, lease))
    }

    pub fn is_open(&self, device_id: &str) -> bool {
        self.open.lock().contains(device_id)
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }

    fn acquire(&self, device_id: &str) -> Result<DeviceLease, OpenError> {
        let mut open = self.open.lock();
        if !open.insert(device_id.to_string()) {
            return Err(OpenError::AlreadyOpen(device_id.to_string()));
        }
        Ok(DeviceLease {
            id: device_id.to_string(),
            open: Arc::clone(&self.open),
        })
    }
}
