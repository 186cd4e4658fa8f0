use crate::models::error::GrabError;
use crate::models::report::DeviceReport;
use crate::models::state::WorkerState;

/// Event delegate for capture worker notifications.
///
/// All methods are called from worker threads, never the controlling thread.
/// Implementations must be cheap; a slow delegate slows the grab loop.
pub trait CaptureDelegate: Send + Sync {
    /// Called when a worker changes state.
    fn on_state_changed(&self, device_id: &str, state: WorkerState);

    /// Called for every failed grab.
    fn on_grab_error(&self, device_id: &str, error: GrabError);

    /// Called once the worker has stopped and released its device.
    fn on_worker_finished(&self, report: &DeviceReport);
}
