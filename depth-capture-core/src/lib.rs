//! # depth-capture-core
//!
//! Platform-agnostic multi-device capture core library.
//!
//! Opens every attached depth camera, records each one to its own container
//! on a dedicated worker thread, and stops all of them together on a single
//! shared signal. Capture backends (the simulated one in `depth-capture-sim`,
//! vendor SDK bindings) implement the `CaptureProvider` trait and plug into
//! the generic `Orchestrator`.
//!
//! ## Architecture
//!
//! ```text
//! depth-capture-core (this crate)
//! ├── traits/       ← CaptureProvider, DeviceConnection, CaptureDelegate
//! ├── models/       ← errors, states, CaptureConfiguration, StreamConfiguration, reports
//! ├── device/       ← DeviceRegistry, DeviceHandle
//! ├── session/      ← Orchestrator, CaptureWorker, StopSignal
//! └── storage/      ← output naming, metadata sidecars
//! ```

pub mod device;
pub mod models;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use device::handle::DeviceHandle;
pub use device::registry::DeviceRegistry;
pub use models::config::{CaptureConfiguration, CodecConfiguration, CompressionMode, PublishConfiguration, PublishEndpoint};
pub use models::device::{DepthMode, DeviceDescriptor, FrameInfo, Resolution, StreamConfiguration};
pub use models::error::{
    CollisionReason, EnumerationError, GrabError, OpenError, PublishError, RecordingError, RunError, StorageError,
};
pub use models::report::{AggregateReport, DeviceReport, OpenFailure};
pub use models::state::{HandleState, StopReason, WorkerFailure, WorkerState, WorkerStatus};
pub use session::orchestrator::Orchestrator;
pub use session::stop_signal::StopSignal;
pub use session::worker::{CaptureWorker, DeviceAssignment, WorkerHandle, WorkerProgress, WorkerSettings};
pub use storage::metadata::RecordingMetadata;
pub use storage::naming::OutputNaming;
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_provider::CaptureProvider;
pub use traits::device_connection::DeviceConnection;
