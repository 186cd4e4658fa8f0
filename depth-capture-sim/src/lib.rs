//! # depth-capture-sim
//!
//! Simulated camera backend for depth-capture-kit.
//!
//! Provides:
//! - `SimulatedProvider`: enumerates and opens scripted cameras
//! - `SimulatedConnection`: frame cadence, dropped frames, disconnects
//! - `ContainerWriter`: the frame-index recording container
//!
//! ## Usage
//! ```ignore
//! use depth_capture_core::{CaptureConfiguration, Orchestrator};
//! use depth_capture_sim::SimulatedProvider;
//!
//! let orchestrator = Orchestrator::new(SimulatedProvider::with_count(2), CaptureConfiguration::default());
//! let report = orchestrator.run()?;
//! ```

pub mod container;
pub mod device;
pub mod provider;

pub use container::{ContainerHeader, ContainerWriter};
pub use device::SimulatedConnection;
pub use provider::{RigError, SimulatedDeviceSpec, SimulatedProvider, SimulatedRig};
