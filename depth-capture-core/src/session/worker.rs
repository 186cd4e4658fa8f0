use std::any::Any;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::device::handle::DeviceHandle;
use crate::models::config::{CaptureConfiguration, CodecConfiguration, PublishEndpoint};
use crate::models::error::GrabError;
use crate::models::report::DeviceReport;
use crate::models::state::{WorkerFailure, WorkerState, WorkerStatus};
use crate::session::stop_signal::StopSignal;
use crate::storage::metadata::{self, RecordingMetadata};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::device_connection::DeviceConnection;

/// Per-worker knobs, taken from the run configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub grab_timeout: Duration,
    pub max_consecutive_disconnects: u32,
    pub codec: CodecConfiguration,
    pub force_overwrite: bool,
}

impl From<&CaptureConfiguration> for WorkerSettings {
    fn from(config: &CaptureConfiguration) -> Self {
        Self {
            grab_timeout: config.grab_timeout,
            max_consecutive_disconnects: config.max_consecutive_disconnects,
            codec: config.codec,
            force_overwrite: config.force_overwrite,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&CaptureConfiguration::default())
    }
}

/// Where one worker sends its frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceAssignment {
    pub recording_target: Option<PathBuf>,
    pub publish: Option<PublishEndpoint>,
}

/// Counters and state of a running worker, readable from any thread.
///
/// Only the owning worker writes; counters never decrease.
#[derive(Debug)]
pub struct WorkerProgress {
    frames_captured: AtomicU64,
    frames_missed: AtomicU64,
    state: Mutex<WorkerState>,
}

impl WorkerProgress {
    fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            frames_missed: AtomicU64::new(0),
            state: Mutex::new(WorkerState::Idle),
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::SeqCst)
    }

    pub fn frames_missed(&self) -> u64 {
        self.frames_missed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }
}

/// Owns one device handle and runs its grab loop until stopped.
pub struct CaptureWorker<C: DeviceConnection> {
    handle: DeviceHandle<C>,
    assignment: DeviceAssignment,
    settings: WorkerSettings,
    stop: StopSignal,
    progress: Arc<WorkerProgress>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl<C: DeviceConnection + 'static> CaptureWorker<C> {
    pub fn new(
        handle: DeviceHandle<C>,
        assignment: DeviceAssignment,
        settings: WorkerSettings,
        stop: StopSignal,
    ) -> Self {
        Self {
            handle,
            assignment,
            settings,
            stop,
            progress: Arc::new(WorkerProgress::new()),
            delegate: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn device_id(&self) -> &str {
        self.handle.id()
    }

    pub fn progress(&self) -> Arc<WorkerProgress> {
        Arc::clone(&self.progress)
    }

    /// Run the worker on its own named thread.
    pub fn spawn(self) -> io::Result<WorkerHandle> {
        let device_id = self.handle.id().to_string();
        let device_name = self.handle.descriptor().name.clone();
        let assignment = self.assignment.clone();
        let progress = self.progress();

        let join = thread::Builder::new()
            .name(format!("capture-{}", device_id))
            .spawn(move || self.run())?;

        Ok(WorkerHandle {
            device_id,
            device_name,
            assignment,
            progress,
            join,
        })
    }

    /// Run to completion on the current thread.
    ///
    /// Every exit path (setup failure, sustained disconnect, external stop)
    /// goes through draining, so the device is always closed.
    pub fn run(mut self) -> DeviceReport {
        let started_at = Utc::now();
        let failure = match self.start() {
            Ok(()) => self.capture_loop(),
            Err(failure) => Some(failure),
        };
        self.drain(failure, started_at)
    }

    fn start(&mut self) -> Result<(), WorkerFailure> {
        if let Some(target) = self.assignment.recording_target.clone() {
            self.handle
                .enable_recording(&target, &self.settings.codec, self.settings.force_overwrite)
                .map_err(|e| {
                    log::error!("{}: cannot record to {}: {}", self.handle.descriptor().name, target.display(), e);
                    WorkerFailure::RecordingSetup(e.to_string())
                })?;
        }

        if let Some(endpoint) = self.assignment.publish.clone() {
            self.handle.enable_publishing(&endpoint).map_err(|e| {
                log::error!("{}: cannot publish on {}: {}", self.handle.descriptor().name, endpoint, e);
                WorkerFailure::PublishingSetup(e.to_string())
            })?;
        }

        self.set_state(WorkerState::Recording);
        Ok(())
    }

    /// Grab until the stop signal is observed. Returns a failure only when
    /// the device stays disconnected for the configured number of attempts.
    fn capture_loop(&mut self) -> Option<WorkerFailure> {
        let mut consecutive_disconnects = 0u32;

        while !self.stop.is_triggered() {
            match self.handle.grab(self.settings.grab_timeout) {
                Ok(_frame) => {
                    self.progress.frames_captured.fetch_add(1, Ordering::SeqCst);
                    consecutive_disconnects = 0;
                }
                Err(error) => {
                    self.progress.frames_missed.fetch_add(1, Ordering::SeqCst);
                    log::debug!("{}: missed frame: {}", self.handle.descriptor().name, error);
                    if let Some(ref delegate) = self.delegate {
                        delegate.on_grab_error(self.handle.id(), error);
                    }

                    match error {
                        GrabError::Disconnected => {
                            consecutive_disconnects += 1;
                            if consecutive_disconnects >= self.settings.max_consecutive_disconnects {
                                log::error!(
                                    "{}: disconnected for {} consecutive grabs, giving up",
                                    self.handle.descriptor().name,
                                    consecutive_disconnects
                                );
                                return Some(WorkerFailure::Disconnected {
                                    consecutive_misses: consecutive_disconnects,
                                });
                            }
                        }
                        GrabError::EndOfStream => {
                            log::info!("{}: end of stream", self.handle.descriptor().name);
                            return None;
                        }
                        GrabError::Timeout => consecutive_disconnects = 0,
                    }
                }
            }
        }
        None
    }

    fn drain(mut self, failure: Option<WorkerFailure>, started_at: DateTime<Utc>) -> DeviceReport {
        self.set_state(WorkerState::Draining);

        let recorded_to = self.handle.recording_target().map(|p| p.to_path_buf());
        self.handle.disable_recording();
        self.handle.disable_publishing();
        let stream = self.handle.negotiated();
        self.handle.close();

        let status = match failure {
            Some(failure) => WorkerStatus::Fatal(failure),
            None => WorkerStatus::Completed,
        };
        let descriptor = self.handle.descriptor().clone();
        let report = DeviceReport {
            device_id: descriptor.id.clone(),
            device_name: descriptor.name.clone(),
            output_target: self.assignment.recording_target.clone(),
            publish_port: self.assignment.publish.as_ref().map(|e| e.port),
            frames_captured: self.progress.frames_captured(),
            frames_missed: self.progress.frames_missed(),
            status,
        };

        if let Some(path) = recorded_to {
            let metadata = RecordingMetadata::new(
                &report.device_id,
                &report.device_name,
                &path,
                started_at,
                Utc::now(),
                report.frames_captured,
                report.frames_missed,
                stream,
                self.settings.codec,
                report.status.clone(),
            );
            let written = metadata
                .with_checksum_of(&path)
                .and_then(|m| metadata::write_metadata(&m, &path));
            if let Err(e) = written {
                log::warn!("{}: {}", report.device_name, e);
            }
        }

        self.set_state(WorkerState::Stopped);
        log::info!(
            "{} has {}/{} missed frames ({})",
            report.device_name,
            report.frames_missed,
            report.frames_captured,
            report.status
        );
        if let Some(ref delegate) = self.delegate {
            delegate.on_worker_finished(&report);
        }
        report
    }

    fn set_state(&self, state: WorkerState) {
        *self.progress.state.lock() = state;
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(self.handle.id(), state);
        }
    }
}

/// Controller-side handle to a spawned worker.
pub struct WorkerHandle {
    device_id: String,
    device_name: String,
    assignment: DeviceAssignment,
    progress: Arc<WorkerProgress>,
    join: thread::JoinHandle<DeviceReport>,
}

impl WorkerHandle {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn progress(&self) -> &WorkerProgress {
        &self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker to stop.
    ///
    /// A panicked worker still yields a report built from its last counters.
    pub fn join(self) -> DeviceReport {
        match self.join.join() {
            Ok(report) => report,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("{}: worker panicked: {}", self.device_name, message);
                DeviceReport {
                    device_id: self.device_id,
                    device_name: self.device_name,
                    output_target: self.assignment.recording_target,
                    publish_port: self.assignment.publish.map(|e| e.port),
                    frames_captured: self.progress.frames_captured(),
                    frames_missed: self.progress.frames_missed(),
                    status: WorkerStatus::Fatal(WorkerFailure::Panicked(message)),
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
