use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::device::handle::DeviceHandle;
use crate::device::registry::DeviceRegistry;
use crate::models::config::CaptureConfiguration;
use crate::models::error::RunError;
use crate::models::report::{AggregateReport, OpenFailure};
use crate::models::state::StopReason;
use crate::session::stop_signal::StopSignal;
use crate::session::worker::{CaptureWorker, DeviceAssignment, WorkerHandle, WorkerSettings};
use crate::storage::metadata;
use crate::storage::naming::{self, OutputNaming};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::CaptureProvider;

/// Runs one capture session across every attached device.
///
/// Per-device failures exclude that device; only an empty device set, a bad
/// configuration or a destination collision abort the run, and all of those
/// are detected before any worker starts.
pub struct Orchestrator<P: CaptureProvider> {
    registry: DeviceRegistry<P>,
    config: CaptureConfiguration,
    stop: StopSignal,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl<P: CaptureProvider> Orchestrator<P> {
    pub fn new(provider: P, config: CaptureConfiguration) -> Self {
        let registry = DeviceRegistry::new(provider).with_probe_timeout(config.probe_timeout);
        Self {
            registry,
            config,
            stop: StopSignal::new(),
            delegate: None,
        }
    }

    /// Handle for stopping the run from another thread or a signal handler.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn registry(&self) -> &DeviceRegistry<P> {
        &self.registry
    }

    pub fn configuration(&self) -> &CaptureConfiguration {
        &self.config
    }

    /// Capture until stopped, then join every worker and report.
    pub fn run(self) -> Result<AggregateReport, RunError> {
        self.config.validate().map_err(RunError::InvalidConfiguration)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mut open_failures = Vec::new();

        let mut opened: Vec<(usize, DeviceHandle<P::Connection>)> = Vec::new();
        for (index, descriptor) in self.registry.list_devices().into_iter().enumerate() {
            match self.registry.open(&descriptor, &self.config.stream) {
                Ok(handle) => opened.push((index, handle)),
                Err(e) => {
                    log::warn!("Excluding {}: {}", descriptor.name, e);
                    open_failures.push(OpenFailure {
                        device_id: descriptor.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if opened.is_empty() {
            log::error!("No devices could be opened");
            return Err(RunError::NoDevicesAvailable);
        }

        // Any early return below drops `opened`, which closes every handle.
        let assignments = self.assign(&opened, started_at)?;

        let settings = WorkerSettings::from(&self.config);
        let mut workers: Vec<WorkerHandle> = Vec::with_capacity(opened.len());
        for ((_, handle), assignment) in opened.into_iter().zip(assignments) {
            let device_id = handle.id().to_string();
            let mut worker = CaptureWorker::new(handle, assignment, settings.clone(), self.stop.clone());
            if let Some(ref delegate) = self.delegate {
                worker.set_delegate(Arc::clone(delegate));
            }
            match worker.spawn() {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    log::error!("Failed to start worker for {}: {}", device_id, e);
                    open_failures.push(OpenFailure {
                        device_id,
                        reason: format!("failed to start worker: {}", e),
                    });
                }
            }
        }

        log::info!("Capturing from {} device(s)", workers.len());
        let stop_reason = self.wait_for_stop(&workers);
        log::info!("Stopping capture: {}", stop_reason);

        let devices = workers.into_iter().map(WorkerHandle::join).collect();
        Ok(AggregateReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            stop_reason: Some(stop_reason),
            devices,
            open_failures,
        })
    }

    /// Output target and publish endpoint per opened device, after the
    /// pre-flight destination checks.
    fn assign(
        &self,
        opened: &[(usize, DeviceHandle<P::Connection>)],
        started_at: chrono::DateTime<Utc>,
    ) -> Result<Vec<DeviceAssignment>, RunError> {
        let naming = self
            .config
            .record
            .then(|| OutputNaming::from_config(&self.config, started_at));

        let mut assignments = Vec::with_capacity(opened.len());
        for (index, handle) in opened {
            let recording_target = naming.as_ref().map(|n| n.target_for(handle.id()));
            let publish = match &self.config.publish {
                Some(publish) => Some(publish.endpoint_for(*index).ok_or_else(|| {
                    RunError::InvalidConfiguration(format!(
                        "publish port for device #{} exceeds 65535 (base {}, stride {})",
                        index, publish.base_port, publish.port_stride
                    ))
                })?),
                None => None,
            };
            assignments.push(DeviceAssignment {
                recording_target,
                publish,
            });
        }

        if let Some(naming) = naming {
            // Every file a worker will write, sidecars included.
            let destinations: Vec<PathBuf> = assignments
                .iter()
                .filter_map(|a| a.recording_target.as_deref())
                .flat_map(|target| [target.to_path_buf(), metadata::metadata_path(target)])
                .collect();
            let checked = destinations.iter().map(PathBuf::as_path);
            if let Err(e) = naming::check_destinations(checked, self.config.force_overwrite) {
                log::error!("{}", e);
                return Err(e);
            }
            naming::ensure_directory(naming.directory())?;
        }
        Ok(assignments)
    }

    /// Block until the stop signal fires, raising it ourselves when every
    /// worker has already stopped or the maximum duration has passed.
    fn wait_for_stop(&self, workers: &[WorkerHandle]) -> StopReason {
        let deadline = self.config.max_duration.map(|d| Instant::now() + d);
        loop {
            let slice = match deadline {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(self.config.stop_poll_interval),
                None => self.config.stop_poll_interval,
            };
            if self.stop.wait_timeout(slice) {
                break;
            }
            if workers.iter().all(WorkerHandle::is_finished) {
                self.stop.trigger(StopReason::WorkersFinished);
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                self.stop.trigger(StopReason::DurationElapsed);
                break;
            }
        }
        self.stop.reason().unwrap_or(StopReason::Requested)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::models::config::PublishConfiguration;
    use crate::models::error::{CollisionReason, GrabError, OpenError, RecordingError};
    use crate::models::state::{WorkerFailure, WorkerStatus};
    use crate::test_support::{MockDevice, MockProvider};

    fn config_in(dir: &std::path::Path) -> CaptureConfiguration {
        CaptureConfiguration {
            output_directory: dir.to_path_buf(),
            output_template: "rec".into(),
            stop_poll_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[test]
    fn zero_devices_is_fatal_and_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let orchestrator = Orchestrator::new(MockProvider::new(vec![]), config_in(&out));

        assert_eq!(orchestrator.run().unwrap_err(), RunError::NoDevicesAvailable);
        assert!(!out.exists());
    }

    #[test]
    fn all_opens_failing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let device = MockDevice::new("1").with_open_error(OpenError::DeviceUnreachable("1".into()));
        let orchestrator = Orchestrator::new(MockProvider::new(vec![device]), config_in(dir.path()));
        assert_eq!(orchestrator.run().unwrap_err(), RunError::NoDevicesAvailable);
    }

    #[test]
    fn invalid_configuration_is_rejected_before_enumeration() {
        let provider = MockProvider::new(vec![MockDevice::new("1")]);
        let probe = provider.probe("1");
        let config = CaptureConfiguration {
            output_template: String::new(),
            ..Default::default()
        };
        let err = Orchestrator::new(provider, config).run().unwrap_err();
        assert!(matches!(err, RunError::InvalidConfiguration(_)));
        assert_eq!(probe.connects(), 0);
    }

    #[test]
    fn two_devices_record_to_distinct_targets() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(vec![MockDevice::new("1001"), MockDevice::new("1002")]);
        let orchestrator = Orchestrator::new(provider, config_in(dir.path()));
        let stop = orchestrator.stop_signal();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stop.trigger(StopReason::Interrupt);
        });
        let report = orchestrator.run().unwrap();
        stopper.join().unwrap();

        assert_eq!(report.stop_reason, Some(StopReason::Interrupt));
        assert_eq!(report.devices.len(), 2);
        for id in ["1001", "1002"] {
            let device = report.device(id).unwrap();
            assert!(device.frames_captured > 0);
            assert_eq!(device.status, WorkerStatus::Completed);
            let target = dir.path().join(format!("rec_{}.svo2", id));
            assert_eq!(device.output_target.as_deref(), Some(target.as_path()));
            assert!(target.exists());
        }
    }

    #[test]
    fn failed_open_excludes_only_that_device() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(vec![
            MockDevice::new("1"),
            MockDevice::new("2").with_open_error(OpenError::UnsupportedConfiguration("HD2K@60".into())),
        ]);
        let config = CaptureConfiguration {
            max_duration: Some(Duration::from_millis(50)),
            ..config_in(dir.path())
        };
        let report = Orchestrator::new(provider, config).run().unwrap();

        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.devices[0].device_id, "1");
        assert_eq!(report.open_failures.len(), 1);
        assert_eq!(report.open_failures[0].device_id, "2");
        assert_eq!(report.stop_reason, Some(StopReason::DurationElapsed));
    }

    #[test]
    fn existing_target_aborts_before_any_worker_starts() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("rec_2.svo2");
        fs::write(&existing, b"yesterday").unwrap();
        let provider = MockProvider::new(vec![MockDevice::new("1"), MockDevice::new("2")]);
        let probes = [provider.probe("1"), provider.probe("2")];

        let err = Orchestrator::new(provider, config_in(dir.path())).run().unwrap_err();

        assert_eq!(
            err,
            RunError::DestinationCollision {
                path: existing.clone(),
                reason: CollisionReason::Exists,
            }
        );
        for probe in &probes {
            assert_eq!(probe.grabs(), 0);
            assert_eq!(probe.releases(), 1);
        }
        assert_eq!(fs::read(&existing).unwrap(), b"yesterday");
        assert!(!dir.path().join("rec_1.svo2").exists());
    }

    #[test]
    fn ids_that_sanitize_alike_collide() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(vec![MockDevice::new("a/b"), MockDevice::new("a:b")]);
        let err = Orchestrator::new(provider, config_in(dir.path())).run().unwrap_err();
        assert!(matches!(
            err,
            RunError::DestinationCollision {
                reason: CollisionReason::Duplicate,
                ..
            }
        ));
    }

    #[test]
    fn existing_sidecar_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = dir.path().join("rec_1.metadata.json");
        fs::write(&sidecar, b"notes").unwrap();
        let provider = MockProvider::new(vec![MockDevice::new("1")]);
        let probe = provider.probe("1");

        let err = Orchestrator::new(provider, config_in(dir.path())).run().unwrap_err();

        assert_eq!(
            err,
            RunError::DestinationCollision {
                path: sidecar.clone(),
                reason: CollisionReason::Exists,
            }
        );
        assert_eq!(probe.grabs(), 0);
        assert_eq!(fs::read(&sidecar).unwrap(), b"notes");
        assert!(!dir.path().join("rec_1.svo2").exists());
    }

    #[test]
    fn collision_abort_creates_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let provider = MockProvider::new(vec![MockDevice::new("a/b"), MockDevice::new("a:b")]);

        let err = Orchestrator::new(provider, config_in(&out)).run().unwrap_err();

        assert!(matches!(err, RunError::DestinationCollision { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn force_overwrites_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("rec_1.svo2"), b"yesterday").unwrap();
        let config = CaptureConfiguration {
            force_overwrite: true,
            max_duration: Some(Duration::from_millis(30)),
            ..config_in(dir.path())
        };
        let report = Orchestrator::new(MockProvider::new(vec![MockDevice::new("1")]), config)
            .run()
            .unwrap();
        assert_eq!(report.devices[0].status, WorkerStatus::Completed);
    }

    #[test]
    fn disconnected_device_does_not_stop_its_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(vec![MockDevice::new("1"), MockDevice::new("2").disconnect_after(2)]);
        let config = CaptureConfiguration {
            max_consecutive_disconnects: 3,
            ..config_in(dir.path())
        };
        let orchestrator = Orchestrator::new(provider, config);
        let stop = orchestrator.stop_signal();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            stop.trigger(StopReason::Interrupt);
        });
        let report = orchestrator.run().unwrap();
        stopper.join().unwrap();

        assert_eq!(report.stop_reason, Some(StopReason::Interrupt));
        assert_eq!(
            report.device("2").unwrap().status,
            WorkerStatus::Fatal(WorkerFailure::Disconnected {
                consecutive_misses: 3
            })
        );
        let healthy = report.device("1").unwrap();
        assert_eq!(healthy.status, WorkerStatus::Completed);
        assert!(healthy.frames_captured > 2);
        assert_eq!(report.fatal_count(), 1);
    }

    #[test]
    fn run_ends_when_every_worker_stops_on_its_own() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(vec![
            MockDevice::new("1").with_script(vec![Ok(()), Err(GrabError::EndOfStream)]),
            MockDevice::new("2").with_recording_error(RecordingError::Setup("read-only".into())),
        ]);
        let report = Orchestrator::new(provider, config_in(dir.path())).run().unwrap();

        assert_eq!(report.stop_reason, Some(StopReason::WorkersFinished));
        assert_eq!(report.devices.len(), 2);
        assert!(report.device("2").unwrap().status.is_fatal());
        assert_eq!(report.device("2").unwrap().grab_attempts(), 0);
    }

    #[test]
    fn stop_before_run_drains_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(vec![MockDevice::new("1")]);
        let probe = provider.probe("1");
        let orchestrator = Orchestrator::new(provider, config_in(dir.path()));
        orchestrator.stop_signal().trigger(StopReason::Interrupt);

        let report = orchestrator.run().unwrap();
        assert_eq!(report.devices[0].grab_attempts(), 0);
        assert_eq!(probe.releases(), 1);
    }

    #[test]
    fn publishing_without_recording_assigns_strided_ports() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never-created");
        let provider = MockProvider::new(vec![MockDevice::new("1"), MockDevice::new("2")]);
        let probes = [provider.probe("1"), provider.probe("2")];
        let config = CaptureConfiguration {
            record: false,
            publish: Some(PublishConfiguration::default()),
            max_duration: Some(Duration::from_millis(30)),
            ..config_in(&out)
        };

        let report = Orchestrator::new(provider, config).run().unwrap();

        assert_eq!(report.device("1").unwrap().publish_port, Some(30002));
        assert_eq!(report.device("2").unwrap().publish_port, Some(30004));
        assert!(report.devices.iter().all(|d| d.output_target.is_none()));
        assert!(probes.iter().all(|p| p.publishing_started() == 1 && p.recordings_started() == 0));
        assert!(!out.exists());
    }

    #[test]
    fn port_overflow_is_a_configuration_error() {
        let provider = MockProvider::new(vec![MockDevice::new("1"), MockDevice::new("2")]);
        let config = CaptureConfiguration {
            record: false,
            publish: Some(PublishConfiguration {
                base_port: 65535,
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = Orchestrator::new(provider, config).run().unwrap_err();
        assert!(matches!(err, RunError::InvalidConfiguration(_)));
    }
}
