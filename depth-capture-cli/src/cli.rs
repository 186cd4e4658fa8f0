//! CLI commands for multi-camera capture
//!
//! This module provides command-line functionality for:
//! - Listing attached cameras
//! - Recording every attached camera until interrupted

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use depth_capture_core::{
    AggregateReport, CaptureConfiguration, CaptureDelegate, CodecConfiguration, CompressionMode, DepthMode,
    DeviceRegistry, DeviceReport, GrabError, Orchestrator, PublishConfiguration, Resolution, StopReason,
    StreamConfiguration, WorkerState,
};
use depth_capture_sim::{SimulatedProvider, SimulatedRig};

/// Options selecting the simulated camera set.
#[derive(Args, Debug, Clone, Default)]
pub struct SimArgs {
    /// Number of simulated cameras
    #[arg(long, global = true, default_value_t = 2)]
    pub sim_devices: usize,

    /// Unplug a camera after some frames (SERIAL=FRAMES, repeatable)
    #[arg(long, global = true, value_parser = parse_disconnect)]
    pub sim_disconnect: Vec<(String, u64)>,

    /// Make a camera fail to open (repeatable)
    #[arg(long, global = true)]
    pub sim_unreachable: Vec<String>,

    /// Load the simulated camera set from a JSON rig file
    #[arg(long, global = true)]
    pub sim_rig: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    /// Output file name template; the camera serial is appended
    #[arg(short = 'o', long, default_value = "recording")]
    pub output_file: String,

    /// Directory for the recordings
    #[arg(short = 'd', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Station id prefixed to every file name
    #[arg(long)]
    pub station: Option<String>,

    /// Prefix file names with the start time
    #[arg(long)]
    pub timestamp: bool,

    /// Overwrite existing recordings
    #[arg(long)]
    pub force: bool,

    #[arg(long, default_value = "HD1080")]
    pub resolution: Resolution,

    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    #[arg(long, default_value = "ULTRA")]
    pub depth_mode: DepthMode,

    #[arg(long, default_value = "H264")]
    pub compression: CompressionMode,

    /// Stop after this many seconds (default: until Ctrl+C)
    #[arg(long)]
    pub duration: Option<u64>,

    #[arg(long, default_value_t = 100)]
    pub grab_timeout_ms: u64,

    /// Consecutive disconnected grabs before a camera is given up
    #[arg(long, default_value_t = 30)]
    pub max_disconnects: u32,

    /// Grab without recording
    #[arg(long)]
    pub no_record: bool,

    /// Publish per-camera results, one port per camera
    #[arg(long)]
    pub publish: bool,

    #[arg(long, default_value = "127.0.0.1")]
    pub publish_host: String,

    #[arg(long, default_value_t = 30002)]
    pub base_port: u16,

    #[arg(long, default_value_t = 2)]
    pub port_stride: u16,

    /// Also write the run report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,
}

impl RecordArgs {
    pub fn to_configuration(&self) -> CaptureConfiguration {
        let publish = self.publish.then(|| PublishConfiguration {
            host: self.publish_host.clone(),
            base_port: self.base_port,
            port_stride: self.port_stride,
        });

        CaptureConfiguration {
            stream: StreamConfiguration {
                resolution: self.resolution,
                fps: self.fps,
                depth_mode: self.depth_mode,
            },
            codec: CodecConfiguration {
                compression: self.compression,
            },
            output_directory: self.output_dir.clone(),
            output_template: self.output_file.clone(),
            station_id: self.station.clone(),
            timestamped: self.timestamp,
            force_overwrite: self.force,
            record: !self.no_record,
            publish,
            grab_timeout: Duration::from_millis(self.grab_timeout_ms),
            max_consecutive_disconnects: self.max_disconnects,
            max_duration: self.duration.map(Duration::from_secs),
            ..Default::default()
        }
    }
}

fn parse_disconnect(value: &str) -> Result<(String, u64), String> {
    let (serial, frames) = value
        .split_once('=')
        .ok_or_else(|| format!("expected SERIAL=FRAMES, got {}", value))?;
    let frames = frames
        .parse()
        .map_err(|_| format!("invalid frame count: {}", frames))?;
    Ok((serial.to_string(), frames))
}

/// Build the simulated camera set from the command line.
pub fn simulated_provider(args: &SimArgs) -> Result<SimulatedProvider, Box<dyn Error>> {
    let mut devices = match &args.sim_rig {
        Some(path) => SimulatedRig::from_json_file(path)?.devices,
        None => SimulatedProvider::with_count(args.sim_devices).devices().to_vec(),
    };

    for (serial, frames) in &args.sim_disconnect {
        match devices.iter_mut().find(|d| &d.serial == serial) {
            Some(device) => device.disconnect_after = Some(*frames),
            None => log::warn!("--sim-disconnect: no simulated camera {}", serial),
        }
    }
    for serial in &args.sim_unreachable {
        match devices.iter_mut().find(|d| &d.serial == serial) {
            Some(device) => device.unreachable = true,
            None => log::warn!("--sim-unreachable: no simulated camera {}", serial),
        }
    }
    Ok(SimulatedProvider::new(devices))
}

/// List attached cameras
pub fn list_devices(sim: &SimArgs, json: bool) -> Result<(), Box<dyn Error>> {
    let registry = DeviceRegistry::new(simulated_provider(sim)?);
    let devices = registry.list_devices();

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {}", index, device.name);
        println!("      serial: {}", device.id);
        println!("      stream: {}", device.configuration);
    }
    Ok(())
}

/// Record every attached camera until Ctrl+C (or `--duration`).
pub fn record(sim: &SimArgs, args: &RecordArgs) -> Result<(), Box<dyn Error>> {
    let config = args.to_configuration();
    let mut orchestrator = Orchestrator::new(simulated_provider(sim)?, config);
    orchestrator.set_delegate(Arc::new(ConsoleDelegate));

    // The handler only raises the stop flag; the run joins every worker
    // and finalizes every recording before the process exits.
    let stop = orchestrator.stop_signal();
    ctrlc::set_handler(move || {
        if stop.trigger(StopReason::Interrupt) {
            log::info!("Interrupt received, stopping all cameras");
        } else {
            log::info!("Already stopping, waiting for cameras to finish");
        }
    })?;

    println!("Recording... (press Ctrl+C to stop)");
    let report = orchestrator.run()?;
    print_report(&report);

    if let Some(path) = &args.report_json {
        fs::write(path, report.to_json()?)?;
        println!("Report saved: {}", path.display());
    }
    Ok(())
}

fn print_report(report: &AggregateReport) {
    println!();
    println!("{}", report);
}

/// Logs worker events as they happen.
struct ConsoleDelegate;

impl CaptureDelegate for ConsoleDelegate {
    fn on_state_changed(&self, device_id: &str, state: WorkerState) {
        log::debug!("{}: {:?}", device_id, state);
    }

    fn on_grab_error(&self, device_id: &str, error: GrabError) {
        if error == GrabError::Disconnected {
            log::warn!("{}: camera disconnected", device_id);
        }
    }

    fn on_worker_finished(&self, report: &DeviceReport) {
        if report.status.is_fatal() {
            log::error!("{} stopped early: {}", report.device_name, report.status);
        }
    }
}
