use std::error::Error;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod cli;

use cli::{RecordArgs, SimArgs};

#[derive(Parser)]
#[command(name = "depth-capture")]
#[command(about = "Record every attached depth camera at once")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    sim: SimArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached cameras
    List {
        /// Print the camera list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record all cameras until Ctrl+C
    Record(RecordArgs),
}

fn main() -> ExitCode {
    // RUST_LOG overrides the default level, e.g. RUST_LOG=debug
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List { json } => cli::list_devices(&cli.sim, json),
        Commands::Record(args) => cli::record(&cli.sim, &args),
    };

    ExitCode::from(exit_status(&result))
}

/// 0 when the command succeeded, even if some cameras stopped early;
/// 1 for run-level failures.
fn exit_status(result: &Result<(), Box<dyn Error>>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use depth_capture_core::{CollisionReason, CompressionMode, DepthMode, Resolution, RunError};

    fn record_args(args: &[&str]) -> RecordArgs {
        let cli = Cli::try_parse_from(std::iter::once("depth-capture").chain(args.iter().copied())).unwrap();
        match cli.command {
            Commands::Record(args) => args,
            Commands::List { .. } => panic!("expected record"),
        }
    }

    #[test]
    fn record_defaults_match_configuration_defaults() {
        let config = record_args(&["record"]).to_configuration();
        assert_eq!(config.output_template, "recording");
        assert_eq!(config.stream.resolution, Resolution::Hd1080);
        assert_eq!(config.stream.fps, 30);
        assert_eq!(config.stream.depth_mode, DepthMode::Ultra);
        assert_eq!(config.codec.compression, CompressionMode::H264);
        assert_eq!(config.grab_timeout, Duration::from_millis(100));
        assert_eq!(config.max_consecutive_disconnects, 30);
        assert!(config.record);
        assert!(config.publish.is_none());
        assert!(config.max_duration.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn record_flags_map_onto_configuration() {
        let config = record_args(&[
            "record",
            "--output-file",
            "take",
            "--output-dir",
            "/data/rig",
            "--station",
            "02",
            "--timestamp",
            "--resolution",
            "hd720",
            "--fps",
            "60",
            "--depth-mode",
            "neural",
            "--compression",
            "h265",
            "--duration",
            "90",
            "--no-record",
            "--publish",
            "--base-port",
            "40000",
        ])
        .to_configuration();

        assert_eq!(config.output_template, "take");
        assert_eq!(config.output_directory, std::path::PathBuf::from("/data/rig"));
        assert_eq!(config.station_id.as_deref(), Some("02"));
        assert!(config.timestamped);
        assert_eq!(config.stream.resolution, Resolution::Hd720);
        assert_eq!(config.stream.fps, 60);
        assert_eq!(config.stream.depth_mode, DepthMode::Neural);
        assert_eq!(config.codec.compression, CompressionMode::H265);
        assert_eq!(config.max_duration, Some(Duration::from_secs(90)));
        assert!(!config.record);
        let publish = config.publish.unwrap();
        assert_eq!(publish.endpoint_for(1).unwrap().port, 40002);
    }

    #[test]
    fn sim_flags_are_global() {
        let cli = Cli::try_parse_from([
            "depth-capture",
            "record",
            "--sim-devices",
            "4",
            "--sim-disconnect",
            "41000001=5",
            "--sim-disconnect",
            "41000002=9",
        ])
        .unwrap();
        assert_eq!(cli.sim.sim_devices, 4);
        assert_eq!(cli.sim.sim_disconnect.len(), 2);
    }

    fn failed(error: RunError) -> Result<(), Box<dyn Error>> {
        Err(Box::new(error))
    }

    #[test]
    fn run_level_failures_exit_with_one() {
        assert_eq!(exit_status(&Ok(())), 0);
        assert_eq!(exit_status(&failed(RunError::NoDevicesAvailable)), 1);
        assert_eq!(
            exit_status(&failed(RunError::DestinationCollision {
                path: std::path::PathBuf::from("rec_1.svo2"),
                reason: CollisionReason::Exists,
            })),
            1
        );
        assert_eq!(
            exit_status(&failed(RunError::InvalidConfiguration("fps must be positive".into()))),
            1
        );
    }

    #[test]
    fn rejects_unknown_resolution() {
        assert!(Cli::try_parse_from(["depth-capture", "record", "--resolution", "8k"]).is_err());
    }
}
