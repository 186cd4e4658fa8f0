use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::device::StreamConfiguration;

/// Compression applied by the device when writing its recording container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompressionMode {
    #[default]
    H264,
    H265,
    Lossless,
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::H264 => "H264",
            Self::H265 => "H265",
            Self::Lossless => "LOSSLESS",
        };
        f.write_str(name)
    }
}

impl FromStr for CompressionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "H264" => Ok(Self::H264),
            "H265" | "HEVC" => Ok(Self::H265),
            "LOSSLESS" => Ok(Self::Lossless),
            other => Err(format!("unknown compression mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodecConfiguration {
    pub compression: CompressionMode,
}

/// Network endpoint a single device publishes its results to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublishEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for PublishEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Per-run publishing settings; each device gets its own port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfiguration {
    pub host: String,
    pub base_port: u16,
    pub port_stride: u16,
}

impl PublishConfiguration {
    /// Endpoint for the device at enumeration position `index`.
    ///
    /// Returns `None` when the port would overflow.
    pub fn endpoint_for(&self, index: usize) -> Option<PublishEndpoint> {
        let offset = u16::try_from(index).ok()?.checked_mul(self.port_stride)?;
        let port = self.base_port.checked_add(offset)?;
        Some(PublishEndpoint {
            host: self.host.clone(),
            port,
        })
    }
}

impl Default for PublishConfiguration {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            base_port: 30002,
            port_stride: 2,
        }
    }
}

/// Configuration for a multi-device capture run.
#[derive(Debug, Clone)]
pub struct CaptureConfiguration {
    /// Stream requested from every device.
    pub stream: StreamConfiguration,

    pub codec: CodecConfiguration,

    /// Directory where recording files are written.
    pub output_directory: PathBuf,

    /// Base file name; device id and extension are added per device.
    pub output_template: String,

    /// Optional station prefix, for rigs with several capture computers.
    pub station_id: Option<String>,

    /// Prefix file names with the run start time.
    pub timestamped: bool,

    /// Recording extension, without the leading dot (default: "svo2").
    pub extension: String,

    /// Allow overwriting existing recordings.
    pub force_overwrite: bool,

    /// Persist grabbed frames (default: true).
    pub record: bool,

    /// Publish per-frame results over the network, one port per device.
    pub publish: Option<PublishConfiguration>,

    /// Upper bound of a single grab call (default: 100ms).
    pub grab_timeout: Duration,

    /// Consecutive `Disconnected` grabs after which a worker gives up (default: 30).
    pub max_consecutive_disconnects: u32,

    /// Granularity of the controller's stop checks (default: 200ms).
    pub stop_poll_interval: Duration,

    /// Bound on device enumeration (default: 2s).
    pub probe_timeout: Duration,

    /// Stop automatically after this long (None = until interrupted).
    pub max_duration: Option<Duration>,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.output_template.trim().is_empty() {
            return Err("output template must not be empty".into());
        }
        if self.output_template.contains(['/', '\\']) {
            return Err(format!(
                "output template must be a file name, not a path: {}",
                self.output_template
            ));
        }
        if let Some(station) = &self.station_id {
            if station.contains(['/', '\\']) || station == ".." {
                return Err(format!("station id must not contain a path: {}", station));
            }
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err("recording extension must not be empty".into());
        }
        if self.stream.fps == 0 {
            return Err("frame rate must be positive".into());
        }
        if self.grab_timeout.is_zero() {
            return Err("grab timeout must be positive".into());
        }
        if self.stop_poll_interval.is_zero() {
            return Err("stop poll interval must be positive".into());
        }
        if self.probe_timeout.is_zero() {
            return Err("probe timeout must be positive".into());
        }
        if self.max_consecutive_disconnects == 0 {
            return Err("consecutive disconnect limit must be at least 1".into());
        }
        if let Some(publish) = &self.publish {
            if publish.port_stride == 0 {
                return Err("publish port stride must be positive".into());
            }
            if publish.host.trim().is_empty() {
                return Err("publish host must not be empty".into());
            }
        }
        Ok(())
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            stream: StreamConfiguration::default(),
            codec: CodecConfiguration::default(),
            output_directory: PathBuf::from("."),
            output_template: "recording".into(),
            station_id: None,
            timestamped: false,
            extension: "svo2".into(),
            force_overwrite: false,
            record: true,
            publish: None,
            grab_timeout: Duration::from_millis(100),
            max_consecutive_disconnects: 30,
            stop_poll_interval: Duration::from_millis(200),
            probe_timeout: Duration::from_secs(2),
            max_duration: None,
        }
    }
}
