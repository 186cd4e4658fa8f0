use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sensor output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Resolution {
    Hd2k,
    Hd1080,
    Hd720,
    Vga,
}

impl Resolution {
    /// Width and height of a single image, in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Hd2k => (2208, 1242),
            Self::Hd1080 => (1920, 1080),
            Self::Hd720 => (1280, 720),
            Self::Vga => (672, 376),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hd2k => "HD2K",
            Self::Hd1080 => "HD1080",
            Self::Hd720 => "HD720",
            Self::Vga => "VGA",
        };
        f.write_str(name)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HD2K" | "2K" => Ok(Self::Hd2k),
            "HD1080" | "1080P" => Ok(Self::Hd1080),
            "HD720" | "720P" => Ok(Self::Hd720),
            "VGA" => Ok(Self::Vga),
            other => Err(format!("unknown resolution: {}", other)),
        }
    }
}

/// Depth computation mode requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DepthMode {
    None,
    Performance,
    Quality,
    Ultra,
    Neural,
}

impl fmt::Display for DepthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Performance => "PERFORMANCE",
            Self::Quality => "QUALITY",
            Self::Ultra => "ULTRA",
            Self::Neural => "NEURAL",
        };
        f.write_str(name)
    }
}

impl FromStr for DepthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "PERFORMANCE" => Ok(Self::Performance),
            "QUALITY" => Ok(Self::Quality),
            "ULTRA" => Ok(Self::Ultra),
            "NEURAL" => Ok(Self::Neural),
            other => Err(format!("unknown depth mode: {}", other)),
        }
    }
}

/// Resolution, frame rate and depth mode of one device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamConfiguration {
    pub resolution: Resolution,
    pub fps: u32,
    pub depth_mode: DepthMode,
}

impl Default for StreamConfiguration {
    fn default() -> Self {
        // 30 fps keeps several HD1080 streams inside USB3 bandwidth.
        Self {
            resolution: Resolution::Hd1080,
            fps: 30,
            depth_mode: DepthMode::Ultra,
        }
    }
}

impl fmt::Display for StreamConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}fps depth={}", self.resolution, self.fps, self.depth_mode)
    }
}

/// Immutable identity of one attached device, produced by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Serial number, or enumeration index when the device has none.
    pub id: String,
    pub name: String,
    pub configuration: StreamConfiguration,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, configuration: StreamConfiguration) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            configuration,
        }
    }
}

/// A frame the device reported as available after a successful grab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub sequence: u64,
    pub timestamp_us: u64,
}
