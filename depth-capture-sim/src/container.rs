use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use depth_capture_core::models::config::{CodecConfiguration, CompressionMode};
use depth_capture_core::models::device::{DepthMode, FrameInfo, StreamConfiguration};

pub const CONTAINER_MAGIC: &[u8; 4] = b"DCAP";
pub const CONTAINER_VERSION: u16 = 1;
pub const HEADER_SIZE: u64 = 32;
pub const FRAME_RECORD_SIZE: u64 = 16;

const FRAME_COUNT_OFFSET: u64 = 20;

/// Streaming writer for the simulated recording container.
///
/// ## File Format
///
/// ```text
/// [32-byte header]
///   0  magic "DCAP"
///   4  version        u16 LE
///   6  compression    u8
///   7  depth mode     u8
///   8  width          u32 LE
///  12  height         u32 LE
///  16  fps            u32 LE
///  20  frame count    u64 LE  (0 until finished)
///  28  reserved       4 bytes
/// [frame records, 16 bytes each: sequence u64 LE | timestamp_us u64 LE]
/// ```
///
/// A container whose frame count is still zero while frame records follow
/// was not finished cleanly.
pub struct ContainerWriter {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    frames_written: u64,
}

impl ContainerWriter {
    /// Create the file and write the header.
    pub fn create(file_path: &Path, stream: &StreamConfiguration, codec: &CodecConfiguration) -> io::Result<Self> {
        let mut file = BufWriter::new(File::create(file_path)?);
        let (width, height) = stream.resolution.dimensions();

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..4].copy_from_slice(CONTAINER_MAGIC);
        header[4..6].copy_from_slice(&CONTAINER_VERSION.to_le_bytes());
        header[6] = compression_code(codec.compression);
        header[7] = depth_code(stream.depth_mode);
        header[8..12].copy_from_slice(&width.to_le_bytes());
        header[12..16].copy_from_slice(&height.to_le_bytes());
        header[16..20].copy_from_slice(&stream.fps.to_le_bytes());
        file.write_all(&header)?;

        Ok(Self {
            file_path: file_path.to_path_buf(),
            file: Some(file),
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &FrameInfo) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(not_open)?;
        file.write_all(&frame.sequence.to_le_bytes())?;
        file.write_all(&frame.timestamp_us.to_le_bytes())?;
        self.frames_written += 1;
        Ok(())
    }

    /// Patch the frame count into the header and flush. Returns the frame count.
    pub fn finish(&mut self) -> io::Result<u64> {
        let mut file = self.file.take().ok_or_else(not_open)?;
        file.seek(SeekFrom::Start(FRAME_COUNT_OFFSET))?;
        file.write_all(&self.frames_written.to_le_bytes())?;
        file.flush()?;
        file.get_ref().sync_all()?;
        Ok(self.frames_written)
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Header fields of a finished container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    pub compression: CompressionMode,
    pub depth_mode: DepthMode,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_count: u64,
}

impl ContainerHeader {
    pub fn read_from(path: &Path) -> io::Result<Self> {
        let mut header = [0u8; HEADER_SIZE as usize];
        File::open(path)?.read_exact(&mut header)?;
        if &header[0..4] != CONTAINER_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a capture container"));
        }

        let u32_at = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
        let mut count = [0u8; 8];
        count.copy_from_slice(&header[20..28]);

        Ok(Self {
            version: u16::from_le_bytes([header[4], header[5]]),
            compression: compression_from_code(header[6])?,
            depth_mode: depth_from_code(header[7])?,
            width: u32_at(8),
            height: u32_at(12),
            fps: u32_at(16),
            frame_count: u64::from_le_bytes(count),
        })
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "container is not open")
}

fn invalid(what: &str, code: u8) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("unknown {} code {}", what, code))
}

fn compression_code(mode: CompressionMode) -> u8 {
    match mode {
        CompressionMode::H264 => 1,
        CompressionMode::H265 => 2,
        CompressionMode::Lossless => 3,
    }
}

fn compression_from_code(code: u8) -> io::Result<CompressionMode> {
    match code {
        1 => Ok(CompressionMode::H264),
        2 => Ok(CompressionMode::H265),
        3 => Ok(CompressionMode::Lossless),
        other => Err(invalid("compression", other)),
    }
}

fn depth_code(mode: DepthMode) -> u8 {
    match mode {
        DepthMode::None => 0,
        DepthMode::Performance => 1,
        DepthMode::Quality => 2,
        DepthMode::Ultra => 3,
        DepthMode::Neural => 4,
    }
}

fn depth_from_code(code: u8) -> io::Result<DepthMode> {
    match code {
        0 => Ok(DepthMode::None),
        1 => Ok(DepthMode::Performance),
        2 => Ok(DepthMode::Quality),
        3 => Ok(DepthMode::Ultra),
        4 => Ok(DepthMode::Neural),
        other => Err(invalid("depth mode", other)),
    }
}
