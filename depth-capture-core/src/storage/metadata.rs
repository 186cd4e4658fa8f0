use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::config::CodecConfiguration;
use crate::models::device::StreamConfiguration;
use crate::models::error::StorageError;
use crate::models::state::WorkerStatus;

/// Sidecar record written next to every finished recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    pub file_path: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub frames_captured: u64,
    pub frames_missed: u64,
    pub stream: StreamConfiguration,
    pub codec: CodecConfiguration,
    pub status: WorkerStatus,
    pub checksum: Option<String>,
}

impl RecordingMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device_id: &str,
        device_name: &str,
        recording_path: &Path,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        frames_captured: u64,
        frames_missed: u64,
        stream: StreamConfiguration,
        codec: CodecConfiguration,
        status: WorkerStatus,
    ) -> Self {
        let duration_secs = (finished_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
            file_path: recording_path.to_string_lossy().into_owned(),
            started_at,
            finished_at,
            duration_secs,
            frames_captured,
            frames_missed,
            stream,
            codec,
            status,
            checksum: None,
        }
    }

    /// Fill in the SHA-256 of the recording, if the file exists.
    pub fn with_checksum_of(mut self, recording_path: &Path) -> Result<Self, StorageError> {
        self.checksum = if recording_path.exists() {
            Some(sha256_file(recording_path)?)
        } else {
            None
        };
        Ok(self)
    }
}

/// Sidecar location: `{recording stem}.metadata.json`.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write recording metadata as a JSON sidecar file.
pub fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<PathBuf, StorageError> {
    let path = metadata_path(recording_path);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json).map_err(|e| StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, StorageError> {
    let path = metadata_path(recording_path);
    let json = fs::read_to_string(&path).map_err(|e| StorageError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| StorageError(format!("failed to parse metadata: {}", e)))
}

/// SHA-256 hex digest of a file, streamed.
pub fn sha256_file(path: &Path) -> Result<String, StorageError> {
    let file = File::open(path).map_err(|e| StorageError(format!("failed to open file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::new(file), &mut hasher)
        .map_err(|e| StorageError(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
