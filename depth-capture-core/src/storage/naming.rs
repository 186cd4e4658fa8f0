//! Deterministic per-device recording paths and the pre-flight
//! destination check that runs before any worker starts.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};

use crate::models::config::CaptureConfiguration;
use crate::models::error::{CollisionReason, RunError, StorageError};

/// Extensions accepted as already present on a template.
pub const RECORDING_EXTENSIONS: &[&str] = &["svo", "svo2"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Builds `[station_][timestamp_]<stem>_<device id>.<ext>` paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNaming {
    directory: PathBuf,
    prefix: String,
    stem: String,
    extension: String,
}

impl OutputNaming {
    pub fn new(
        directory: impl Into<PathBuf>,
        template: &str,
        default_extension: &str,
        station_id: Option<&str>,
        timestamp: Option<&str>,
    ) -> Self {
        let default_extension = default_extension.trim_start_matches('.');
        let (stem, extension) = split_template(template, default_extension);

        let mut prefix = String::new();
        for part in [station_id, timestamp].into_iter().flatten() {
            if !part.is_empty() {
                prefix.push_str(part);
                prefix.push('_');
            }
        }

        Self {
            directory: directory.into(),
            prefix,
            stem,
            extension,
        }
    }

    /// Naming for a run that started at `started_at`.
    pub fn from_config(config: &CaptureConfiguration, started_at: DateTime<Utc>) -> Self {
        let timestamp = config
            .timestamped
            .then(|| started_at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string());
        Self::new(
            config.output_directory.clone(),
            &config.output_template,
            &config.extension,
            config.station_id.as_deref(),
            timestamp.as_deref(),
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn file_name_for(&self, device_id: &str) -> String {
        format!(
            "{}{}_{}.{}",
            self.prefix,
            self.stem,
            sanitize_device_id(device_id),
            self.extension
        )
    }

    pub fn target_for(&self, device_id: &str) -> PathBuf {
        self.directory.join(self.file_name_for(device_id))
    }
}

/// Use the template's own extension when it is a recording extension,
/// otherwise append the configured one.
fn split_template(template: &str, default_extension: &str) -> (String, String) {
    let path = Path::new(template);
    if let (Some(stem), Some(ext)) = (path.file_stem(), path.extension()) {
        let ext = ext.to_string_lossy();
        let known = RECORDING_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
            || ext.eq_ignore_ascii_case(default_extension);
        if known {
            return (stem.to_string_lossy().into_owned(), ext.into_owned());
        }
    }
    (template.to_string(), default_extension.to_string())
}

/// Map a device id onto `[A-Za-z0-9_-]`.
pub fn sanitize_device_id(id: &str) -> String {
    let sanitized: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "device".into()
    } else {
        sanitized
    }
}

/// Reject duplicate targets, and existing files unless `allow_existing`.
pub fn check_destinations<'a>(
    targets: impl IntoIterator<Item = &'a Path>,
    allow_existing: bool,
) -> Result<(), RunError> {
    let mut seen = HashSet::new();
    for target in targets {
        if !seen.insert(target) {
            return Err(RunError::DestinationCollision {
                path: target.to_path_buf(),
                reason: CollisionReason::Duplicate,
            });
        }
        if !allow_existing && target.exists() {
            return Err(RunError::DestinationCollision {
                path: target.to_path_buf(),
                reason: CollisionReason::Exists,
            });
        }
    }
    Ok(())
}

pub fn ensure_directory(directory: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(directory).map_err(|e| {
        StorageError(format!(
            "failed to create output directory {}: {}",
            directory.display(),
            e
        ))
    })
}
