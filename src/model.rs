use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Media kind resolved from a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileKind {
    Image,
    RawImage,
    Video,
}

impl FileKind {
    /// Single-letter form used by the `{type}` template field.
    pub fn short_str(self) -> &'static str {
        match self {
            FileKind::Image | FileKind::RawImage => "p",
            FileKind::Video => "v",
        }
    }

    /// Full word used by the `{longtype}` template field.
    pub fn long_str(self) -> &'static str {
        match self {
            FileKind::Image => "photo",
            FileKind::RawImage => "raw",
            FileKind::Video => "video",
        }
    }
}

/// Fixed per-file record produced by a [`crate::metadata::MetadataProvider`].
///
/// Date/time fields are zero-padded strings and always populated: when a
/// file carries no usable EXIF timestamp the filesystem modify time fills
/// them in. `prefix`/`number` come from the original file name stem;
/// `number` preserves leading zeros. `extension` is lower-cased and keeps
/// its leading dot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub kind: FileKind,
    pub prefix: String,
    pub number: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
    pub minute: String,
    pub second: String,
    pub model: String,
    pub original_stem: String,
    pub extension: String,
    pub file_size: u64,
}

/// Lower-cased camera model -> user-chosen short display string.
/// Consulted only by the `{alias}` template field.
pub type AliasTable = HashMap<String, String>;

/// Adds one alias entry. Keys match case-insensitively, so they are
/// stored lower-cased; values end up inside rendered file names and go
/// through the same component cleanup as any other name fragment.
pub fn insert_alias(table: &mut AliasTable, model: &str, value: &str) {
    table.insert(
        model.trim().to_lowercase(),
        crate::path_norm::sanitize_component(value),
    );
}

/// What to do when a transfer destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    Skip,
    Rename,
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferMode {
    Copy,
    Move,
}

/// One scan root. Unselected entries keep their position in the list so
/// that leaf `source_dir` indexes stay valid across toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDir {
    pub path: PathBuf,
    pub selected: bool,
}

impl SourceDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            selected: true,
        }
    }
}

/// Which media kinds a scan accepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFilter {
    pub images: bool,
    pub raw_images: bool,
    pub video: bool,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            images: true,
            raw_images: true,
            video: true,
        }
    }
}

impl ScanFilter {
    pub fn allows(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::Image => self.images,
            FileKind::RawImage => self.raw_images,
            FileKind::Video => self.video,
        }
    }
}

/// Progress checkpoint emitted after each scanned directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub current_dir: String,
    pub found: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanStatus {
    Completed,
    /// A full scan accepted zero files. Terminal state, not an error.
    NothingFound,
    Cancelled,
}

/// Recovered per-file problem during a scan (metadata extraction failure,
/// unreadable directory). The file is skipped, the scan continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanWarning {
    pub path: String,
    pub message: String,
}

/// Progress checkpoint emitted while transferring; throttled to roughly
/// one update per percent of the total for large batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub processed: usize,
    pub total: usize,
    pub current_path: Option<String>,
    pub done: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogSeverity {
    Error,
    Warning,
    Info,
}

/// One line of the user-visible operation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLogEntry {
    pub severity: LogSeverity,
    pub path: String,
    pub message: String,
}

/// Final accounting of a transfer run. `processed` counts every leaf the
/// executor looked at; files not reached after a cancellation are in none
/// of the buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub log: Vec<TransferLogEntry>,
}

impl TransferReport {
    pub fn warnings(&self) -> usize {
        self.log
            .iter()
            .filter(|entry| entry.severity == LogSeverity::Warning)
            .count()
    }

    /// True for a fully successful, uncancelled run. Hosts may close the
    /// session automatically on this, per user preference.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.failed == 0 && self.skipped == 0
    }
}

/// Shared cooperative-cancellation flag. Scanning checks it after each
/// directory, transferring before each file; a single file operation is
/// never interrupted mid-flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
