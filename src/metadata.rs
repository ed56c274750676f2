use crate::model::{FileKind, FileMetadata};
use chrono::{DateTime, Datelike, Local, NaiveDateTime, Timelike};
use exif::{In, Reader, Tag, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// Splits an original file stem into prefix and shot number, e.g.
/// `IMG_0042` -> (`IMG`, `0042`). Some vendors get creative with names,
/// so both groups are optional.
static FNAME_PARTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)[-_]?(\d+)?$").expect("failed to compile file name regex"));

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown file type")]
    UnknownType,
}

/// Extension (lower-cased, with leading dot) -> media kind table.
/// Seeded with the stock RAW/image/video sets; hosts may extend it from
/// their configuration.
#[derive(Debug, Clone)]
pub struct KnownFileTypes {
    extensions: HashMap<String, FileKind>,
}

const RAW_IMAGE_EXTENSIONS: &[&str] = &[
    ".nef", ".cr2", ".cr3", ".crf", ".crw", ".3fr", ".arw", ".dcr", ".dng", ".fff", ".iiq",
    ".kdc", ".mef", ".mos", ".mrw", ".nrw", ".orf", ".pef", ".raf", ".raw", ".rw2", ".rwl",
    ".rwz", ".sr2", ".srf", ".srw", ".x3f", ".arq",
];

const IMAGE_EXTENSIONS: &[&str] = &[".tif", ".tiff", ".jpg", ".jpeg", ".png"];

const VIDEO_EXTENSIONS: &[&str] = &[
    ".mov", ".avi", ".mpg", ".vob", ".ts", ".mp4", ".m4v", ".mkv",
];

impl Default for KnownFileTypes {
    fn default() -> Self {
        let mut types = Self {
            extensions: HashMap::new(),
        };
        types.add_extensions(FileKind::RawImage, RAW_IMAGE_EXTENSIONS.iter().copied());
        types.add_extensions(FileKind::Image, IMAGE_EXTENSIONS.iter().copied());
        types.add_extensions(FileKind::Video, VIDEO_EXTENSIONS.iter().copied());
        types
    }
}

impl KnownFileTypes {
    pub fn add_extensions<'a>(&mut self, kind: FileKind, extensions: impl IntoIterator<Item = &'a str>) {
        for ext in extensions {
            let ext = ext.trim().to_lowercase();
            if ext.is_empty() {
                continue;
            }
            let ext = if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            };
            self.extensions.insert(ext, kind);
        }
    }

    /// Media kind for a path, or `None` when the extension is unknown;
    /// such files are excluded before any metadata extraction happens.
    pub fn kind_of(&self, path: &Path) -> Option<FileKind> {
        let ext = path.extension()?.to_str()?;
        self.extensions.get(&format!(".{}", ext.to_lowercase())).copied()
    }
}

/// External collaborator boundary: given a path, produce the fixed
/// metadata record templates evaluate against. A failure on one file is
/// recovered by the scan (warning + skip), never fatal.
pub trait MetadataProvider {
    fn metadata(&self, path: &Path) -> Result<FileMetadata, MetadataError>;
}

/// Default provider: EXIF timestamp/model for still images, filesystem
/// modify time as the date fallback, original-name prefix/number split.
#[derive(Debug, Clone, Default)]
pub struct ExifMetadataProvider {
    types: KnownFileTypes,
}

impl ExifMetadataProvider {
    pub fn new(types: KnownFileTypes) -> Self {
        Self { types }
    }
}

impl MetadataProvider for ExifMetadataProvider {
    fn metadata(&self, path: &Path) -> Result<FileMetadata, MetadataError> {
        let kind = self.types.kind_of(path).ok_or(MetadataError::UnknownType)?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        let (prefix, number) = split_stem(&stem);

        // exiv-style libraries choke on plain video containers; videos
        // always take the mtime fallback.
        let (exif_datetime, model) = if kind == FileKind::Video {
            (None, String::new())
        } else {
            read_exif(path)
        };

        let stat = fs::metadata(path)?;
        let timestamp = match exif_datetime {
            Some(dt) => dt,
            None => DateTime::<Local>::from(stat.modified()?).naive_local(),
        };

        Ok(FileMetadata {
            kind,
            prefix,
            number,
            year: format!("{:04}", timestamp.year()),
            month: format!("{:02}", timestamp.month()),
            day: format!("{:02}", timestamp.day()),
            hour: format!("{:02}", timestamp.hour()),
            minute: format!("{:02}", timestamp.minute()),
            second: format!("{:02}", timestamp.second()),
            model,
            original_stem: stem,
            extension,
            file_size: stat.len(),
        })
    }
}

fn split_stem(stem: &str) -> (String, String) {
    let Some(captures) = FNAME_PARTS_RE.captures(stem) else {
        return (String::new(), String::new());
    };
    let prefix = captures
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let number = captures
        .get(2)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    (prefix, number)
}

/// Best effort: files without readable EXIF simply yield no timestamp
/// and no model, and the caller falls back to the filesystem mtime.
fn read_exif(path: &Path) -> (Option<NaiveDateTime>, String) {
    let Ok(file) = fs::File::open(path) else {
        return (None, String::new());
    };
    let mut reader = BufReader::new(file);
    let Ok(exif) = Reader::new().read_from_container(&mut reader) else {
        return (None, String::new());
    };

    let datetime = exif
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))
        .and_then(|field| ascii_value(&field.value))
        .and_then(|raw| parse_exif_datetime(&raw));

    let model = exif
        .get_field(Tag::Model, In::PRIMARY)
        .and_then(|field| ascii_value(&field.value))
        .map(|raw| raw.trim().to_string())
        .unwrap_or_default();

    (datetime, model)
}

/// Extract the raw ASCII bytes directly instead of `display_value()`,
/// which wraps the string in double quotes causing parse failure.
fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) if !vec.is_empty() => String::from_utf8(vec[0].clone()).ok(),
        _ => None,
    }
}

fn parse_exif_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim().trim_matches('"');
    let dt = NaiveDateTime::parse_from_str(trimmed, "%Y:%m:%d %H:%M:%S").ok()?;
    // Some cameras write garbage timestamps; anything out of a sane
    // calendar range falls back to the file mtime.
    if dt.year() < 1800 {
        return None;
    }
    Some(dt)
}
