//! Directory browser - media listing and sorting

use crate::{FsError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "ico", "tiff", "tif",
];

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "avi", "m4v"];

/// Coarse media class derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Classify a path by extension. `None` means the file is not media.
pub fn classify(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Check if a file is a supported image or video
pub fn is_media_file(path: &Path) -> bool {
    classify(path).is_some()
}

/// Media file with the metadata the directory model needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Modification time (Unix epoch seconds)
    pub modified: Option<i64>,
    pub kind: MediaKind,
}

impl FileEntry {
    /// Build an entry from a path on disk. Fails for directories and non-media files.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let kind = classify(path)
            .ok_or_else(|| FsError::InvalidPath(format!("Not a media file: {}", path.display())))?;

        let metadata = fs::metadata(path)?;
        if metadata.is_dir() {
            return Err(FsError::InvalidPath(format!("Is a directory: {}", path.display())));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            modified,
            kind,
        })
    }

    /// Same size and timestamp; used to pair a removal with a creation
    pub fn same_content_stamp(&self, other: &FileEntry) -> bool {
        self.size == other.size && self.modified == other.modified
    }
}

/// Sort key for media listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "size")]
    Size,
    #[serde(rename = "modified")]
    Modified,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

/// Options for listing directory contents
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub show_hidden: bool,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            show_hidden: false,
            sort_by: SortBy::Name,
            sort_order: SortOrder::Ascending,
        }
    }
}

/// List the media files of a directory, sorted per `options`
pub fn list_media<P: AsRef<Path>>(path: P, options: &ListOptions) -> Result<Vec<FileEntry>> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(FsError::NotFound(path.display().to_string()));
    }

    if !path.is_dir() {
        return Err(FsError::InvalidPath(format!("Not a directory: {}", path.display())));
    }

    let mut entries = Vec::new();

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();

        if !is_media_file(&entry_path) {
            continue;
        }

        let file_entry = match FileEntry::from_path(&entry_path) {
            Ok(e) => e,
            Err(_) => continue, // Skip entries we can't read
        };

        if !options.show_hidden && is_hidden_file(&entry_path, &file_entry.name) {
            continue;
        }

        entries.push(file_entry);
    }

    sort_entries(&mut entries, options.sort_by, options.sort_order);

    Ok(entries)
}

/// Compare two entries under a sort key and direction
pub fn compare_entries(a: &FileEntry, b: &FileEntry, sort_by: SortBy, order: SortOrder) -> Ordering {
    let by_name = || natural_sort_key(&a.name).cmp(&natural_sort_key(&b.name));

    let cmp = match sort_by {
        SortBy::Name => by_name(),
        SortBy::Size => a.size.cmp(&b.size).then_with(by_name),
        SortBy::Modified => a.modified.cmp(&b.modified).then_with(by_name),
    };

    match order {
        SortOrder::Ascending => cmp,
        SortOrder::Descending => cmp.reverse(),
    }
}

/// Sort file entries
pub fn sort_entries(entries: &mut [FileEntry], sort_by: SortBy, order: SortOrder) {
    entries.sort_by(|a, b| compare_entries(a, b, sort_by, order));
}

/// Generate a natural sort key (handles numbers correctly)
/// "image2.jpg" < "image10.jpg"
fn natural_sort_key(s: &str) -> Vec<NaturalSortPart> {
    let mut parts = Vec::new();
    let mut current_num = String::new();
    let mut current_str = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            if !current_str.is_empty() {
                parts.push(NaturalSortPart::Str(current_str.to_lowercase()));
                current_str.clear();
            }
            current_num.push(c);
        } else {
            if !current_num.is_empty() {
                if let Ok(n) = current_num.parse::<u64>() {
                    parts.push(NaturalSortPart::Num(n));
                }
                current_num.clear();
            }
            current_str.push(c);
        }
    }

    if !current_num.is_empty() {
        if let Ok(n) = current_num.parse::<u64>() {
            parts.push(NaturalSortPart::Num(n));
        }
    }
    if !current_str.is_empty() {
        parts.push(NaturalSortPart::Str(current_str.to_lowercase()));
    }

    parts
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalSortPart {
    Num(u64),
    Str(String),
}

#[cfg(windows)]
fn is_hidden_file(path: &Path, _name: &str) -> bool {
    use std::os::windows::fs::MetadataExt;

    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;

    fs::metadata(path)
        .map(|m| m.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
fn is_hidden_file(_path: &Path, name: &str) -> bool {
    name.starts_with('.')
}
