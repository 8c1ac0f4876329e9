//! imgdeck File System Layer
//!
//! Provides the filesystem side of the directory engine:
//! - Directory listing with media classification and sorting
//! - File watching (raw created/modified/removed events)
//! - File deletion (recycle bin or permanent)

mod browser;
mod file_operations;
mod watcher;

pub use browser::{
    classify, compare_entries, is_media_file, list_media, sort_entries, FileEntry, ListOptions, MediaKind, SortBy,
    SortOrder,
};
pub use file_operations::{DefaultFileOperations, FileOpError, FileOperations};
pub use watcher::{FileWatcher, FsEvent};

use thiserror::Error;

/// File system errors
#[derive(Error, Debug)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
