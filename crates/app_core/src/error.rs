//! Engine error types

use std::path::PathBuf;
use thiserror::Error;

/// Main engine error type.
///
/// Structural errors (`InvalidPath`, `OutOfRange`) are rejected at the call
/// boundary. `Decode` never crosses the worker boundary as an `Err`: workers
/// deliver it inside a completion event instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid path: {0:?}")]
    InvalidPath(PathBuf),

    #[error("Index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File operation failed: {0}")]
    FileOp(#[from] app_fs::FileOpError),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker unavailable: {0}")]
    WorkerGone(&'static str),
}

impl AppError {
    /// Errors that leave the engine state untouched and can just be reported
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::WorkerGone(_) | AppError::Config(_))
    }

    /// Get a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidPath(path) => format!("Cannot open: {}", path.display()),
            AppError::Decode(e) => format!("Cannot load image: {}", e),
            AppError::FileOp(e) => format!("File operation failed: {}", e),
            _ => self.to_string(),
        }
    }
}

impl From<app_fs::FsError> for AppError {
    fn from(e: app_fs::FsError) -> Self {
        match e {
            app_fs::FsError::NotFound(p) => AppError::InvalidPath(PathBuf::from(p)),
            app_fs::FsError::InvalidPath(msg) => AppError::InvalidPath(PathBuf::from(msg)),
            app_fs::FsError::Io(e) => AppError::Io(e),
            app_fs::FsError::Watch(e) => AppError::Watcher(e.to_string()),
        }
    }
}

/// Per-item decode failure. Cloneable so it can ride along completion events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("read failed for {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("decode failed for {path:?}: {message}")]
    Image { path: PathBuf, message: String },

    #[error("unsupported media: {0:?}")]
    Unsupported(PathBuf),
}

impl DecodeError {
    pub fn image(path: &std::path::Path, e: image::ImageError) -> Self {
        DecodeError::Image {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }

    pub fn io(path: &std::path::Path, e: std::io::Error) -> Self {
        DecodeError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
