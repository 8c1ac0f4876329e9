//! File deletion used by the directory model

use std::path::{Path, PathBuf};
use thiserror::Error;

/// File operation errors
#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Trash error: {0}")]
    #[cfg(feature = "trash-support")]
    Trash(#[from] trash::Error),

    #[error("File not found: {0:?}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, FileOpError>;

/// File operations the engine performs on the user's files
pub trait FileOperations: Send + Sync {
    /// Delete a file (move to trash or permanent delete)
    fn delete(&self, path: &Path) -> Result<()>;
}

/// Default implementation backed by the OS
pub struct DefaultFileOperations {
    use_trash: bool,
}

impl DefaultFileOperations {
    pub fn new(use_trash: bool) -> Self {
        Self { use_trash }
    }
}

impl Default for DefaultFileOperations {
    fn default() -> Self {
        Self::new(false)
    }
}

impl FileOperations for DefaultFileOperations {
    fn delete(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(FileOpError::NotFound(path.to_path_buf()));
        }

        #[cfg(feature = "trash-support")]
        if self.use_trash {
            trash::delete(path)?;
            tracing::info!("Moved to trash: {}", path.display());
            return Ok(());
        }

        #[cfg(not(feature = "trash-support"))]
        if self.use_trash {
            tracing::debug!("Trash support disabled, deleting permanently");
        }

        std::fs::remove_file(path)?;
        tracing::warn!("Permanently deleted: {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"test").unwrap();

        let ops = DefaultFileOperations::new(false);
        assert!(ops.delete(&path).is_ok());
        assert!(!path.exists());

        assert!(matches!(ops.delete(&path), Err(FileOpError::NotFound(_))));
    }

    #[test]
    fn test_delete_leaves_other_files() {
        let dir = TempDir::new().unwrap();
        let keep = dir.path().join("keep.jpg");
        let gone = dir.path().join("gone.jpg");
        fs::write(&keep, b"keep").unwrap();
        fs::write(&gone, b"gone").unwrap();

        let ops: &dyn FileOperations = &DefaultFileOperations::default();
        ops.delete(&gone).unwrap();
        assert!(keep.exists());
        assert!(!gone.exists());
    }
}
