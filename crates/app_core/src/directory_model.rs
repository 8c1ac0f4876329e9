//! Directory model: the ordered media list of one directory, the current
//! position into it, and translation of raw watcher events into
//! add/remove/rename/modify changes.

use crate::events::{EventHub, Subscription};
use crate::services::{file_name_of, Thumbnail};
use crate::{AppConfig, AppError, Result};
use app_fs::{compare_entries, FileEntry, FileOperations, FsEvent, ListOptions, SortBy, SortOrder};
use parking_lot::RwLock;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Change notifications. Indices are the ones valid at emission time, so a
/// subscriber replaying the stream in order reproduces the list.
#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    Loaded {
        dir: PathBuf,
        count: usize,
    },
    FileAdded {
        name: String,
        index: usize,
    },
    FileRemoved {
        name: String,
        index: usize,
    },
    FileRenamed {
        old_name: String,
        old_index: usize,
        new_name: String,
        new_index: usize,
    },
    FileModified {
        name: String,
        index: usize,
    },
    IndexChanged {
        old: Option<usize>,
        new: Option<usize>,
    },
    /// Asynchronous selection: settles into `IndexChanged` once loaded
    IndexRequested {
        index: usize,
    },
    SortingChanged {
        count: usize,
        current: Option<usize>,
    },
    ThumbnailsRequested {
        indices: Vec<usize>,
    },
    ThumbnailReady {
        index: usize,
        thumbnail: Thumbnail,
    },
}

#[derive(Debug, Clone)]
struct PendingRemoval {
    entry: FileEntry,
    at: Instant,
}

#[derive(Debug, Default)]
struct ModelState {
    dir: Option<PathBuf>,
    entries: Vec<FileEntry>,
    current: Option<usize>,
    /// Removals held back while a matching creation may still arrive
    pending_removals: Vec<PendingRemoval>,
}

impl ModelState {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Sorted insertion; keeps the current file current
    fn insert_entry(&mut self, entry: FileEntry, options: &ListOptions, events: &mut Vec<DirectoryEvent>) -> usize {
        let index = self.entries.partition_point(|e| {
            compare_entries(e, &entry, options.sort_by, options.sort_order).is_lt()
        });
        events.push(DirectoryEvent::FileAdded {
            name: entry.name.clone(),
            index,
        });
        self.entries.insert(index, entry);

        let old = self.current;
        self.current = match old {
            Some(c) if c >= index => Some(c + 1),
            Some(c) => Some(c),
            None => Some(0),
        };
        if old != self.current {
            events.push(DirectoryEvent::IndexChanged { old, new: self.current });
        }
        index
    }

    /// Removal; a removed current index is re-pointed to `min(index, len - 1)`
    fn remove_entry(&mut self, index: usize, events: &mut Vec<DirectoryEvent>) -> FileEntry {
        let entry = self.entries.remove(index);
        events.push(DirectoryEvent::FileRemoved {
            name: entry.name.clone(),
            index,
        });

        let old = self.current;
        self.current = match old {
            Some(_) if self.entries.is_empty() => None,
            Some(c) if c > index => Some(c - 1),
            Some(c) if c == index => Some(index.min(self.entries.len() - 1)),
            other => other,
        };
        if old != self.current || old == Some(index) {
            events.push(DirectoryEvent::IndexChanged { old, new: self.current });
        }
        entry
    }
}

/// Ordered media list of a directory plus the current position
pub struct DirectoryModel {
    state: RwLock<ModelState>,
    options: RwLock<ListOptions>,
    events: EventHub<DirectoryEvent>,
    file_ops: Arc<dyn FileOperations>,
    rename_window: Duration,
}

impl DirectoryModel {
    pub fn new(file_ops: Arc<dyn FileOperations>, options: ListOptions, rename_window: Duration) -> Self {
        Self {
            state: RwLock::new(ModelState::default()),
            options: RwLock::new(options),
            events: EventHub::new(),
            file_ops,
            rename_window,
        }
    }

    pub fn from_config(config: &AppConfig, file_ops: Arc<dyn FileOperations>) -> Self {
        Self::new(file_ops, config.list_options(), config.directory.rename_window())
    }

    pub fn subscribe(&self) -> Subscription<DirectoryEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventHub<DirectoryEvent> {
        &self.events
    }

    // ===== Queries =====

    pub fn dir(&self) -> Option<PathBuf> {
        self.state.read().dir.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    pub fn contains_images(&self) -> bool {
        !self.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.read().current
    }

    pub fn current_entry(&self) -> Option<FileEntry> {
        let state = self.state.read();
        state.current.and_then(|i| state.entries.get(i).cloned())
    }

    pub fn current_file_name(&self) -> Option<String> {
        self.current_entry().map(|e| e.name)
    }

    pub fn entry(&self, index: usize) -> Option<FileEntry> {
        self.state.read().entries.get(index).cloned()
    }

    pub fn path_at(&self, index: usize) -> Option<PathBuf> {
        self.state.read().entries.get(index).map(|e| e.path.clone())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.state.read().index_of(name)
    }

    pub fn index_of_path(&self, path: &Path) -> Option<usize> {
        self.state.read().entries.iter().position(|e| e.path == path)
    }

    pub fn file_names(&self) -> Vec<String> {
        self.state.read().entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn sorting(&self) -> (SortBy, SortOrder) {
        let options = self.options.read();
        (options.sort_by, options.sort_order)
    }

    /// Whether `path` names a file this model would list
    pub fn is_supported(&self, path: &Path) -> bool {
        app_fs::is_media_file(path)
    }

    // ===== Mutations =====

    /// Replace the model contents with the media files of `path`
    pub fn set_current_dir(&self, path: &Path) -> Result<()> {
        let options = self.options.read().clone();
        let entries = app_fs::list_media(path, &options).map_err(|e| {
            tracing::warn!("Cannot open directory {}: {}", path.display(), e);
            AppError::InvalidPath(path.to_path_buf())
        })?;

        let mut state = self.state.write();
        let count = entries.len();
        *state = ModelState {
            dir: Some(path.to_path_buf()),
            current: if count > 0 { Some(0) } else { None },
            entries,
            pending_removals: Vec::new(),
        };

        tracing::info!("Directory loaded: {} ({} files)", path.display(), count);
        self.events.emit(DirectoryEvent::Loaded {
            dir: path.to_path_buf(),
            count,
        });
        Ok(())
    }

    /// Set the current position immediately. Setting the same index again is a no-op.
    pub fn set_index(&self, index: usize) -> Result<()> {
        let mut state = self.state.write();
        let len = state.entries.len();
        if index >= len {
            return Err(AppError::OutOfRange { index, len });
        }

        let old = state.current;
        if old == Some(index) {
            return Ok(());
        }
        state.current = Some(index);

        tracing::debug!("Index changed: {:?} -> {}", old, index);
        self.events.emit(DirectoryEvent::IndexChanged {
            old,
            new: Some(index),
        });
        Ok(())
    }

    /// Request a position change that settles once the item at `index` is loaded
    pub fn set_index_async(&self, index: usize) -> Result<()> {
        let state = self.state.read();
        let len = state.entries.len();
        if index >= len {
            return Err(AppError::OutOfRange { index, len });
        }

        self.events.emit(DirectoryEvent::IndexRequested { index });
        Ok(())
    }

    /// Delete the file at `index` from disk and from the model.
    /// The model is left unchanged when the deletion fails.
    pub fn remove_at(&self, index: usize) -> Result<FileEntry> {
        let mut state = self.state.write();
        let len = state.entries.len();
        if index >= len {
            return Err(AppError::OutOfRange { index, len });
        }

        let path = state.entries[index].path.clone();
        self.file_ops.delete(&path).map_err(|e| {
            tracing::warn!("Delete failed for {}: {}", path.display(), e);
            AppError::FileOp(e)
        })?;

        let mut events = Vec::new();
        let entry = state.remove_entry(index, &mut events);
        for event in events {
            self.events.emit(event);
        }
        Ok(entry)
    }

    /// Re-sort in place; the current file stays current
    pub fn set_sorting(&self, sort_by: SortBy, sort_order: SortOrder) {
        let options = {
            let mut options = self.options.write();
            if options.sort_by == sort_by && options.sort_order == sort_order {
                return;
            }
            options.sort_by = sort_by;
            options.sort_order = sort_order;
            options.clone()
        };

        let mut state = self.state.write();
        let current_name = state.current.and_then(|i| state.entries.get(i)).map(|e| e.name.clone());
        app_fs::sort_entries(&mut state.entries, options.sort_by, options.sort_order);
        let current = current_name.and_then(|name| state.index_of(&name));
        state.current = current;

        tracing::info!("Sorting changed: {:?} {:?}", sort_by, sort_order);
        self.events.emit(DirectoryEvent::SortingChanged {
            count: state.entries.len(),
            current: state.current,
        });
    }

    /// Ask for thumbnails of the items in `range` (clipped to the list)
    pub fn request_thumbnails(&self, range: Range<usize>) {
        let len = self.len();
        let indices: Vec<usize> = (range.start.min(len)..range.end.min(len)).collect();
        if !indices.is_empty() {
            self.events.emit(DirectoryEvent::ThumbnailsRequested { indices });
        }
    }

    /// Publish a finished thumbnail at the current index of its file
    pub fn thumbnail_ready(&self, thumbnail: Thumbnail) {
        let state = self.state.read();
        match state.index_of(&thumbnail.name) {
            Some(index) => self.events.emit(DirectoryEvent::ThumbnailReady { index, thumbnail }),
            None => tracing::trace!("Thumbnail for vanished file: {}", thumbnail.name),
        }
    }

    // ===== Filesystem events =====

    /// Fold raw watcher events into the model.
    ///
    /// A removal is held back for the rename window; a creation with the same
    /// size and timestamp inside the window turns the pair into one rename.
    /// Removals older than the window are applied at the end.
    pub fn apply_fs_events(&self, fs_events: &[FsEvent], now: Instant) {
        let options = self.options.read().clone();
        let mut state = self.state.write();
        let Some(dir) = state.dir.clone() else {
            return;
        };

        let mut events = Vec::new();
        self.flush_expired_locked(&mut state, now, &mut events);

        for fs_event in fs_events {
            let path = fs_event.path();
            if path.parent() != Some(dir.as_path()) || !app_fs::is_media_file(path) {
                continue;
            }
            let name = file_name_of(path);

            match fs_event {
                FsEvent::Removed(_) => {
                    let pending = state.pending_removals.iter().any(|p| p.entry.name == name);
                    if let (Some(index), false) = (state.index_of(&name), pending) {
                        let entry = state.entries[index].clone();
                        state.pending_removals.push(PendingRemoval { entry, at: now });
                    }
                }
                FsEvent::Created(_) | FsEvent::Modified(_) => {
                    let entry = match FileEntry::from_path(path) {
                        Ok(entry) => entry,
                        Err(e) => {
                            tracing::debug!("Ignoring {}: {}", path.display(), e);
                            continue;
                        }
                    };
                    if !options.show_hidden && entry.name.starts_with('.') {
                        continue;
                    }

                    if let Some(index) = state.index_of(&name) {
                        // Recreated under the same name counts as a modification
                        state.pending_removals.retain(|p| p.entry.name != name);
                        state.entries[index] = entry;
                        events.push(DirectoryEvent::FileModified { name, index });
                        continue;
                    }

                    let window = self.rename_window;
                    let partner = state.pending_removals.iter().position(|p| {
                        now.saturating_duration_since(p.at) <= window && p.entry.same_content_stamp(&entry)
                    });

                    match partner {
                        Some(p) => {
                            let removed = state.pending_removals.remove(p);
                            self.rename_entry(&mut state, &removed.entry.name, entry, &options, &mut events);
                        }
                        None => {
                            tracing::debug!("File added: {}", name);
                            state.insert_entry(entry, &options, &mut events);
                        }
                    }
                }
            }
        }

        self.flush_expired_locked(&mut state, now, &mut events);

        for event in events {
            self.events.emit(event);
        }
    }

    /// Apply removals whose rename window has elapsed
    pub fn flush_expired(&self, now: Instant) {
        let mut state = self.state.write();
        let mut events = Vec::new();
        self.flush_expired_locked(&mut state, now, &mut events);
        for event in events {
            self.events.emit(event);
        }
    }

    pub fn has_pending_removals(&self) -> bool {
        !self.state.read().pending_removals.is_empty()
    }

    fn flush_expired_locked(&self, state: &mut ModelState, now: Instant, events: &mut Vec<DirectoryEvent>) {
        let window = self.rename_window;
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending_removals)
            .into_iter()
            .partition(|p| now.saturating_duration_since(p.at) >= window);
        state.pending_removals = kept;

        for pending in expired {
            if let Some(index) = state.index_of(&pending.entry.name) {
                tracing::debug!("File removed: {}", pending.entry.name);
                state.remove_entry(index, events);
            }
        }
    }

    fn rename_entry(
        &self,
        state: &mut ModelState,
        old_name: &str,
        new_entry: FileEntry,
        options: &ListOptions,
        events: &mut Vec<DirectoryEvent>,
    ) {
        let Some(old_index) = state.index_of(old_name) else {
            return;
        };
        let was_current = state.current == Some(old_index);
        let old_current = state.current;

        state.entries.remove(old_index);
        let new_name = new_entry.name.clone();
        let new_index = state.entries.partition_point(|e| {
            compare_entries(e, &new_entry, options.sort_by, options.sort_order).is_lt()
        });
        state.entries.insert(new_index, new_entry);

        tracing::debug!("File renamed: {} -> {}", old_name, new_name);
        events.push(DirectoryEvent::FileRenamed {
            old_name: old_name.to_string(),
            old_index,
            new_name,
            new_index,
        });

        if was_current {
            // Followed silently: views reselect from the rename itself
            state.current = Some(new_index);
            return;
        }

        if let Some(mut c) = old_current {
            if c > old_index {
                c -= 1;
            }
            if c >= new_index {
                c += 1;
            }
            state.current = Some(c);
            if old_current != state.current {
                events.push(DirectoryEvent::IndexChanged {
                    old: old_current,
                    new: state.current,
                });
            }
        }
    }
}
