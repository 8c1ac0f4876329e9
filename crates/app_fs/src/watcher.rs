//! Directory watcher with notify-debouncer-mini

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

/// Raw file system event at OS granularity.
///
/// Renames are not reported as such: a rename shows up as `Removed(old)`
/// plus `Created(new)` and is paired up by the directory model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

impl FsEvent {
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Created(p) | FsEvent::Modified(p) | FsEvent::Removed(p) => p,
        }
    }
}

/// Watches a single directory (non-recursive) with debouncing
pub struct FileWatcher {
    debouncer: Debouncer<RecommendedWatcher>,
    event_rx: Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
    watched: Option<PathBuf>,
}

impl FileWatcher {
    /// Create a new watcher with the given debounce interval
    pub fn new(debounce: Duration) -> Result<Self, notify::Error> {
        let (tx, rx) = channel();

        let debouncer = new_debouncer(debounce, tx)?;

        Ok(Self {
            debouncer,
            event_rx: rx,
            watched: None,
        })
    }

    /// Watch `dir`, replacing any previously watched directory
    pub fn watch_dir(&mut self, dir: &Path) -> Result<(), notify::Error> {
        if let Some(old) = self.watched.take() {
            if let Err(e) = self.debouncer.watcher().unwatch(&old) {
                tracing::debug!("Unwatch failed for {}: {}", old.display(), e);
            }
        }

        self.debouncer.watcher().watch(dir, RecursiveMode::NonRecursive)?;
        self.watched = Some(dir.to_path_buf());
        tracing::info!("Watching: {}", dir.display());
        Ok(())
    }

    /// Stop watching
    pub fn unwatch(&mut self) -> Result<(), notify::Error> {
        if let Some(dir) = self.watched.take() {
            self.debouncer.watcher().unwatch(&dir)?;
            tracing::info!("Unwatched: {}", dir.display());
        }
        Ok(())
    }

    pub fn watched_dir(&self) -> Option<&Path> {
        self.watched.as_deref()
    }

    /// Poll for file system events (non-blocking)
    pub fn poll_events(&self) -> Vec<FsEvent> {
        let mut events = Vec::new();

        while let Ok(result) = self.event_rx.try_recv() {
            match result {
                Ok(debounced_events) => {
                    for event in debounced_events {
                        if let Some(fs_event) = Self::convert_event(event) {
                            events.push(fs_event);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Watcher error: {:?}", e);
                }
            }
        }

        // Deduplication: remove consecutive Modified events for the same path
        events.dedup_by(|a, b| match (a, b) {
            (FsEvent::Modified(p1), FsEvent::Modified(p2)) => p1 == p2,
            _ => false,
        });

        events
    }

    fn convert_event(event: DebouncedEvent) -> Option<FsEvent> {
        match event.kind {
            DebouncedEventKind::Any => Some(classify_path(event.path)),
            _ => None,
        }
    }
}

/// Turn a "something happened at path" notification into a typed event
/// by looking at the path's current state on disk.
pub(crate) fn classify_path(path: PathBuf) -> FsEvent {
    if !path.exists() {
        return FsEvent::Removed(path);
    }

    // Newly created within the last second
    let fresh = path
        .metadata()
        .and_then(|m| m.created())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .map(|elapsed| elapsed < Duration::from_secs(1))
        .unwrap_or(false);

    if fresh {
        FsEvent::Created(path)
    } else {
        FsEvent::Modified(path)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Some(dir) = self.watched.take() {
            let _ = self.debouncer.watcher().unwatch(&dir);
        }
    }
}
