//! Fakes and fixtures shared by the unit tests

use crate::error::DecodeError;
use crate::item::{AnimatedImage, AnimationFrame, Bitmap, Item, Size, StaticImage, VideoClip};
use crate::presenter::{View, ViewEvent};
use crate::services::{file_name_of, ScaleQuality, Scaler, Thumbnail, ThumbnailGenerator, WallpaperSetter};
use crate::{AppConfig, AppError};
use app_fs::{FileOpError, FileOperations};
use image::RgbaImage;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Temp directory holding one small file per name
pub fn fixture_dir(names: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), b"data").unwrap();
    }
    dir
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.cache.decode_workers = 2;
    config
}

pub fn thumbnail(name: &str) -> Thumbnail {
    Thumbnail {
        name: name.to_string(),
        bitmap: Arc::new(RgbaImage::new(2, 2)),
        source_size: Some(Size::new(4, 3)),
    }
}

/// Poll `done` until it returns true; panics after `timeout`
pub fn pump_until(timeout: Duration, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !done() {
        if Instant::now() >= deadline {
            panic!("condition not reached within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Deletion always fails
pub struct FailingFileOps;

impl FileOperations for FailingFileOps {
    fn delete(&self, path: &Path) -> Result<(), FileOpError> {
        Err(FileOpError::NotFound(path.to_path_buf()))
    }
}

/// Decoder that fabricates items from the extension and counts calls.
/// Images are 4x3, `.gif` files animate with two 50ms frames.
#[derive(Default)]
pub struct CountingDecoder {
    delay: Duration,
    calls: Mutex<HashMap<PathBuf, usize>>,
    failing: Mutex<HashSet<String>>,
}

impl CountingDecoder {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    pub fn calls_for(&self, path: &Path) -> usize {
        self.calls.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

impl crate::services::ImageDecoder for CountingDecoder {
    fn decode(&self, path: &Path) -> Result<Item, DecodeError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        *self.calls.lock().entry(path.to_path_buf()).or_insert(0) += 1;

        if self.failing.lock().contains(&file_name_of(path)) {
            return Err(DecodeError::Image {
                path: path.to_path_buf(),
                message: "broken".into(),
            });
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Ok(match ext.as_str() {
            "mp4" => Item::Video(VideoClip::new(path)),
            "gif" => Item::Animated(AnimatedImage {
                frames: (0..2)
                    .map(|_| AnimationFrame {
                        bitmap: Arc::new(RgbaImage::new(4, 3)),
                        delay: Duration::from_millis(50),
                    })
                    .collect(),
            }),
            _ => Item::Static(StaticImage::new(RgbaImage::new(4, 3))),
        })
    }
}

#[derive(Default)]
pub struct StubThumbnailer {
    calls: AtomicUsize,
}

impl StubThumbnailer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ThumbnailGenerator for StubThumbnailer {
    fn generate(&self, path: &Path, _max_side: u32) -> Result<Thumbnail, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(thumbnail(&file_name_of(path)))
    }
}

/// Records every resample and returns a blank bitmap of the target size
#[derive(Default)]
pub struct RecordingScaler {
    calls: Mutex<Vec<(Size, ScaleQuality)>>,
}

impl RecordingScaler {
    pub fn calls(&self) -> Vec<(Size, ScaleQuality)> {
        self.calls.lock().clone()
    }
}

impl Scaler for RecordingScaler {
    fn resample(&self, _bitmap: &Bitmap, target: Size, quality: ScaleQuality) -> Bitmap {
        self.calls.lock().push((target, quality));
        Arc::new(RgbaImage::new(target.width, target.height))
    }
}

#[derive(Default)]
pub struct RecordingWallpaper {
    paths: Mutex<Vec<PathBuf>>,
}

impl RecordingWallpaper {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().clone()
    }
}

impl WallpaperSetter for RecordingWallpaper {
    fn set_wallpaper(&self, image_path: &Path) -> Result<(), AppError> {
        self.paths.lock().push(image_path.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
struct ViewRecord {
    calls: Vec<String>,
    pending: Vec<ViewEvent>,
}

/// Handle onto a [`RecordingView`] that stays with the test after the view
/// moves into a presenter
#[derive(Clone, Default)]
pub struct ViewLog(Arc<Mutex<ViewRecord>>);

impl ViewLog {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut self.0.lock().calls)
    }

    pub fn clear(&self) {
        self.0.lock().calls.clear();
    }

    /// Queue a user event for the next presenter pump
    pub fn push_event(&self, event: ViewEvent) {
        self.0.lock().pending.push(event);
    }

    fn record(&self, call: String) {
        self.0.lock().calls.push(call);
    }
}

/// View that logs every call and tracks its selection like a list widget
pub struct RecordingView {
    log: ViewLog,
    selected: Option<usize>,
}

impl RecordingView {
    pub fn new() -> (Self, ViewLog) {
        let log = ViewLog::default();
        (
            Self {
                log: log.clone(),
                selected: None,
            },
            log,
        )
    }
}

impl View for RecordingView {
    fn populate(&mut self, count: usize) {
        self.selected = None;
        self.log.record(format!("populate {}", count));
    }

    fn insert_item(&mut self, index: usize) {
        self.selected = self.selected.map(|s| if s >= index { s + 1 } else { s });
        self.log.record(format!("insert {}", index));
    }

    fn remove_item(&mut self, index: usize) {
        self.selected = match self.selected {
            Some(s) if s == index => None,
            Some(s) if s > index => Some(s - 1),
            other => other,
        };
        self.log.record(format!("remove {}", index));
    }

    fn reload_item(&mut self, index: usize) {
        self.log.record(format!("reload {}", index));
    }

    fn select_index(&mut self, index: Option<usize>) {
        self.selected = index;
        self.log.record(format!("select {:?}", index));
    }

    fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    fn focus_on(&mut self, index: usize) {
        self.log.record(format!("focus {}", index));
    }

    fn set_thumbnail(&mut self, index: usize, thumbnail: &Thumbnail) {
        self.log.record(format!("thumbnail {} {}", index, thumbnail.name));
    }

    fn drain_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.log.0.lock().pending)
    }
}
