//! Navigation core
//!
//! Ties the directory model, loader and cache together and turns completed
//! loads into presentation events. All state changes happen on the thread
//! that calls [`NavigationCore::pump`] and [`NavigationCore::tick`].

use crate::directory_model::{DirectoryEvent, DirectoryModel};
use crate::error::DecodeError;
use crate::events::{EventHub, Subscription};
use crate::image_cache::CacheEvent;
use crate::info::ImageInfo;
use crate::item::{Bitmap, Item, ItemKind, Rect, Size, VideoClip};
use crate::loader::{Loader, LoaderEvent};
use crate::services::{
    save_bitmap, CommandWallpaperSetter, ImageDecoder, ImageRsDecoder, ImageRsScaler, ImageRsThumbnailer,
    ScaleQuality, Scaler, ThumbnailGenerator, WallpaperSetter,
};
use crate::{AppConfig, AppError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Presentation events for rendering surfaces
#[derive(Debug, Clone)]
pub enum CoreEvent {
    LoadStarted { position: usize },
    /// The pending load is slow; playback was stopped
    LoadingTimeout,
    SetStaticImage { position: usize, bitmap: Bitmap },
    SetAnimation { position: usize, first_frame: Bitmap, frame_count: usize },
    FrameChanged { bitmap: Bitmap },
    SetVideo { position: usize, clip: VideoClip },
    StopVideo,
    /// Nothing to show: the load failed, or the directory ran empty
    UnsetImage { position: Option<usize>, error: Option<DecodeError> },
    StaticImageAltered { bitmap: Bitmap },
    VideoAltered { clip: VideoClip },
    ScalingFinished { bitmap: Bitmap },
    ImageChanged { position: usize },
    InfoChanged(ImageInfo),
    CacheInitialized { count: usize },
}

/// External collaborators of the core
#[derive(Clone)]
pub struct Services {
    pub decoder: Arc<dyn ImageDecoder>,
    pub scaler: Arc<dyn Scaler>,
    pub thumbnailer: Arc<dyn ThumbnailGenerator>,
    pub wallpaper: Option<Arc<dyn WallpaperSetter>>,
}

impl Services {
    /// `image`-crate backed services; the wallpaper setter runs the configured command
    pub fn image_rs(config: &AppConfig) -> Self {
        Self {
            decoder: Arc::new(ImageRsDecoder),
            scaler: Arc::new(ImageRsScaler),
            thumbnailer: Arc::new(ImageRsThumbnailer),
            wallpaper: config
                .wallpaper
                .command
                .as_ref()
                .map(|cmd| Arc::new(CommandWallpaperSetter::new(cmd.clone())) as Arc<dyn WallpaperSetter>),
        }
    }
}

/// Playback state of the current item. An animation always belongs to
/// `current_pos`, so it follows the item through list shifts.
#[derive(Debug)]
enum Playback {
    Idle,
    Animation { frame: usize, next_at: Instant },
    Video,
}

pub struct NavigationCore {
    config: AppConfig,
    model: Arc<DirectoryModel>,
    model_events: Subscription<DirectoryEvent>,
    loader: Loader,
    cache_events: Subscription<CacheEvent>,
    scaler: Arc<dyn Scaler>,
    wallpaper: Option<Arc<dyn WallpaperSetter>>,
    events: EventHub<CoreEvent>,
    current_pos: Option<usize>,
    current_path: Option<PathBuf>,
    playback: Playback,
    loading_since: Option<Instant>,
    timeout_reported: bool,
    /// Directory the core last (re)initialized for
    loaded_dir: Option<PathBuf>,
    awaiting_init: bool,
}

impl NavigationCore {
    pub fn new(config: AppConfig, model: Arc<DirectoryModel>, services: Services) -> Result<Self> {
        let loader = Loader::new(&config, services.decoder, services.thumbnailer)?;
        let cache_events = loader.cache().subscribe();
        let model_events = model.subscribe();

        Ok(Self {
            config,
            model,
            model_events,
            loader,
            cache_events,
            scaler: services.scaler,
            wallpaper: services.wallpaper,
            events: EventHub::new(),
            current_pos: None,
            current_path: None,
            playback: Playback::Idle,
            loading_since: None,
            timeout_reported: false,
            loaded_dir: None,
            awaiting_init: false,
        })
    }

    pub fn subscribe(&self) -> Subscription<CoreEvent> {
        self.events.subscribe()
    }

    pub fn model(&self) -> &Arc<DirectoryModel> {
        &self.model
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn current_position(&self) -> Option<usize> {
        self.current_pos
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Item on screen; `None` while loading or after a failed load
    pub fn current_image(&self) -> Option<&Item> {
        let pos = self.current_pos?;
        let cache = self.loader.cache();
        if cache.path_at(pos) != self.current_path.as_deref() {
            return None;
        }
        cache.image_at(pos)
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn has_pending_work(&self) -> bool {
        self.loader.has_pending_work() || !self.model_events.is_empty() || !self.cache_events.is_empty()
    }

    pub fn set_fast_scale(&mut self, fast: bool) {
        self.config.viewer.fast_scale = fast;
    }

    // ===== Opening =====

    /// Switch to `dir` and load its first file
    pub fn open_dir(&mut self, dir: &Path) -> Result<()> {
        self.model.set_current_dir(dir)?;
        self.reset_for_dir(dir);
        if let Some(index) = self.model.current_index() {
            self.load_by_pos(index)?;
        }
        Ok(())
    }

    /// Open a file, switching directory when needed. An invalid or
    /// unsupported path is logged and ignored.
    pub fn load_image(&mut self, path: &Path) {
        if !path.is_file() || !self.model.is_supported(path) {
            tracing::warn!("Not a supported media file: {}", path.display());
            return;
        }
        let Some(parent) = path.parent() else {
            tracing::warn!("File has no parent directory: {}", path.display());
            return;
        };

        if self.model.dir().as_deref() != Some(parent) {
            if let Err(e) = self.model.set_current_dir(parent) {
                tracing::warn!("Cannot open {}: {}", parent.display(), e);
                return;
            }
            self.reset_for_dir(parent);
        }

        let Some(position) = self.model.index_of_path(path) else {
            tracing::warn!("File not listed: {}", path.display());
            return;
        };
        if let Err(e) = self.load_by_pos(position) {
            tracing::warn!("Cannot load {}: {}", path.display(), e);
        }
    }

    /// Decode `path` and wait for the result without changing the current item
    pub fn load_image_blocking(&mut self, path: &Path) -> Result<Item> {
        if !path.is_file() || !self.model.is_supported(path) {
            return Err(AppError::InvalidPath(path.to_path_buf()));
        }
        self.loader.open_blocking(&self.model, path)
    }

    pub fn load_by_pos(&mut self, position: usize) -> Result<()> {
        self.loader.open_position(&self.model, position)?;
        Ok(())
    }

    pub fn next(&mut self) -> Result<()> {
        self.loader.load_next(&self.model)?;
        Ok(())
    }

    pub fn prev(&mut self) -> Result<()> {
        self.loader.load_prev(&self.model)?;
        Ok(())
    }

    fn reset_for_dir(&mut self, dir: &Path) {
        self.stop_playback();
        self.loader.reset();
        self.current_pos = None;
        self.current_path = None;
        self.loading_since = None;
        self.loaded_dir = Some(dir.to_path_buf());
        self.awaiting_init = true;
        // Events from the old directory no longer apply
        let _ = self.model_events.drain();
    }

    // ===== Event processing =====

    /// Process queued directory changes and finished loads. Returns the
    /// number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = self.process_model_events();

        for event in self.loader.pump(&self.model) {
            handled += 1;
            match event {
                LoaderEvent::LoadStarted { position, .. } => self.on_load_started(position),
                LoaderEvent::LoadFinished { position, path, result } => {
                    self.on_load_finished(position, path, result)
                }
                LoaderEvent::ThumbnailReady { thumbnail, .. } => self.model.thumbnail_ready(thumbnail),
            }
        }

        for event in self.cache_events.drain() {
            handled += 1;
            if let CacheEvent::Initialized { count } = event {
                self.events.emit(CoreEvent::CacheInitialized { count });
            }
        }

        handled
    }

    fn process_model_events(&mut self) -> usize {
        let events = self.model_events.drain();
        let handled = events.len();
        let mut reload = false;

        for event in events {
            match event {
                DirectoryEvent::Loaded { dir, .. } => {
                    if self.loaded_dir.as_deref() != Some(dir.as_path()) {
                        self.reset_for_dir(&dir);
                        reload = true;
                    }
                }
                DirectoryEvent::FileAdded { index, .. } => {
                    self.loader.cache_mut().insert_at(index);
                    self.current_pos = self.current_pos.map(|p| if p >= index { p + 1 } else { p });
                }
                DirectoryEvent::FileRemoved { name, index } => {
                    self.loader.cache_mut().remove_at(index);
                    self.loader.forget_thumbnail(&name);
                    match self.current_pos {
                        Some(p) if p == index => {
                            self.stop_playback();
                            self.current_pos = None;
                            self.current_path = None;
                            reload = true;
                        }
                        Some(p) if p > index => self.current_pos = Some(p - 1),
                        _ => {}
                    }
                }
                DirectoryEvent::FileRenamed {
                    old_name,
                    old_index,
                    new_index,
                    ..
                } => {
                    let new_path = self.model.path_at(new_index).unwrap_or_default();
                    self.loader.cache_mut().move_slot(old_index, new_index, &new_path);
                    self.loader.forget_thumbnail(&old_name);
                    match self.current_pos {
                        Some(p) if p == old_index => {
                            self.current_pos = Some(new_index);
                            self.current_path = Some(new_path);
                        }
                        Some(p) => {
                            let p = if p > old_index { p - 1 } else { p };
                            self.current_pos = Some(if p >= new_index { p + 1 } else { p });
                        }
                        None => {}
                    }
                }
                DirectoryEvent::FileModified { index, .. } => {
                    self.loader.cache_mut().invalidate(index);
                    if self.current_pos == Some(index) {
                        reload = true;
                    }
                }
                DirectoryEvent::SortingChanged { current, .. } => {
                    let cache = self.loader.cache_mut();
                    // The displayed item survives the re-sort under its new index
                    let shown = self
                        .current_pos
                        .filter(|&p| cache.path_at(p).is_some() && cache.path_at(p) == self.current_path.as_deref());
                    cache.resort(shown.zip(current));
                    cache.set_current(current);
                    if let Some(pos) = current {
                        cache.set_focus(pos);
                    }
                    self.current_pos = current;
                    self.emit_info();
                }
                DirectoryEvent::IndexRequested { index } => {
                    if let Err(e) = self.load_by_pos(index) {
                        tracing::warn!("Requested index {} not loadable: {}", index, e);
                    }
                }
                DirectoryEvent::ThumbnailsRequested { indices } => {
                    for index in indices {
                        let id = self.loader.next_thumbnail_request_id();
                        if let Err(e) = self.loader.generate_thumbnail_for(&self.model, index, id) {
                            tracing::debug!("Thumbnail request {} skipped: {}", index, e);
                        }
                    }
                }
                DirectoryEvent::IndexChanged { .. } | DirectoryEvent::ThumbnailReady { .. } => {}
            }
        }

        self.loader.cache_mut().set_current(self.current_pos);

        if reload {
            match self.model.current_index() {
                Some(index) => {
                    if let Err(e) = self.load_by_pos(index) {
                        tracing::warn!("Reload of {} failed: {}", index, e);
                    }
                }
                None => self.events.emit(CoreEvent::UnsetImage {
                    position: None,
                    error: None,
                }),
            }
        }

        handled
    }

    fn on_load_started(&mut self, position: usize) {
        self.loading_since = Some(Instant::now());
        self.timeout_reported = false;
        self.events.emit(CoreEvent::LoadStarted { position });
        if let Some(info) = self.info_at(position) {
            self.events.emit(CoreEvent::InfoChanged(info));
        }
    }

    fn on_load_finished(&mut self, position: usize, path: PathBuf, result: std::result::Result<Item, DecodeError>) {
        self.stop_playback();
        self.loading_since = None;
        self.current_pos = Some(position);
        self.current_path = Some(path);
        self.loader.cache_mut().set_current(Some(position));

        match result {
            Ok(Item::Static(img)) => {
                self.events.emit(CoreEvent::SetStaticImage {
                    position,
                    bitmap: img.bitmap,
                });
            }
            Ok(Item::Animated(anim)) => match anim.frames.first() {
                Some(first) => {
                    if self.config.viewer.enable_animation && anim.frames.len() > 1 {
                        self.playback = Playback::Animation {
                            frame: 0,
                            next_at: Instant::now() + first.delay,
                        };
                    }
                    self.events.emit(CoreEvent::SetAnimation {
                        position,
                        first_frame: first.bitmap.clone(),
                        frame_count: anim.frames.len(),
                    });
                }
                None => self.events.emit(CoreEvent::UnsetImage {
                    position: Some(position),
                    error: None,
                }),
            },
            Ok(Item::Video(clip)) => {
                self.playback = Playback::Video;
                self.events.emit(CoreEvent::SetVideo { position, clip });
            }
            Err(error) => {
                self.events.emit(CoreEvent::UnsetImage {
                    position: Some(position),
                    error: Some(error),
                });
            }
        }

        if let Err(e) = self.model.set_index(position) {
            tracing::debug!("Model index not updated: {}", e);
        }
        if self.awaiting_init {
            self.awaiting_init = false;
            let count = self.model.len();
            self.loader.cache_mut().mark_initialized(count);
        }

        self.events.emit(CoreEvent::ImageChanged { position });
        self.emit_info();
    }

    fn stop_playback(&mut self) {
        if matches!(self.playback, Playback::Video) {
            self.events.emit(CoreEvent::StopVideo);
        }
        self.playback = Playback::Idle;
    }

    /// Drive time-based behaviour: the loading timeout and animation frames
    pub fn tick(&mut self, now: Instant) {
        if let Some(since) = self.loading_since {
            if !self.timeout_reported && now.saturating_duration_since(since) >= self.config.viewer.loading_timeout() {
                self.timeout_reported = true;
                self.stop_playback();
                tracing::debug!("Load is taking longer than {:?}", self.config.viewer.loading_timeout());
                self.events.emit(CoreEvent::LoadingTimeout);
            }
        }

        let Playback::Animation { mut frame, mut next_at } = self.playback else {
            return;
        };
        if now < next_at {
            return;
        }

        let Some(Item::Animated(anim)) = self.current_image() else {
            self.playback = Playback::Idle;
            return;
        };
        let count = anim.frames.len();
        while now >= next_at {
            frame = (frame + 1) % count;
            // Zero delays would spin forever
            next_at += anim.frames[frame].delay.max(Duration::from_millis(1));
        }
        let bitmap = anim.frames[frame].bitmap.clone();

        self.playback = Playback::Animation { frame, next_at };
        self.events.emit(CoreEvent::FrameChanged { bitmap });
    }

    // ===== Editing =====

    /// Rotate the current static image or video. `false` when nothing changed.
    pub fn rotate(&mut self, degrees: i32) -> bool {
        self.alter(|item| match item {
            Item::Static(img) => img.rotate(degrees).then(|| CoreEvent::StaticImageAltered {
                bitmap: img.bitmap.clone(),
            }),
            Item::Video(clip) => clip.rotate(degrees).then(|| CoreEvent::VideoAltered { clip: clip.clone() }),
            Item::Animated(_) => None,
        })
    }

    pub fn crop(&mut self, rect: Rect) -> bool {
        self.alter(|item| match item {
            Item::Static(img) => img.crop(rect).then(|| CoreEvent::StaticImageAltered {
                bitmap: img.bitmap.clone(),
            }),
            Item::Video(clip) => clip.crop(rect).then(|| CoreEvent::VideoAltered { clip: clip.clone() }),
            Item::Animated(_) => None,
        })
    }

    fn alter(&mut self, f: impl FnOnce(&mut Item) -> Option<CoreEvent>) -> bool {
        if self.current_image().is_none() {
            return false;
        }
        let Some(pos) = self.current_pos else {
            return false;
        };
        match self.loader.cache_mut().modify(pos, f).flatten() {
            Some(event) => {
                self.events.emit(event);
                self.emit_info();
                true
            }
            None => false,
        }
    }

    /// Resample the displayed bitmap for `target`. The stored item is left
    /// untouched; a target equal to the source returns the source bitmap.
    pub fn rescale_for_zoom(&mut self, target: Size) -> Option<Bitmap> {
        if target.is_empty() {
            return None;
        }
        let source = match &self.playback {
            Playback::Animation { frame, .. } => match self.current_image() {
                Some(Item::Animated(anim)) => anim.frames.get(*frame).map(|f| f.bitmap.clone()),
                _ => None,
            },
            _ => self.current_image().and_then(|item| item.bitmap().cloned()),
        }?;

        let source_size = Size::of(&source);
        let bitmap = if source_size == target {
            source
        } else {
            let upscale = target.area() > source_size.area();
            let quality = if upscale || self.config.viewer.fast_scale {
                ScaleQuality::Fast
            } else {
                ScaleQuality::Quality
            };
            self.scaler.resample(&source, target, quality)
        };

        self.events.emit(CoreEvent::ScalingFinished { bitmap: bitmap.clone() });
        Some(bitmap)
    }

    // ===== File operations =====

    /// Delete the current file, then show whatever takes its position
    pub fn remove_file(&mut self) -> Result<()> {
        let len = self.model.len();
        let position = self
            .current_pos
            .or_else(|| self.model.current_index())
            .ok_or(AppError::OutOfRange { index: 0, len })?;

        self.model.remove_at(position)?;
        self.process_model_events();
        Ok(())
    }

    /// Crop the current static image to `region`, fit it to `screen`, write
    /// it out and hand it to the wallpaper setter. `Ok(false)` when the
    /// current item is not a static image or the crop is empty.
    pub fn set_wallpaper(&mut self, region: Rect, screen: Size) -> Result<bool> {
        let Some(Item::Static(img)) = self.current_image() else {
            return Ok(false);
        };
        let Some(cropped) = img.cropped(region) else {
            return Ok(false);
        };
        let setter = self
            .wallpaper
            .clone()
            .ok_or_else(|| AppError::Config("no wallpaper command configured".into()))?;

        let fitted = self.scaler.resample(&Arc::new(cropped), screen, ScaleQuality::Quality);
        let output = self.config.wallpaper.output_path();
        save_bitmap(&fitted, &output)?;
        setter.set_wallpaper(&output)?;
        Ok(true)
    }

    /// Write the current static image to `target`, or over its own file.
    /// `Ok(None)` when the current item is not a static image.
    pub fn save_image(&mut self, target: Option<&Path>) -> Result<Option<PathBuf>> {
        let Some(Item::Static(img)) = self.current_image() else {
            return Ok(None);
        };
        let bitmap = img.bitmap.clone();
        let path = match target.map(Path::to_path_buf).or_else(|| self.current_path.clone()) {
            Some(path) => path,
            None => return Ok(None),
        };

        save_bitmap(&bitmap, &path)?;
        tracing::info!("Saved {}", path.display());
        Ok(Some(path))
    }

    // ===== Info =====

    pub fn info(&self) -> Option<ImageInfo> {
        self.info_at(self.current_pos?)
    }

    fn info_at(&self, position: usize) -> Option<ImageInfo> {
        let entry = self.model.entry(position)?;
        let size = self
            .loader
            .cache()
            .image_at(position)
            .filter(|_| self.loader.cache().path_at(position) == Some(entry.path.as_path()))
            .and_then(Item::size);
        Some(ImageInfo {
            position,
            count: self.model.len(),
            name: entry.name,
            size,
            file_size: entry.size,
        })
    }

    fn emit_info(&self) {
        if let Some(info) = self.info() {
            self.events.emit(CoreEvent::InfoChanged(info));
        }
    }

    pub fn current_kind(&self) -> Option<ItemKind> {
        self.current_image().map(Item::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        fixture_dir, pump_until, test_config, CountingDecoder, RecordingScaler, RecordingWallpaper, StubThumbnailer,
    };
    use app_fs::{DefaultFileOperations, FsEvent, ListOptions, SortBy, SortOrder};
    use std::fs;

    struct Fixture {
        dir: tempfile::TempDir,
        core: NavigationCore,
        events: Subscription<CoreEvent>,
        decoder: Arc<CountingDecoder>,
        scaler: Arc<RecordingScaler>,
        wallpaper: Arc<RecordingWallpaper>,
    }

    fn fixture_with(names: &[&str], config: AppConfig, delay: Duration) -> Fixture {
        let dir = fixture_dir(names);
        let model = Arc::new(DirectoryModel::new(
            Arc::new(DefaultFileOperations::new(false)),
            ListOptions::default(),
            Duration::from_millis(300),
        ));
        let decoder = Arc::new(CountingDecoder::with_delay(delay));
        let scaler = Arc::new(RecordingScaler::default());
        let wallpaper = Arc::new(RecordingWallpaper::default());
        let services = Services {
            decoder: decoder.clone(),
            scaler: scaler.clone(),
            thumbnailer: Arc::new(StubThumbnailer::default()),
            wallpaper: Some(wallpaper.clone()),
        };
        let core = NavigationCore::new(config, model, services).unwrap();
        let events = core.subscribe();

        Fixture {
            dir,
            core,
            events,
            decoder,
            scaler,
            wallpaper,
        }
    }

    fn fixture(names: &[&str]) -> Fixture {
        let mut config = test_config();
        config.cache.retention_radius = 0;
        fixture_with(names, config, Duration::ZERO)
    }

    fn settle(f: &mut Fixture) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        pump_until(Duration::from_secs(5), || {
            f.core.pump();
            events.extend(f.events.drain());
            !f.core.has_pending_work()
        });
        events
    }

    fn open(f: &mut Fixture) -> Vec<CoreEvent> {
        let dir = f.dir.path().to_path_buf();
        f.core.open_dir(&dir).unwrap();
        settle(f)
    }

    fn changed_positions(events: &[CoreEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                CoreEvent::ImageChanged { position } => Some(*position),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_open_dir_shows_first_and_initializes_cache() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let events = open(&mut f);

        assert_eq!(f.core.current_position(), Some(0));
        assert!(matches!(f.core.current_kind(), Some(ItemKind::Static)));
        assert!(events.iter().any(|e| matches!(e, CoreEvent::SetStaticImage { position: 0, .. })));
        assert!(events.iter().any(|e| matches!(e, CoreEvent::CacheInitialized { count: 3 })));
        assert_eq!(changed_positions(&events), vec![0]);

        f.core.next().unwrap();
        let events = settle(&mut f);
        assert!(!events.iter().any(|e| matches!(e, CoreEvent::CacheInitialized { .. })));
    }

    #[test]
    fn test_next_prev_wrap() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        open(&mut f);

        f.core.prev().unwrap();
        settle(&mut f);
        assert_eq!(f.core.current_position(), Some(2));
        assert_eq!(f.core.model().current_index(), Some(2));

        for _ in 0..4 {
            f.core.next().unwrap();
            settle(&mut f);
        }
        assert_eq!(f.core.current_position(), Some(0));
    }

    #[test]
    fn test_stale_open_is_not_presented() {
        let names: Vec<String> = (0..10).map(|i| format!("{}.png", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut config = test_config();
        config.cache.retention_radius = 0;
        let mut f = fixture_with(&refs, config, Duration::from_millis(30));
        open(&mut f);

        f.core.load_by_pos(5).unwrap();
        f.core.load_by_pos(7).unwrap();
        let events = settle(&mut f);

        assert_eq!(changed_positions(&events), vec![7]);
        assert_eq!(f.core.current_position(), Some(7));
    }

    #[test]
    fn test_failed_load_unsets_image_only() {
        let mut f = fixture(&["a.png", "b.png"]);
        f.decoder.fail_on("b.png");
        open(&mut f);

        f.core.load_by_pos(1).unwrap();
        let events = settle(&mut f);

        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::UnsetImage { position: Some(1), error: Some(_) })));
        assert!(!events.iter().any(|e| matches!(
            e,
            CoreEvent::SetStaticImage { .. } | CoreEvent::SetAnimation { .. } | CoreEvent::SetVideo { .. }
        )));
        assert!(f.core.current_image().is_none());
    }

    #[test]
    fn test_video_rotate_emits_video_altered() {
        let mut f = fixture(&["a.png", "clip.mp4"]);
        open(&mut f);
        f.core.load_by_pos(1).unwrap();
        let events = settle(&mut f);
        assert!(events.iter().any(|e| matches!(e, CoreEvent::SetVideo { position: 1, .. })));

        assert!(f.core.rotate(90));
        let events = f.events.drain();
        assert!(events.iter().any(|e| matches!(e, CoreEvent::VideoAltered { clip } if clip.rotation == 90)));
        assert!(!events.iter().any(|e| matches!(e, CoreEvent::StaticImageAltered { .. })));

        // Leaving the clip stops playback
        f.core.load_by_pos(0).unwrap();
        let events = settle(&mut f);
        assert!(events.iter().any(|e| matches!(e, CoreEvent::StopVideo)));
    }

    #[test]
    fn test_rotate_and_crop_static() {
        let mut f = fixture(&["a.png"]);
        open(&mut f);

        assert!(f.core.rotate(90));
        assert_eq!(f.core.current_image().and_then(Item::size), Some(Size::new(3, 4)));
        assert!(!f.core.rotate(45));
        assert!(!f.core.rotate(360));

        assert!(f.core.crop(Rect::new(0, 0, 2, 2)));
        assert_eq!(f.core.current_image().and_then(Item::size), Some(Size::new(2, 2)));
        let events = f.events.drain();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, CoreEvent::StaticImageAltered { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_rescale_identity_returns_same_bitmap() {
        let mut f = fixture(&["a.png"]);
        open(&mut f);
        let source = f.core.current_image().and_then(Item::bitmap).cloned().unwrap();

        let same = f.core.rescale_for_zoom(Size::of(&source)).unwrap();
        assert!(Arc::ptr_eq(&same, &source));
        assert!(f.scaler.calls().is_empty());
    }

    #[test]
    fn test_rescale_picks_quality_path() {
        let mut f = fixture(&["a.png"]);
        open(&mut f);

        f.core.rescale_for_zoom(Size::new(2, 1)).unwrap();
        f.core.rescale_for_zoom(Size::new(40, 30)).unwrap();
        f.core.set_fast_scale(true);
        f.core.rescale_for_zoom(Size::new(2, 1)).unwrap();

        assert_eq!(
            f.scaler.calls(),
            vec![
                (Size::new(2, 1), ScaleQuality::Quality),
                (Size::new(40, 30), ScaleQuality::Fast),
                (Size::new(2, 1), ScaleQuality::Fast),
            ]
        );
        // Stored item is untouched
        assert_eq!(f.core.current_image().and_then(Item::size), Some(Size::new(4, 3)));
        assert!(f.core.rescale_for_zoom(Size::new(0, 5)).is_none());
    }

    #[test]
    fn test_remove_file_reloads_clamped_position() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        open(&mut f);
        f.core.load_by_pos(1).unwrap();
        settle(&mut f);

        f.core.remove_file().unwrap();
        let events = settle(&mut f);

        assert!(!f.dir.path().join("b.png").exists());
        assert_eq!(f.core.current_position(), Some(1));
        assert_eq!(f.core.current_path(), Some(f.dir.path().join("c.png").as_path()));
        assert_eq!(changed_positions(&events), vec![1]);
    }

    #[test]
    fn test_remove_last_file_unsets() {
        let mut f = fixture(&["a.png"]);
        open(&mut f);

        f.core.remove_file().unwrap();
        let events = settle(&mut f);
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::UnsetImage { position: None, error: None })));
        assert_eq!(f.core.current_position(), None);
    }

    #[test]
    fn test_load_image_invalid_is_noop() {
        let mut f = fixture(&["a.png"]);
        open(&mut f);
        let txt = f.dir.path().join("notes.txt");
        fs::write(&txt, b"x").unwrap();

        f.core.load_image(&txt);
        f.core.load_image(&f.dir.path().join("missing.png"));
        assert!(settle(&mut f).is_empty());
        assert_eq!(f.core.current_position(), Some(0));
    }

    #[test]
    fn test_load_image_switches_directory() {
        let mut f = fixture(&["a.png"]);
        open(&mut f);
        let other = fixture_dir(&["x.png", "y.png"]);

        f.core.load_image(&other.path().join("y.png"));
        settle(&mut f);

        assert_eq!(f.core.model().dir().as_deref(), Some(other.path()));
        assert_eq!(f.core.current_position(), Some(1));
        assert_eq!(f.core.model().current_index(), Some(1));
    }

    #[test]
    fn test_index_request_settles_after_load() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        open(&mut f);
        let model_events = f.core.model().subscribe();

        f.core.model().set_index_async(2).unwrap();
        assert_eq!(f.core.model().current_index(), Some(0));
        settle(&mut f);

        assert_eq!(f.core.model().current_index(), Some(2));
        assert!(model_events
            .drain()
            .iter()
            .any(|e| matches!(e, DirectoryEvent::IndexChanged { old: Some(0), new: Some(2) })));
    }

    #[test]
    fn test_external_add_keeps_current_file() {
        let mut f = fixture(&["b.png", "c.png"]);
        open(&mut f);
        f.core.load_by_pos(1).unwrap();
        settle(&mut f);

        let path = f.dir.path().join("a.png");
        fs::write(&path, b"data").unwrap();
        f.core.model().apply_fs_events(&[FsEvent::Created(path)], Instant::now());
        settle(&mut f);

        assert_eq!(f.core.current_position(), Some(2));
        assert!(f.core.current_image().is_some());
    }

    #[test]
    fn test_external_rename_of_current_follows() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        open(&mut f);
        f.core.load_by_pos(2).unwrap();
        settle(&mut f);
        let calls = f.decoder.total_calls();

        let from = f.dir.path().join("c.png");
        let to = f.dir.path().join("0.png");
        fs::rename(&from, &to).unwrap();
        let now = Instant::now();
        f.core.model().apply_fs_events(&[FsEvent::Removed(from), FsEvent::Created(to.clone())], now);
        settle(&mut f);

        assert_eq!(f.core.current_position(), Some(0));
        assert_eq!(f.core.current_path(), Some(to.as_path()));
        assert!(f.core.current_image().is_some());
        assert_eq!(f.decoder.total_calls(), calls);
    }

    #[test]
    fn test_loading_timeout() {
        let mut config = test_config();
        config.cache.retention_radius = 0;
        let mut f = fixture_with(&["a.png", "b.png"], config, Duration::from_millis(100));
        open(&mut f);

        f.core.load_by_pos(1).unwrap();
        f.core.pump();
        f.core.tick(Instant::now() + Duration::from_secs(1));
        f.core.tick(Instant::now() + Duration::from_secs(2));
        let events = settle(&mut f);

        assert_eq!(
            events.iter().filter(|e| matches!(e, CoreEvent::LoadingTimeout)).count(),
            1
        );
    }

    #[test]
    fn test_animation_ticks_frames() {
        let mut f = fixture(&["anim.gif"]);
        let events = open(&mut f);
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::SetAnimation { frame_count: 2, .. })));

        f.core.tick(Instant::now() + Duration::from_millis(60));
        let events = f.events.drain();
        assert!(matches!(events.as_slice(), [CoreEvent::FrameChanged { .. }]));
    }

    #[test]
    fn test_sorting_keeps_current_item() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        open(&mut f);
        let calls = f.decoder.total_calls();

        f.core.model().set_sorting(SortBy::Name, SortOrder::Descending);
        settle(&mut f);

        assert_eq!(f.core.current_position(), Some(2));
        assert!(!f.core.is_loading());
        assert!(f.core.current_image().is_some());
        assert_eq!(f.decoder.total_calls(), calls);

        assert!(f.core.rotate(90));
        assert_eq!(f.core.current_image().and_then(Item::size), Some(Size::new(3, 4)));
        assert!(f.core.save_image(None).unwrap().is_some());
    }

    #[test]
    fn test_animation_follows_list_shifts() {
        let mut f = fixture(&["b.gif"]);
        open(&mut f);

        let added = f.dir.path().join("a.png");
        fs::write(&added, b"data").unwrap();
        f.core.model().apply_fs_events(&[FsEvent::Created(added)], Instant::now());
        settle(&mut f);
        assert_eq!(f.core.current_position(), Some(1));

        f.core.tick(Instant::now() + Duration::from_millis(60));
        let events = f.events.drain();
        assert!(matches!(events.as_slice(), [CoreEvent::FrameChanged { .. }]));
        assert!(f.core.rescale_for_zoom(Size::new(8, 6)).is_some());

        f.core.model().set_sorting(SortBy::Name, SortOrder::Descending);
        settle(&mut f);
        assert_eq!(f.core.current_position(), Some(0));
        f.core.tick(Instant::now() + Duration::from_millis(200));
        assert!(f
            .events
            .drain()
            .iter()
            .any(|e| matches!(e, CoreEvent::FrameChanged { .. })));
    }

    #[test]
    fn test_wallpaper_static_only() {
        let mut f = fixture(&["a.png", "clip.mp4"]);
        let output = f.dir.path().join("wall").join("wallpaper.png");
        f.core.config.wallpaper.output_path = Some(output.clone());
        open(&mut f);

        assert!(f.core.set_wallpaper(Rect::new(0, 0, 2, 2), Size::new(16, 9)).unwrap());
        assert_eq!(image::image_dimensions(&output).unwrap(), (16, 9));
        assert_eq!(f.wallpaper.paths(), vec![output.clone()]);

        assert!(!f.core.set_wallpaper(Rect::new(50, 50, 2, 2), Size::new(16, 9)).unwrap());

        f.core.load_by_pos(1).unwrap();
        settle(&mut f);
        assert!(!f.core.set_wallpaper(Rect::new(0, 0, 2, 2), Size::new(16, 9)).unwrap());
        assert_eq!(f.wallpaper.paths().len(), 1);
    }

    #[test]
    fn test_save_image() {
        let mut f = fixture(&["a.png"]);
        open(&mut f);
        let target = f.dir.path().join("copy.png");

        let saved = f.core.save_image(Some(&target)).unwrap();
        assert_eq!(saved.as_deref(), Some(target.as_path()));
        assert_eq!(image::image_dimensions(&target).unwrap(), (4, 3));
    }

    #[test]
    fn test_info_line() {
        let mut f = fixture(&["a.png", "b.png"]);
        open(&mut f);
        let info = f.core.info().unwrap();
        assert_eq!(info.to_string(), "[ 1/2 ]   a.png  (4x3  0 KB)");
    }

    #[test]
    fn test_load_image_blocking() {
        let mut f = fixture(&["a.png", "b.png"]);
        open(&mut f);
        let item = f.core.load_image_blocking(&f.dir.path().join("b.png")).unwrap();
        assert_eq!(item.size(), Some(Size::new(4, 3)));
        assert_eq!(f.core.current_position(), Some(0));
        assert!(f.core.load_image_blocking(&f.dir.path().join("nope.png")).is_err());
    }
}
