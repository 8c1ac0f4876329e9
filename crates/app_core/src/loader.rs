//! Decode pipeline
//!
//! Full-image decodes run on a small pool of worker threads; thumbnails run
//! on their own worker so neither queue waits on the other. Every worker
//! reports into one inbox that the primary thread drains in [`Loader::pump`].
//!
//! Each `open` gets a fresh token. A completion is delivered only when the
//! newest request still targets the decoded file; anything else is cached
//! and dropped. Decodes are keyed by path, so asking for a file that is
//! already being decoded joins the running job instead of starting another.

use crate::directory_model::DirectoryModel;
use crate::error::DecodeError;
use crate::image_cache::ImageCache;
use crate::item::Item;
use crate::services::{ImageDecoder, Thumbnail, ThumbnailGenerator};
use crate::{AppConfig, AppError, Result};
use app_fs::FileEntry;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use xxhash_rust::xxh3::xxh3_64;

/// Upper bound for `open_blocking` waiting on a shared in-flight decode
const BLOCKING_WAIT: Duration = Duration::from_secs(30);

/// Token carried by preload jobs; never matches a request
const PRELOAD_TOKEN: u64 = 0;

/// Events handed to the primary thread by [`Loader::pump`]
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    LoadStarted {
        position: usize,
        path: PathBuf,
    },
    /// `result` is the decode error when the item could not be loaded
    LoadFinished {
        position: usize,
        path: PathBuf,
        result: std::result::Result<Item, DecodeError>,
    },
    ThumbnailReady {
        request_id: u64,
        thumbnail: Thumbnail,
    },
}

enum InboxMsg {
    Decoded {
        path: PathBuf,
        result: std::result::Result<Item, DecodeError>,
    },
    CacheHit {
        path: PathBuf,
        token: u64,
    },
    Thumbnail {
        request_id: u64,
        result: std::result::Result<Thumbnail, DecodeError>,
    },
}

enum Reply {
    Inbox,
    Blocking(oneshot::Sender<std::result::Result<Item, DecodeError>>),
}

struct DecodeJob {
    path: PathBuf,
    reply: Reply,
}

struct ThumbnailJob {
    request_id: u64,
    path: PathBuf,
    stamp: u64,
}

#[derive(Clone)]
struct CachedThumbnail {
    stamp: u64,
    thumbnail: Thumbnail,
}

#[derive(Debug, Clone)]
struct Request {
    token: u64,
    path: PathBuf,
}

/// Outcome of an `open` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenTicket {
    pub token: u64,
    pub position: usize,
    /// Served from the cache; no decode was scheduled
    pub cached: bool,
}

pub struct Loader {
    cache: ImageCache,
    jobs: Option<Sender<DecodeJob>>,
    thumbnail_jobs: Option<Sender<ThumbnailJob>>,
    inbox_tx: Sender<InboxMsg>,
    inbox_rx: Receiver<InboxMsg>,
    /// Messages taken off the inbox by `open_blocking`, replayed first by `pump`
    deferred: VecDeque<InboxMsg>,
    /// Events produced synchronously by `open`, delivered on the next `pump`
    ready: VecDeque<LoaderEvent>,
    workers: Vec<JoinHandle<()>>,
    /// Path -> token of the newest request waiting on that decode
    in_flight: HashMap<PathBuf, u64>,
    latest: Option<Request>,
    next_token: u64,
    next_thumbnail_id: u64,
    /// Thumbnail requests not yet answered
    pending_thumbnails: usize,
    thumbnails: Arc<DashMap<String, CachedThumbnail>>,
    wrap: bool,
    preload: bool,
}

impl Loader {
    pub fn new(
        config: &AppConfig,
        decoder: Arc<dyn ImageDecoder>,
        thumbnailer: Arc<dyn ThumbnailGenerator>,
    ) -> Result<Self> {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<DecodeJob>();
        let (thumb_tx, thumb_rx) = crossbeam_channel::unbounded::<ThumbnailJob>();
        let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
        let thumbnails = Arc::new(DashMap::new());

        let mut workers = Vec::new();
        for i in 0..config.cache.decode_workers.max(1) {
            let jobs_rx = jobs_rx.clone();
            let inbox = inbox_tx.clone();
            let decoder = decoder.clone();
            let handle = std::thread::Builder::new()
                .name(format!("imgdeck-decode-{}", i))
                .spawn(move || decode_worker(i, jobs_rx, inbox, decoder))?;
            workers.push(handle);
        }

        let inbox = inbox_tx.clone();
        let memory = Arc::clone(&thumbnails);
        let max_side = config.thumbnails.size;
        let handle = std::thread::Builder::new()
            .name("imgdeck-thumbnails".into())
            .spawn(move || thumbnail_worker(thumb_rx, inbox, thumbnailer, memory, max_side))?;
        workers.push(handle);

        tracing::debug!("Loader started with {} decode workers", workers.len() - 1);

        Ok(Self {
            cache: ImageCache::from_config(&config.cache),
            jobs: Some(jobs_tx),
            thumbnail_jobs: Some(thumb_tx),
            inbox_tx,
            inbox_rx,
            deferred: VecDeque::new(),
            ready: VecDeque::new(),
            workers,
            in_flight: HashMap::new(),
            latest: None,
            next_token: 1,
            next_thumbnail_id: 1,
            pending_thumbnails: 0,
            thumbnails,
            wrap: config.viewer.wrap_navigation,
            preload: config.cache.retention_radius > 0,
        })
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ImageCache {
        &mut self.cache
    }

    pub fn set_wrap(&mut self, wrap: bool) {
        self.wrap = wrap;
    }

    /// Position of the newest request, re-resolved against the model
    pub fn latest_position(&self, model: &DirectoryModel) -> Option<usize> {
        self.latest.as_ref().and_then(|r| model.index_of_path(&r.path))
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.in_flight.contains_key(path)
    }

    /// Whether the newest request is still waiting on its decode
    pub fn is_loading(&self) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|r| self.in_flight.get(&r.path) == Some(&r.token))
    }

    /// Anything queued, running or undelivered
    pub fn has_pending_work(&self) -> bool {
        !self.in_flight.is_empty()
            || self.pending_thumbnails > 0
            || !self.ready.is_empty()
            || !self.deferred.is_empty()
            || !self.inbox_rx.is_empty()
    }

    /// Forget the previous directory's items and requests
    pub fn reset(&mut self) {
        self.cache.clear();
        self.latest = None;
        self.ready.clear();
    }

    // ===== Requests =====

    pub fn open_position(&mut self, model: &DirectoryModel, position: usize) -> Result<OpenTicket> {
        let path = model.path_at(position).ok_or(AppError::OutOfRange {
            index: position,
            len: model.len(),
        })?;
        self.request(position, path)
    }

    pub fn open_path(&mut self, model: &DirectoryModel, path: &Path) -> Result<OpenTicket> {
        let position = model
            .index_of_path(path)
            .ok_or_else(|| AppError::InvalidPath(path.to_path_buf()))?;
        self.request(position, path.to_path_buf())
    }

    /// Step forward from the newest request. `None` when there is nowhere to go.
    pub fn load_next(&mut self, model: &DirectoryModel) -> Result<Option<OpenTicket>> {
        match self.step(model, true) {
            Some(position) => self.open_position(model, position).map(Some),
            None => Ok(None),
        }
    }

    pub fn load_prev(&mut self, model: &DirectoryModel) -> Result<Option<OpenTicket>> {
        match self.step(model, false) {
            Some(position) => self.open_position(model, position).map(Some),
            None => Ok(None),
        }
    }

    fn step(&self, model: &DirectoryModel, forward: bool) -> Option<usize> {
        let len = model.len();
        if len <= 1 {
            return None;
        }
        let from = self
            .latest_position(model)
            .or_else(|| model.current_index())
            .unwrap_or(0);

        if forward {
            match from + 1 {
                next if next < len => Some(next),
                _ if self.wrap => Some(0),
                _ => None,
            }
        } else {
            match from.checked_sub(1) {
                Some(prev) => Some(prev),
                None if self.wrap => Some(len - 1),
                None => None,
            }
        }
    }

    fn request(&mut self, position: usize, path: PathBuf) -> Result<OpenTicket> {
        let token = self.next_token;
        self.next_token += 1;
        self.latest = Some(Request {
            token,
            path: path.clone(),
        });
        self.cache.set_focus(position);

        if self.cache.lookup(position, &path).is_some() {
            tracing::trace!("Cache hit at {}", position);
            self.send_inbox(InboxMsg::CacheHit { path, token })?;
            return Ok(OpenTicket {
                token,
                position,
                cached: true,
            });
        }

        self.ready.push_back(LoaderEvent::LoadStarted {
            position,
            path: path.clone(),
        });

        if let Some(waiting) = self.in_flight.get_mut(&path) {
            tracing::trace!("Joining in-flight decode of {}", path.display());
            *waiting = token;
        } else {
            self.submit(path, token)?;
        }

        Ok(OpenTicket {
            token,
            position,
            cached: false,
        })
    }

    fn submit(&mut self, path: PathBuf, token: u64) -> Result<()> {
        let jobs = self.jobs.as_ref().ok_or(AppError::WorkerGone("decode"))?;
        jobs.send(DecodeJob {
            path: path.clone(),
            reply: Reply::Inbox,
        })
        .map_err(|_| AppError::WorkerGone("decode"))?;
        self.in_flight.insert(path, token);
        Ok(())
    }

    fn send_inbox(&self, msg: InboxMsg) -> Result<()> {
        self.inbox_tx.send(msg).map_err(|_| AppError::WorkerGone("inbox"))
    }

    /// Decode `path` on a worker and wait for it. Only the calling thread
    /// waits; a decode already running for the same file is shared.
    pub fn open_blocking(&mut self, model: &DirectoryModel, path: &Path) -> Result<Item> {
        let position = model.index_of_path(path);
        if let Some(pos) = position {
            if let Some(item) = self.cache.lookup(pos, path) {
                return Ok(item.clone());
            }
            self.cache.pin(pos);
        }

        let result = if self.in_flight.contains_key(path) {
            self.wait_for_in_flight(path)
        } else {
            self.decode_blocking(path)
        };

        if let Some(pos) = position {
            if let Ok(Ok(item)) = &result {
                self.cache.insert(pos, path, item.clone());
            }
            self.cache.unpin(pos);
        }

        Ok(result??)
    }

    fn decode_blocking(&self, path: &Path) -> Result<std::result::Result<Item, DecodeError>> {
        let jobs = self.jobs.as_ref().ok_or(AppError::WorkerGone("decode"))?;
        let (tx, rx) = oneshot::channel();
        jobs.send(DecodeJob {
            path: path.to_path_buf(),
            reply: Reply::Blocking(tx),
        })
        .map_err(|_| AppError::WorkerGone("decode"))?;

        rx.blocking_recv().map_err(|_| AppError::WorkerGone("decode"))
    }

    fn wait_for_in_flight(&mut self, path: &Path) -> Result<std::result::Result<Item, DecodeError>> {
        loop {
            let msg = match self.inbox_rx.recv_timeout(BLOCKING_WAIT) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(AppError::WorkerGone("decode"));
                }
            };
            let found = match &msg {
                InboxMsg::Decoded { path: p, result } if p == path => Some(result.clone()),
                _ => None,
            };
            self.deferred.push_back(msg);
            if let Some(result) = found {
                return Ok(result);
            }
        }
    }

    // ===== Thumbnails =====

    pub fn next_thumbnail_request_id(&mut self) -> u64 {
        let id = self.next_thumbnail_id;
        self.next_thumbnail_id += 1;
        id
    }

    /// Queue a thumbnail for the file at `position`. A thumbnail still valid
    /// for the file's size and timestamp is answered from memory.
    pub fn generate_thumbnail_for(&mut self, model: &DirectoryModel, position: usize, request_id: u64) -> Result<()> {
        let entry = model.entry(position).ok_or(AppError::OutOfRange {
            index: position,
            len: model.len(),
        })?;
        let stamp = thumbnail_stamp(&entry);

        let cached = self
            .thumbnails
            .get(&entry.name)
            .filter(|c| c.stamp == stamp)
            .map(|c| c.thumbnail.clone());
        if let Some(thumbnail) = cached {
            self.send_inbox(InboxMsg::Thumbnail {
                request_id,
                result: Ok(thumbnail),
            })?;
        } else {
            let jobs = self.thumbnail_jobs.as_ref().ok_or(AppError::WorkerGone("thumbnail"))?;
            jobs.send(ThumbnailJob {
                request_id,
                path: entry.path,
                stamp,
            })
            .map_err(|_| AppError::WorkerGone("thumbnail"))?;
        }
        self.pending_thumbnails += 1;
        Ok(())
    }

    pub fn forget_thumbnail(&self, name: &str) {
        self.thumbnails.remove(name);
    }

    pub fn thumbnail_count(&self) -> usize {
        self.thumbnails.len()
    }

    // ===== Completion =====

    /// Drain the inbox and return deliverable events in arrival order
    pub fn pump(&mut self, model: &DirectoryModel) -> Vec<LoaderEvent> {
        let mut out: Vec<LoaderEvent> = self.ready.drain(..).collect();

        while let Some(msg) = self.deferred.pop_front().or_else(|| self.inbox_rx.try_recv().ok()) {
            match msg {
                InboxMsg::Decoded { path, result } => self.on_decoded(model, path, result, &mut out),
                InboxMsg::CacheHit { path, token } => self.on_cache_hit(model, path, token, &mut out),
                InboxMsg::Thumbnail { request_id, result } => {
                    self.pending_thumbnails = self.pending_thumbnails.saturating_sub(1);
                    match result {
                        Ok(thumbnail) => out.push(LoaderEvent::ThumbnailReady { request_id, thumbnail }),
                        Err(e) => tracing::debug!("Thumbnail {} failed: {}", request_id, e),
                    }
                }
            }
        }

        out
    }

    fn is_latest(&self, token: u64) -> bool {
        token != PRELOAD_TOKEN && self.latest.as_ref().is_some_and(|r| r.token == token)
    }

    fn on_decoded(
        &mut self,
        model: &DirectoryModel,
        path: PathBuf,
        result: std::result::Result<Item, DecodeError>,
        out: &mut Vec<LoaderEvent>,
    ) {
        let token = self.in_flight.remove(&path).unwrap_or(PRELOAD_TOKEN);
        let position = model.index_of_path(&path);

        if let (Ok(item), Some(pos)) = (&result, position) {
            self.cache.insert(pos, &path, item.clone());
        }

        if !self.is_latest(token) {
            tracing::trace!("Dropping superseded result for {}", path.display());
            return;
        }
        let Some(position) = position else {
            tracing::debug!("Decoded file left the directory: {}", path.display());
            return;
        };

        if let Err(e) = &result {
            tracing::warn!("Failed to load {}: {}", path.display(), e);
        }
        out.push(LoaderEvent::LoadFinished { position, path, result });
        self.schedule_preload(model, position);
    }

    fn on_cache_hit(&mut self, model: &DirectoryModel, path: PathBuf, token: u64, out: &mut Vec<LoaderEvent>) {
        if !self.is_latest(token) {
            return;
        }
        let Some(position) = model.index_of_path(&path) else {
            return;
        };

        match self.cache.lookup(position, &path).cloned() {
            Some(item) => {
                out.push(LoaderEvent::LoadFinished {
                    position,
                    path,
                    result: Ok(item),
                });
                self.schedule_preload(model, position);
            }
            None => {
                // Evicted between request and delivery
                out.push(LoaderEvent::LoadStarted {
                    position,
                    path: path.clone(),
                });
                if let Err(e) = self.submit(path, token) {
                    tracing::error!("Cannot reschedule decode: {}", e);
                }
            }
        }
    }

    /// Decode the retention window neighbours of `center`, nearest first
    fn schedule_preload(&mut self, model: &DirectoryModel, center: usize) {
        if !self.preload {
            return;
        }
        let len = model.len();
        for distance in 1..=self.cache.radius() {
            let candidates = [center.checked_add(distance), center.checked_sub(distance)];
            for position in candidates.into_iter().flatten().filter(|p| *p < len) {
                let Some(path) = model.path_at(position) else {
                    continue;
                };
                if self.cache.path_at(position) == Some(path.as_path()) || self.in_flight.contains_key(&path) {
                    continue;
                }
                tracing::trace!("Preloading position {}", position);
                if let Err(e) = self.submit(path, PRELOAD_TOKEN) {
                    tracing::error!("Preload failed: {}", e);
                    return;
                }
            }
        }
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.jobs.take();
        self.thumbnail_jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Loader worker panicked");
            }
        }
    }
}

/// Identity of a thumbnail: changes whenever the file's size or timestamp does
pub fn thumbnail_stamp(entry: &FileEntry) -> u64 {
    let mut key = Vec::with_capacity(entry.name.len() + 16);
    key.extend_from_slice(entry.name.as_bytes());
    key.extend_from_slice(&entry.size.to_le_bytes());
    key.extend_from_slice(&entry.modified.unwrap_or(0).to_le_bytes());
    xxh3_64(&key)
}

fn decode_worker(id: usize, jobs: Receiver<DecodeJob>, inbox: Sender<InboxMsg>, decoder: Arc<dyn ImageDecoder>) {
    while let Ok(job) = jobs.recv() {
        let result = decoder.decode(&job.path);
        match job.reply {
            Reply::Inbox => {
                if inbox.send(InboxMsg::Decoded { path: job.path, result }).is_err() {
                    break;
                }
            }
            Reply::Blocking(tx) => {
                let _ = tx.send(result);
            }
        }
    }
    tracing::debug!("Decode worker {} stopped", id);
}

fn thumbnail_worker(
    jobs: Receiver<ThumbnailJob>,
    inbox: Sender<InboxMsg>,
    generator: Arc<dyn ThumbnailGenerator>,
    memory: Arc<DashMap<String, CachedThumbnail>>,
    max_side: u32,
) {
    while let Ok(first) = jobs.recv() {
        let mut batch = vec![first];
        batch.extend(jobs.try_iter());

        let results: Vec<_> = batch
            .into_par_iter()
            .map(|job| {
                let result = generator.generate(&job.path, max_side);
                (job, result)
            })
            .collect();

        for (job, result) in results {
            if let Ok(thumbnail) = &result {
                memory.insert(
                    thumbnail.name.clone(),
                    CachedThumbnail {
                        stamp: job.stamp,
                        thumbnail: thumbnail.clone(),
                    },
                );
            }
            let msg = InboxMsg::Thumbnail {
                request_id: job.request_id,
                result,
            };
            if inbox.send(msg).is_err() {
                return;
            }
        }
    }
    tracing::debug!("Thumbnail worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture_dir, pump_until, test_config, CountingDecoder, StubThumbnailer};
    use app_fs::{DefaultFileOperations, ListOptions};
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        model: DirectoryModel,
        loader: Loader,
        decoder: Arc<CountingDecoder>,
        thumbnailer: Arc<StubThumbnailer>,
    }

    fn fixture(names: &[&str], radius: usize, delay: Duration) -> Fixture {
        let dir = fixture_dir(names);
        let model = DirectoryModel::new(
            Arc::new(DefaultFileOperations::new(false)),
            ListOptions::default(),
            Duration::from_millis(300),
        );
        model.set_current_dir(dir.path()).unwrap();

        let mut config = test_config();
        config.cache.retention_radius = radius;
        let decoder = Arc::new(CountingDecoder::with_delay(delay));
        let thumbnailer = Arc::new(StubThumbnailer::default());
        let loader = Loader::new(&config, decoder.clone(), thumbnailer.clone()).unwrap();

        Fixture {
            _dir: dir,
            model,
            loader,
            decoder,
            thumbnailer,
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{:02}.png", i)).collect()
    }

    fn finished(events: &[LoaderEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                LoaderEvent::LoadFinished { position, .. } => Some(*position),
                _ => None,
            })
            .collect()
    }

    fn drain_all(f: &mut Fixture) -> Vec<LoaderEvent> {
        let mut events = Vec::new();
        pump_until(Duration::from_secs(5), || {
            events.extend(f.loader.pump(&f.model));
            !f.loader.has_pending_work()
        });
        events
    }

    #[test]
    fn test_superseded_request_is_dropped() {
        let files = names(10);
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        let mut f = fixture(&refs, 0, Duration::from_millis(50));

        f.loader.open_position(&f.model, 5).unwrap();
        f.loader.open_position(&f.model, 7).unwrap();
        let events = drain_all(&mut f);

        assert_eq!(finished(&events), vec![7]);
        // The stale result still lands in the cache
        assert!(f.loader.cache().contains(5) || f.loader.cache().contains(7));
    }

    #[test]
    fn test_same_file_decoded_once() {
        let mut f = fixture(&["a.png", "b.png", "c.png", "d.png"], 0, Duration::from_millis(50));
        let path = f.model.path_at(3).unwrap();

        f.loader.open_position(&f.model, 3).unwrap();
        f.loader.open_position(&f.model, 3).unwrap();
        assert!(f.loader.is_in_flight(&path));
        let events = drain_all(&mut f);

        assert_eq!(f.decoder.calls_for(&path), 1);
        assert_eq!(finished(&events), vec![3]);
    }

    #[test]
    fn test_cache_hit_is_delivered_on_pump() {
        let mut f = fixture(&["a.png", "b.png"], 1, Duration::ZERO);
        f.loader.open_position(&f.model, 0).unwrap();
        drain_all(&mut f);

        let ticket = f.loader.open_position(&f.model, 0).unwrap();
        assert!(ticket.cached);
        let events = f.loader.pump(&f.model);
        assert_eq!(finished(&events), vec![0]);
        assert!(!events.iter().any(|e| matches!(e, LoaderEvent::LoadStarted { .. })));
        assert_eq!(f.decoder.calls_for(&f.model.path_at(0).unwrap()), 1);
    }

    #[test]
    fn test_load_started_precedes_finished() {
        let mut f = fixture(&["a.png", "b.png"], 0, Duration::ZERO);
        f.loader.open_position(&f.model, 1).unwrap();
        let events = drain_all(&mut f);
        assert!(matches!(events[0], LoaderEvent::LoadStarted { position: 1, .. }));
        assert!(matches!(events.last(), Some(LoaderEvent::LoadFinished { position: 1, .. })));
    }

    #[test]
    fn test_decode_failure_is_an_event() {
        let mut f = fixture(&["a.png", "bad.png"], 0, Duration::ZERO);
        f.decoder.fail_on("bad.png");

        f.loader.open_position(&f.model, 1).unwrap();
        let events = drain_all(&mut f);
        match events.last() {
            Some(LoaderEvent::LoadFinished { position: 1, result: Err(_), .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(!f.loader.cache().contains(1));
    }

    #[test]
    fn test_next_prev_wrap_and_bounds() {
        let mut f = fixture(&["a.png", "b.png", "c.png"], 0, Duration::ZERO);

        let t = f.loader.load_prev(&f.model).unwrap().unwrap();
        assert_eq!(t.position, 2);
        let t = f.loader.load_next(&f.model).unwrap().unwrap();
        assert_eq!(t.position, 0);

        f.loader.set_wrap(false);
        assert!(f.loader.load_prev(&f.model).unwrap().is_none());
        f.loader.open_position(&f.model, 2).unwrap();
        assert!(f.loader.load_next(&f.model).unwrap().is_none());
        drain_all(&mut f);
    }

    #[test]
    fn test_next_noop_for_single_file() {
        let mut f = fixture(&["only.png"], 0, Duration::ZERO);
        assert!(f.loader.load_next(&f.model).unwrap().is_none());
        assert!(f.loader.load_prev(&f.model).unwrap().is_none());
        assert!(f.loader.open_position(&f.model, 3).is_err());
    }

    #[test]
    fn test_preload_fills_window() {
        let mut f = fixture(&["a.png", "b.png", "c.png", "d.png", "e.png"], 1, Duration::ZERO);
        f.loader.open_position(&f.model, 2).unwrap();
        let events = drain_all(&mut f);

        assert_eq!(finished(&events), vec![2]);
        assert_eq!(f.loader.cache().positions(), vec![1, 2, 3]);
    }

    #[test]
    fn test_open_blocking_returns_item() {
        let mut f = fixture(&["a.png", "b.png"], 0, Duration::ZERO);
        let path = f.model.path_at(1).unwrap();

        let item = f.loader.open_blocking(&f.model, &path).unwrap();
        assert!(item.size().is_some());
        assert!(f.loader.cache().contains(1));
        assert!(!f.loader.cache().is_pinned(1));

        f.decoder.fail_on("a.png");
        let first = f.model.path_at(0).unwrap();
        assert!(matches!(f.loader.open_blocking(&f.model, &first), Err(AppError::Decode(_))));
    }

    #[test]
    fn test_open_blocking_shares_in_flight_decode() {
        let mut f = fixture(&["a.png", "b.png"], 0, Duration::from_millis(50));
        let path = f.model.path_at(0).unwrap();

        f.loader.open_position(&f.model, 0).unwrap();
        f.loader.open_blocking(&f.model, &path).unwrap();
        let events = drain_all(&mut f);

        assert_eq!(f.decoder.calls_for(&path), 1);
        assert_eq!(finished(&events), vec![0]);
    }

    #[test]
    fn test_thumbnails_are_memoized_by_stamp() {
        let mut f = fixture(&["a.png", "b.png"], 0, Duration::ZERO);

        let first = f.loader.next_thumbnail_request_id();
        f.loader.generate_thumbnail_for(&f.model, 1, first).unwrap();
        let events = drain_all(&mut f);
        assert!(matches!(
            &events[..],
            [LoaderEvent::ThumbnailReady { request_id, thumbnail }] if *request_id == first && thumbnail.name == "b.png"
        ));

        let second = f.loader.next_thumbnail_request_id();
        assert_ne!(first, second);
        f.loader.generate_thumbnail_for(&f.model, 1, second).unwrap();
        let events = f.loader.pump(&f.model);
        assert_eq!(events.len(), 1);
        assert_eq!(f.thumbnailer.calls(), 1);
        assert!(f.loader.generate_thumbnail_for(&f.model, 9, second).is_err());
    }

    #[test]
    fn test_thumbnail_stamp_tracks_metadata() {
        let dir = fixture_dir(&["a.png"]);
        let entry = FileEntry::from_path(dir.path().join("a.png")).unwrap();
        let mut changed = entry.clone();
        changed.size += 1;
        assert_eq!(thumbnail_stamp(&entry), thumbnail_stamp(&entry.clone()));
        assert_ne!(thumbnail_stamp(&entry), thumbnail_stamp(&changed));
    }
}
