//! Position-keyed cache of decoded items
//!
//! Slots are keyed by directory position and follow structural changes of
//! the list: a removal shifts every later slot down by one, an insertion
//! shifts them up, a rename moves the slot. Each slot remembers the path it
//! was decoded from so a lookup never returns another file's pixels.

use crate::events::{EventHub, Subscription};
use crate::item::Item;
use crate::CacheConfig;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// First item of a freshly loaded directory is resident
    Initialized { count: usize },
    ItemRemoved { position: usize },
}

#[derive(Debug)]
struct Slot {
    path: PathBuf,
    item: Item,
    bytes: usize,
    last_used: u64,
}

/// Bounded position -> item store
pub struct ImageCache {
    slots: BTreeMap<usize, Slot>,
    /// Blocking readers per position
    pins: BTreeMap<usize, usize>,
    radius: usize,
    max_bytes: usize,
    total_bytes: usize,
    /// Most recently requested position; centre of the retention window
    focus: Option<usize>,
    /// Displayed position; never evicted
    current: Option<usize>,
    clock: u64,
    initialized: bool,
    events: EventHub<CacheEvent>,
}

impl ImageCache {
    pub fn new(radius: usize, max_bytes: usize) -> Self {
        Self {
            slots: BTreeMap::new(),
            pins: BTreeMap::new(),
            radius,
            max_bytes,
            total_bytes: 0,
            focus: None,
            current: None,
            clock: 0,
            initialized: false,
            events: EventHub::new(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.retention_radius, config.max_bytes)
    }

    pub fn subscribe(&self) -> Subscription<CacheEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn positions(&self) -> Vec<usize> {
        self.slots.keys().copied().collect()
    }

    pub fn contains(&self, position: usize) -> bool {
        self.slots.contains_key(&position)
    }

    /// Item at `position`, if resident. Never blocks.
    pub fn image_at(&self, position: usize) -> Option<&Item> {
        self.slots.get(&position).map(|s| &s.item)
    }

    /// Item at `position` only when it was decoded from `path`
    pub fn lookup(&mut self, position: usize, path: &Path) -> Option<&Item> {
        self.clock += 1;
        let clock = self.clock;
        let slot = self.slots.get_mut(&position).filter(|s| s.path == path)?;
        slot.last_used = clock;
        Some(&slot.item)
    }

    pub fn path_at(&self, position: usize) -> Option<&Path> {
        self.slots.get(&position).map(|s| s.path.as_path())
    }

    /// Mutate a resident item in place
    pub fn modify<R>(&mut self, position: usize, f: impl FnOnce(&mut Item) -> R) -> Option<R> {
        let slot = self.slots.get_mut(&position)?;
        let result = f(&mut slot.item);
        let bytes = slot.item.byte_size();
        self.total_bytes = self.total_bytes - slot.bytes + bytes;
        slot.bytes = bytes;
        Some(result)
    }

    /// Recenter the retention window
    pub fn set_focus(&mut self, position: usize) {
        self.focus = Some(position);
    }

    pub fn set_current(&mut self, position: Option<usize>) {
        self.current = position;
    }

    pub fn retention_window(&self) -> Option<RangeInclusive<usize>> {
        self.focus
            .map(|f| f.saturating_sub(self.radius)..=f.saturating_add(self.radius))
    }

    /// Store `item` at `position`, then evict outside the retention window
    pub fn insert(&mut self, position: usize, path: &Path, item: Item) {
        self.clock += 1;
        let bytes = item.byte_size();
        let slot = Slot {
            path: path.to_path_buf(),
            item,
            bytes,
            last_used: self.clock,
        };
        if let Some(old) = self.slots.insert(position, slot) {
            self.total_bytes -= old.bytes;
        }
        self.total_bytes += bytes;
        tracing::trace!("Cached position {} ({} bytes)", position, bytes);

        self.evict();
    }

    /// Hold `position` against eviction while a blocking reader waits on it
    pub fn pin(&mut self, position: usize) {
        *self.pins.entry(position).or_insert(0) += 1;
    }

    pub fn unpin(&mut self, position: usize) {
        if let Some(count) = self.pins.get_mut(&position) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(&position);
            }
        }
    }

    pub fn is_pinned(&self, position: usize) -> bool {
        self.pins.contains_key(&position)
    }

    /// Drop the slot without touching other keys (content changed on disk)
    pub fn invalidate(&mut self, position: usize) {
        if let Some(slot) = self.slots.remove(&position) {
            self.total_bytes -= slot.bytes;
        }
    }

    /// Structural removal: drop `position` and shift later slots down by one
    pub fn remove_at(&mut self, position: usize) {
        self.invalidate(position);
        self.slots = shift_down(std::mem::take(&mut self.slots), position);
        self.pins.remove(&position);
        self.pins = shift_down(std::mem::take(&mut self.pins), position);
        self.focus = self.focus.map(|p| shift_position_down(p, position));
        self.current = self.current.map(|p| shift_position_down(p, position));

        self.events.emit(CacheEvent::ItemRemoved { position });
    }

    /// Structural insertion: slots at or after `position` move up by one
    pub fn insert_at(&mut self, position: usize) {
        self.slots = shift_up(std::mem::take(&mut self.slots), position);
        self.pins = shift_up(std::mem::take(&mut self.pins), position);
        self.focus = self.focus.map(|p| if p >= position { p + 1 } else { p });
        self.current = self.current.map(|p| if p >= position { p + 1 } else { p });
    }

    /// Rename: the slot keeps its item, moves to `to` and takes `new_path`
    pub fn move_slot(&mut self, from: usize, to: usize, new_path: &Path) {
        let slot = self.slots.remove(&from);
        let follows_focus = self.focus == Some(from);
        let follows_current = self.current == Some(from);

        self.slots = shift_down(std::mem::take(&mut self.slots), from);
        self.pins = shift_down(std::mem::take(&mut self.pins), from);
        self.focus = self.focus.map(|p| shift_position_down(p, from));
        self.current = self.current.map(|p| shift_position_down(p, from));
        self.insert_at(to);

        if follows_focus {
            self.focus = Some(to);
        }
        if follows_current {
            self.current = Some(to);
        }
        if let Some(mut slot) = slot {
            slot.path = new_path.to_path_buf();
            self.slots.insert(to, slot);
        }
    }

    /// List re-sorted: drop every slot except `keep.0`, which moves to
    /// `keep.1`. Stays initialized.
    pub fn resort(&mut self, keep: Option<(usize, usize)>) {
        let kept = keep.and_then(|(from, to)| {
            let slot = self.slots.remove(&from)?;
            Some((to, slot, self.pins.remove(&from)))
        });
        self.slots.clear();
        self.pins.clear();
        self.total_bytes = 0;

        if let Some((to, slot, pins)) = kept {
            self.total_bytes = slot.bytes;
            self.slots.insert(to, slot);
            if let Some(count) = pins {
                self.pins.insert(to, count);
            }
            self.focus = Some(to);
            self.current = Some(to);
        }
    }

    /// Forget everything (directory replaced)
    pub fn clear(&mut self) {
        self.slots.clear();
        self.pins.clear();
        self.total_bytes = 0;
        self.focus = None;
        self.current = None;
        self.initialized = false;
    }

    /// Emit `Initialized` the first time an item lands after a directory load
    pub fn mark_initialized(&mut self, count: usize) {
        if !self.initialized {
            self.initialized = true;
            tracing::debug!("Cache initialized ({} files)", count);
            self.events.emit(CacheEvent::Initialized { count });
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn evict(&mut self) {
        let window = self.retention_window();
        let window_len = 2 * self.radius + 1;

        let mut candidates: Vec<(u64, usize)> = self
            .slots
            .iter()
            .filter(|(pos, _)| {
                let pos = **pos;
                !window.as_ref().is_some_and(|w| w.contains(&pos))
                    && self.current != Some(pos)
                    && !self.pins.contains_key(&pos)
            })
            .map(|(pos, slot)| (slot.last_used, *pos))
            .collect();
        candidates.sort_unstable();

        for (_, pos) in candidates {
            if self.slots.len() <= window_len && self.total_bytes <= self.max_bytes {
                break;
            }
            if let Some(slot) = self.slots.remove(&pos) {
                self.total_bytes -= slot.bytes;
                tracing::trace!("Evicted position {}", pos);
            }
        }
    }
}

fn shift_position_down(p: usize, removed: usize) -> usize {
    if p > removed {
        p - 1
    } else {
        p
    }
}

fn shift_down<V>(map: BTreeMap<usize, V>, removed: usize) -> BTreeMap<usize, V> {
    map.into_iter()
        .filter(|(k, _)| *k != removed)
        .map(|(k, v)| (shift_position_down(k, removed), v))
        .collect()
}

fn shift_up<V>(map: BTreeMap<usize, V>, inserted: usize) -> BTreeMap<usize, V> {
    map.into_iter()
        .map(|(k, v)| (if k >= inserted { k + 1 } else { k }, v))
        .collect()
}
