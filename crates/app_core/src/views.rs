//! Headless thumbnail strip
//!
//! Holds what a horizontal strip widget needs to draw: one slot per
//! directory item, the selection, and the scroll position. Rendering code
//! reads [`ThumbnailStrip::visible_range`] and [`ThumbnailStrip::thumbnail`];
//! clicks come back in through [`ThumbnailStrip::click`].

use crate::item::Bitmap;
use crate::presenter::{View, ViewEvent};
use crate::services::Thumbnail;
use std::ops::Range;

/// Space taken by the caption and frame below each thumbnail
const CAPTION_HEIGHT: u32 = 25;
const MIN_THUMBNAIL_SIZE: u32 = 20;
/// Horizontal gap between items
const ITEM_SPACING: u32 = 8;

#[derive(Debug, Clone)]
enum Slot {
    Missing,
    Requested,
    Ready(Bitmap),
}

pub struct ThumbnailStrip {
    slots: Vec<Slot>,
    selected: Option<usize>,
    /// Index of the first visible item
    scroll: usize,
    panel_width: u32,
    thumbnail_size: u32,
    pending: Vec<ViewEvent>,
}

impl ThumbnailStrip {
    pub fn new(panel_width: u32, panel_height: u32) -> Self {
        Self {
            slots: Vec::new(),
            selected: None,
            scroll: 0,
            panel_width,
            thumbnail_size: thumbnail_size_for(panel_height),
            pending: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn thumbnail_size(&self) -> u32 {
        self.thumbnail_size
    }

    /// Panel was resized. Thumbnails of the old size are dropped and the
    /// visible ones asked for again.
    pub fn resize(&mut self, panel_width: u32, panel_height: u32) {
        let size = thumbnail_size_for(panel_height);
        self.panel_width = panel_width;
        if size != self.thumbnail_size {
            self.thumbnail_size = size;
            self.slots.iter_mut().for_each(|s| *s = Slot::Missing);
        }
        self.clamp_scroll();
        self.request_visible();
    }

    /// Number of items that fit the panel width
    pub fn visible_count(&self) -> usize {
        (self.panel_width / (self.thumbnail_size + ITEM_SPACING)).max(1) as usize
    }

    pub fn visible_range(&self) -> Range<usize> {
        let end = (self.scroll + self.visible_count()).min(self.slots.len());
        self.scroll.min(end)..end
    }

    pub fn thumbnail(&self, index: usize) -> Option<&Bitmap> {
        match self.slots.get(index) {
            Some(Slot::Ready(bitmap)) => Some(bitmap),
            _ => None,
        }
    }

    /// User clicked `index`; the presenter turns it into an index request
    pub fn click(&mut self, index: usize) {
        if index < self.slots.len() {
            self.pending.push(ViewEvent::ItemSelected(index));
        }
    }

    pub fn scroll_by(&mut self, delta: isize) {
        self.scroll = self.scroll.saturating_add_signed(delta);
        self.clamp_scroll();
        self.request_visible();
    }

    fn clamp_scroll(&mut self) {
        let max_scroll = self.slots.len().saturating_sub(self.visible_count());
        self.scroll = self.scroll.min(max_scroll);
    }

    /// Ask for the missing thumbnails of the visible items
    fn request_visible(&mut self) {
        let range = self.visible_range();
        let missing: Vec<usize> = range.filter(|&i| matches!(self.slots[i], Slot::Missing)).collect();
        let (Some(&first), Some(&last)) = (missing.first(), missing.last()) else {
            return;
        };
        for slot in &mut self.slots[first..=last] {
            if matches!(slot, Slot::Missing) {
                *slot = Slot::Requested;
            }
        }
        self.pending.push(ViewEvent::ThumbnailsRequested(first..last + 1));
    }
}

/// Square thumbnail edge for a panel of `panel_height` pixels
fn thumbnail_size_for(panel_height: u32) -> u32 {
    (panel_height.saturating_sub(CAPTION_HEIGHT) & !1).max(MIN_THUMBNAIL_SIZE)
}

impl View for ThumbnailStrip {
    fn populate(&mut self, count: usize) {
        self.slots = vec![Slot::Missing; count];
        self.selected = None;
        self.scroll = 0;
        self.request_visible();
    }

    fn insert_item(&mut self, index: usize) {
        let index = index.min(self.slots.len());
        self.slots.insert(index, Slot::Missing);
        self.selected = self.selected.map(|s| if s >= index { s + 1 } else { s });
        self.request_visible();
    }

    fn remove_item(&mut self, index: usize) {
        if index >= self.slots.len() {
            return;
        }
        self.slots.remove(index);
        self.selected = match self.selected {
            Some(s) if s == index => None,
            Some(s) if s > index => Some(s - 1),
            other => other,
        };
        self.clamp_scroll();
        self.request_visible();
    }

    fn reload_item(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Slot::Missing;
            self.request_visible();
        }
    }

    fn select_index(&mut self, index: Option<usize>) {
        self.selected = index.filter(|&i| i < self.slots.len());
    }

    fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    fn focus_on(&mut self, index: usize) {
        if index >= self.slots.len() {
            return;
        }
        let visible = self.visible_count();
        if index < self.scroll {
            self.scroll = index;
        } else if index >= self.scroll + visible {
            self.scroll = index + 1 - visible;
        }
        self.request_visible();
    }

    fn set_thumbnail(&mut self, index: usize, thumbnail: &Thumbnail) {
        match self.slots.get_mut(index) {
            Some(slot) => *slot = Slot::Ready(thumbnail.bitmap.clone()),
            None => tracing::trace!("Thumbnail for index {} past the strip end", index),
        }
    }

    fn drain_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.pending)
    }
}
