//! Keeps attached views in step with one directory model

use crate::directory_model::{DirectoryEvent, DirectoryModel};
use crate::events::Subscription;
use crate::services::Thumbnail;
use crate::Result;
use std::ops::Range;
use std::sync::Arc;

/// A passive surface listing the model's items by index
pub trait View {
    /// Replace all items with `count` fresh ones
    fn populate(&mut self, count: usize);
    fn insert_item(&mut self, index: usize);
    fn remove_item(&mut self, index: usize);
    /// Re-fetch rendering data for `index`
    fn reload_item(&mut self, index: usize);
    fn select_index(&mut self, index: Option<usize>);
    fn selected_index(&self) -> Option<usize>;
    fn focus_on(&mut self, index: usize);
    fn set_thumbnail(&mut self, index: usize, thumbnail: &Thumbnail);

    /// User-originated events queued since the last call
    fn drain_events(&mut self) -> Vec<ViewEvent> {
        Vec::new()
    }
}

/// Events flowing from a view back to the presenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    ItemSelected(usize),
    ThumbnailsRequested(Range<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(u64);

struct AttachedModel {
    model: Arc<DirectoryModel>,
    events: Subscription<DirectoryEvent>,
}

/// Owns the views and fans model changes out to them
#[derive(Default)]
pub struct Presenter {
    views: Vec<(ViewId, Box<dyn View>)>,
    attached: Option<AttachedModel>,
    next_view_id: u64,
}

impl Presenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self) -> Option<&Arc<DirectoryModel>> {
        self.attached.as_ref().map(|a| &a.model)
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn attach_view(&mut self, mut view: Box<dyn View>) -> ViewId {
        self.next_view_id += 1;
        let id = ViewId(self.next_view_id);

        if let Some(attached) = &self.attached {
            sync_view(view.as_mut(), &attached.model);
        }
        self.views.push((id, view));
        id
    }

    pub fn detach_view(&mut self, id: ViewId) -> Option<Box<dyn View>> {
        let pos = self.views.iter().position(|(vid, _)| *vid == id)?;
        Some(self.views.remove(pos).1)
    }

    pub fn view(&self, id: ViewId) -> Option<&dyn View> {
        self.views.iter().find(|(vid, _)| *vid == id).map(|(_, v)| v.as_ref())
    }

    pub fn view_mut(&mut self, id: ViewId) -> Option<&mut (dyn View + 'static)> {
        self.views
            .iter_mut()
            .find(|(vid, _)| *vid == id)
            .map(|(_, v)| v.as_mut())
    }

    /// Attach to `model`, fully detaching the previous one first
    pub fn set_model(&mut self, model: Arc<DirectoryModel>) {
        self.unset_model();

        let events = model.subscribe();
        for (_, view) in &mut self.views {
            sync_view(view.as_mut(), &model);
        }
        tracing::debug!("Presenter attached to {:?}", model.dir());
        self.attached = Some(AttachedModel { model, events });
    }

    pub fn unset_model(&mut self) {
        if let Some(old) = self.attached.take() {
            old.model.events().unsubscribe(old.events.id());
        }
    }

    /// Forward a view's selection as an asynchronous index request
    pub fn load_by_index(&self, index: usize) -> Result<()> {
        match &self.attached {
            Some(attached) => attached.model.set_index_async(index),
            None => Ok(()),
        }
    }

    pub fn handle_view_event(&self, event: ViewEvent) {
        let Some(attached) = &self.attached else {
            return;
        };
        match event {
            ViewEvent::ItemSelected(index) => {
                if let Err(e) = attached.model.set_index_async(index) {
                    tracing::warn!("Selection ignored: {}", e);
                }
            }
            ViewEvent::ThumbnailsRequested(range) => attached.model.request_thumbnails(range),
        }
    }

    /// Apply queued model changes to every view, then forward view events.
    /// Returns the number of model events handled.
    pub fn pump(&mut self) -> usize {
        let Some(attached) = &self.attached else {
            return 0;
        };
        let events = attached.events.drain();
        let handled = events.len();

        for event in &events {
            for (_, view) in &mut self.views {
                apply(view.as_mut(), event);
            }
        }

        let view_events: Vec<ViewEvent> = self.views.iter_mut().flat_map(|(_, v)| v.drain_events()).collect();
        for event in view_events {
            self.handle_view_event(event);
        }

        handled
    }
}

fn sync_view(view: &mut dyn View, model: &DirectoryModel) {
    view.populate(model.len());
    let current = model.current_index();
    view.select_index(current);
    if let Some(index) = current {
        view.focus_on(index);
    }
}

fn apply(view: &mut dyn View, event: &DirectoryEvent) {
    match event {
        DirectoryEvent::Loaded { count, .. } => {
            view.populate(*count);
            // Loaded always starts at the first file
            if *count > 0 {
                view.select_index(Some(0));
                view.focus_on(0);
            }
        }
        DirectoryEvent::FileAdded { index, .. } => view.insert_item(*index),
        DirectoryEvent::FileRemoved { index, .. } => view.remove_item(*index),
        DirectoryEvent::FileRenamed {
            old_index, new_index, ..
        } => {
            let follows = matches!(view.selected_index(), Some(sel) if sel == *old_index)
                || view.selected_index().is_none();
            view.remove_item(*old_index);
            view.insert_item(*new_index);
            if follows {
                view.select_index(Some(*new_index));
                view.focus_on(*new_index);
            }
        }
        DirectoryEvent::FileModified { index, .. } => view.reload_item(*index),
        DirectoryEvent::IndexChanged { new, .. } => {
            view.select_index(*new);
            if let Some(index) = new {
                view.focus_on(*index);
            }
        }
        DirectoryEvent::SortingChanged { count, current } => {
            view.populate(*count);
            view.select_index(*current);
            if let Some(index) = current {
                view.focus_on(*index);
            }
        }
        DirectoryEvent::ThumbnailReady { index, thumbnail } => view.set_thumbnail(*index, thumbnail),
        DirectoryEvent::IndexRequested { .. } | DirectoryEvent::ThumbnailsRequested { .. } => {}
    }
}
