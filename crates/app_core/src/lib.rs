//! imgdeck Core Engine
//!
//! This crate contains:
//! - Directory model (ordered media list, current position, watcher folding)
//! - Position-keyed image cache
//! - Decode pipeline with staleness handling
//! - Navigation core (presentation events, editing, zoom)
//! - Presenter and headless views
//! - Configuration and error types

pub mod config;
pub mod directory_model;
pub mod error;
pub mod events;
pub mod image_cache;
pub mod info;
pub mod item;
pub mod loader;
pub mod navigation;
pub mod presenter;
pub mod services;
pub mod views;

#[cfg(test)]
mod test_support;

pub use config::{AppConfig, CacheConfig, DirectoryConfig, ThumbnailConfig, ViewerConfig, WallpaperConfig};
pub use directory_model::{DirectoryEvent, DirectoryModel};
pub use error::{AppError, DecodeError, Result};
pub use events::{EventHub, Subscription, SubscriptionId};
pub use image_cache::{CacheEvent, ImageCache};
pub use info::ImageInfo;
pub use item::{AnimatedImage, AnimationFrame, Bitmap, Item, ItemKind, Rect, Size, StaticImage, VideoClip};
pub use loader::{Loader, LoaderEvent, OpenTicket};
pub use navigation::{CoreEvent, NavigationCore, Services};
pub use presenter::{Presenter, View, ViewEvent, ViewId};
pub use services::{
    CommandWallpaperSetter, ImageDecoder, ImageRsDecoder, ImageRsScaler, ImageRsThumbnailer, ScaleQuality, Scaler,
    Thumbnail, ThumbnailGenerator, WallpaperSetter,
};
pub use views::ThumbnailStrip;

pub use app_fs::{SortBy, SortOrder};
