//! Decoded media items

use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Shared decoded pixels. Two bitmaps are "the same" when `Arc::ptr_eq`.
pub type Bitmap = Arc<RgbaImage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(bitmap: &RgbaImage) -> Self {
        Self::new(bitmap.width(), bitmap.height())
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clip to `0..bounds`. `None` when nothing is left.
    pub fn clamp_to(&self, bounds: Size) -> Option<Rect> {
        let x0 = (self.x.max(0) as i64).min(bounds.width as i64);
        let y0 = (self.y.max(0) as i64).min(bounds.height as i64);
        let x1 = (self.x as i64 + self.width as i64).clamp(0, bounds.width as i64);
        let y1 = (self.y as i64 + self.height as i64).clamp(0, bounds.height as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Rect::new(x0 as i32, y0 as i32, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Static,
    Animated,
    Video,
}

#[derive(Debug, Clone)]
pub struct StaticImage {
    pub bitmap: Bitmap,
}

impl StaticImage {
    pub fn new(bitmap: RgbaImage) -> Self {
        Self { bitmap: Arc::new(bitmap) }
    }

    /// Rotate by a multiple of 90 degrees (clockwise for positive values).
    /// `false` when the bitmap is unchanged.
    pub fn rotate(&mut self, degrees: i32) -> bool {
        let rotated = match normalize_degrees(degrees) {
            Some(90) => image::imageops::rotate90(self.bitmap.as_ref()),
            Some(180) => image::imageops::rotate180(self.bitmap.as_ref()),
            Some(270) => image::imageops::rotate270(self.bitmap.as_ref()),
            _ => return false,
        };
        self.bitmap = Arc::new(rotated);
        true
    }

    pub fn crop(&mut self, rect: Rect) -> bool {
        match self.cropped(rect) {
            Some(bitmap) => {
                self.bitmap = Arc::new(bitmap);
                true
            }
            None => false,
        }
    }

    /// Copy of the pixels inside `rect`, clipped to the image
    pub fn cropped(&self, rect: Rect) -> Option<RgbaImage> {
        let r = rect.clamp_to(Size::of(&self.bitmap))?;
        Some(
            image::imageops::crop_imm(self.bitmap.as_ref(), r.x as u32, r.y as u32, r.width, r.height)
                .to_image(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct AnimationFrame {
    pub bitmap: Bitmap,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct AnimatedImage {
    pub frames: Vec<AnimationFrame>,
}

impl AnimatedImage {
    pub fn first_frame(&self) -> Option<&Bitmap> {
        self.frames.first().map(|f| &f.bitmap)
    }
}

/// Handle to a video file; playback belongs to the rendering surface.
/// Rotation and crop are applied by the player.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoClip {
    pub path: PathBuf,
    pub size: Option<Size>,
    pub rotation: i32,
    pub crop: Option<Rect>,
}

impl VideoClip {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            size: None,
            rotation: 0,
            crop: None,
        }
    }

    pub fn rotate(&mut self, degrees: i32) -> bool {
        match normalize_degrees(degrees) {
            Some(d) if d != 0 => {
                // Both terms are below 360
                self.rotation = (self.rotation + d) % 360;
                true
            }
            _ => false,
        }
    }

    pub fn crop(&mut self, rect: Rect) -> bool {
        let bounded = match self.display_size() {
            Some(size) => rect.clamp_to(size),
            None => Some(rect),
        };
        match bounded {
            Some(r) if !r.size().is_empty() => {
                self.crop = Some(r);
                true
            }
            _ => false,
        }
    }

    /// Frame size after rotation and crop
    pub fn display_size(&self) -> Option<Size> {
        if let Some(crop) = self.crop {
            return Some(crop.size());
        }
        let size = self.size?;
        Some(if self.rotation % 180 == 0 { size } else { size.transposed() })
    }
}

/// A decoded, displayable unit bound to one file
#[derive(Debug, Clone)]
pub enum Item {
    Static(StaticImage),
    Animated(AnimatedImage),
    Video(VideoClip),
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Static(_) => ItemKind::Static,
            Item::Animated(_) => ItemKind::Animated,
            Item::Video(_) => ItemKind::Video,
        }
    }

    pub fn size(&self) -> Option<Size> {
        match self {
            Item::Static(img) => Some(Size::of(&img.bitmap)),
            Item::Animated(anim) => anim.first_frame().map(|b| Size::of(b)),
            Item::Video(clip) => clip.display_size(),
        }
    }

    /// Displayable pixels: the image, or the first frame of an animation
    pub fn bitmap(&self) -> Option<&Bitmap> {
        match self {
            Item::Static(img) => Some(&img.bitmap),
            Item::Animated(anim) => anim.first_frame(),
            Item::Video(_) => None,
        }
    }

    /// Decoded bytes held by this item
    pub fn byte_size(&self) -> usize {
        match self {
            Item::Static(img) => img.bitmap.as_raw().len(),
            Item::Animated(anim) => anim.frames.iter().map(|f| f.bitmap.as_raw().len()).sum(),
            Item::Video(_) => 0,
        }
    }
}

/// Map any multiple of 90 into 0/90/180/270
fn normalize_degrees(degrees: i32) -> Option<i32> {
    if degrees % 90 != 0 {
        return None;
    }
    Some(degrees.rem_euclid(360))
}
