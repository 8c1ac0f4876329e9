//! External collaborators: decoding, scaling, thumbnails, wallpaper
//!
//! The engine only sees the traits. The `image`-crate implementations
//! below are the defaults wired by the binary.

use crate::error::DecodeError;
use crate::item::{AnimatedImage, AnimationFrame, Bitmap, Item, Size, StaticImage, VideoClip};
use crate::AppError;
use app_fs::MediaKind;
use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

/// Which resampling path to take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleQuality {
    /// Bilinear
    Fast,
    /// Bicubic
    Quality,
}

/// Path -> decoded item
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Item, DecodeError>;
}

/// Bitmap resampling
pub trait Scaler: Send + Sync {
    fn resample(&self, bitmap: &Bitmap, target: Size, quality: ScaleQuality) -> Bitmap;
}

/// Small preview bitmap, keyed by file name
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub name: String,
    pub bitmap: Bitmap,
    /// Original media dimensions, when known
    pub source_size: Option<Size>,
}

pub trait ThumbnailGenerator: Send + Sync {
    fn generate(&self, path: &Path, max_side: u32) -> Result<Thumbnail, DecodeError>;
}

/// OS wallpaper integration
pub trait WallpaperSetter: Send + Sync {
    fn set_wallpaper(&self, image_path: &Path) -> Result<(), AppError>;
}

/// Decoder backed by the `image` crate. GIFs with more than one frame
/// become animations; video files become clip handles.
#[derive(Debug, Default, Clone)]
pub struct ImageRsDecoder;

impl ImageDecoder for ImageRsDecoder {
    fn decode(&self, path: &Path) -> Result<Item, DecodeError> {
        match app_fs::classify(path) {
            Some(MediaKind::Video) => {
                if !path.is_file() {
                    return Err(DecodeError::Unsupported(path.to_path_buf()));
                }
                return Ok(Item::Video(VideoClip::new(path)));
            }
            Some(MediaKind::Image) => {}
            None => return Err(DecodeError::Unsupported(path.to_path_buf())),
        }

        tracing::debug!("Decoding image: {}", path.display());
        let bytes = std::fs::read(path).map_err(|e| DecodeError::io(path, e))?;

        if image::guess_format(&bytes).ok() == Some(ImageFormat::Gif) {
            return decode_gif(path, bytes);
        }

        let img = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| DecodeError::io(path, e))?
            .decode()
            .map_err(|e| DecodeError::image(path, e))?;

        Ok(Item::Static(StaticImage::new(img.to_rgba8())))
    }
}

fn decode_gif(path: &Path, bytes: Vec<u8>) -> Result<Item, DecodeError> {
    let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(|e| DecodeError::image(path, e))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| DecodeError::image(path, e))?;

    let mut frames: Vec<AnimationFrame> = frames
        .into_iter()
        .map(|frame| {
            let (num, den) = frame.delay().numer_denom_ms();
            let ms = if den == 0 { 0 } else { num / den };
            AnimationFrame {
                // Browsers treat tiny delays as 100ms
                delay: Duration::from_millis(if ms < 20 { 100 } else { ms as u64 }),
                bitmap: Arc::new(frame.into_buffer()),
            }
        })
        .collect();

    match frames.len() {
        0 => Err(DecodeError::Image {
            path: path.to_path_buf(),
            message: "GIF has no frames".into(),
        }),
        1 => {
            let frame = frames.remove(0);
            Ok(Item::Static(StaticImage { bitmap: frame.bitmap }))
        }
        _ => Ok(Item::Animated(AnimatedImage { frames })),
    }
}

/// Scaler backed by `image::imageops::resize`
#[derive(Debug, Default, Clone)]
pub struct ImageRsScaler;

impl Scaler for ImageRsScaler {
    fn resample(&self, bitmap: &Bitmap, target: Size, quality: ScaleQuality) -> Bitmap {
        let filter = match quality {
            ScaleQuality::Fast => FilterType::Triangle,
            ScaleQuality::Quality => FilterType::CatmullRom,
        };
        Arc::new(image::imageops::resize(
            bitmap.as_ref(),
            target.width.max(1),
            target.height.max(1),
            filter,
        ))
    }
}

/// Thumbnail generator backed by the `image` crate
#[derive(Debug, Default, Clone)]
pub struct ImageRsThumbnailer;

impl ThumbnailGenerator for ImageRsThumbnailer {
    fn generate(&self, path: &Path, max_side: u32) -> Result<Thumbnail, DecodeError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if app_fs::classify(path) != Some(MediaKind::Image) {
            return Err(DecodeError::Unsupported(path.to_path_buf()));
        }

        let img = ImageReader::open(path)
            .map_err(|e| DecodeError::io(path, e))?
            .with_guessed_format()
            .map_err(|e| DecodeError::io(path, e))?
            .decode()
            .map_err(|e| DecodeError::image(path, e))?;

        let source_size = Size::new(img.width(), img.height());
        let thumb = img.thumbnail(max_side, max_side).to_rgba8();

        Ok(Thumbnail {
            name,
            bitmap: Arc::new(thumb),
            source_size: Some(source_size),
        })
    }
}

/// Runs an external command with the image path appended
#[derive(Debug, Clone)]
pub struct CommandWallpaperSetter {
    command: String,
}

impl CommandWallpaperSetter {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

impl WallpaperSetter for CommandWallpaperSetter {
    fn set_wallpaper(&self, image_path: &Path) -> Result<(), AppError> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| AppError::Config("empty wallpaper command".into()))?;

        let output = Command::new(program).args(parts).arg(image_path).output()?;
        if !output.status.success() {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!(
                    "wallpaper command failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            )));
        }

        tracing::info!("Wallpaper set from {}", image_path.display());
        Ok(())
    }
}

/// Write a bitmap to disk, format chosen by extension
pub fn save_bitmap(bitmap: &Bitmap, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    bitmap.save(path).map_err(|e| match e {
        image::ImageError::IoError(io) => AppError::Io(io),
        other => AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, other.to_string())),
    })?;
    tracing::debug!("Saved bitmap to {}", path.display());
    Ok(())
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
