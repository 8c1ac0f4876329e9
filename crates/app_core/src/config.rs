//! Engine configuration

use app_fs::{SortBy, SortOrder};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub viewer: ViewerConfig,
    pub cache: CacheConfig,
    pub directory: DirectoryConfig,
    pub thumbnails: ThumbnailConfig,
    pub wallpaper: WallpaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Always take the fast scaling path, even for downscales
    pub fast_scale: bool,
    /// Wrap around at directory boundaries on next/prev
    pub wrap_navigation: bool,
    /// Time after which a pending load is reported as slow
    pub loading_timeout_ms: u64,
    pub enable_animation: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            fast_scale: false,
            wrap_navigation: true,
            loading_timeout_ms: 250,
            enable_animation: true,
        }
    }
}

impl ViewerConfig {
    pub fn loading_timeout(&self) -> Duration {
        Duration::from_millis(self.loading_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Positions kept resident on each side of the current one
    pub retention_radius: usize,
    /// Decoded byte budget
    pub max_bytes: usize,
    pub decode_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_radius: 2,
            max_bytes: 512 * 1024 * 1024,
            decode_workers: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub show_hidden: bool,
    /// Window in which a removal and a creation are paired into a rename
    pub rename_window_ms: u64,
    pub use_recycle_bin: bool,
    pub watch_debounce_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            sort_by: SortBy::Name,
            sort_order: SortOrder::Ascending,
            show_hidden: false,
            rename_window_ms: 300,
            use_recycle_bin: false,
            watch_debounce_ms: 100,
        }
    }
}

impl DirectoryConfig {
    pub fn rename_window(&self) -> Duration {
        Duration::from_millis(self.rename_window_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub size: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { size: 256 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WallpaperConfig {
    /// External setter, the image path is appended as last argument
    /// (e.g. "feh --bg-fill")
    pub command: Option<String>,
    /// Where the cropped wallpaper is written
    pub output_path: Option<PathBuf>,
}

impl WallpaperConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output_path.clone().unwrap_or_else(|| {
            ProjectDirs::from("com", "imgdeck", "imgdeck")
                .map(|dirs| dirs.data_dir().join(".wallpaper.png"))
                .unwrap_or_else(|| PathBuf::from("./.wallpaper.png"))
        })
    }
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, defaults when the file is absent
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::info!("Configuration loaded from {:?}", config_path);
            Ok(config)
        } else {
            tracing::info!("Using default configuration");
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        tracing::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("com", "imgdeck", "imgdeck")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }

    pub fn list_options(&self) -> app_fs::ListOptions {
        app_fs::ListOptions {
            show_hidden: self.directory.show_hidden,
            sort_by: self.directory.sort_by,
            sort_order: self.directory.sort_order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.cache.retention_radius, 2);
        assert_eq!(config.viewer.loading_timeout(), Duration::from_millis(250));
        assert!(config.viewer.wrap_navigation);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[viewer]\nfast_scale = true\n\n[directory]\nsort_by = \"size\"\nsort_order = \"desc\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.viewer.fast_scale);
        assert_eq!(config.viewer.loading_timeout_ms, 250);
        assert_eq!(config.directory.sort_by, SortBy::Size);
        assert_eq!(config.directory.sort_order, SortOrder::Descending);
        assert_eq!(config.thumbnails.size, 256);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.cache.retention_radius = 4;
        config.wallpaper.command = Some("feh --bg-fill".into());
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.cache.retention_radius, 4);
        assert_eq!(loaded.wallpaper.command.as_deref(), Some("feh --bg-fill"));
    }
}
