//! Photo Storage - Configuration
//!
//! JSON configuration for store locations, encoding and capabilities.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_JPEG_QUALITY;
use crate::error::{StorageError, StorageResult};
use crate::permissions::{Permissions, SCOPED_STORAGE_API_LEVEL};

const APP_DIR: &str = "photo-storage";

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// App-private photo directory
    pub private_dir: PathBuf,
    /// Shared media index root
    pub shared_dir: PathBuf,
    /// JPEG quality for both stores
    pub jpeg_quality: u8,
    /// Platform level; 29+ implies write access to own media
    pub api_level: u32,
    /// Read media capability granted
    pub read_media: bool,
    /// Write media capability granted
    pub write_media: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::for_root(&Self::default_root())
    }
}

impl StorageConfig {
    /// Config with both stores under `root`
    pub fn for_root(root: &Path) -> Self {
        Self {
            private_dir: root.join("files"),
            shared_dir: root.join("shared"),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            api_level: SCOPED_STORAGE_API_LEVEL,
            read_media: true,
            write_media: false,
        }
    }

    /// Per-user data directory, falling back to the working directory
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Load config from `path`, or defaults under `root` if it does not exist
    pub fn load_or_default(path: &Path, root: &Path) -> StorageResult<Self> {
        let config = if path.exists() {
            let data = std::fs::read(path)?;
            serde_json::from_slice(&data)
                .map_err(|e| StorageError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Self::for_root(root)
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config as pretty JSON
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> StorageResult<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(StorageError::Config(format!(
                "jpeg_quality must be 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.private_dir == self.shared_dir {
            return Err(StorageError::Config(
                "private_dir and shared_dir must differ".into(),
            ));
        }
        Ok(())
    }

    /// Effective capability flags
    pub fn permissions(&self) -> Permissions {
        Permissions::resolve(self.read_media, self.write_media, self.api_level)
    }
}
