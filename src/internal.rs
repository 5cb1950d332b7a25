//! Photo Storage - Internal (App-Private) Photo Store
//!
//! Photos saved here are plain JPEG files in the private directory,
//! identified only by their file name.

use std::path::Path;

use image::DynamicImage;

use crate::codec::{self, DEFAULT_JPEG_QUALITY};
use crate::error::StorageResult;
use crate::private_fs::PrivateFs;
use crate::PHOTO_SUFFIX;

/// Photo decoded from the private directory
#[derive(Debug, Clone)]
pub struct InternalPhoto {
    /// File name, suffix included
    pub name: String,
    /// Decoded bitmap
    pub image: DynamicImage,
}

impl InternalPhoto {
    /// File name without the image suffix
    pub fn stem(&self) -> &str {
        self.name.strip_suffix(PHOTO_SUFFIX).unwrap_or(&self.name)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        codec::dimensions(&self.image)
    }
}

/// Internal storage accessor
pub struct InternalStorage {
    fs: PrivateFs,
    quality: u8,
}

impl InternalStorage {
    /// Open the store rooted at `root`
    pub fn open(root: &Path) -> StorageResult<Self> {
        Ok(Self {
            fs: PrivateFs::new(root)?,
            quality: DEFAULT_JPEG_QUALITY,
        })
    }

    /// Override the JPEG quality used by `save`
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn root(&self) -> &Path {
        self.fs.root()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIST
    // ═══════════════════════════════════════════════════════════════════════

    /// Decode every readable `.jpg` file. Files that fail to read or decode
    /// are skipped; only a failure to scan the directory is an error.
    pub fn try_list(&self) -> StorageResult<Vec<InternalPhoto>> {
        let names = self.fs.list_files()?;
        let mut photos = Vec::with_capacity(names.len());

        for name in names.into_iter().filter(|n| n.ends_with(PHOTO_SUFFIX)) {
            let bytes = match self.fs.read_file(&name) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Skipping unreadable photo {}: {}", name, e);
                    continue;
                }
            };

            match codec::decode(&bytes) {
                Ok(image) => photos.push(InternalPhoto { name, image }),
                Err(e) => log::warn!("Skipping undecodable photo {}: {}", name, e),
            }
        }

        log::debug!("Listed {} private photos", photos.len());
        Ok(photos)
    }

    /// List private photos; an unreadable directory yields an empty list
    pub fn list(&self) -> Vec<InternalPhoto> {
        self.try_list().unwrap_or_else(|e| {
            log::error!("Couldn't list private photos: {}", e);
            Vec::new()
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SAVE
    // ═══════════════════════════════════════════════════════════════════════

    /// Encode `bitmap` and write it as `<name>.jpg`. Returns the file name.
    pub fn try_save(&self, name: &str, bitmap: &DynamicImage) -> StorageResult<String> {
        let file_name = format!("{}{}", name, PHOTO_SUFFIX);
        let jpeg = codec::encode_jpeg(bitmap, self.quality)?;
        self.fs.write_file(&file_name, &jpeg)?;

        log::debug!("Saved private photo {} ({} bytes)", file_name, jpeg.len());
        Ok(file_name)
    }

    pub fn save(&self, name: &str, bitmap: &DynamicImage) -> bool {
        match self.try_save(name, bitmap) {
            Ok(_) => true,
            Err(e) => {
                log::error!("Couldn't save private photo {}: {}", name, e);
                false
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DELETE
    // ═══════════════════════════════════════════════════════════════════════

    /// Remove a private photo by file name (as returned by `list`)
    pub fn try_delete(&self, file_name: &str) -> StorageResult<()> {
        self.fs.delete_file(file_name)?;
        log::debug!("Deleted private photo {}", file_name);
        Ok(())
    }

    pub fn delete(&self, file_name: &str) -> bool {
        match self.try_delete(file_name) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Couldn't delete private photo {}: {}", file_name, e);
                false
            }
        }
    }
}
