//! Photo Storage - Shared Photo Store
//!
//! Photos published through the shared media index, visible to other
//! applications.

use std::io::{Read, Write};
use std::sync::Arc;

use image::DynamicImage;

use crate::codec::{self, DEFAULT_JPEG_QUALITY};
use crate::error::{StorageError, StorageResult};
use crate::index::{Column, ContentValues, Locator, MediaIndex, MediaRow, SortOrder};
use crate::permissions::Permissions;
use crate::{PHOTO_MIME_TYPE, PHOTO_SUFFIX};

/// Photo listed from the shared index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedPhoto {
    /// Assigned by the index
    pub id: i64,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Where to open the photo bytes
    pub locator: Locator,
}

const PROJECTION: [Column; 4] = [Column::Id, Column::DisplayName, Column::Width, Column::Height];

/// Shared storage accessor
pub struct SharedStorage {
    index: Arc<MediaIndex>,
    permissions: Arc<Permissions>,
    quality: u8,
}

impl SharedStorage {
    pub fn new(index: Arc<MediaIndex>, permissions: Arc<Permissions>) -> Self {
        Self {
            index,
            permissions,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn index(&self) -> &Arc<MediaIndex> {
        &self.index
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIST
    // ═══════════════════════════════════════════════════════════════════════

    /// Every shared photo, ascending by name
    pub fn try_list(&self) -> StorageResult<Vec<SharedPhoto>> {
        if !self.permissions.can_read() {
            return Err(StorageError::PermissionDenied("read media"));
        }

        let rows = self
            .index
            .query(&PROJECTION, SortOrder::asc(Column::DisplayName))?;

        let collection = self.index.collection();
        let mut photos = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::photo_from_row(&row, collection) {
                Ok(photo) => photos.push(photo),
                Err(e) => log::warn!("Skipping shared entry {:?}: {}", row.id().ok(), e),
            }
        }

        log::debug!("Listed {} shared photos", photos.len());
        Ok(photos)
    }

    fn photo_from_row(row: &MediaRow, collection: &str) -> StorageResult<SharedPhoto> {
        let id = row.id()?;
        Ok(SharedPhoto {
            id,
            name: row.display_name()?.to_string(),
            width: row.width()?,
            height: row.height()?,
            locator: Locator::with_appended_id(collection, id),
        })
    }

    /// List shared photos; no permission or a failed query yields an empty list
    pub fn list(&self) -> Vec<SharedPhoto> {
        match self.try_list() {
            Ok(photos) => photos,
            Err(e) if e.is_permission() => {
                log::debug!("Not listing shared photos: {}", e);
                Vec::new()
            }
            Err(e) => {
                log::error!("Couldn't query shared photos: {}", e);
                Vec::new()
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SAVE
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert an entry for `<name>.jpg` and write the encoded bitmap to it.
    /// A failed write removes the half-created entry.
    pub fn try_save(&self, name: &str, bitmap: &DynamicImage) -> StorageResult<Locator> {
        if !self.permissions.can_write() {
            return Err(StorageError::PermissionDenied("write media"));
        }

        let (width, height) = codec::dimensions(bitmap);
        let values = ContentValues {
            display_name: format!("{}{}", name, PHOTO_SUFFIX),
            mime_type: PHOTO_MIME_TYPE.to_string(),
            width,
            height,
        };

        let jpeg = codec::encode_jpeg(bitmap, self.quality)?;
        let locator = self.index.insert(self.index.collection(), &values)?;

        if let Err(e) = self.write_payload(&locator, &jpeg) {
            if let Err(cleanup) = self.index.delete(&locator) {
                log::warn!("Couldn't remove pending entry {}: {}", locator, cleanup);
            }
            return Err(e);
        }

        log::debug!("Saved shared photo {} at {}", values.display_name, locator);
        Ok(locator)
    }

    fn write_payload(&self, locator: &Locator, jpeg: &[u8]) -> StorageResult<()> {
        let mut stream = self.index.open_output_stream(locator)?;
        stream.write_all(jpeg)?;
        stream.finish()
    }

    pub fn save(&self, name: &str, bitmap: &DynamicImage) -> bool {
        match self.try_save(name, bitmap) {
            Ok(_) => true,
            Err(e) => {
                log::error!("Couldn't save shared photo {}: {}", name, e);
                false
            }
        }
    }

    /// Decode a listed photo's bytes
    pub fn load(&self, photo: &SharedPhoto) -> StorageResult<DynamicImage> {
        if !self.permissions.can_read() {
            return Err(StorageError::PermissionDenied("read media"));
        }

        let mut stream = self.index.open_input_stream(&photo.locator)?;
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        codec::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexChange;
    use tempfile::tempdir;

    fn store(permissions: Permissions) -> (tempfile::TempDir, SharedStorage) {
        let dir = tempdir().unwrap();
        let index = Arc::new(MediaIndex::open(dir.path()).unwrap());
        (dir, SharedStorage::new(index, Arc::new(permissions)))
    }

    #[test]
    fn test_save_then_list() {
        let (_dir, store) = store(Permissions::all());

        assert!(store.save("B", &DynamicImage::new_rgb8(5, 5)));

        let photos = store.list();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].name, "B.jpg");
        assert_eq!((photos[0].width, photos[0].height), (5, 5));
        assert_eq!(photos[0].locator.id().unwrap(), photos[0].id);

        let decoded = store.load(&photos[0]).unwrap();
        assert_eq!(codec::dimensions(&decoded), (5, 5));
    }

    #[test]
    fn test_malformed_external_row_does_not_hide_others() {
        let (dir, store) = store(Permissions::all());
        assert!(store.save("good", &DynamicImage::new_rgb8(4, 4)));
        assert_eq!(store.list().len(), 1);

        let other = rusqlite::Connection::open(dir.path().join("index.db")).unwrap();
        other
            .execute(
                "INSERT INTO images (_display_name, mime_type, width, height, date_added, _data, is_pending)
                 VALUES ('another.jpg', 'image/jpeg', -1, 5, '2024-01-01T00:00:00+00:00', '99.jpg', 0)",
                [],
            )
            .unwrap();

        let photos = store.list();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].name, "good.jpg");
    }

    #[test]
    fn test_list_sorted_by_name() {
        let (_dir, store) = store(Permissions::all());
        for name in ["delta", "alpha", "charlie", "bravo"] {
            assert!(store.save(name, &DynamicImage::new_rgb8(2, 3)));
        }

        let names: Vec<_> = store.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha.jpg", "bravo.jpg", "charlie.jpg", "delta.jpg"]);
    }

    #[test]
    fn test_write_requires_permission() {
        let (_dir, store) = store(Permissions::new(true, false));

        assert!(!store.save("nope", &DynamicImage::new_rgb8(2, 2)));
        assert!(store.try_save("nope", &DynamicImage::new_rgb8(2, 2)).unwrap_err().is_permission());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_read_requires_permission() {
        let (_dir, store) = store(Permissions::new(false, true));

        assert!(store.save("hidden", &DynamicImage::new_rgb8(2, 2)));
        assert!(store.list().is_empty());
        assert_eq!(store.index().count().unwrap(), 1);
    }

    #[test]
    fn test_failed_encode_leaves_no_entry() {
        let (_dir, store) = store(Permissions::all());
        let observer = store.index().register_observer();

        assert!(!store.save("empty", &DynamicImage::new_rgb8(0, 0)));
        assert_eq!(store.index().count().unwrap(), 0);
        assert_eq!(observer.try_recv(), None);
    }

    #[test]
    fn test_save_notifies_once() {
        let (_dir, store) = store(Permissions::all());
        let observer = store.index().register_observer();

        let locator = store.try_save("n", &DynamicImage::new_rgb8(1, 1)).unwrap();
        assert_eq!(observer.try_recv(), Some(IndexChange::Inserted(locator)));
        assert_eq!(observer.try_recv(), None);
    }
}
