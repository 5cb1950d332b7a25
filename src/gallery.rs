//! Photo Storage - Gallery
//!
//! Drives both stores the way the photo screen does: capture, delete,
//! refresh the displayed lists, and re-list shared photos whenever the
//! media index changes. Storage calls run on the blocking pool and are
//! awaited, one per user action.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::StorageResult;
use crate::index::{MediaIndex, ObserverHandle};
use crate::internal::{InternalPhoto, InternalStorage};
use crate::permissions::Permissions;
use crate::shared::{SharedPhoto, SharedStorage};

const OBSERVER_POLL: Duration = Duration::from_millis(100);

/// User-facing status after an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMessage {
    PhotoSaved,
    SaveFailed,
    PhotoDeleted,
    DeleteFailed,
    ReadPermissionMissing,
}

impl StatusMessage {
    pub fn text(&self) -> &'static str {
        match self {
            StatusMessage::PhotoSaved => "Photo saved successfully",
            StatusMessage::SaveFailed => "Failed to save photo",
            StatusMessage::PhotoDeleted => "Photo deleted successfully",
            StatusMessage::DeleteFailed => "Photo was not able to be removed",
            StatusMessage::ReadPermissionMissing => "Can't read files without permission",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusMessage::PhotoSaved | StatusMessage::PhotoDeleted)
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Run a storage call off the async workers. `None` if the call panicked.
async fn blocking<T, F>(f: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("Storage task failed: {}", e);
            None
        }
    }
}

/// Photo gallery over the private and shared stores
pub struct Gallery {
    internal: Arc<InternalStorage>,
    shared: Arc<SharedStorage>,
    permissions: Arc<Permissions>,
    /// Currently displayed private photos
    private_photos: RwLock<Vec<InternalPhoto>>,
    /// Currently displayed shared photos
    shared_photos: RwLock<Vec<SharedPhoto>>,
    shared_refreshes: AtomicU64,
}

impl Gallery {
    pub fn new(
        internal: InternalStorage,
        shared: SharedStorage,
        permissions: Arc<Permissions>,
    ) -> Self {
        Self {
            internal: Arc::new(internal),
            shared: Arc::new(shared),
            permissions,
            private_photos: RwLock::new(Vec::new()),
            shared_photos: RwLock::new(Vec::new()),
            shared_refreshes: AtomicU64::new(0),
        }
    }

    /// Open both stores from configuration
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        config.validate()?;

        let permissions = Arc::new(config.permissions());
        let internal = InternalStorage::open(&config.private_dir)?.with_quality(config.jpeg_quality);
        let index = Arc::new(MediaIndex::open(&config.shared_dir)?);
        let shared = SharedStorage::new(index, Arc::clone(&permissions)).with_quality(config.jpeg_quality);

        Ok(Self::new(internal, shared, permissions))
    }

    pub fn internal(&self) -> &InternalStorage {
        &self.internal
    }

    pub fn shared(&self) -> &SharedStorage {
        &self.shared
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACTIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Load both lists
    pub async fn start(&self) {
        self.refresh_private().await;
        self.refresh_shared().await;
    }

    /// Save a captured bitmap under a random name. Private photos go to the
    /// private store; others go to shared storage if writing is allowed.
    pub async fn capture(&self, bitmap: DynamicImage, private: bool) -> StatusMessage {
        let name = Uuid::new_v4().to_string();

        let saved = if private {
            let internal = Arc::clone(&self.internal);
            blocking(move || internal.save(&name, &bitmap)).await.unwrap_or(false)
        } else if self.permissions.can_write() {
            let shared = Arc::clone(&self.shared);
            blocking(move || shared.save(&name, &bitmap)).await.unwrap_or(false)
        } else {
            log::info!("Not saving shared photo: write media not granted");
            false
        };

        if private {
            self.refresh_private().await;
        }

        if saved {
            StatusMessage::PhotoSaved
        } else {
            StatusMessage::SaveFailed
        }
    }

    /// Delete a private photo by file name
    pub async fn delete_private(&self, file_name: &str) -> StatusMessage {
        let internal = Arc::clone(&self.internal);
        let name = file_name.to_string();

        let deleted = blocking(move || internal.delete(&name)).await.unwrap_or(false);
        if deleted {
            self.refresh_private().await;
            StatusMessage::PhotoDeleted
        } else {
            StatusMessage::DeleteFailed
        }
    }

    /// Apply a new permission grant and reload shared photos if readable
    pub async fn on_permissions_changed(
        &self,
        read_media: Option<bool>,
        write_media: Option<bool>,
    ) -> Option<StatusMessage> {
        if let Some(read) = read_media {
            self.permissions.set_read(read);
        }
        if let Some(write) = write_media {
            self.permissions.set_write(write);
        }

        if self.permissions.can_read() {
            self.refresh_shared().await;
            None
        } else {
            Some(StatusMessage::ReadPermissionMissing)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REFRESH
    // ═══════════════════════════════════════════════════════════════════════

    /// Re-list private photos. Returns how many are displayed.
    pub async fn refresh_private(&self) -> usize {
        let internal = Arc::clone(&self.internal);
        let photos = blocking(move || internal.list()).await.unwrap_or_default();

        let count = photos.len();
        *self.private_photos.write() = photos;
        count
    }

    /// Re-list shared photos. Returns how many are displayed.
    pub async fn refresh_shared(&self) -> usize {
        let shared = Arc::clone(&self.shared);
        let photos = blocking(move || shared.list()).await.unwrap_or_default();

        self.shared_refreshes.fetch_add(1, Ordering::SeqCst);
        let count = photos.len();
        *self.shared_photos.write() = photos;
        count
    }

    /// React to a media index change: one re-list if reading is allowed
    pub async fn on_index_change(&self) -> bool {
        if !self.permissions.can_read() {
            return false;
        }

        self.refresh_shared().await;
        true
    }

    pub fn private_photos(&self) -> Vec<InternalPhoto> {
        self.private_photos.read().clone()
    }

    pub fn shared_photos(&self) -> Vec<SharedPhoto> {
        self.shared_photos.read().clone()
    }

    /// How many times the shared list has been reloaded
    pub fn shared_refresh_count(&self) -> u64 {
        self.shared_refreshes.load(Ordering::SeqCst)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CHANGE NOTIFICATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Call [`Gallery::on_index_change`] for every change `observer`
    /// receives, until the returned task is stopped or dropped.
    pub fn watch(self: &Arc<Self>, observer: ObserverHandle) -> StorageResult<WatchTask> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let stop_flag = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("index-observer".into())
            .spawn(move || {
                while !stop_flag.load(Ordering::SeqCst) && !observer.is_closed() {
                    if let Some(change) = observer.recv_timeout(OBSERVER_POLL) {
                        if tx.send(change).is_err() {
                            break;
                        }
                    }
                }
            })?;

        let gallery = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                log::debug!("Media index changed: {:?}", change);
                gallery.on_index_change().await;
            }
        });

        Ok(WatchTask { stop, task })
    }
}

/// Running change-notification subscription
pub struct WatchTask {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WatchTask {
    /// Unsubscribe
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for WatchTask {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn gallery(read: bool, write: bool) -> (tempfile::TempDir, Gallery) {
        let dir = tempdir().unwrap();
        let mut config = StorageConfig::for_root(dir.path());
        config.read_media = read;
        config.write_media = write;
        config.api_level = 28;
        let gallery = Gallery::open(&config).unwrap();
        (dir, gallery)
    }

    async fn wait_for_refreshes(gallery: &Gallery, count: u64) {
        for _ in 0..100 {
            if gallery.shared_refresh_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn test_status_text() {
        assert_eq!(StatusMessage::PhotoSaved.to_string(), "Photo saved successfully");
        assert_eq!(StatusMessage::PhotoDeleted.text(), "Photo deleted successfully");
        assert_eq!(StatusMessage::DeleteFailed.text(), "Photo was not able to be removed");
        assert_eq!(StatusMessage::SaveFailed.text(), "Failed to save photo");
        assert!(!StatusMessage::SaveFailed.is_success());
    }

    #[tokio::test]
    async fn test_private_capture_and_delete() {
        let (_dir, gallery) = gallery(true, true);

        let status = gallery.capture(DynamicImage::new_rgb8(10, 10), true).await;
        assert_eq!(status, StatusMessage::PhotoSaved);

        let photos = gallery.private_photos();
        assert_eq!(photos.len(), 1);
        assert!(photos[0].name.ends_with(".jpg"));
        assert_eq!(photos[0].dimensions(), (10, 10));

        let status = gallery.delete_private(&photos[0].name).await;
        assert_eq!(status, StatusMessage::PhotoDeleted);
        assert!(gallery.private_photos().is_empty());

        let status = gallery.delete_private(&photos[0].name).await;
        assert_eq!(status, StatusMessage::DeleteFailed);
    }

    #[tokio::test]
    async fn test_shared_capture_needs_write() {
        let (_dir, gallery) = gallery(true, false);

        let status = gallery.capture(DynamicImage::new_rgb8(5, 5), false).await;
        assert_eq!(status, StatusMessage::SaveFailed);
        assert_eq!(gallery.refresh_shared().await, 0);

        gallery.on_permissions_changed(None, Some(true)).await;
        let status = gallery.capture(DynamicImage::new_rgb8(5, 5), false).await;
        assert_eq!(status, StatusMessage::PhotoSaved);
        assert_eq!(gallery.refresh_shared().await, 1);

        let shared = gallery.shared_photos();
        assert_eq!((shared[0].width, shared[0].height), (5, 5));
    }

    #[tokio::test]
    async fn test_index_change_relists_once_with_read() {
        let (_dir, gallery) = gallery(true, true);

        assert!(gallery.on_index_change().await);
        assert_eq!(gallery.shared_refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_index_change_ignored_without_read() {
        let (_dir, gallery) = gallery(false, true);

        assert!(!gallery.on_index_change().await);
        assert_eq!(gallery.shared_refresh_count(), 0);

        let status = gallery.on_permissions_changed(Some(false), None).await;
        assert_eq!(status, Some(StatusMessage::ReadPermissionMissing));
    }

    #[tokio::test]
    async fn test_watch_relists_on_save() {
        let (_dir, gallery) = gallery(true, true);
        let gallery = Arc::new(gallery);

        let observer = gallery.shared().index().register_observer();
        let watch = gallery.watch(observer).unwrap();
        assert!(watch.is_running());

        let status = gallery.capture(DynamicImage::new_rgb8(5, 5), false).await;
        assert_eq!(status, StatusMessage::PhotoSaved);

        wait_for_refreshes(&gallery, 1).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(gallery.shared_refresh_count(), 1);
        assert_eq!(gallery.shared_photos().len(), 1);

        watch.stop();
    }

    #[tokio::test]
    async fn test_stopped_watch_unsubscribes() {
        let (_dir, gallery) = gallery(true, true);
        let gallery = Arc::new(gallery);
        let index = gallery.shared().index();
        let before = index.observer_count();

        let watch = gallery.watch(index.register_observer()).unwrap();
        assert_eq!(index.observer_count(), before + 1);
        watch.stop();

        for _ in 0..100 {
            if index.observer_count() == before {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(index.observer_count(), before);

        assert_eq!(gallery.capture(DynamicImage::new_rgb8(3, 3), false).await, StatusMessage::PhotoSaved);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(gallery.shared_refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_without_read_does_nothing() {
        let (_dir, gallery) = gallery(false, true);
        let gallery = Arc::new(gallery);

        let observer = gallery.shared().index().register_observer();
        let _watch = gallery.watch(observer).unwrap();

        assert_eq!(gallery.capture(DynamicImage::new_rgb8(3, 3), false).await, StatusMessage::PhotoSaved);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(gallery.shared_refresh_count(), 0);
        assert!(gallery.shared_photos().is_empty());
    }
}
