//! Photo Storage - Shared Media Index
//!
//! A cross-application index of media entries: an SQLite table of metadata
//! rows plus a directory holding one payload file per entry. Entries are
//! addressed by [`Locator`]s and observers are told about every change.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StorageError, StorageResult};

/// Base locator of the image collection
pub const EXTERNAL_CONTENT_URI: &str = "content://media/external/images/media";

const DB_FILE: &str = "index.db";
const MEDIA_DIR: &str = "media";

/// Pending entries older than this are leftovers of an interrupted save
const PENDING_TTL_MINUTES: i64 = 60;

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque reference to one index entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    /// Build the locator of entry `id` under `base`
    pub fn with_appended_id(base: &str, id: i64) -> Self {
        Self(format!("{}/{}", base.trim_end_matches('/'), id))
    }

    /// Parse a locator string produced by [`Locator::with_appended_id`]
    pub fn parse(value: &str) -> StorageResult<Self> {
        let locator = Self(value.to_string());
        locator.id()?;
        Ok(locator)
    }

    /// Entry id encoded in the last path segment
    pub fn id(&self) -> StorageResult<i64> {
        self.0
            .rsplit_once('/')
            .and_then(|(base, id)| (!base.is_empty()).then_some(id))
            .and_then(|id| id.parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| StorageError::InvalidLocator(self.0.clone()))
    }

    /// Locator without the entry id
    pub fn base(&self) -> &str {
        self.0.rsplit_once('/').map(|(base, _)| base).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUERY TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Queryable metadata columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    DisplayName,
    MimeType,
    Width,
    Height,
    DateAdded,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Id => "_id",
            Column::DisplayName => "_display_name",
            Column::MimeType => "mime_type",
            Column::Width => "width",
            Column::Height => "height",
            Column::DateAdded => "date_added",
        }
    }

    /// Resolve a column by its name
    pub fn from_name(name: &str) -> StorageResult<Self> {
        match name {
            "_id" => Ok(Column::Id),
            "_display_name" => Ok(Column::DisplayName),
            "mime_type" => Ok(Column::MimeType),
            "width" => Ok(Column::Width),
            "height" => Ok(Column::Height),
            "date_added" => Ok(Column::DateAdded),
            other => Err(StorageError::InvalidQuery(format!("unknown column {}", other))),
        }
    }
}

/// Sort key for [`MediaIndex::query`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: Column,
    pub ascending: bool,
}

impl SortOrder {
    pub fn asc(column: Column) -> Self {
        Self { column, ascending: true }
    }

    pub fn desc(column: Column) -> Self {
        Self { column, ascending: false }
    }

    fn sql(&self) -> String {
        let direction = if self.ascending { "ASC" } else { "DESC" };
        format!("{} {}", self.column.name(), direction)
    }
}

/// Metadata record for a new entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentValues {
    pub display_name: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// One result row. Only projected columns are populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaRow {
    id: Option<i64>,
    display_name: Option<String>,
    mime_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    date_added: Option<DateTime<Utc>>,
}

fn not_projected(column: Column) -> StorageError {
    StorageError::InvalidQuery(format!("column {} not in projection", column.name()))
}

impl MediaRow {
    pub fn id(&self) -> StorageResult<i64> {
        self.id.ok_or_else(|| not_projected(Column::Id))
    }

    pub fn display_name(&self) -> StorageResult<&str> {
        self.display_name
            .as_deref()
            .ok_or_else(|| not_projected(Column::DisplayName))
    }

    pub fn mime_type(&self) -> StorageResult<&str> {
        self.mime_type
            .as_deref()
            .ok_or_else(|| not_projected(Column::MimeType))
    }

    pub fn width(&self) -> StorageResult<u32> {
        self.width.ok_or_else(|| not_projected(Column::Width))
    }

    pub fn height(&self) -> StorageResult<u32> {
        self.height.ok_or_else(|| not_projected(Column::Height))
    }

    pub fn date_added(&self) -> StorageResult<DateTime<Utc>> {
        self.date_added.ok_or_else(|| not_projected(Column::DateAdded))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANGE NOTIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Change published to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexChange {
    /// Entry written and visible to queries
    Inserted(Locator),
    /// Entry removed
    Deleted(Locator),
    /// Another process modified the index
    External,
}

#[derive(Default)]
struct ObserverRegistry {
    next_id: AtomicU64,
    senders: RwLock<Vec<(u64, Sender<IndexChange>)>>,
}

impl ObserverRegistry {
    fn register(self: &Arc<Self>) -> ObserverHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = crossbeam_channel::unbounded();
        self.senders.write().push((id, tx));

        ObserverHandle {
            id,
            receiver: rx,
            registry: Arc::downgrade(self),
        }
    }

    fn unregister(&self, id: u64) {
        self.senders.write().retain(|(observer, _)| *observer != id);
    }

    fn publish(&self, change: IndexChange) {
        let senders = self.senders.read();
        log::debug!("Index change {:?} -> {} observer(s)", change, senders.len());
        for (_, tx) in senders.iter() {
            let _ = tx.send(change.clone());
        }
    }

    fn len(&self) -> usize {
        self.senders.read().len()
    }
}

/// Registered observer. Dropping it unregisters the observer.
pub struct ObserverHandle {
    id: u64,
    receiver: Receiver<IndexChange>,
    registry: Weak<ObserverRegistry>,
}

impl ObserverHandle {
    /// Block until the next change. `None` once the index is gone.
    pub fn recv(&self) -> Option<IndexChange> {
        self.receiver.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<IndexChange> {
        match self.receiver.recv_timeout(timeout) {
            Ok(change) => Some(change),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<IndexChange> {
        self.receiver.try_recv().ok()
    }

    /// Number of changes waiting to be received
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// The index this observer was registered on is gone
    pub fn is_closed(&self) -> bool {
        self.registry.strong_count() == 0
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

/// Filesystem watch on the index database. Stops when dropped.
pub struct IndexWatcher {
    _watcher: RecommendedWatcher,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEDIA INDEX
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared media index
pub struct MediaIndex {
    /// Database connection
    conn: Mutex<Connection>,
    /// Root path
    root: PathBuf,
    /// Payload directory
    media_dir: PathBuf,
    /// Registered observers
    observers: Arc<ObserverRegistry>,
    /// Last seen `PRAGMA data_version`
    data_version: AtomicI64,
}

impl MediaIndex {
    /// Open the index under `root`, creating it if needed
    pub fn open(root: &Path) -> StorageResult<Self> {
        let media_dir = root.join(MEDIA_DIR);
        fs::create_dir_all(&media_dir)?;

        let conn = Connection::open(root.join(DB_FILE))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS images (
                _id INTEGER PRIMARY KEY AUTOINCREMENT,
                _display_name TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                date_added TEXT NOT NULL,
                _data TEXT NOT NULL,
                is_pending INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_display_name ON images(_display_name);
            "#,
        )?;

        let version = Self::read_data_version(&conn)?;
        log::debug!("Opened media index at {}", root.display());

        let index = Self {
            conn: Mutex::new(conn),
            root: root.to_path_buf(),
            media_dir,
            observers: Arc::new(ObserverRegistry::default()),
            data_version: AtomicI64::new(version),
        };

        index.reap_pending(ChronoDuration::minutes(PENDING_TTL_MINUTES))?;
        Ok(index)
    }

    /// Remove pending entries added more than `max_age` ago, along with any
    /// partial payload. Returns how many were removed.
    pub fn reap_pending(&self, max_age: ChronoDuration) -> StorageResult<usize> {
        let cutoff = Utc::now() - max_age;
        let conn = self.conn.lock();

        let stale: Vec<(i64, String)> = {
            let mut stmt =
                conn.prepare("SELECT _id, _data, date_added FROM images WHERE is_pending = 1")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let stale = rows
                .filter_map(|row| row.ok())
                .filter(|(_, _, added)| {
                    DateTime::parse_from_rfc3339(added)
                        .map(|t| t.with_timezone(&Utc) <= cutoff)
                        .unwrap_or(true)
                })
                .map(|(id, data, _)| (id, data))
                .collect();
            stale
        };

        for (id, data) in &stale {
            conn.execute("DELETE FROM images WHERE _id = ?1", params![id])?;

            for path in [self.media_dir.join(data), self.media_dir.join(format!(".{}.tmp", data))] {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => log::warn!("Couldn't remove {}: {}", path.display(), e),
                }
            }
        }

        if !stale.is_empty() {
            self.sync_data_version(&conn)?;
            log::info!("Removed {} abandoned pending entries", stale.len());
        }

        Ok(stale.len())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Base locator of the collection
    pub fn collection(&self) -> &'static str {
        EXTERNAL_CONTENT_URI
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INSERT / WRITE
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a metadata row and return the new entry's locator.
    /// The entry stays hidden from queries until its payload is written.
    pub fn insert(&self, collection: &str, values: &ContentValues) -> StorageResult<Locator> {
        if collection != EXTERNAL_CONTENT_URI {
            return Err(StorageError::InvalidLocator(collection.to_string()));
        }
        if values.display_name.is_empty() {
            return Err(StorageError::EntryNotCreated);
        }

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO images (_display_name, mime_type, width, height, date_added, _data)
             VALUES (?1, ?2, ?3, ?4, ?5, '')",
            params![
                values.display_name,
                values.mime_type,
                values.width,
                values.height,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        let data = Self::payload_name(id, &values.mime_type);
        conn.execute("UPDATE images SET _data = ?1 WHERE _id = ?2", params![data, id])?;
        self.sync_data_version(&conn)?;

        log::debug!("Inserted pending entry {} ({})", id, values.display_name);
        Ok(Locator::with_appended_id(collection, id))
    }

    /// Open a writer for an entry's payload. The entry becomes visible when
    /// [`MediaWriter::finish`] succeeds.
    pub fn open_output_stream(&self, locator: &Locator) -> StorageResult<MediaWriter<'_>> {
        let id = locator.id()?;
        let data = self.payload_of(id)?;

        let path = self.media_dir.join(&data);
        let temp_path = self.media_dir.join(format!(".{}.tmp", data));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        Ok(MediaWriter {
            index: self,
            locator: locator.clone(),
            file: Some(file),
            temp_path,
            path,
        })
    }

    fn complete(&self, locator: &Locator) -> StorageResult<()> {
        let id = locator.id()?;
        {
            let conn = self.conn.lock();
            let updated = conn.execute("UPDATE images SET is_pending = 0 WHERE _id = ?1", params![id])?;
            if updated == 0 {
                return Err(StorageError::EntryNotFound(locator.to_string()));
            }
            self.sync_data_version(&conn)?;
        }

        self.observers.publish(IndexChange::Inserted(locator.clone()));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // READ
    // ═══════════════════════════════════════════════════════════════════════

    /// Select `projection` for every visible entry, ordered by `sort`
    pub fn query(&self, projection: &[Column], sort: SortOrder) -> StorageResult<Vec<MediaRow>> {
        if projection.is_empty() {
            return Err(StorageError::InvalidQuery("empty projection".into()));
        }

        let columns: Vec<&str> = projection.iter().map(Column::name).collect();
        let sql = format!(
            "SELECT {} FROM images WHERE is_pending = 0 ORDER BY {}, _id ASC",
            columns.join(", "),
            sort.sql()
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let mut media = MediaRow::default();
            for (i, column) in projection.iter().enumerate() {
                match column {
                    Column::Id => media.id = Some(row.get(i)?),
                    Column::DisplayName => media.display_name = Some(row.get(i)?),
                    Column::MimeType => media.mime_type = Some(row.get(i)?),
                    Column::Width => media.width = Some(row.get(i)?),
                    Column::Height => media.height = Some(row.get(i)?),
                    Column::DateAdded => {
                        let raw: String = row.get(i)?;
                        media.date_added = DateTime::parse_from_rfc3339(&raw)
                            .ok()
                            .map(|t| t.with_timezone(&Utc));
                    }
                }
            }
            Ok(media)
        })?;

        // Other processes write this table too; one bad row must not hide the rest
        let mut result = Vec::new();
        for row in rows {
            match row {
                Ok(row) => result.push(row),
                Err(e) => log::warn!("Skipping unreadable index row: {}", e),
            }
        }

        Ok(result)
    }

    /// Open an entry's payload for reading
    pub fn open_input_stream(&self, locator: &Locator) -> StorageResult<File> {
        let id = locator.id()?;

        let data: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT _data FROM images WHERE _id = ?1 AND is_pending = 0",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let data = data.ok_or_else(|| StorageError::EntryNotFound(locator.to_string()))?;
        File::open(self.media_dir.join(data)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::EntryNotFound(locator.to_string()),
            _ => e.into(),
        })
    }

    /// Count visible entries
    pub fn count(&self) -> StorageResult<usize> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM images WHERE is_pending = 0",
            [],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DELETE
    // ═══════════════════════════════════════════════════════════════════════

    /// Remove an entry and its payload. Returns `false` if no such entry.
    pub fn delete(&self, locator: &Locator) -> StorageResult<bool> {
        let id = locator.id()?;

        let removed: Option<(String, bool)> = {
            let conn = self.conn.lock();
            let row = conn
                .query_row(
                    "SELECT _data, is_pending FROM images WHERE _id = ?1",
                    params![id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
                )
                .optional()?;

            if row.is_some() {
                conn.execute("DELETE FROM images WHERE _id = ?1", params![id])?;
                self.sync_data_version(&conn)?;
            }
            row
        };

        let Some((data, pending)) = removed else {
            return Ok(false);
        };

        match fs::remove_file(self.media_dir.join(&data)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        log::debug!("Deleted entry {}", locator);
        if !pending {
            self.observers.publish(IndexChange::Deleted(locator.clone()));
        }

        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // OBSERVERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Subscribe to index changes
    pub fn register_observer(&self) -> ObserverHandle {
        self.observers.register()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Publish [`IndexChange::External`] if another connection committed
    /// since the last check. Returns whether it did.
    pub fn check_external_changes(&self) -> StorageResult<bool> {
        // Hold the connection across read and swap so it cannot interleave
        // with a local commit's sync_data_version
        let conn = self.conn.lock();
        let version = Self::read_data_version(&conn)?;
        let previous = self.data_version.swap(version, Ordering::SeqCst);

        if version != previous {
            self.observers.publish(IndexChange::External);
            return Ok(true);
        }

        Ok(false)
    }

    /// Watch the database file and check for external commits on every
    /// filesystem event touching it
    pub fn watch_external(self: &Arc<Self>) -> StorageResult<IndexWatcher> {
        let index = Arc::downgrade(self);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("Index watch error: {}", e);
                    return;
                }
            };

            if event.kind.is_access() {
                return;
            }

            let touches_db = event.paths.iter().any(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(DB_FILE))
                    .unwrap_or(false)
            });

            if let (true, Some(index)) = (touches_db, index.upgrade()) {
                if let Err(e) = index.check_external_changes() {
                    log::warn!("Couldn't check index version: {}", e);
                }
            }
        })?;

        watcher.watch(&self.root, RecursiveMode::NonRecursive)?;
        log::debug!("Watching media index at {}", self.root.display());

        Ok(IndexWatcher { _watcher: watcher })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    fn payload_of(&self, id: i64) -> StorageResult<String> {
        self.conn
            .lock()
            .query_row("SELECT _data FROM images WHERE _id = ?1", params![id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| StorageError::EntryNotFound(id.to_string()))
    }

    fn payload_name(id: i64, mime_type: &str) -> String {
        let extension = match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        };
        format!("{}.{}", id, extension)
    }

    fn read_data_version(conn: &Connection) -> StorageResult<i64> {
        Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    /// Our own commits do not move `data_version`, but keep the cached value
    /// current so a racing external commit is still noticed once.
    fn sync_data_version(&self, conn: &Connection) -> StorageResult<()> {
        let version = Self::read_data_version(conn)?;
        let previous = self.data_version.swap(version, Ordering::SeqCst);
        if version != previous {
            self.observers.publish(IndexChange::External);
        }
        Ok(())
    }
}

/// Writer for one entry's payload. Dropped without `finish`, the partial
/// payload is discarded and the entry stays pending.
pub struct MediaWriter<'a> {
    index: &'a MediaIndex,
    locator: Locator,
    file: Option<File>,
    temp_path: PathBuf,
    path: PathBuf,
}

impl MediaWriter<'_> {
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Flush the payload and publish the entry
    pub fn finish(mut self) -> StorageResult<()> {
        let flushed = match self.file.take() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        };
        if let Err(e) = flushed.and_then(|_| fs::rename(&self.temp_path, &self.path)) {
            let _ = fs::remove_file(&self.temp_path);
            return Err(e.into());
        }
        self.index.complete(&self.locator)
    }
}

impl Write for MediaWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "writer finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for MediaWriter<'_> {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn values(name: &str, width: u32, height: u32) -> ContentValues {
        ContentValues {
            display_name: name.into(),
            mime_type: "image/jpeg".into(),
            width,
            height,
        }
    }

    fn add(index: &MediaIndex, name: &str, payload: &[u8]) -> Locator {
        let locator = index.insert(EXTERNAL_CONTENT_URI, &values(name, 1, 1)).unwrap();
        let mut writer = index.open_output_stream(&locator).unwrap();
        writer.write_all(payload).unwrap();
        writer.finish().unwrap();
        locator
    }

    #[test]
    fn test_locator() {
        let locator = Locator::with_appended_id(EXTERNAL_CONTENT_URI, 42);
        assert_eq!(locator.as_str(), "content://media/external/images/media/42");
        assert_eq!(locator.id().unwrap(), 42);
        assert_eq!(locator.base(), EXTERNAL_CONTENT_URI);
        assert_eq!(Locator::parse(locator.as_str()).unwrap(), locator);

        assert!(Locator::parse("content://media/external/images/media/abc").is_err());
        assert!(Locator::parse("42").is_err());
        assert!(Locator::parse("content://x/0").is_err());
    }

    #[test]
    fn test_insert_write_read() {
        let dir = tempdir().unwrap();
        let index = MediaIndex::open(dir.path()).unwrap();

        let locator = add(&index, "a.jpg", b"payload");

        let mut data = Vec::new();
        index.open_input_stream(&locator).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"payload");
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_pending_entries_hidden() {
        let dir = tempdir().unwrap();
        let index = MediaIndex::open(dir.path()).unwrap();

        let locator = index.insert(EXTERNAL_CONTENT_URI, &values("p.jpg", 2, 2)).unwrap();
        {
            let mut writer = index.open_output_stream(&locator).unwrap();
            writer.write_all(b"partial").unwrap();
            // dropped without finish
        }

        assert_eq!(index.count().unwrap(), 0);
        assert!(index
            .query(&[Column::Id], SortOrder::asc(Column::Id))
            .unwrap()
            .is_empty());
        assert!(index.open_input_stream(&locator).unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_projection_and_sort() {
        let dir = tempdir().unwrap();
        let index = MediaIndex::open(dir.path()).unwrap();
        add(&index, "c.jpg", b"c");
        add(&index, "a.jpg", b"a");
        add(&index, "b.jpg", b"b");

        let rows = index
            .query(&[Column::Id, Column::DisplayName], SortOrder::asc(Column::DisplayName))
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.display_name().unwrap().to_string()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);

        // width was not projected
        assert!(matches!(rows[0].width(), Err(StorageError::InvalidQuery(_))));

        let rows = index
            .query(&[Column::DisplayName], SortOrder::desc(Column::DisplayName))
            .unwrap();
        assert_eq!(rows[0].display_name().unwrap(), "c.jpg");

        assert!(index.query(&[], SortOrder::asc(Column::Id)).is_err());
        assert!(Column::from_name("orientation").is_err());
        assert_eq!(Column::from_name("_display_name").unwrap(), Column::DisplayName);
    }

    #[test]
    fn test_insert_rejects_unknown_collection() {
        let dir = tempdir().unwrap();
        let index = MediaIndex::open(dir.path()).unwrap();

        assert!(matches!(
            index.insert("content://media/external/video/media", &values("v", 1, 1)),
            Err(StorageError::InvalidLocator(_))
        ));
        assert!(matches!(
            index.insert(EXTERNAL_CONTENT_URI, &values("", 1, 1)),
            Err(StorageError::EntryNotCreated)
        ));
    }

    #[test]
    fn test_observers() {
        let dir = tempdir().unwrap();
        let index = MediaIndex::open(dir.path()).unwrap();
        let observer = index.register_observer();
        assert_eq!(index.observer_count(), 1);

        let locator = add(&index, "x.jpg", b"x");
        assert_eq!(observer.try_recv(), Some(IndexChange::Inserted(locator.clone())));
        assert_eq!(observer.try_recv(), None);

        assert!(index.delete(&locator).unwrap());
        assert_eq!(observer.try_recv(), Some(IndexChange::Deleted(locator.clone())));
        assert!(!index.delete(&locator).unwrap());
        assert_eq!(observer.try_recv(), None);

        drop(observer);
        assert_eq!(index.observer_count(), 0);
    }

    #[test]
    fn test_external_change_detected() {
        let dir = tempdir().unwrap();
        let ours = MediaIndex::open(dir.path()).unwrap();
        let theirs = MediaIndex::open(dir.path()).unwrap();
        let observer = ours.register_observer();

        assert!(!ours.check_external_changes().unwrap());

        add(&theirs, "external.jpg", b"e");

        assert!(ours.check_external_changes().unwrap());
        assert_eq!(observer.try_recv(), Some(IndexChange::External));
        assert!(!ours.check_external_changes().unwrap());
        assert_eq!(ours.count().unwrap(), 1);

        // a local commit between checks is not reported as external
        let local = add(&ours, "local.jpg", b"l");
        assert!(!ours.check_external_changes().unwrap());
        assert_eq!(observer.try_recv(), Some(IndexChange::Inserted(local)));
        assert_eq!(observer.try_recv(), None);
    }

    fn raw_count(dir: &Path) -> i64 {
        let conn = Connection::open(dir.join(DB_FILE)).unwrap();
        conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_query_skips_malformed_rows() {
        let dir = tempdir().unwrap();
        let index = MediaIndex::open(dir.path()).unwrap();
        add(&index, "good.jpg", b"g");

        let other = Connection::open(dir.path().join(DB_FILE)).unwrap();
        other
            .execute(
                "INSERT INTO images (_display_name, mime_type, width, height, date_added, _data, is_pending)
                 VALUES ('bad.jpg', 'image/jpeg', -1, 5, '2024-01-01T00:00:00+00:00', '99.jpg', 0)",
                [],
            )
            .unwrap();

        let rows = index
            .query(&[Column::DisplayName, Column::Width], SortOrder::asc(Column::DisplayName))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].display_name().unwrap(), "good.jpg");
    }

    #[test]
    fn test_stale_pending_reaped_on_open() {
        let dir = tempdir().unwrap();
        {
            let index = MediaIndex::open(dir.path()).unwrap();
            let old = index.insert(EXTERNAL_CONTENT_URI, &values("old.jpg", 1, 1)).unwrap();
            index.insert(EXTERNAL_CONTENT_URI, &values("fresh.jpg", 1, 1)).unwrap();
            add(&index, "done.jpg", b"d");

            let other = Connection::open(dir.path().join(DB_FILE)).unwrap();
            other
                .execute(
                    "UPDATE images SET date_added = '2000-01-01T00:00:00+00:00' WHERE _id = ?1",
                    params![old.id().unwrap()],
                )
                .unwrap();
            assert_eq!(raw_count(dir.path()), 3);
        }

        let index = MediaIndex::open(dir.path()).unwrap();
        // the recent pending entry may still belong to a save in progress
        assert_eq!(raw_count(dir.path()), 2);
        assert_eq!(index.count().unwrap(), 1);

        assert_eq!(index.reap_pending(ChronoDuration::zero()).unwrap(), 1);
        assert_eq!(raw_count(dir.path()), 1);
    }

    #[test]
    fn test_watcher_starts() {
        let dir = tempdir().unwrap();
        let index = Arc::new(MediaIndex::open(dir.path()).unwrap());
        let watcher = index.watch_external();
        assert!(watcher.is_ok());
    }
}
