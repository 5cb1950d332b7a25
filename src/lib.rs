//! # Photo Storage
//!
//! Saves captured photos either to an app-private directory or to a shared
//! media index, and lists both sets for display.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         GALLERY                          │
//! │        capture / delete / refresh / on_index_change      │
//! │  ┌────────────────────┐        ┌──────────────────────┐  │
//! │  │  INTERNAL STORAGE  │        │   SHARED STORAGE     │  │
//! │  │  <name>.jpg files  │        │   (permission gated) │  │
//! │  └─────────┬──────────┘        └──────────┬───────────┘  │
//! │  ┌─────────┴──────────┐        ┌──────────┴───────────┐  │
//! │  │    PRIVATE FS      │        │    MEDIA INDEX       │  │
//! │  │    (0700 dir)      │        │  SQLite + media/ dir │  │
//! │  └────────────────────┘        │  observers + watcher │  │
//! │                                └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Both stores compress with JPEG quality 95. The boolean `save`/`delete`
//! operations swallow failures after logging them; the `try_*` variants
//! return the cause.

pub mod codec;
pub mod config;
pub mod error;
pub mod gallery;
pub mod index;
pub mod internal;
pub mod permissions;
pub mod private_fs;
pub mod shared;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use gallery::{Gallery, StatusMessage, WatchTask};
pub use index::{IndexChange, Locator, MediaIndex, ObserverHandle, EXTERNAL_CONTENT_URI};
pub use internal::{InternalPhoto, InternalStorage};
pub use permissions::Permissions;
pub use shared::{SharedPhoto, SharedStorage};

/// Photo Storage version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File suffix of every stored photo
pub const PHOTO_SUFFIX: &str = ".jpg";

/// MIME type recorded for shared photos
pub const PHOTO_MIME_TYPE: &str = "image/jpeg";
