//! Photo Storage - Error Types

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    // ═══════════════════════════════════════════════════════════════
    // FILE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    // ═══════════════════════════════════════════════════════════════
    // IMAGE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Couldn't encode bitmap: {0}")]
    Encode(String),

    #[error("Couldn't decode bitmap: {0}")]
    Decode(String),

    // ═══════════════════════════════════════════════════════════════
    // INDEX ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Database error: {0}")]
    Database(String),

    #[error("Couldn't create media index entry")]
    EntryNotCreated,

    #[error("Media index entry not found: {0}")]
    EntryNotFound(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Index watcher error: {0}")]
    Watch(String),

    // ═══════════════════════════════════════════════════════════════
    // ACCESS / CONFIG ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Check if the error means the target simply does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::FileNotFound(_) | StorageError::EntryNotFound(_) => true,
            StorageError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Check if the error comes from a missing capability
    pub fn is_permission(&self) -> bool {
        match self {
            StorageError::PermissionDenied(_) => true,
            StorageError::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Config(e.to_string())
    }
}

impl From<image::ImageError> for StorageError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Encoding(_) | image::ImageError::Parameter(_) => {
                StorageError::Encode(e.to_string())
            }
            _ => StorageError::Decode(e.to_string()),
        }
    }
}

impl From<notify::Error> for StorageError {
    fn from(e: notify::Error) -> Self {
        StorageError::Watch(e.to_string())
    }
}
