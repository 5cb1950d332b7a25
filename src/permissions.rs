//! Photo Storage - Media Capabilities
//!
//! Read/write capability flags that gate shared-storage operations.

use std::sync::atomic::{AtomicBool, Ordering};

/// From this API level on, writing own media needs no explicit grant
pub const SCOPED_STORAGE_API_LEVEL: u32 = 29;

/// Media capability flags
#[derive(Debug, Default)]
pub struct Permissions {
    read_media: AtomicBool,
    write_media: AtomicBool,
}

impl Permissions {
    pub fn new(read_media: bool, write_media: bool) -> Self {
        Self {
            read_media: AtomicBool::new(read_media),
            write_media: AtomicBool::new(write_media),
        }
    }

    /// Everything granted
    pub fn all() -> Self {
        Self::new(true, true)
    }

    /// Effective flags from the granted capabilities and the platform level
    pub fn resolve(granted_read: bool, granted_write: bool, api_level: u32) -> Self {
        Self::new(granted_read, granted_write || api_level >= SCOPED_STORAGE_API_LEVEL)
    }

    pub fn can_read(&self) -> bool {
        self.read_media.load(Ordering::SeqCst)
    }

    pub fn can_write(&self) -> bool {
        self.write_media.load(Ordering::SeqCst)
    }

    pub fn set_read(&self, granted: bool) {
        self.read_media.store(granted, Ordering::SeqCst);
    }

    pub fn set_write(&self, granted: bool) {
        self.write_media.store(granted, Ordering::SeqCst);
    }

    /// Capabilities still missing
    pub fn missing(&self) -> Vec<Capability> {
        let mut missing = Vec::new();
        if !self.can_write() {
            missing.push(Capability::WriteMedia);
        }
        if !self.can_read() {
            missing.push(Capability::ReadMedia);
        }
        missing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ReadMedia,
    WriteMedia,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_storage_implies_write() {
        let legacy = Permissions::resolve(true, false, 28);
        assert!(legacy.can_read());
        assert!(!legacy.can_write());
        assert_eq!(legacy.missing(), vec![Capability::WriteMedia]);

        let scoped = Permissions::resolve(false, false, 29);
        assert!(scoped.can_write());
        assert_eq!(scoped.missing(), vec![Capability::ReadMedia]);
    }

    #[test]
    fn test_toggle() {
        let perms = Permissions::default();
        assert_eq!(perms.missing().len(), 2);

        perms.set_read(true);
        perms.set_write(true);
        assert!(perms.missing().is_empty());
    }
}
