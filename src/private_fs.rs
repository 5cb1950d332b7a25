//! Photo Storage - App-Private Filesystem
//!
//! File I/O scoped to a single application-private directory.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use crate::error::{StorageError, StorageResult};

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Private directory handler
#[derive(Debug, Clone)]
pub struct PrivateFs {
    /// Root directory
    root: PathBuf,
}

impl PrivateFs {
    /// Open the private directory, creating it with owner-only permissions if needed.
    /// An existing directory keeps its mode.
    pub fn new(root: &Path) -> StorageResult<Self> {
        if !root.is_dir() {
            fs::create_dir_all(root)?;

            #[cfg(unix)]
            fs::set_permissions(root, fs::Permissions::from_mode(DIR_MODE))?;
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Root of the private area
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a file name inside the root. Names must be a single path component.
    fn full_path(&self, name: &str) -> StorageResult<PathBuf> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0');

        if invalid {
            return Err(StorageError::InvalidName(name.to_string()));
        }

        Ok(self.root.join(name))
    }

    /// Write file atomically
    pub fn write_file(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.full_path(name)?;
        let temp_path = self.root.join(format!(".{}.tmp", name));

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);

        let mut file = options.open(&temp_path)?;
        let written = file.write_all(data).and_then(|_| file.sync_all());
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    /// Read whole file
    pub fn read_file(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.full_path(name)?;

        if !path.is_file() {
            return Err(StorageError::FileNotFound(name.to_string()));
        }

        let mut file = File::open(&path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        Ok(data)
    }

    /// Delete file. Missing files are an error.
    pub fn delete_file(&self, name: &str) -> StorageResult<()> {
        let path = self.full_path(name)?;

        if !path.is_file() {
            return Err(StorageError::FileNotFound(name.to_string()));
        }

        fs::remove_file(&path)?;
        Ok(())
    }

    /// Check if file exists
    pub fn exists(&self, name: &str) -> bool {
        self.full_path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Names of the regular files in the root (temp files excluded)
    pub fn list_files(&self) -> StorageResult<Vec<String>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };

            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with('.') && name.ends_with(".tmp") {
                    continue;
                }
                files.push(name.to_string());
            }
        }

        Ok(files)
    }
}
