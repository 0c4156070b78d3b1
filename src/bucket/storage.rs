//! Blob storage for bucket entries.
//!
//! Entry contents are stored under UUID-based names, sharded by the first
//! two characters of the UUID. The entry's display name never reaches the
//! filesystem except for its extension.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{BucketError, Result};

/// Blob storage rooted at a base directory.
///
/// ```text
/// {base_path}/
/// ├── ab/
/// │   └── ab12cd34-5678-90ab-cdef-123456789012.flw
/// └── cd/
///     └── cd90ab12-3456-7890-abcd-ef1234567890.bin
/// ```
#[derive(Debug, Clone)]
pub struct BlobStorage {
    base_path: PathBuf,
}

impl BlobStorage {
    /// Create a storage at the given base path, creating the directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Copy content from a reader into a new blob.
    ///
    /// Returns the stored name and the number of bytes written. A partial
    /// blob is removed when the copy fails.
    pub fn save_from(&self, reader: &mut dyn Read, entry_name: &str) -> Result<(String, u64)> {
        let stored_name = Self::generate_stored_name(entry_name);
        let file_path = self.prepare_path(&stored_name)?;

        let mut file = File::create(&file_path)?;
        match io::copy(reader, &mut file) {
            Ok(size) => Ok((stored_name, size)),
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&file_path);
                Err(e.into())
            }
        }
    }

    /// Move an existing file into storage under a new stored name.
    ///
    /// Falls back to copy-and-remove when the source lives on another
    /// filesystem.
    pub fn ingest(&self, source: &Path, entry_name: &str) -> Result<String> {
        let stored_name = Self::generate_stored_name(entry_name);
        let file_path = self.prepare_path(&stored_name)?;

        if fs::rename(source, &file_path).is_err() {
            fs::copy(source, &file_path)?;
            fs::remove_file(source)?;
        }

        Ok(stored_name)
    }

    /// Load the content of a stored blob.
    pub fn load(&self, stored_name: &str) -> Result<Vec<u8>> {
        match fs::read(self.get_file_path(stored_name)) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BucketError::NotFound(format!("Blob: {stored_name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a stored blob for reading.
    pub fn open(&self, stored_name: &str) -> Result<File> {
        match File::open(self.get_file_path(stored_name)) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BucketError::NotFound(format!("Blob: {stored_name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read up to `limit` leading bytes of a stored blob.
    pub fn read_head(&self, stored_name: &str, limit: usize) -> Result<Vec<u8>> {
        let file = self.open(stored_name)?;
        let mut head = Vec::with_capacity(limit);
        file.take(limit as u64).read_to_end(&mut head)?;
        Ok(head)
    }

    /// Delete a blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it didn't exist.
    pub fn delete(&self, stored_name: &str) -> Result<bool> {
        match fs::remove_file(self.get_file_path(stored_name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete several blobs, logging failures instead of returning them.
    ///
    /// Used once the database no longer references the blobs.
    pub fn delete_all<'a>(&self, stored_names: impl IntoIterator<Item = &'a str>) {
        for stored_name in stored_names {
            if let Err(e) = self.delete(stored_name) {
                tracing::warn!(stored_name, error = %e, "Failed to delete blob");
            }
        }
    }

    /// Check if a blob exists.
    pub fn exists(&self, stored_name: &str) -> bool {
        self.get_file_path(stored_name).exists()
    }

    /// Get the size of a stored blob.
    pub fn file_size(&self, stored_name: &str) -> Result<u64> {
        match fs::metadata(self.get_file_path(stored_name)) {
            Ok(m) => Ok(m.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BucketError::NotFound(format!("Blob: {stored_name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get the full path for a stored name: {base_path}/{shard}/{stored_name}.
    pub fn get_file_path(&self, stored_name: &str) -> PathBuf {
        self.base_path
            .join(Self::get_shard(stored_name))
            .join(stored_name)
    }

    fn prepare_path(&self, stored_name: &str) -> Result<PathBuf> {
        let file_path = self.get_file_path(stored_name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(file_path)
    }

    /// First two characters of the stored name (UUID prefix).
    fn get_shard(stored_name: &str) -> &str {
        stored_name.get(..2).unwrap_or(stored_name)
    }

    /// Extension of an entry name, "bin" when there is none or it is unusual.
    fn extract_extension(entry_name: &str) -> &str {
        Path::new(entry_name)
            .extension()
            .and_then(|s| s.to_str())
            .filter(|ext| ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin")
    }

    /// Generate a new UUID-based stored name keeping the entry's extension.
    pub fn generate_stored_name(entry_name: &str) -> String {
        let uuid = Uuid::new_v4();
        let ext = Self::extract_extension(entry_name);
        format!("{uuid}.{ext}")
    }
}
