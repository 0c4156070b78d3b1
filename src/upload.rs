//! Staged uploads.
//!
//! Uploads are received by the host before a bucket update references them.
//! A staged upload can be taken exactly once; taking it hands ownership of
//! the backing file to the caller.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BucketError, Result};

/// Metadata recorded when an upload is staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMeta {
    /// Opaque upload ID.
    pub id: String,
    /// Declared file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared mime type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size in bytes.
    pub size: u64,
}

/// A staged upload taken out of the staging area.
///
/// The backing file is removed on drop unless it was moved away first.
#[derive(Debug)]
pub struct StagedUpload {
    meta: UploadMeta,
    path: PathBuf,
}

impl StagedUpload {
    /// Upload metadata.
    pub fn meta(&self) -> &UploadMeta {
        &self.meta
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the content for reading.
    pub fn open(&self) -> Result<fs::File> {
        Ok(fs::File::open(&self.path)?)
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = ?self.path, error = %e, "Failed to remove staged upload"),
        }
    }
}

/// Source of staged uploads referenced by bucket updates.
pub trait StagedUploads: Send + Sync {
    /// Take the upload with the given ID.
    ///
    /// Fails with `UnknownUpload` if the ID is unknown or already taken.
    fn take(&self, id: &str) -> Result<StagedUpload>;
}

/// Filesystem staging area: `<id>.data` holds the content, `<id>.json`
/// the metadata.
#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
}

impl UploadStore {
    /// Create a staging area at the given path, creating the directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of the staging area.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Stage content and return its metadata.
    pub fn stage(
        &self,
        content: &[u8],
        name: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<UploadMeta> {
        let meta = UploadMeta {
            id: Uuid::new_v4().to_string(),
            name: name.map(str::to_string),
            mime_type: mime_type.map(str::to_string),
            size: content.len() as u64,
        };

        fs::write(self.data_path(&meta.id), content)?;
        let json = serde_json::to_vec(&meta)
            .map_err(|e| BucketError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        // Metadata is written last: an upload is visible only once complete.
        fs::write(self.meta_path(&meta.id), json)?;

        tracing::debug!(id = %meta.id, size = meta.size, "Staged upload");
        Ok(meta)
    }

    fn data_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{id}.data"))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{id}.json"))
    }
}

impl StagedUploads for UploadStore {
    fn take(&self, id: &str) -> Result<StagedUpload> {
        // IDs are UUIDs; anything else would be joined into a path.
        let uuid = Uuid::parse_str(id).map_err(|_| BucketError::UnknownUpload(id.to_string()))?;
        let id = uuid.to_string();

        let meta_path = self.meta_path(&id);
        let json = match fs::read(&meta_path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BucketError::UnknownUpload(id))
            }
            Err(e) => return Err(e.into()),
        };

        // Removing the metadata claims the upload.
        match fs::remove_file(&meta_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BucketError::UnknownUpload(id))
            }
            Err(e) => return Err(e.into()),
        }

        let path = self.data_path(&id);
        if !path.exists() {
            return Err(BucketError::UnknownUpload(id));
        }

        match serde_json::from_slice::<UploadMeta>(&json) {
            Ok(meta) => Ok(StagedUpload { meta, path }),
            Err(e) => {
                let _ = fs::remove_file(&path);
                Err(BucketError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
            }
        }
    }
}
