//! Update payload accepted on bucket create and update.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::{BucketError, Result};

/// Reference to one file of the new entry set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct FileRef {
    /// Entry name.
    pub name: String,
    /// Staged upload holding new content. Without it the existing entry
    /// of the same name is kept.
    #[serde(default)]
    pub id: Option<String>,
    /// Declared mime type; detected when absent.
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl FileRef {
    /// Reference to new content in a staged upload.
    pub fn upload(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Some(id.into()),
            mime_type: None,
        }
    }

    /// Reference keeping an existing entry.
    pub fn keep(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            mime_type: None,
        }
    }
}

/// Reference to a staged zip archive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct ArchiveRef {
    /// Staged upload ID.
    pub id: String,
}

/// Raw update payload: exactly one of `files` and `archive` must be present.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BucketPayload {
    /// New entry set as a list of file references.
    #[serde(default)]
    pub files: Option<Vec<FileRef>>,
    /// New entry set as a zip archive.
    #[serde(default)]
    pub archive: Option<ArchiveRef>,
}

/// Resolved source of a new entry set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSource {
    /// Replace from a list of file references.
    Files(Vec<FileRef>),
    /// Replace from a staged archive.
    Archive(ArchiveRef),
}

impl BucketPayload {
    /// Resolve the payload into the single source it carries.
    pub fn into_source(self) -> Result<UpdateSource> {
        match (self.files, self.archive) {
            (Some(files), None) => Ok(UpdateSource::Files(files)),
            (None, Some(archive)) => Ok(UpdateSource::Archive(archive)),
            (Some(_), Some(_)) => Err(BucketError::ConflictingInput(
                "files and archive are mutually exclusive".to_string(),
            )),
            (None, None) => Err(BucketError::ConflictingInput(
                "either files or archive is required".to_string(),
            )),
        }
    }
}
