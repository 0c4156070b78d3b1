//! Response DTOs for the web API.

use serde::Serialize;
use utoipa::ToSchema;

use crate::bucket::FileEntry;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// One entry of a bucket listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileEntryResponse {
    /// Entry name.
    pub name: String,
    /// Mime type served on download.
    pub mime_type: String,
    /// Size in bytes.
    pub size: i64,
    /// When the entry was stored (RFC 3339).
    pub created_at: String,
}

impl From<&FileEntry> for FileEntryResponse {
    fn from(entry: &FileEntry) -> Self {
        Self {
            name: entry.name.clone(),
            mime_type: entry.mime_type.clone(),
            size: entry.size,
            created_at: entry.created_at_datetime().to_rfc3339(),
        }
    }
}

/// A bucket and its entries.
#[derive(Debug, Serialize, ToSchema)]
pub struct BucketResponse {
    /// Owning resource ID.
    pub owner_id: i64,
    /// Entries ordered by name.
    pub files: Vec<FileEntryResponse>,
}

impl BucketResponse {
    pub fn new(owner_id: i64, entries: &[FileEntry]) -> Self {
        Self {
            owner_id,
            files: entries.iter().map(FileEntryResponse::from).collect(),
        }
    }
}
