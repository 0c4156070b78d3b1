//! API handlers for the file bucket.

pub mod bucket;

pub use bucket::*;

use std::sync::Arc;

use crate::bucket::{BlobStorage, CollectionStore};
use crate::upload::StagedUploads;
use crate::Database;

/// Thread-safe database handle for the web API.
pub type SharedDatabase = Arc<Database>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database pool.
    pub db: SharedDatabase,
    /// Blob storage for entry contents.
    pub storage: BlobStorage,
    /// Staged uploads referenced by update payloads.
    pub uploads: Arc<dyn StagedUploads>,
    /// Total uncompressed size limit for imported archives.
    pub max_archive_size: Option<u64>,
}

impl AppState {
    /// Create a new application state without an archive size limit.
    pub fn new(db: SharedDatabase, storage: BlobStorage, uploads: Arc<dyn StagedUploads>) -> Self {
        Self {
            db,
            storage,
            uploads,
            max_archive_size: None,
        }
    }

    /// Set the archive size limit in bytes.
    pub fn with_max_archive_size(mut self, max_size: u64) -> Self {
        self.max_archive_size = Some(max_size);
        self
    }

    /// Collection store over this state's database and storage.
    pub fn store(&self) -> CollectionStore<'_> {
        let store = CollectionStore::new(&self.db, &self.storage);
        match self.max_archive_size {
            Some(max_size) => store.with_archive_limit(max_size),
            None => store,
        }
    }
}
