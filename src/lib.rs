//! File bucket - a named collection of files owned by a resource.
//!
//! Files are downloaded one at a time or exported together as a streamed
//! zip archive. The collection is replaced as a whole, either from a list
//! of staged uploads or from one staged zip archive.

pub mod archive;
pub mod bucket;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod upload;
pub mod web;

pub use bucket::{
    is_safe_name, BlobStorage, BucketPayload, CollectionStore, FileEntry, FileRef, UpdateSource,
};
pub use config::Config;
pub use db::Database;
pub use error::{BucketError, Result};
pub use upload::{StagedUpload, StagedUploads, UploadMeta, UploadStore};
