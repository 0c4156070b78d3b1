//! File bucket: a named collection of files owned by a resource.
//!
//! This module provides:
//! - Name validation shared by every import path
//! - Blob storage for entry contents
//! - Entry persistence and the collection store
//! - The update payload accepted by create and update

mod entry;
mod mime;
pub mod name;
mod payload;
mod storage;
mod store;

pub use entry::{EntryRepository, FileEntry, NewEntry};
pub use mime::{detect_mime_type, parse_declared, SNIFF_LEN};
pub use name::{is_safe_name, validate_name};
pub use payload::{ArchiveRef, BucketPayload, FileRef, UpdateSource};
pub use storage::BlobStorage;
pub use store::CollectionStore;
