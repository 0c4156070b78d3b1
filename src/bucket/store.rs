//! Collection store: the authoritative name to blob mapping per owner.
//!
//! Every mutation validates the whole new entry set before touching
//! anything, writes new blobs, then swaps the rows in one transaction.
//! Blobs no longer referenced after the swap are deleted right away.

use std::collections::{HashMap, HashSet};
use std::io;

use tracing::{debug, info};

use crate::archive::{ArchiveReader, ExportEntry};
use crate::upload::{StagedUpload, StagedUploads};
use crate::{BucketError, Database, Result};

use super::entry::{EntryRepository, EntryWriter, FileEntry, NewEntry};
use super::mime::{detect_mime_type, parse_declared, SNIFF_LEN};
use super::name::validate_name;
use super::payload::{ArchiveRef, FileRef, UpdateSource};
use super::storage::BlobStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Create,
    Update,
}

/// Blobs written for a pending swap. Deleted on drop unless committed.
struct PendingBlobs {
    storage: BlobStorage,
    names: Vec<String>,
    committed: bool,
}

impl PendingBlobs {
    fn new(storage: BlobStorage) -> Self {
        Self {
            storage,
            names: Vec::new(),
            committed: false,
        }
    }

    fn push(&mut self, stored_name: String) {
        self.names.push(stored_name);
    }

    fn contains(&self, stored_name: &str) -> bool {
        self.names.iter().any(|name| name == stored_name)
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingBlobs {
    fn drop(&mut self) {
        if !self.committed && !self.names.is_empty() {
            debug!(count = self.names.len(), "Discarding blobs of failed update");
            self.storage.delete_all(self.names.iter().map(String::as_str));
        }
    }
}

/// Collection operations over a database and a blob storage.
pub struct CollectionStore<'a> {
    db: &'a Database,
    storage: &'a BlobStorage,
    max_archive_size: Option<u64>,
}

impl<'a> CollectionStore<'a> {
    /// Create a store without an archive size limit.
    pub fn new(db: &'a Database, storage: &'a BlobStorage) -> Self {
        Self {
            db,
            storage,
            max_archive_size: None,
        }
    }

    /// Limit the total uncompressed size of imported archives.
    pub fn with_archive_limit(mut self, max_size: u64) -> Self {
        self.max_archive_size = Some(max_size);
        self
    }

    fn repo(&self) -> EntryRepository<'_> {
        EntryRepository::new(self.db.pool())
    }

    /// Check whether the owner has a collection.
    pub async fn exists(&self, owner_id: i64) -> Result<bool> {
        self.repo().bucket_exists(owner_id).await
    }

    /// Find an entry by exact name.
    pub async fn lookup(&self, owner_id: i64, name: &str) -> Result<Option<FileEntry>> {
        self.repo().get_by_name(owner_id, name).await
    }

    /// List all entries ordered by name.
    pub async fn enumerate(&self, owner_id: i64) -> Result<Vec<FileEntry>> {
        self.repo().list_by_owner(owner_id).await
    }

    /// Read the content of an entry.
    pub fn read(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        self.storage.load(&entry.stored_name)
    }

    /// Map entries to their blob paths for export.
    pub fn export_entries(&self, entries: &[FileEntry]) -> Vec<ExportEntry> {
        entries
            .iter()
            .map(|entry| ExportEntry {
                name: entry.name.clone(),
                path: self.storage.get_file_path(&entry.stored_name),
            })
            .collect()
    }

    /// Create the owner's collection populated from `source`.
    ///
    /// Fails with `AlreadyExists` if a collection exists. Nothing is
    /// persisted when validation fails.
    pub async fn create(
        &self,
        owner_id: i64,
        source: UpdateSource,
        uploads: &dyn StagedUploads,
    ) -> Result<Vec<FileEntry>> {
        if self.exists(owner_id).await? {
            return Err(already_exists(owner_id));
        }
        self.apply(owner_id, source, uploads, Mode::Create).await
    }

    /// Replace the entries of an existing collection from `source`.
    pub async fn update(
        &self,
        owner_id: i64,
        source: UpdateSource,
        uploads: &dyn StagedUploads,
    ) -> Result<Vec<FileEntry>> {
        if !self.exists(owner_id).await? {
            return Err(not_found(owner_id));
        }
        self.apply(owner_id, source, uploads, Mode::Update).await
    }

    /// Replace the entries of an existing collection with a file list.
    pub async fn replace_from_list(
        &self,
        owner_id: i64,
        files: Vec<FileRef>,
        uploads: &dyn StagedUploads,
    ) -> Result<Vec<FileEntry>> {
        self.update(owner_id, UpdateSource::Files(files), uploads)
            .await
    }

    /// Replace the entries of an existing collection with an archive's files.
    pub async fn replace_from_archive(
        &self,
        owner_id: i64,
        archive: ArchiveRef,
        uploads: &dyn StagedUploads,
    ) -> Result<Vec<FileEntry>> {
        self.update(owner_id, UpdateSource::Archive(archive), uploads)
            .await
    }

    /// Delete the collection, its entries and their blobs.
    pub async fn delete(&self, owner_id: i64) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let entries = EntryWriter::list_by_owner(&mut tx, owner_id).await?;
        if !EntryWriter::delete_bucket(&mut tx, owner_id).await? {
            return Err(not_found(owner_id));
        }
        tx.commit().await?;

        self.storage
            .delete_all(entries.iter().map(|e| e.stored_name.as_str()));
        info!(owner_id, files = entries.len(), "Deleted bucket");
        Ok(())
    }

    async fn apply(
        &self,
        owner_id: i64,
        source: UpdateSource,
        uploads: &dyn StagedUploads,
        mode: Mode,
    ) -> Result<Vec<FileEntry>> {
        let (entries, pending) = match source {
            UpdateSource::Files(files) => self.stage_list(owner_id, files, uploads).await?,
            UpdateSource::Archive(archive) => self.stage_archive(&archive, uploads).await?,
        };

        self.swap(owner_id, entries, pending, mode).await?;
        self.enumerate(owner_id).await
    }

    /// Validate a file list and write the blobs of its uploads.
    async fn stage_list(
        &self,
        owner_id: i64,
        files: Vec<FileRef>,
        uploads: &dyn StagedUploads,
    ) -> Result<(Vec<NewEntry>, PendingBlobs)> {
        for file in &files {
            validate_name(&file.name)?;
        }

        let mut seen = HashSet::with_capacity(files.len());
        for file in &files {
            if !seen.insert(file.name.as_str()) {
                return Err(BucketError::DuplicateName(file.name.clone()));
            }
        }

        let existing: HashMap<String, FileEntry> = self
            .enumerate(owner_id)
            .await?
            .into_iter()
            .map(|entry| (entry.name.clone(), entry))
            .collect();
        if let Some(missing) = files
            .iter()
            .find(|f| f.id.is_none() && !existing.contains_key(&f.name))
        {
            return Err(BucketError::UnknownEntry(missing.name.clone()));
        }

        let mut declared = Vec::with_capacity(files.len());
        for file in &files {
            let mime_type = match &file.mime_type {
                Some(value) => Some(
                    parse_declared(value)
                        .ok_or_else(|| BucketError::InvalidMimeType(value.clone()))?,
                ),
                None => None,
            };
            declared.push(mime_type);
        }

        // Take every upload before writing anything.
        let mut taken = Vec::with_capacity(files.len());
        for (file, mime_type) in files.into_iter().zip(declared) {
            let source = match &file.id {
                Some(id) => Staged::Upload(uploads.take(id)?, mime_type),
                None => match existing.get(&file.name) {
                    Some(entry) => Staged::Kept(NewEntry::from(entry)),
                    None => return Err(BucketError::UnknownEntry(file.name)),
                },
            };
            taken.push((file.name, source));
        }

        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || ingest_uploads(taken, storage))
            .await
            .map_err(|e| BucketError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    /// Take a staged archive and extract its files into blobs.
    async fn stage_archive(
        &self,
        archive: &ArchiveRef,
        uploads: &dyn StagedUploads,
    ) -> Result<(Vec<NewEntry>, PendingBlobs)> {
        let upload = uploads.take(&archive.id)?;
        let storage = self.storage.clone();
        let max_size = self.max_archive_size;

        tokio::task::spawn_blocking(move || extract_archive(upload, storage, max_size))
            .await
            .map_err(|e| BucketError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    /// Swap the entry rows in one transaction and reclaim unreferenced blobs.
    async fn swap(
        &self,
        owner_id: i64,
        entries: Vec<NewEntry>,
        pending: PendingBlobs,
        mode: Mode,
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        match mode {
            Mode::Create => {
                if !EntryWriter::insert_bucket(&mut tx, owner_id).await? {
                    return Err(already_exists(owner_id));
                }
            }
            Mode::Update => {
                if !EntryWriter::bucket_exists(&mut tx, owner_id).await? {
                    return Err(not_found(owner_id));
                }
            }
        }

        let old = EntryWriter::list_by_owner(&mut tx, owner_id).await?;
        let old_blobs: HashSet<&str> = old.iter().map(|e| e.stored_name.as_str()).collect();

        // Kept entries must still be there; a concurrent update may have
        // replaced them since validation.
        if let Some(gone) = entries
            .iter()
            .find(|e| !pending.contains(&e.stored_name) && !old_blobs.contains(e.stored_name.as_str()))
        {
            return Err(BucketError::UnknownEntry(gone.name.clone()));
        }

        EntryWriter::replace_all(&mut tx, owner_id, &entries).await?;
        tx.commit().await?;
        pending.commit();

        let referenced: HashSet<&str> = entries.iter().map(|e| e.stored_name.as_str()).collect();
        let released: Vec<&str> = old_blobs
            .into_iter()
            .filter(|name| !referenced.contains(name))
            .collect();
        self.storage.delete_all(released.iter().copied());

        info!(
            owner_id,
            files = entries.len(),
            released = released.len(),
            created = mode == Mode::Create,
            "Replaced bucket entries"
        );
        Ok(())
    }
}

/// Content source of one entry in a file list.
enum Staged {
    /// New content with the declared mime type, if any.
    Upload(StagedUpload, Option<String>),
    Kept(NewEntry),
}

fn ingest_uploads(
    taken: Vec<(String, Staged)>,
    storage: BlobStorage,
) -> Result<(Vec<NewEntry>, PendingBlobs)> {
    let mut pending = PendingBlobs::new(storage.clone());
    let mut entries = Vec::with_capacity(taken.len());

    for (name, source) in taken {
        let entry = match source {
            Staged::Upload(upload, declared) => {
                let stored_name = storage.ingest(upload.path(), &name)?;
                pending.push(stored_name.clone());

                let size = storage.file_size(&stored_name)?;
                let staged_type = upload.meta().mime_type.as_deref().and_then(parse_declared);
                let mime_type = match declared.or(staged_type) {
                    Some(mime_type) => mime_type,
                    None => {
                        let head = storage.read_head(&stored_name, SNIFF_LEN)?;
                        detect_mime_type(&name, &head)
                    }
                };
                NewEntry::new(name, stored_name, mime_type, size as i64)
            }
            Staged::Kept(entry) => entry,
        };
        entries.push(entry);
    }

    Ok((entries, pending))
}

fn extract_archive(
    upload: StagedUpload,
    storage: BlobStorage,
    max_size: Option<u64>,
) -> Result<(Vec<NewEntry>, PendingBlobs)> {
    let mut reader = ArchiveReader::open(upload.open()?, max_size)?;
    let mut pending = PendingBlobs::new(storage.clone());
    let mut entries = Vec::new();

    reader.extract_each(|name, content| {
        let (stored_name, size) = storage.save_from(content, name)?;
        pending.push(stored_name.clone());

        let head = storage.read_head(&stored_name, SNIFF_LEN)?;
        let mime_type = detect_mime_type(name, &head);
        entries.push(NewEntry::new(name, stored_name, mime_type, size as i64));
        Ok(())
    })?;

    debug!(files = entries.len(), "Extracted archive");
    Ok((entries, pending))
}

fn not_found(owner_id: i64) -> BucketError {
    BucketError::NotFound(format!("Bucket for resource {owner_id}"))
}

fn already_exists(owner_id: i64) -> BucketError {
    BucketError::AlreadyExists(format!("Bucket for resource {owner_id}"))
}
