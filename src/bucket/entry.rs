//! Bucket entry types and repository.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::Result;

/// One named file of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FileEntry {
    /// Owning resource ID.
    pub owner_id: i64,
    /// Entry name, unique within the bucket.
    pub name: String,
    /// Blob key in storage (UUID.ext format).
    pub stored_name: String,
    /// Mime type served on download.
    pub mime_type: String,
    /// Content size in bytes.
    pub size: i64,
    /// When the entry was stored.
    pub created_at: String,
}

impl FileEntry {
    /// Get the created_at as DateTime<Utc>.
    pub fn created_at_datetime(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("{}Z", self.created_at.replace(' ', "T")))
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }
}

/// Data for inserting an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// Entry name.
    pub name: String,
    /// Blob key in storage.
    pub stored_name: String,
    /// Mime type.
    pub mime_type: String,
    /// Content size in bytes.
    pub size: i64,
}

impl NewEntry {
    /// Create a new NewEntry.
    pub fn new(
        name: impl Into<String>,
        stored_name: impl Into<String>,
        mime_type: impl Into<String>,
        size: i64,
    ) -> Self {
        Self {
            name: name.into(),
            stored_name: stored_name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }
}

impl From<&FileEntry> for NewEntry {
    fn from(entry: &FileEntry) -> Self {
        Self::new(
            &entry.name,
            &entry.stored_name,
            &entry.mime_type,
            entry.size,
        )
    }
}

const SELECT_ENTRY: &str =
    "SELECT owner_id, name, stored_name, mime_type, size, created_at FROM bucket_files";

/// Read access to buckets and their entries.
pub struct EntryRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EntryRepository<'a> {
    /// Create a new EntryRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Check whether a bucket exists for the owner.
    pub async fn bucket_exists(&self, owner_id: i64) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM buckets WHERE owner_id = ?)")
                .bind(owner_id)
                .fetch_one(self.pool)
                .await?;

        Ok(exists.0)
    }

    /// Get an entry by exact, case-sensitive name.
    pub async fn get_by_name(&self, owner_id: i64, name: &str) -> Result<Option<FileEntry>> {
        let entry = sqlx::query_as::<_, FileEntry>(&format!(
            "{SELECT_ENTRY} WHERE owner_id = ? AND name = ?"
        ))
        .bind(owner_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(entry)
    }

    /// List the entries of a bucket ordered by name.
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<FileEntry>> {
        let entries = sqlx::query_as::<_, FileEntry>(&format!(
            "{SELECT_ENTRY} WHERE owner_id = ? ORDER BY name"
        ))
        .bind(owner_id)
        .fetch_all(self.pool)
        .await?;

        Ok(entries)
    }
}

/// Write operations, run on a connection inside the caller's transaction.
pub(crate) struct EntryWriter;

impl EntryWriter {
    /// Insert the bucket row. Returns `false` if it already existed.
    pub async fn insert_bucket(conn: &mut SqliteConnection, owner_id: i64) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO buckets (owner_id) VALUES (?)")
            .bind(owner_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Check bucket existence on the transaction's connection.
    pub async fn bucket_exists(conn: &mut SqliteConnection, owner_id: i64) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM buckets WHERE owner_id = ?)")
                .bind(owner_id)
                .fetch_one(&mut *conn)
                .await?;

        Ok(exists.0)
    }

    /// Delete the bucket row; entries go with it.
    pub async fn delete_bucket(conn: &mut SqliteConnection, owner_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM buckets WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List entries on the transaction's connection.
    pub async fn list_by_owner(
        conn: &mut SqliteConnection,
        owner_id: i64,
    ) -> Result<Vec<FileEntry>> {
        let entries = sqlx::query_as::<_, FileEntry>(&format!(
            "{SELECT_ENTRY} WHERE owner_id = ? ORDER BY name"
        ))
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(entries)
    }

    /// Replace every entry of a bucket with `entries`.
    pub async fn replace_all(
        conn: &mut SqliteConnection,
        owner_id: i64,
        entries: &[NewEntry],
    ) -> Result<()> {
        sqlx::query("DELETE FROM bucket_files WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&mut *conn)
            .await?;

        for entry in entries {
            sqlx::query(
                "INSERT INTO bucket_files (owner_id, name, stored_name, mime_type, size)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(owner_id)
            .bind(&entry.name)
            .bind(&entry.stored_name)
            .bind(&entry.mime_type)
            .bind(entry.size)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}
