//! Error types for the file bucket.

use thiserror::Error;

/// Common error type for file bucket operations.
#[derive(Error, Debug)]
pub enum BucketError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry name is empty or could escape the collection root.
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    /// The same name appears twice in one import batch.
    #[error("duplicate file name: {0:?}")]
    DuplicateName(String),

    /// A declared mime type is not a valid media type.
    #[error("invalid mime type: {0:?}")]
    InvalidMimeType(String),

    /// The update payload supplies both or neither of `files` and `archive`.
    #[error("conflicting input: {0}")]
    ConflictingInput(String),

    /// The uploaded archive could not be decoded.
    #[error("archive decode error: {0}")]
    ArchiveDecode(String),

    /// A kept entry does not exist in the collection.
    #[error("file {0:?} is not in the bucket")]
    UnknownEntry(String),

    /// A staged upload reference does not resolve.
    #[error("upload {0:?} not found")]
    UnknownUpload(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Resource already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BucketError {
    /// Whether the error was caused by untrusted client input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BucketError::InvalidName(_)
                | BucketError::DuplicateName(_)
                | BucketError::InvalidMimeType(_)
                | BucketError::ConflictingInput(_)
                | BucketError::ArchiveDecode(_)
                | BucketError::UnknownEntry(_)
                | BucketError::UnknownUpload(_)
        )
    }
}

impl From<sqlx::Error> for BucketError {
    fn from(e: sqlx::Error) -> Self {
        BucketError::Database(e.to_string())
    }
}

impl From<zip::result::ZipError> for BucketError {
    fn from(e: zip::result::ZipError) -> Self {
        BucketError::ArchiveDecode(e.to_string())
    }
}

/// Result type alias for file bucket operations.
pub type Result<T> = std::result::Result<T, BucketError>;
