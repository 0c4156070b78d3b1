//! Database schema and migrations for the file bucket.
//!
//! Migrations are applied in order when the database is opened; the
//! schema_version table tracks which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Buckets and their files
    r#"
-- One row per owning resource
CREATE TABLE buckets (
    owner_id    INTEGER PRIMARY KEY,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Named files of a bucket; content lives in blob storage under stored_name
CREATE TABLE bucket_files (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id    INTEGER NOT NULL REFERENCES buckets(owner_id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    stored_name TEXT NOT NULL UNIQUE,    -- UUID.ext
    mime_type   TEXT NOT NULL,
    size        INTEGER NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (owner_id, name)
);

CREATE INDEX idx_bucket_files_owner_id ON bucket_files(owner_id);
"#,
];
