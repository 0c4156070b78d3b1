//! Zip codec for bucket import and export.
//!
//! Import reads a staged archive in two passes: the central directory is
//! checked first (names, duplicates, declared size), then entries are
//! extracted one at a time. Export writes a zip on a blocking thread and
//! streams it out through a bounded channel.

mod spool;

pub use spool::{Chunk, CHUNK_SIZE};

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::PathBuf;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::bucket::validate_name;
use crate::{BucketError, Result};

use spool::Spool;

/// Chunks buffered between the encoder and the response body.
const CHANNEL_CAPACITY: usize = 4;

/// A decoded archive entry held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub content: Vec<u8>,
}

/// A file to be written into an exported archive.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    /// Name inside the archive.
    pub name: String,
    /// Path of the content on disk.
    pub path: PathBuf,
}

/// Validated view of a zip archive.
///
/// Directory entries are skipped once their names pass the same check as
/// file names. Any unsafe or duplicate name rejects the whole archive.
pub struct ArchiveReader<R> {
    archive: ZipArchive<R>,
    files: Vec<(usize, String)>,
    max_size: Option<u64>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Open an archive and check its central directory.
    ///
    /// `max_size` bounds the total uncompressed size of the file entries.
    pub fn open(reader: R, max_size: Option<u64>) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut files = Vec::with_capacity(archive.len());
        let mut seen = HashSet::new();
        let mut declared: u64 = 0;

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            let name = file.name().to_string();
            if file.is_dir() {
                validate_name(name.strip_suffix(['/', '\\']).unwrap_or(&name))?;
                continue;
            }

            validate_name(&name)?;
            if !seen.insert(name.clone()) {
                return Err(BucketError::DuplicateName(name));
            }

            declared = declared.saturating_add(file.size());
            if let Some(limit) = max_size {
                if declared > limit {
                    return Err(size_limit_error(limit));
                }
            }

            files.push((index, name));
        }

        debug!(files = files.len(), declared, "Opened archive");
        Ok(Self {
            archive,
            files,
            max_size,
        })
    }

    /// Extract every file entry in archive order.
    ///
    /// `f` receives the entry name and a reader over its decompressed
    /// content. Read failures (corrupt data, checksum mismatch, size limit)
    /// surface as `ArchiveDecode` even when `f` wraps them.
    pub fn extract_each<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, &mut dyn Read) -> Result<()>,
    {
        let mut remaining = self.max_size.unwrap_or(u64::MAX);

        for (index, name) in &self.files {
            let file = self.archive.by_index(*index)?;
            let mut reader = TrackedReader::new(file, remaining);

            let result = f(name, &mut reader);
            if let Some(message) = reader.failure.take() {
                return Err(BucketError::ArchiveDecode(format!("{name}: {message}")));
            }
            result?;

            remaining -= reader.read;
        }

        Ok(())
    }
}

/// Decode a whole archive into memory.
pub fn decode<R: Read + Seek>(reader: R, max_size: Option<u64>) -> Result<Vec<ArchiveEntry>> {
    let mut archive = ArchiveReader::open(reader, max_size)?;
    let mut entries = Vec::new();

    archive.extract_each(|name, reader| {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        entries.push(ArchiveEntry {
            name: name.to_string(),
            content,
        });
        Ok(())
    })?;

    Ok(entries)
}

/// Reader that counts bytes, enforces a limit and remembers read failures.
struct TrackedReader<R> {
    inner: R,
    limit: u64,
    read: u64,
    failure: Option<String>,
}

impl<R: Read> TrackedReader<R> {
    fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            limit,
            read: 0,
            failure: None,
        }
    }
}

impl<R: Read> Read for TrackedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match self.inner.read(buf) {
            Ok(n) => n,
            Err(e) => {
                self.failure = Some(e.to_string());
                return Err(e);
            }
        };

        self.read += n as u64;
        if self.read > self.limit {
            let message = format!("archive exceeds size limit of {} bytes", self.limit);
            self.failure = Some(message.clone());
            return Err(io::Error::new(io::ErrorKind::InvalidData, message));
        }

        Ok(n)
    }
}

fn size_limit_error(limit: u64) -> BucketError {
    BucketError::ArchiveDecode(format!("archive exceeds size limit of {limit} bytes"))
}

/// Stream a zip archive of `entries` in the given order.
///
/// Encoding runs on a blocking thread. Bytes are sent as soon as the zip
/// writer can no longer patch them, so memory use is bounded by the largest
/// compressed entry. When the stream is dropped the encoder stops before the
/// next entry. An encoding failure ends the stream with an error.
pub fn encode_stream(entries: Vec<ExportEntry>) -> impl Stream<Item = io::Result<Bytes>> + Send {
    let (tx, rx) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);

    tokio::task::spawn_blocking(move || {
        let error_tx = tx.clone();
        match write_archive(&entries, tx) {
            Ok(()) => debug!(files = entries.len(), "Archive export complete"),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Archive export stopped: receiver closed");
            }
            Err(e) => {
                warn!(error = %e, "Archive export failed");
                let _ = error_tx.blocking_send(Err(e));
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
}

/// Write a zip of `entries` into `sink`.
///
/// Each entry's content is opened right before its header is written; a
/// missing file fails the export at that point.
pub fn write_archive(entries: &[ExportEntry], sink: mpsc::Sender<Chunk>) -> io::Result<()> {
    let spool = Spool::new(sink);
    let mut zip = ZipWriter::new(spool.clone());

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
        .large_file(true);

    for entry in entries {
        let mut file = File::open(&entry.path)?;

        // Everything before this header is final once the previous entry
        // has been closed by start_file.
        let mark = spool.position();
        zip.start_file(entry.name.as_str(), options)
            .map_err(zip_to_io)?;
        spool.release_before(mark)?;

        io::copy(&mut file, &mut zip)?;
    }

    zip.finish().map_err(zip_to_io)?.flush()?;
    spool.release_all()
}

fn zip_to_io(e: ZipError) -> io::Error {
    match e {
        ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn build_zip(files: &[(&str, &[u8])], dirs: &[&str]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for dir in dirs {
            zip.add_directory(*dir, options).unwrap();
        }
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn build_stored_zip(name: &str, content: &[u8]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file(name, options).unwrap();
        zip.write_all(content).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn replace_all(data: &mut [u8], from: &[u8], to: &[u8]) {
        let mut i = 0;
        while i + from.len() <= data.len() {
            if &data[i..i + from.len()] == from {
                data[i..i + to.len()].copy_from_slice(to);
            }
            i += 1;
        }
    }

    fn write_files(dir: &TempDir, files: &[(&str, &[u8])]) -> Vec<ExportEntry> {
        files
            .iter()
            .enumerate()
            .map(|(i, (name, content))| {
                let path = dir.path().join(format!("blob{i}"));
                std::fs::write(&path, content).unwrap();
                ExportEntry {
                    name: name.to_string(),
                    path,
                }
            })
            .collect()
    }

    async fn collect(entries: Vec<ExportEntry>) -> io::Result<Vec<u8>> {
        let mut stream = Box::pin(encode_stream(entries));
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[test]
    fn test_decode() {
        let data = build_zip(&[("rose.flw", b"rose"), ("daisy.flw", b"daisy")], &[]);

        let entries = decode(Cursor::new(data), None).unwrap();
        assert_eq!(
            entries,
            vec![
                ArchiveEntry {
                    name: "rose.flw".into(),
                    content: b"rose".to_vec()
                },
                ArchiveEntry {
                    name: "daisy.flw".into(),
                    content: b"daisy".to_vec()
                },
            ]
        );
    }

    #[test]
    fn test_decode_skips_directories() {
        let data = build_zip(&[("rose.flw", b"rose")], &["flowers/"]);

        let entries = decode(Cursor::new(data), None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "rose.flw");
    }

    #[test]
    fn test_decode_rejects_unsafe_directories() {
        for dir in ["../escape/", "./", "a/b/"] {
            let data = build_zip(&[("ok.txt", b"ok")], &[dir]);
            assert!(
                matches!(decode(Cursor::new(data), None), Err(BucketError::InvalidName(_))),
                "directory {dir:?} was accepted"
            );
        }
    }

    #[test]
    fn test_decode_rejects_nested_names() {
        let data = build_zip(&[("rose.flw", b"rose"), ("sub/evil.flw", b"x")], &[]);

        assert!(matches!(
            decode(Cursor::new(data), None),
            Err(BucketError::InvalidName(name)) if name == "sub/evil.flw"
        ));
    }

    #[test]
    fn test_decode_rejects_traversal() {
        let data = build_zip(&[("../escape", b"x")], &[]);
        assert!(matches!(
            decode(Cursor::new(data), None),
            Err(BucketError::InvalidName(_))
        ));
    }

    #[test]
    fn test_decode_never_yields_duplicates() {
        let mut data = build_zip(&[("rose.flw", b"one"), ("rose.flx", b"two")], &[]);
        // Rename the second entry in both local and central headers.
        replace_all(&mut data, b"rose.flx", b"rose.flw");

        match decode(Cursor::new(data), None) {
            Err(BucketError::DuplicateName(_)) | Err(BucketError::ArchiveDecode(_)) => {}
            Ok(entries) => assert_eq!(entries.len(), 1),
            Err(e) => panic!("Unexpected error: {e}"),
        }
    }

    #[test]
    fn test_decode_corrupt_data() {
        assert!(matches!(
            decode(Cursor::new(b"not a zip at all".to_vec()), None),
            Err(BucketError::ArchiveDecode(_))
        ));
        assert!(matches!(
            decode(Cursor::new(Vec::new()), None),
            Err(BucketError::ArchiveDecode(_))
        ));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut data = build_stored_zip("rose.flw", b"rose petals");
        replace_all(&mut data, b"rose petals", b"rose pedals");

        assert!(matches!(
            decode(Cursor::new(data), None),
            Err(BucketError::ArchiveDecode(_))
        ));
    }

    #[test]
    fn test_decode_size_limit() {
        let data = build_zip(&[("a", &[1u8; 100]), ("b", &[2u8; 100])], &[]);

        assert!(decode(Cursor::new(data.clone()), Some(200)).is_ok());
        assert!(matches!(
            decode(Cursor::new(data), Some(150)),
            Err(BucketError::ArchiveDecode(_))
        ));
    }

    #[test]
    fn test_extract_error_is_decode_error() {
        let mut data = build_stored_zip("rose.flw", b"rose petals");
        replace_all(&mut data, b"rose petals", b"rose pedals");

        let mut archive = ArchiveReader::open(Cursor::new(data), None).unwrap();
        let result = archive.extract_each(|_, reader| {
            io::copy(reader, &mut io::sink())?;
            Ok(())
        });
        assert!(matches!(result, Err(BucketError::ArchiveDecode(_))));
    }

    #[test]
    fn test_reader_extracts_in_archive_order() {
        let data = build_zip(&[("b", b"1"), ("a", b"2")], &["d/"]);
        let mut archive = ArchiveReader::open(Cursor::new(data), None).unwrap();

        let mut names = Vec::new();
        archive
            .extract_each(|name, _| {
                names.push(name.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_write_archive_uses_zip64_headers() {
        let dir = TempDir::new().unwrap();
        let entries = write_files(&dir, &[("rose.flw", b"rose")]);

        let (tx, mut rx) = mpsc::channel(64);
        write_archive(&entries, tx).unwrap();
        let mut data = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            data.extend_from_slice(&chunk.unwrap());
        }

        // Local file header: signature, fixed fields, name, extra fields.
        assert_eq!(&data[..4], b"PK\x03\x04");
        let name_len = u16::from_le_bytes([data[26], data[27]]) as usize;
        let extra_len = u16::from_le_bytes([data[28], data[29]]) as usize;
        let mut extra = &data[30 + name_len..30 + name_len + extra_len];

        let mut header_ids = Vec::new();
        while extra.len() >= 4 {
            header_ids.push(u16::from_le_bytes([extra[0], extra[1]]));
            let size = u16::from_le_bytes([extra[2], extra[3]]) as usize;
            extra = &extra[(4 + size).min(extra.len())..];
        }
        assert!(header_ids.contains(&0x0001), "extra fields: {header_ids:?}");

        let decoded = decode(Cursor::new(data), None).unwrap();
        assert_eq!(decoded[0].content, b"rose");
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let dir = TempDir::new().unwrap();
        let big: Vec<u8> = (0..300_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let entries = write_files(
            &dir,
            &[("rose.flw", b"rose"), ("big.bin", &big), ("empty", b"")],
        );

        let data = collect(entries).await.unwrap();
        let decoded = decode(Cursor::new(data), None).unwrap();

        let names: Vec<&str> = decoded.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["rose.flw", "big.bin", "empty"]);
        assert_eq!(decoded[0].content, b"rose");
        assert_eq!(decoded[1].content, big);
        assert!(decoded[2].content.is_empty());
    }

    #[tokio::test]
    async fn test_export_empty_is_valid_zip() {
        let data = collect(Vec::new()).await.unwrap();

        let archive = ZipArchive::new(Cursor::new(data)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[tokio::test]
    async fn test_export_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let mut entries = write_files(&dir, &[("rose.flw", b"rose")]);
        entries.push(ExportEntry {
            name: "gone".into(),
            path: dir.path().join("missing"),
        });

        assert!(collect(entries).await.is_err());
    }

    #[test]
    fn test_write_archive_stops_when_receiver_closed() {
        let dir = TempDir::new().unwrap();
        let entries = write_files(&dir, &[("a", &[1u8; 1000]), ("b", &[2u8; 1000])]);

        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = write_archive(&entries, tx).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
