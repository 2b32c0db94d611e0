use std::fs::Metadata;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipDateTime, ZipEntryBuilder};
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::compat::TokioAsyncReadCompatExt;

use super::{BackupEntry, EntryKind};
use crate::error::BackupError;

/// Write side of a backup archive.
///
/// Entries are appended one at a time; the handle is owned by the driver and
/// never shared, so only one write is ever in flight.
pub struct ArchiveWriter {
    path: PathBuf,
    writer: ZipFileWriter<File>,
    entries: usize,
}

impl ArchiveWriter {
    /// Creates (or truncates) the archive file at `path`.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .await
            .with_context(|| format!("creating archive {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: ZipFileWriter::with_tokio(file),
            entries: 0,
        })
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Appends one walked entry. Regular files are deflated, placeholders are
    /// stored as empty directory entries.
    pub async fn add(&mut self, entry: &BackupEntry) -> Result<(), BackupError> {
        match entry.kind {
            EntryKind::File => self.add_file(entry).await?,
            EntryKind::Placeholder => self.add_placeholder(entry).await?,
        }
        self.entries += 1;
        Ok(())
    }

    async fn add_file(&mut self, entry: &BackupEntry) -> Result<(), BackupError> {
        let file = File::open(&entry.path)
            .await
            .map_err(|e| read_failed(entry, e))?;
        let metadata = file.metadata().await.map_err(|e| read_failed(entry, e))?;

        let builder = entry_builder(&entry.name_in_archive, Compression::Deflate, &metadata);
        let mut entry_writer = self
            .writer
            .write_entry_stream(builder)
            .await
            .map_err(|e| write_failed(entry, e))?;

        futures::io::copy(file.compat(), &mut entry_writer)
            .await
            .map_err(|source| BackupError::CopyFailed {
                path: entry.path.clone(),
                source,
            })?;

        entry_writer.close().await.map_err(|e| write_failed(entry, e))?;
        Ok(())
    }

    async fn add_placeholder(&mut self, entry: &BackupEntry) -> Result<(), BackupError> {
        let metadata = tokio::fs::metadata(&entry.path)
            .await
            .map_err(|e| read_failed(entry, e))?;

        let builder = entry_builder(&entry.name_in_archive, Compression::Stored, &metadata);
        self.writer
            .write_entry_whole(builder, &[])
            .await
            .map_err(|e| write_failed(entry, e))
    }

    /// Writes the central directory and flushes the file to disk.
    /// Returns the final archive size in bytes.
    pub async fn close(self) -> Result<u64> {
        let path = self.path;
        let mut file = self
            .writer
            .close()
            .await
            .with_context(|| format!("finishing archive {}", path.display()))?
            .into_inner();

        file.flush().await?;
        file.sync_all().await?;
        let size = file.metadata().await?.len();
        Ok(size)
    }
}

fn entry_builder(name: &str, compression: Compression, metadata: &Metadata) -> ZipEntryBuilder {
    let mut builder = ZipEntryBuilder::new(name.to_string().into(), compression);

    if let Ok(modified) = metadata.modified() {
        let modified: DateTime<Utc> = modified.into();
        builder = builder.last_modification_date(ZipDateTime::from_chrono(&modified));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder = builder.unix_permissions((metadata.permissions().mode() & 0o7777) as u16);
    }

    builder
}

fn read_failed(entry: &BackupEntry, source: std::io::Error) -> BackupError {
    BackupError::ReadFailed {
        path: entry.path.clone(),
        source,
    }
}

fn write_failed(entry: &BackupEntry, source: async_zip::error::ZipError) -> BackupError {
    BackupError::WriteFailed {
        path: entry.path.clone(),
        source,
    }
}
