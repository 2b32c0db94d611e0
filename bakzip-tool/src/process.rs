use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bakzip_lib::{Config, DEFAULT_INTERVAL_MS, DEFAULT_NAME_TEMPLATE};
use tokio::task;

use crate::error::BackupError;
use crate::fs_utils::{
    absolute, compile_skip_patterns, encode_size, folder_name, list_entries, total_size,
};
use crate::naming::create_archive_path;
use crate::packaging::zip::ArchiveWriter;
use crate::spinner::Spinner;

/// Outcome of a completed backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    pub archive: PathBuf,
    pub entries: usize,
    pub size: u64,
}

/// Checks both folders before anything touches the filesystem. The
/// destination is checked first.
pub fn validate_folders(source: &Path, destination: Option<&Path>) -> Result<(), BackupError> {
    if let Some(dst) = destination {
        if !dst.is_dir() {
            return Err(BackupError::InvalidDestination(dst.to_path_buf()));
        }
    }
    if !source.is_dir() {
        return Err(BackupError::InvalidSource(source.to_path_buf()));
    }
    Ok(())
}

/// Runs the backup on a dedicated tokio runtime.
///
/// This is the entrypoint for the synchronous `main`.
pub fn run_within_tokio(
    config: Config,
    source: PathBuf,
    destination: Option<PathBuf>,
) -> Result<Option<BackupSummary>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all() // Enables both IO and time drivers
        .build()?;
    runtime.block_on(async { run_backup(&config, &source, destination.as_deref()).await })
}

/// Validates, walks and archives `source` into `destination`, or the
/// current directory when none is given. Returns `None` for a dry run.
pub async fn run_backup(
    config: &Config,
    source: &Path,
    destination: Option<&Path>,
) -> Result<Option<BackupSummary>> {
    validate_folders(source, destination)?;

    let destination = destination.map(Path::to_path_buf).unwrap_or_default();
    let skip = compile_skip_patterns(config.skip.as_deref())?;
    let template = config.name.as_deref().unwrap_or(DEFAULT_NAME_TEMPLATE);
    let archive = create_archive_path(&destination, template, &folder_name(source)?)?;

    let exclude = match archive.file_name() {
        Some(name) => absolute(&destination).join(name),
        None => absolute(&archive),
    };
    tracing::debug!("archive {} (excluded from walk as {})", archive.display(), exclude.display());

    let walk_root = source.to_path_buf();
    let entries = task::spawn_blocking(move || list_entries(&walk_root, &skip, Some(&exclude)))
        .await
        .context("directory walk panicked")??;
    tracing::info!("{} entries to back up from {}", entries.len(), source.display());

    if config.dry.unwrap_or(false) {
        println!("--- DRY RUN ---");
        println!("{}", serde_yaml::to_string(config)?);
        let total = total_size(&entries)?;
        println!("Archive: {}", archive.display());
        println!("Total entries: {}", entries.len());
        println!("Total size: {}", encode_size(total));
        for entry in &entries {
            println!("  {} -> {}", entry.path.display(), entry.name_in_archive);
        }
        return Ok(None);
    }

    let mut writer = ArchiveWriter::create(&archive).await?;
    let spinner = Spinner::stdout(spinner_interval(config));

    for entry in &entries {
        spinner
            .start(format!(
                "Adding {} to backup archive {}",
                entry.path.display(),
                archive.display()
            ))
            .await;

        let added = writer.add(entry).await;
        if let Err(e) = added {
            spinner.fail().await;
            spinner.shutdown().await;
            return Err(e.into());
        }
        spinner.stop().await;
        tracing::debug!("added {}", entry.name_in_archive);
    }
    spinner.shutdown().await;

    let count = writer.entries();
    let size = writer.close().await?;
    tracing::info!(
        "wrote {} entries to {} ({})",
        count,
        archive.display(),
        encode_size(size)
    );

    Ok(Some(BackupSummary {
        archive,
        entries: count,
        size,
    }))
}

/// Tick interval, or `None` when the animation is turned off.
fn spinner_interval(config: &Config) -> Option<Duration> {
    if !config.spinner.unwrap_or(true) {
        return None;
    }
    match config.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS) {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    }
}
