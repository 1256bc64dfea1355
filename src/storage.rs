//! Storage inspection and housekeeping.
//!
//! Assembled documents stay on disk until the host removes them. These helpers
//! let the host inspect a document, measure how much space the plugin data
//! uses and purge files past a maximum age. Nothing here runs implicitly.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use log::{info, warn};
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::{OutputInfo, SizeLevel, StorageUsage};

/// Facts about the document at `path`, or `None` when there is none.
pub async fn output_info(path: &Path, size_limit_bytes: u64) -> Result<Option<OutputInfo>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Err(Error::InvalidPath(
            path.to_path_buf(),
            "Output path is not a file.".to_string(),
        ));
    }

    let byte_size = metadata.len();
    Ok(Some(OutputInfo {
        path: path.to_path_buf(),
        byte_size,
        modified: metadata
            .modified()
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|_| Local::now()),
        size_level: SizeLevel::classify(byte_size, size_limit_bytes),
    }))
}

/// Total size and number of files below `root`. A missing root is empty.
pub async fn storage_usage(root: &Path, limit_bytes: u64) -> Result<StorageUsage> {
    let root = root.to_path_buf();
    spawn_blocking(move || -> Result<StorageUsage> {
        let (total_bytes, file_count) = regular_files(&root)
            .filter_map(|(_, metadata)| metadata.map(|m| m.len()))
            .fold((0u64, 0usize), |(bytes, count), len| (bytes + len, count + 1));

        Ok(StorageUsage {
            total_bytes,
            file_count,
            limit_bytes,
        })
    })
    .await
    .map_err(|e| Error::AsyncTaskError(e.to_string()))?
}

/// Deletes regular files below `root` last modified more than `max_age` ago.
///
/// # Returns
///
/// * `Result<usize>` - Number of files deleted
pub async fn purge_expired(root: &Path, max_age: Duration) -> Result<usize> {
    let root = root.to_path_buf();
    spawn_blocking(move || -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let expired: Vec<PathBuf> = regular_files(&root)
            .filter_map(|(path, metadata)| {
                let modified = metadata?.modified().ok()?;
                (modified < cutoff).then_some(path)
            })
            .collect();

        let mut removed = 0;
        for path in expired {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!("Purged expired file {:?}", path);
                    removed += 1;
                }
                Err(e) => warn!("Failed to purge {:?}: {}", path, e),
            }
        }
        Ok(removed)
    })
    .await
    .map_err(|e| Error::AsyncTaskError(e.to_string()))?
}

/// Regular files below `root` with their metadata, skipping unreadable entries.
fn regular_files(root: &Path) -> impl Iterator<Item = (PathBuf, Option<std::fs::Metadata>)> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                if e.io_error().map(|io| io.kind()) != Some(std::io::ErrorKind::NotFound) {
                    warn!("Skipping unreadable entry: {}", e);
                }
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let metadata = entry.metadata().ok();
            (entry.into_path(), metadata)
        })
}
