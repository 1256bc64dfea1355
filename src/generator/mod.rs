//! Generator module provides the trait and implementations for document generators.
//!
//! A generator receives pages one at a time, in reading order, and writes a
//! single output document. Every implementation embeds page images without
//! lossy recompression.

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::ImageReader;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;

pub mod cbz;
pub mod pdf;

/// Common interface for all document generators.
///
/// Implementations handle the specifics of each file format (PDF, CBZ).
#[async_trait]
pub trait Generator {
    /// Creates a new generator instance.
    ///
    /// # Parameters
    /// * `output_file` - Full path of the document to write; parent directories are created
    /// * `title` - Title embedded in the document metadata
    ///
    /// # Returns
    /// * `Result<Self>` - A new generator instance or an error if creation fails
    fn new(output_file: &Path, title: &str) -> Result<Self>
    where
        Self: Sized;

    /// Appends a page to the document.
    ///
    /// # Parameters
    /// * `image_path` - Path to the image file to add as the next page
    ///
    /// # Returns
    /// * `Result<&mut Self>` - Self reference for method chaining, or an error if failed
    async fn add_page(&mut self, image_path: &Path) -> Result<&mut Self>
    where
        Self: Sized;

    /// Number of pages added so far.
    fn page_count(&self) -> usize;

    /// Makes `add_page` fail with `TooLarge` as soon as the page data written
    /// so far exceeds `limit_bytes`. The finished document is at least that
    /// large, so nothing that would fit is rejected.
    fn limit_size(&mut self, limit_bytes: u64);

    /// Finalizes the document and writes it to its output location.
    async fn save(self) -> Result<()>;
}

/// Reads the header of an image and returns its pixel dimensions, failing when
/// the file is unreadable or not a recognizable image.
pub(crate) async fn probe_dimensions(image_path: &Path) -> Result<(u32, u32)> {
    let path: PathBuf = image_path.to_path_buf();
    spawn_blocking(move || -> Result<(u32, u32)> {
        let dimensions = ImageReader::open(&path)?
            .with_guessed_format()?
            .into_dimensions()?;
        Ok(dimensions)
    })
    .await
    .map_err(|e| Error::AsyncTaskError(e.to_string()))?
}

/// Adds `added` bytes to a running page-data total and checks it against the
/// optional limit.
pub(crate) fn count_page_bytes(total: &mut u64, added: u64, limit: Option<u64>) -> Result<()> {
    *total += added;
    match limit {
        Some(limit) if *total > limit => Err(Error::TooLarge {
            size: *total,
            limit,
        }),
        _ => Ok(()),
    }
}

/// Whether JPEG data runs up to its end-of-image marker. Zero and whitespace
/// padding after the marker is tolerated.
pub(crate) fn jpeg_is_complete(data: &[u8]) -> bool {
    let end = data
        .iter()
        .rposition(|b| !matches!(b, 0x00 | b'\r' | b'\n' | b' '))
        .map_or(0, |i| i + 1);
    data[..end].ends_with(&[0xFF, 0xD9])
}

/// Rejects JPEG data cut off before its end-of-image marker, as left behind by
/// an interrupted download. Such files still have a readable header.
pub(crate) fn ensure_complete_jpeg(path: &Path, data: &[u8]) -> Result<()> {
    if jpeg_is_complete(data) {
        Ok(())
    } else {
        Err(Error::CorruptSource {
            path: path.to_path_buf(),
            reason: "JPEG data ends before its end-of-image marker".to_string(),
        })
    }
}
