//! Document assembly module.
//!
//! Packages an [`ImageSet`] into one document, in exactly the set's page order.
//! The document is written next to its final location as `<name>.part` and only
//! renamed into place once it is complete and within the size ceiling; every
//! failure removes the partial file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio::fs;

use crate::error::{Error, Result};
use crate::generator::{Generator, cbz::Cbz, pdf::Pdf};
use crate::types::{AssemblyResult, ImageSet, OutputFormat};

/// Assembles image sets into PDF or CBZ documents.
#[derive(Debug, Clone, Copy)]
pub struct Assembler {
    format: OutputFormat,
}

impl Assembler {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Writes `image_set` to `output_path` as one document.
    ///
    /// # Arguments
    ///
    /// * `image_set` - Pages in reading order
    /// * `output_path` - Final location of the document
    /// * `size_limit_bytes` - Largest acceptable document size
    ///
    /// # Returns
    ///
    /// * `Ok(AssemblyResult)` - The document is in place and within the limit
    /// * `Err(Error::EmptySet)` - The set has no pages
    /// * `Err(Error::CorruptSource)` - A page could not be read or decoded
    /// * `Err(Error::TooLarge)` - The page data or the finished document exceeds the limit
    pub async fn assemble(
        &self,
        image_set: &ImageSet,
        output_path: &Path,
        size_limit_bytes: u64,
    ) -> Result<AssemblyResult> {
        if image_set.is_empty() {
            return Err(Error::EmptySet {
                directory: image_set.directory.clone(),
            });
        }

        let partial_path = partial_path(output_path);
        info!(
            "Assembling {} pages of content {} into {:?}",
            image_set.len(),
            image_set.content_id,
            output_path
        );

        let outcome = self
            .write_document(image_set, &partial_path, size_limit_bytes)
            .await;

        let (page_count, byte_size) = match outcome {
            Ok(written) => written,
            Err(e) => {
                remove_partial(&partial_path).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&partial_path, output_path).await {
            remove_partial(&partial_path).await;
            return Err(e.into());
        }

        info!(
            "Assembled {:?}: {} pages, {} bytes",
            output_path, page_count, byte_size
        );
        Ok(AssemblyResult {
            output_path: output_path.to_path_buf(),
            page_count,
            byte_size,
            truncated: false,
        })
    }

    /// Generates the document at `partial_path` and measures it.
    async fn write_document(
        &self,
        image_set: &ImageSet,
        partial_path: &Path,
        size_limit_bytes: u64,
    ) -> Result<(usize, u64)> {
        let title = image_set.content_id.to_string();

        let page_count = match self.format {
            OutputFormat::Pdf => {
                let generator = Pdf::new(partial_path, &title)?;
                Self::fill(generator, image_set, size_limit_bytes).await?
            }
            OutputFormat::Cbz => {
                let generator = Cbz::new(partial_path, &title)?;
                Self::fill(generator, image_set, size_limit_bytes).await?
            }
        };

        let byte_size = fs::metadata(partial_path).await?.len();
        if byte_size > size_limit_bytes {
            warn!(
                "Document for content {} is {} bytes, over the {} byte limit",
                image_set.content_id, byte_size, size_limit_bytes
            );
            return Err(Error::TooLarge {
                size: byte_size,
                limit: size_limit_bytes,
            });
        }

        Ok((page_count, byte_size))
    }

    /// Adds every page in order and saves, returning the page count.
    ///
    /// Generators report unreadable pages as `CorruptSource` themselves, so
    /// output-side failures reach the caller unchanged.
    async fn fill<G>(
        mut generator: G,
        image_set: &ImageSet,
        size_limit_bytes: u64,
    ) -> Result<usize>
    where
        G: Generator + Send,
    {
        generator.limit_size(size_limit_bytes);
        for page in image_set.pages() {
            generator.add_page(page).await?;
        }

        let page_count = generator.page_count();
        generator.save().await?;
        Ok(page_count)
    }
}

/// `<output>.part` next to the final output.
fn partial_path(output_path: &Path) -> PathBuf {
    let mut name: OsString = output_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".part");
    output_path.with_file_name(name)
}

async fn remove_partial(partial_path: &Path) {
    match fs::remove_file(partial_path).await {
        Ok(()) => debug!("Removed partial output {:?}", partial_path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {:?}: {}", partial_path, e),
    }
}
