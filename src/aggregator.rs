//! Chapter aggregation module.
//!
//! Walks a located content directory and turns it into an [`ImageSet`]: images
//! sitting directly in the directory form an unnamed first chapter, every
//! sub-directory holding images becomes a named chapter. Chapters and pages are
//! ordered with numeric-aware name comparison so `"2"` precedes `"10"`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use log::{debug, info};
use rayon::prelude::*;
use tokio::fs::{ReadDir, read_dir};
use tokio::spawn;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::path_utils::{
    compare_names_natural, get_file_name_lossy, has_allowed_extension, is_hidden_file,
};
use crate::types::{CandidateDirectory, ContentId, ImageSet};

/// Builds ordered image sets out of located content directories.
#[derive(Debug)]
pub struct Aggregator<'a> {
    extensions: &'a [String],
    max_concurrent_dirs: usize,
}

impl<'a> Aggregator<'a> {
    /// Creates a new Aggregator.
    ///
    /// # Arguments
    ///
    /// * `extensions` - Normalized image extension allow-list
    /// * `max_concurrent_dirs` - Upper bound on chapter directories read at the same time
    pub fn new(extensions: &'a [String], max_concurrent_dirs: usize) -> Self {
        Self {
            extensions,
            max_concurrent_dirs: max_concurrent_dirs.max(1),
        }
    }

    /// Collects the pages of a located directory in reading order.
    ///
    /// # Returns
    ///
    /// * `Ok(ImageSet)` - Unnamed root chapter first (if any), then named chapters
    /// * `Err(Error::EmptySet)` - The directory holds no allow-listed images at all
    pub async fn aggregate(
        &self,
        content_id: ContentId,
        candidate: &CandidateDirectory,
    ) -> Result<ImageSet> {
        let directory = &candidate.path;

        let root_pages = collect_images(directory, self.extensions).await?;
        let mut chapter_dirs = collect_entries(directory, true).await?;
        chapter_dirs.par_sort_by(|a, b| compare_names_natural(a, b));

        let chapter_pages = self.collect_chapter_pages(chapter_dirs).await?;

        let mut chapters: Vec<(Option<String>, Vec<PathBuf>)> = Vec::new();
        if !root_pages.is_empty() {
            chapters.push((None, root_pages));
        }
        chapters.extend(
            chapter_pages
                .into_iter()
                .map(|(dir, pages)| (Some(get_file_name_lossy(&dir)), pages)),
        );

        let image_set = ImageSet::from_chapters(content_id, directory.clone(), chapters);
        if image_set.is_empty() {
            info!("Directory {:?} holds no usable images", directory);
            return Err(Error::EmptySet {
                directory: directory.clone(),
            });
        }

        info!(
            "Aggregated {} pages in {} chapters for content {}",
            image_set.len(),
            image_set.chapters().len(),
            content_id
        );
        Ok(image_set)
    }

    /// Reads the images of every chapter directory concurrently, keeping the
    /// chapter order given.
    async fn collect_chapter_pages(
        &self,
        chapter_dirs: Vec<PathBuf>,
    ) -> Result<Vec<(PathBuf, Vec<PathBuf>)>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_dirs));
        let extensions = Arc::new(self.extensions.to_vec());
        let mut handles: Vec<JoinHandle<Result<(usize, Vec<PathBuf>)>>> = Vec::new();

        for (index, chapter_dir) in chapter_dirs.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let extensions = Arc::clone(&extensions);

            handles.push(spawn(async move {
                let _permit = semaphore.acquire().await?;
                let pages = collect_images(&chapter_dir, &extensions).await?;
                Ok((index, pages))
            }));
        }

        let results = try_join_all(handles).await.map_err(|e| {
            Error::AsyncTaskError(format!("Failed to join page collection tasks: {}", e))
        })?;

        let mut pages_per_chapter = vec![Vec::new(); results.len()];
        for res in results {
            let (index, pages) = res?;
            pages_per_chapter[index] = pages;
        }

        Ok(chapter_dirs
            .into_iter()
            .zip(pages_per_chapter)
            .filter(|(dir, pages)| {
                if pages.is_empty() {
                    debug!("Skipping chapter directory without images: {:?}", dir);
                }
                !pages.is_empty()
            })
            .collect())
    }
}

/// Lists the non-hidden entries of a directory.
///
/// # Arguments
///
/// * `directory` - Directory to scan
/// * `only_dirs` - When true, only directories are collected; when false, only files
pub async fn collect_entries(directory: &Path, only_dirs: bool) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = Vec::new();
    let mut paths: ReadDir = read_dir(directory).await?;

    while let Some(entry) = paths.next_entry().await? {
        let path = entry.path();

        if is_hidden_file(&path) {
            continue;
        }

        // file_type() does not follow symlinks; metadata() does, so linked
        // chapter directories still count as directories
        let is_dir = match entry.file_type().await {
            Ok(file_type) if file_type.is_symlink() => path.is_dir(),
            Ok(file_type) => file_type.is_dir(),
            Err(_) => continue,
        };
        if only_dirs != is_dir {
            continue;
        }

        entries.push(path);
    }

    Ok(entries)
}

/// Lists the allow-listed image files directly inside `directory`, in natural
/// file name order.
pub async fn collect_images(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = collect_entries(directory, false)
        .await?
        .into_iter()
        .filter(|path| has_allowed_extension(path, extensions))
        .collect();
    images.par_sort_by(|a, b| compare_names_natural(a, b));
    Ok(images)
}
