//! Image set location module.
//!
//! The crawler deposits a content's images under a directory whose name is not
//! guaranteed: sometimes the bare id, sometimes a localized title, sometimes a
//! mix of both. This module enumerates the sub-directories of the download
//! root, classifies their names against the requested id with [`classify`],
//! counts their images and picks one with the pure tie-break [`select_candidate`].

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use tokio::spawn;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::aggregator::{collect_entries, collect_images};
use crate::error::{Error, Result};
use crate::path_utils::{compare_names_natural, get_file_name_lossy, modified_utc};
use crate::types::{CandidateDirectory, ContentId, NamingPattern};

lazy_static! {
    /// A leading id-like number: "654321", "654321_title", "[654321]title", "654321 title".
    static ref LEADING_ID_REGEX: Regex = Regex::new(r"^\[?(\d{4,})(?:\]|[\s_\-]|$)").unwrap();
    /// A trailing id-like number: "title_654321", "title-654321".
    static ref TRAILING_ID_REGEX: Regex = Regex::new(r"[_\-](\d{4,})$").unwrap();
}

/// Classifies a directory name against a content id.
///
/// The id only counts as present when it is a whole digit run, so `"1234567"`
/// does not match id `123456`. A leading, trailing or all-digit number marks
/// another content's directory only when it is at least as long as the
/// requested id, so a year such as `"2024 夏の物語"` stays a title.
pub fn classify(name: &str, content_id: ContentId) -> NamingPattern {
    let id = content_id.to_string();

    if name == id {
        return NamingPattern::ExactId;
    }

    if digit_runs(name).any(|run| run == id) {
        return NamingPattern::MixedIdAndTitle;
    }

    let all_digits =
        (!name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())).then_some(name);
    let leading = LEADING_ID_REGEX
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());
    let trailing = TRAILING_ID_REGEX
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());

    let foreign_id = [all_digits, leading, trailing]
        .into_iter()
        .flatten()
        .any(|run| run.len() >= id.len().max(4));
    if foreign_id {
        return NamingPattern::Unrelated;
    }

    NamingPattern::TitleOnly
}

/// Maximal runs of ASCII digits inside `s`.
fn digit_runs(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_ascii_digit()).filter(|run| !run.is_empty())
}

/// Picks the directory most likely to hold the requested content.
///
/// Only candidates with at least one image are eligible. An exact-id directory
/// wins outright. Otherwise, among id-and-title and title-only directories, the
/// most recently modified wins, then the one with more images, then the
/// smallest name. Unrelated directories are never picked.
pub fn select_candidate(candidates: &[CandidateDirectory]) -> Option<&CandidateDirectory> {
    let eligible = || candidates.iter().filter(|c| c.total_images() > 0);

    let exact = eligible()
        .filter(|c| c.pattern == NamingPattern::ExactId)
        .max_by(|a, b| by_images_then_name(a, b));
    if exact.is_some() {
        return exact;
    }

    eligible()
        .filter(|c| {
            matches!(
                c.pattern,
                NamingPattern::MixedIdAndTitle | NamingPattern::TitleOnly
            )
        })
        .max_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| by_images_then_name(a, b))
        })
}

fn by_images_then_name(a: &CandidateDirectory, b: &CandidateDirectory) -> Ordering {
    a.total_images()
        .cmp(&b.total_images())
        // Reversed so the smaller name is the maximum
        .then_with(|| b.name.cmp(&a.name))
}

/// Scans a download root for the directory holding a content's images.
#[derive(Debug)]
pub struct Locator<'a> {
    download_root: &'a Path,
    extensions: &'a [String],
    max_concurrent_dirs: usize,
}

impl<'a> Locator<'a> {
    /// Creates a new Locator.
    ///
    /// # Arguments
    ///
    /// * `download_root` - Directory the crawler writes content directories into
    /// * `extensions` - Normalized image extension allow-list
    /// * `max_concurrent_dirs` - Upper bound on directories read at the same time
    pub fn new(
        download_root: &'a Path,
        extensions: &'a [String],
        max_concurrent_dirs: usize,
    ) -> Self {
        Self {
            download_root,
            extensions,
            max_concurrent_dirs: max_concurrent_dirs.max(1),
        }
    }

    /// Lists every sub-directory of the download root as a classified candidate
    /// with its image counts, in natural name order. Empty directories are
    /// included so diagnostics can show them.
    ///
    /// # Returns
    ///
    /// * `Err(Error::NotFound)` - The download root does not exist
    pub async fn scan(&self, content_id: ContentId) -> Result<Vec<CandidateDirectory>> {
        if !self.download_root.exists() {
            return Err(Error::NotFound {
                content_id,
                download_root: self.download_root.to_path_buf(),
            });
        }
        if !self.download_root.is_dir() {
            return Err(Error::InvalidPath(
                self.download_root.to_path_buf(),
                "Download root is not a directory.".to_string(),
            ));
        }

        let mut directories = collect_entries(self.download_root, true).await?;
        directories.sort_by(|a, b| compare_names_natural(a, b));

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_dirs));
        let extensions = Arc::new(self.extensions.to_vec());
        let mut handles: Vec<JoinHandle<Result<Option<CandidateDirectory>>>> = Vec::new();

        for directory in directories {
            let semaphore = Arc::clone(&semaphore);
            let extensions = Arc::clone(&extensions);

            handles.push(spawn(async move {
                let _permit = semaphore.acquire().await?;
                inspect_candidate(directory, content_id, &extensions).await
            }));
        }

        let results = try_join_all(handles).await.map_err(|e| {
            Error::AsyncTaskError(format!("Failed to join candidate scan tasks: {}", e))
        })?;

        let mut candidates = Vec::with_capacity(results.len());
        for result in results {
            if let Some(candidate) = result? {
                debug!(
                    "Candidate '{}' classified as {} with {} direct and {} nested images",
                    candidate.name,
                    candidate.pattern.label(),
                    candidate.direct_images,
                    candidate.nested_images
                );
                candidates.push(candidate);
            }
        }

        Ok(candidates)
    }

    /// Finds the directory holding the content's images.
    ///
    /// # Returns
    ///
    /// * `Ok(CandidateDirectory)` - The selected directory
    /// * `Err(Error::NotFound)` - The root is missing or no eligible directory holds images
    pub async fn locate(&self, content_id: ContentId) -> Result<CandidateDirectory> {
        let candidates = self.scan(content_id).await?;
        match select_candidate(&candidates) {
            Some(chosen) => {
                info!(
                    "Located content {} in '{}' ({}, {} images)",
                    content_id,
                    chosen.name,
                    chosen.pattern.label(),
                    chosen.total_images()
                );
                Ok(chosen.clone())
            }
            None => {
                info!(
                    "No directory with images for content {} among {} candidates",
                    content_id,
                    candidates.len()
                );
                Err(Error::NotFound {
                    content_id,
                    download_root: self.download_root.to_path_buf(),
                })
            }
        }
    }
}

/// Builds a candidate from one directory. A directory that vanished or
/// became unreadable while scanning is skipped, since the crawler may be
/// rewriting it.
async fn inspect_candidate(
    directory: PathBuf,
    content_id: ContentId,
    extensions: &[String],
) -> Result<Option<CandidateDirectory>> {
    let metadata = match tokio::fs::metadata(&directory).await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("Skipping candidate {:?}: {}", directory, e);
            return Ok(None);
        }
    };

    let (direct_images, nested_images) = match count_images(&directory, extensions).await {
        Ok(counts) => counts,
        Err(e) => {
            warn!("Skipping candidate {:?}: {}", directory, e);
            return Ok(None);
        }
    };

    let name = get_file_name_lossy(&directory);
    Ok(Some(CandidateDirectory {
        pattern: classify(&name, content_id),
        name,
        modified: modified_utc(&metadata),
        path: directory,
        direct_images,
        nested_images,
    }))
}

/// Counts allow-listed images directly inside `directory` and inside its
/// immediate sub-directories.
///
/// # Returns
///
/// * `Result<(usize, usize)>` - `(direct, nested)` image counts
pub async fn count_images(directory: &Path, extensions: &[String]) -> Result<(usize, usize)> {
    let direct = collect_images(directory, extensions).await?.len();

    let mut nested = 0;
    for chapter in collect_entries(directory, true).await? {
        nested += collect_images(&chapter, extensions).await?.len();
    }

    Ok((direct, nested))
}
