//! Diagnostics module.
//!
//! Explains what the locator and aggregator see for a content id without
//! assembling anything. [`diagnose`] never fails: a missing directory, an
//! image-less directory and unexpected I/O errors all end up in the report's
//! `reason` field so the host can show them to the user.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rayon::prelude::*;
use tokio::task::spawn_blocking;

use crate::aggregator::Aggregator;
use crate::error::{Error, Result};
use crate::locator::{Locator, select_candidate};
use crate::types::{
    CandidateDirectory, ChapterBreakdown, ContentId, DiagnosticReport, ImageSet, NamingPattern,
};

pub const REASON_NOT_LOCATED: &str = "no directory located";
pub const REASON_NO_IMAGES: &str = "directory present but no images";

/// How many candidates the text rendering lists before summarizing the rest.
const RENDERED_CANDIDATES: usize = 10;

/// Inspects the download root for `content_id` and reports what was found.
///
/// # Arguments
///
/// * `content_id` - The content to look up
/// * `download_root` - Directory the crawler writes content directories into
/// * `extensions` - Normalized image extension allow-list
/// * `size_limit_bytes` - Transfer ceiling the estimate is graded against
/// * `max_concurrent_dirs` - Upper bound on directories read at the same time
pub async fn diagnose(
    content_id: ContentId,
    download_root: &Path,
    extensions: &[String],
    size_limit_bytes: u64,
    max_concurrent_dirs: usize,
) -> DiagnosticReport {
    let mut report = DiagnosticReport {
        content_id,
        found: false,
        candidates_examined: Vec::new(),
        chosen: None,
        page_count: 0,
        chapters: Vec::new(),
        estimated_size_bytes: 0,
        size_limit_bytes,
        reason: None,
    };

    let locator = Locator::new(download_root, extensions, max_concurrent_dirs);
    match locator.scan(content_id).await {
        Ok(candidates) => report.candidates_examined = candidates,
        Err(Error::NotFound { .. }) => {
            report.reason = Some(REASON_NOT_LOCATED.to_string());
            return report;
        }
        Err(e) => {
            report.reason = Some(format!("{}: {}", REASON_NOT_LOCATED, e));
            return report;
        }
    }

    let Some(chosen) = select_candidate(&report.candidates_examined).cloned() else {
        debug!(
            "No candidate selected for content {} among {} directories",
            content_id,
            report.candidates_examined.len()
        );
        // A directory carrying the id but no images is reported as present
        match id_directory_without_images(&report.candidates_examined).cloned() {
            Some(directory) => {
                report.found = true;
                report.chosen = Some(directory);
                report.reason = Some(REASON_NO_IMAGES.to_string());
            }
            None => report.reason = Some(REASON_NOT_LOCATED.to_string()),
        }
        return report;
    };

    report.found = true;
    report.chosen = Some(chosen.clone());

    let aggregator = Aggregator::new(extensions, max_concurrent_dirs);
    let image_set = match aggregator.aggregate(content_id, &chosen).await {
        Ok(image_set) => image_set,
        Err(Error::EmptySet { .. }) => {
            report.reason = Some(REASON_NO_IMAGES.to_string());
            return report;
        }
        Err(e) => {
            report.reason = Some(format!("failed to read {:?}: {}", chosen.path, e));
            return report;
        }
    };

    report.page_count = image_set.len();
    report.chapters = chapter_breakdown(&image_set);
    match estimate_size(&image_set).await {
        Ok(size) => report.estimated_size_bytes = size,
        Err(e) => report.reason = Some(format!("size estimate incomplete: {}", e)),
    }

    info!(
        "Diagnosed content {}: {} pages in {} chapters, about {} bytes",
        content_id,
        report.page_count,
        report.chapters.len(),
        report.estimated_size_bytes
    );
    report
}

/// The exact-id directory, else the newest id-and-title directory, among
/// candidates the locator could not pick.
fn id_directory_without_images(candidates: &[CandidateDirectory]) -> Option<&CandidateDirectory> {
    candidates
        .iter()
        .find(|c| c.pattern == NamingPattern::ExactId)
        .or_else(|| {
            candidates
                .iter()
                .filter(|c| c.pattern == NamingPattern::MixedIdAndTitle)
                .max_by_key(|c| c.modified)
        })
}

/// Pages per chapter, in reading order.
pub fn chapter_breakdown(image_set: &ImageSet) -> Vec<ChapterBreakdown> {
    image_set
        .chapters()
        .iter()
        .map(|chapter| ChapterBreakdown {
            name: chapter.display_name().to_string(),
            page_count: chapter.pages.len(),
        })
        .collect()
}

/// Sum of the image file sizes of a set: a cheap upper-bound proxy for the
/// size of an assembled document.
pub async fn estimate_size(image_set: &ImageSet) -> Result<u64> {
    let pages: Vec<PathBuf> = image_set.pages().cloned().collect();
    spawn_blocking(move || -> Result<u64> {
        pages
            .par_iter()
            .map(|page| std::fs::metadata(page).map(|m| m.len()))
            .try_reduce(|| 0, |a, b| Ok(a + b))
            .map_err(Error::from)
    })
    .await
    .map_err(|e| Error::AsyncTaskError(e.to_string()))?
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Content {}", self.content_id)?;

        match &self.chosen {
            Some(chosen) => writeln!(
                f,
                "Directory: {} ({})",
                chosen.name,
                chosen.pattern.label()
            )?,
            None => writeln!(f, "Directory: not found")?,
        }

        if self.found {
            writeln!(f, "Pages: {}", self.page_count)?;
            if !self.chapters.is_empty() {
                let chapters: Vec<String> = self
                    .chapters
                    .iter()
                    .map(|c| format!("{} ({})", c.name, c.page_count))
                    .collect();
                writeln!(f, "Chapters: {}", chapters.join(", "))?;
            }
            writeln!(
                f,
                "Estimated size: {:.2} MB ({})",
                megabytes(self.estimated_size_bytes),
                self.size_level().label()
            )?;
        }

        writeln!(
            f,
            "Directories examined: {}",
            self.candidates_examined.len()
        )?;
        for candidate in self.candidates_examined.iter().take(RENDERED_CANDIDATES) {
            writeln!(
                f,
                "  - {} [{}, {} images]",
                candidate.name,
                candidate.pattern.label(),
                candidate.total_images()
            )?;
        }
        if self.candidates_examined.len() > RENDERED_CANDIDATES {
            writeln!(
                f,
                "  ... and {} more",
                self.candidates_examined.len() - RENDERED_CANDIDATES
            )?;
        }

        if let Some(reason) = &self.reason {
            write!(f, "Note: {}", reason)?;
        }
        Ok(())
    }
}
