//! Core data types, enums, and reports for jmcosmos.
//!
//! This module defines the fundamental data structures used throughout the crate:
//! - Identifiers (`ContentId`)
//! - Lookup results (`CandidateDirectory`, `NamingPattern`)
//! - The ordered page collection (`ImageSet`, `Chapter`)
//! - Reporting types (`AssemblyResult`, `DiagnosticReport`, `OutputInfo`, `StorageUsage`)
//! - Enumerations for settings and grading (`OutputFormat`, `SizeLevel`)

use chrono::{DateTime, Local, Utc};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Longest identifier accepted from user input.
const MAX_CONTENT_ID_DIGITS: usize = 10;

/// Numeric identifier of one comic work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ContentId(u64);

impl ContentId {
    /// Creates an identifier, rejecting zero.
    pub fn new(id: u64) -> Result<Self> {
        if id == 0 {
            return Err(Error::InvalidContentId(id.to_string()));
        }
        Ok(Self(id))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = Error;

    /// Parses user-supplied text. Only plain ASCII digits are accepted so the
    /// value can never smuggle path separators into a lookup.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_CONTENT_ID_DIGITS
            || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(Error::InvalidContentId(s.to_string()));
        }
        let id = trimmed
            .parse::<u64>()
            .map_err(|_| Error::InvalidContentId(s.to_string()))?;
        ContentId::new(id).map_err(|_| Error::InvalidContentId(s.to_string()))
    }
}

/// How a directory name relates to the content identifier being looked up.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NamingPattern {
    ExactId,         // "123456"
    MixedIdAndTitle, // "123456 Title", "[123456]Title", "Title_123456"
    TitleOnly,       // "Title" (localized title without any id)
    Unrelated,       // "654321", "[654321]Title" (clearly another work)
}

impl NamingPattern {
    /// Short label used in diagnostic output.
    pub fn label(&self) -> &'static str {
        match self {
            NamingPattern::ExactId => "exact id",
            NamingPattern::MixedIdAndTitle => "id and title",
            NamingPattern::TitleOnly => "title only",
            NamingPattern::Unrelated => "unrelated",
        }
    }
}

/// A sub-directory of the download root considered as the home of a content's images.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CandidateDirectory {
    pub path: PathBuf,
    pub name: String,
    pub modified: DateTime<Utc>,
    pub pattern: NamingPattern,
    pub direct_images: usize, // Images directly inside `path`
    pub nested_images: usize, // Images one level down, inside chapter directories
}

impl CandidateDirectory {
    pub fn total_images(&self) -> usize {
        self.direct_images + self.nested_images
    }
}

/// One chapter of an [`ImageSet`]. The unnamed chapter holds images that sit
/// directly in the content directory.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chapter {
    pub index: usize,
    pub name: Option<String>,
    pub pages: Vec<PathBuf>,
}

impl Chapter {
    /// Display name; the unnamed chapter renders as `(root)`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(root)")
    }
}

/// The ordered page images of one content, grouped by chapter.
///
/// The flattened order returned by [`ImageSet::pages`] is the page order of any
/// document assembled from the set and of any preview taken from it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageSet {
    pub content_id: ContentId,
    pub directory: PathBuf,
    chapters: Vec<Chapter>,
}

impl ImageSet {
    /// Builds a set from chapters already in reading order. Chapter indexes are
    /// reassigned in that order, duplicate paths and empty chapters are dropped.
    pub fn from_chapters(
        content_id: ContentId,
        directory: PathBuf,
        chapters: Vec<(Option<String>, Vec<PathBuf>)>,
    ) -> Self {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let chapters = chapters
            .into_iter()
            .filter_map(|(name, pages)| {
                let pages: Vec<PathBuf> = pages
                    .into_iter()
                    .filter(|page| seen.insert(page.clone()))
                    .collect();
                (!pages.is_empty()).then_some((name, pages))
            })
            .enumerate()
            .map(|(index, (name, pages))| Chapter { index, name, pages })
            .collect();

        Self {
            content_id,
            directory,
            chapters,
        }
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// All pages in reading order.
    pub fn pages(&self) -> impl Iterator<Item = &PathBuf> {
        self.chapters.iter().flat_map(|c| c.pages.iter())
    }

    pub fn len(&self) -> usize {
        self.chapters.iter().map(|c| c.pages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first `count` pages, in the same order an assembled document uses.
    pub fn preview(&self, count: usize) -> Vec<PathBuf> {
        self.pages().take(count).cloned().collect()
    }
}

/// Outcome of a successful assembly.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssemblyResult {
    pub output_path: PathBuf,
    pub page_count: usize,
    pub byte_size: u64,
    /// Always `false`: oversize output fails with `Error::TooLarge` instead.
    pub truncated: bool,
}

/// Pages per chapter, as listed in a [`DiagnosticReport`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChapterBreakdown {
    pub name: String,
    pub page_count: usize,
}

/// Structured explanation of what was found for a content id.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticReport {
    pub content_id: ContentId,
    pub found: bool,
    pub candidates_examined: Vec<CandidateDirectory>,
    pub chosen: Option<CandidateDirectory>,
    pub page_count: usize,
    pub chapters: Vec<ChapterBreakdown>,
    pub estimated_size_bytes: u64, // Sum of image file sizes, not of an assembled document
    pub size_limit_bytes: u64,
    pub reason: Option<String>,
}

impl DiagnosticReport {
    pub fn size_level(&self) -> SizeLevel {
        SizeLevel::classify(self.estimated_size_bytes, self.size_limit_bytes)
    }
}

/// Output document format.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputFormat {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "PDF"))]
    Pdf,
    #[cfg_attr(feature = "serde", serde(rename = "CBZ"))]
    Cbz,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Cbz => "cbz",
        }
    }
}

/// Grade of a byte size relative to the transfer ceiling.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SizeLevel {
    Normal,
    Large,     // Above half the limit; sending may be slow
    NearLimit, // Above 90% of the limit; sending may fail
    OverLimit,
}

impl SizeLevel {
    pub fn classify(size: u64, limit: u64) -> Self {
        // Compare in u128 so `size * 10` cannot overflow for huge inputs
        let (size, limit) = (size as u128, limit as u128);
        if size > limit {
            SizeLevel::OverLimit
        } else if size * 10 > limit * 9 {
            SizeLevel::NearLimit
        } else if size * 2 > limit {
            SizeLevel::Large
        } else {
            SizeLevel::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SizeLevel::Normal => "normal",
            SizeLevel::Large => "large, sending may be slow",
            SizeLevel::NearLimit => "close to the transfer limit, sending may fail",
            SizeLevel::OverLimit => "over the transfer limit, use a page preview instead",
        }
    }
}

/// Facts about an already assembled document.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputInfo {
    pub path: PathBuf,
    pub byte_size: u64,
    pub modified: DateTime<Local>,
    pub size_level: SizeLevel,
}

/// Disk usage below a storage root.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageUsage {
    pub total_bytes: u64,
    pub file_count: usize,
    pub limit_bytes: u64,
}

impl StorageUsage {
    pub fn has_space(&self) -> bool {
        self.total_bytes < self.limit_bytes
    }

    pub fn usage_percent(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 100.0;
        }
        self.total_bytes as f64 * 100.0 / self.limit_bytes as f64
    }
}

/// Determines the canonical extension and MIME type of an image file.
///
/// # Supported formats
///
/// - JPEG/JPG: image/jpeg
/// - PNG: image/png
/// - WebP: image/webp
/// - GIF: image/gif
/// - BMP: image/bmp
pub fn get_file_info(image_path: &Path) -> Result<(&'static str, &'static str)> {
    let extension = image_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => Ok(("jpg", "image/jpeg")),
        Some("png") => Ok(("png", "image/png")),
        Some("webp") => Ok(("webp", "image/webp")),
        Some("gif") => Ok(("gif", "image/gif")),
        Some("bmp") => Ok(("bmp", "image/bmp")),
        _ => Err(Error::Unsupported(format!("Image format {:?}", extension))),
    }
}
