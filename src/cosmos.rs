use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};

use crate::aggregator::Aggregator;
use crate::assembler::Assembler;
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::locator::Locator;
use crate::path_utils::normalize_extensions;
use crate::storage;
use crate::types::{
    AssemblyResult, CandidateDirectory, ContentId, DiagnosticReport, ImageSet, OutputFormat,
    OutputInfo, StorageUsage,
};

/// The chat platform's file ceiling: 100 MiB.
pub const DEFAULT_SIZE_LIMIT_BYTES: u64 = 100 * 1024 * 1024;

/// Extensions accepted when none are configured.
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

fn default_image_extensions() -> Vec<String> {
    normalize_extensions(DEFAULT_IMAGE_EXTENSIONS)
}

/// The jmcosmos configuration, built declaratively using the builder pattern.
///
/// One value carries everything a host command needs: where the crawler puts
/// downloads, where documents go, the size ceiling and the image allow-list.
/// Every entry point takes the content id and reads the rest from here:
///
/// - [`locate`](CosmosConfig::locate): Find the directory holding a content's images
/// - [`collect`](CosmosConfig::collect): Locate and aggregate into an [`ImageSet`]
/// - [`assemble`](CosmosConfig::assemble): Collect and write one document
/// - [`preview`](CosmosConfig::preview): First pages of the set, no document
/// - [`diagnose`](CosmosConfig::diagnose): Report what was found, never fails
///
/// ## Builder Pattern
///
/// ```rust,no_run
/// # use jmcosmos::prelude::*;
/// let config = CosmosConfig::builder()
///     .download_root(PathBuf::from("./downloads"))
///     .output_root(PathBuf::from("./documents"))
///     .output_format(OutputFormat::Cbz)
///     .build()
///     .expect("Invalid configuration");
/// ```
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CosmosConfig {
    /// Directory the crawler writes one sub-directory per content into.
    #[builder(default)]
    pub download_root: PathBuf,

    /// Directory assembled documents are written to, as `<id>.<ext>`.
    #[builder(default)]
    pub output_root: PathBuf,

    /// Largest document size accepted, in bytes. Also the ceiling diagnostics
    /// grade estimates against.
    #[builder(default = "DEFAULT_SIZE_LIMIT_BYTES")]
    pub size_limit_bytes: u64,

    /// Image extension allow-list, lower-case without a leading dot.
    ///
    /// The setter normalizes its input, so `[".JPG", "png"]` is stored as
    /// `["jpg", "png"]`.
    #[builder(setter(custom), default = "default_image_extensions()")]
    pub image_extensions: Vec<String>,

    #[builder(default)]
    pub output_format: OutputFormat,

    /// Pages returned by [`preview`](CosmosConfig::preview) when no count is given.
    #[builder(default = "3")]
    pub default_preview_pages: usize,

    /// Upper bound on the pages one preview returns.
    #[builder(default = "10")]
    pub max_preview_pages: usize,

    /// Upper bound on directories read at the same time.
    #[builder(default = "64")]
    pub max_concurrent_dirs: usize,
}

impl CosmosConfig {
    /// Creates a new builder for configuring `CosmosConfig`.
    pub fn builder() -> CosmosConfigBuilder {
        CosmosConfigBuilder::default()
    }

    /// Checks the configuration against the filesystem without reading any content.
    ///
    /// # Returns
    ///
    /// * `Ok(&self)` - Both roots are set and the download root is a directory
    /// * `Err(Error)` - A root is unset, missing or not a directory
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use jmcosmos::prelude::*;
    /// # fn main() -> jmcosmos::error::Result<()> {
    /// let config = CosmosConfig::builder()
    ///     .download_root(PathBuf::from("./downloads"))
    ///     .output_root(PathBuf::from("./documents"))
    ///     .build()?;
    ///
    /// config.preflight_check()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn preflight_check(&self) -> Result<&Self> {
        if self.download_root.as_os_str().is_empty() {
            return Err(Error::Other("`download_root` must be set".to_string()));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(Error::Other("`output_root` must be set".to_string()));
        }
        if !self.download_root.exists() {
            return Err(Error::InvalidPath(
                self.download_root.clone(),
                "Download root does not exist.".to_string(),
            ));
        }
        if !self.download_root.is_dir() {
            return Err(Error::InvalidPath(
                self.download_root.clone(),
                "Download root is not a directory.".to_string(),
            ));
        }
        if self.output_root.exists() && !self.output_root.is_dir() {
            return Err(Error::InvalidPath(
                self.output_root.clone(),
                "Output root is not a directory.".to_string(),
            ));
        }
        Ok(self)
    }

    /// Where the document for `content_id` is written: `output_root/<id>.<ext>`.
    pub fn output_path(&self, content_id: ContentId) -> PathBuf {
        self.output_root
            .join(format!("{}.{}", content_id, self.output_format.extension()))
    }

    /// Finds the directory holding the images of `content_id`.
    pub async fn locate(&self, content_id: ContentId) -> Result<CandidateDirectory> {
        Locator::new(
            &self.download_root,
            &self.image_extensions,
            self.max_concurrent_dirs,
        )
        .locate(content_id)
        .await
    }

    /// Locates the content and aggregates its chapters into one ordered set.
    pub async fn collect(&self, content_id: ContentId) -> Result<ImageSet> {
        let candidate = self.locate(content_id).await?;
        Aggregator::new(&self.image_extensions, self.max_concurrent_dirs)
            .aggregate(content_id, &candidate)
            .await
    }

    /// Collects the content and writes it to [`output_path`](CosmosConfig::output_path).
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use jmcosmos::prelude::*;
    /// # #[tokio::main]
    /// # async fn main() -> jmcosmos::error::Result<()> {
    /// let config = CosmosConfig::builder()
    ///     .download_root(PathBuf::from("./downloads"))
    ///     .output_root(PathBuf::from("./documents"))
    ///     .build()?;
    ///
    /// let id: ContentId = "123456".parse()?;
    /// match config.assemble(id).await {
    ///     Ok(result) => println!("{} pages in {:?}", result.page_count, result.output_path),
    ///     Err(e) if e.is_reportable() => println!("Cannot send {}: {}", id, e),
    ///     Err(e) => return Err(e),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn assemble(&self, content_id: ContentId) -> Result<AssemblyResult> {
        if self.output_root.as_os_str().is_empty() {
            return Err(Error::Other("`output_root` must be set".to_string()));
        }
        let image_set = self.collect(content_id).await?;
        Assembler::new(self.output_format)
            .assemble(
                &image_set,
                &self.output_path(content_id),
                self.size_limit_bytes,
            )
            .await
    }

    /// The first pages of the content, in document order.
    ///
    /// `pages` defaults to `default_preview_pages` and is clamped to
    /// `1..=max_preview_pages`.
    pub async fn preview(
        &self,
        content_id: ContentId,
        pages: Option<usize>,
    ) -> Result<Vec<PathBuf>> {
        let count = self.preview_count(pages);
        let image_set = self.collect(content_id).await?;
        debug!(
            "Previewing {} of {} pages for content {}",
            count.min(image_set.len()),
            image_set.len(),
            content_id
        );
        Ok(image_set.preview(count))
    }

    fn preview_count(&self, pages: Option<usize>) -> usize {
        pages
            .unwrap_or(self.default_preview_pages)
            .clamp(1, self.max_preview_pages.max(1))
    }

    /// Reports what the locator and aggregator see for `content_id`.
    pub async fn diagnose(&self, content_id: ContentId) -> DiagnosticReport {
        diagnostics::diagnose(
            content_id,
            &self.download_root,
            &self.image_extensions,
            self.size_limit_bytes,
            self.max_concurrent_dirs,
        )
        .await
    }

    /// Facts about the already assembled document of `content_id`, if any.
    pub async fn output_info(&self, content_id: ContentId) -> Result<Option<OutputInfo>> {
        storage::output_info(&self.output_path(content_id), self.size_limit_bytes).await
    }

    /// Space used below the output root, measured against `budget_bytes`.
    pub async fn storage_usage(&self, budget_bytes: u64) -> Result<StorageUsage> {
        storage::storage_usage(&self.output_root, budget_bytes).await
    }

    /// Deletes documents below the output root older than `max_age`.
    pub async fn purge_outputs(&self, max_age: Duration) -> Result<usize> {
        let removed = storage::purge_expired(&self.output_root, max_age).await?;
        info!(
            "Purged {} documents older than {:?} from {:?}",
            removed, max_age, self.output_root
        );
        Ok(removed)
    }
}

impl CosmosConfigBuilder {
    /// Sets the image extension allow-list, normalizing each entry.
    pub fn image_extensions<I, S>(&mut self, extensions: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.image_extensions = Some(normalize_extensions(extensions));
        self
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.size_limit_bytes == Some(0) {
            return Err("Size limit must be greater than zero.".to_string());
        }
        if let Some(extensions) = &self.image_extensions {
            if extensions.is_empty() {
                return Err("At least one image extension is required.".to_string());
            }
            // Each extension must name a format the image decoder can read
            if let Some(unreadable) = extensions.iter().find(|ext| {
                !image::ImageFormat::from_extension(ext.as_str())
                    .is_some_and(|format| format.reading_enabled())
            }) {
                return Err(format!(
                    "Image extension '{}' is not a decodable image format.",
                    unreadable
                ));
            }
        }
        if self.max_concurrent_dirs == Some(0) {
            return Err("Concurrent directory limit must be greater than zero.".to_string());
        }

        let max_preview = self.max_preview_pages.unwrap_or(10);
        if max_preview == 0 {
            return Err("Preview limit must be greater than zero.".to_string());
        }
        let default_preview = self.default_preview_pages.unwrap_or(3);
        if default_preview > max_preview {
            return Err(format!(
                "Default preview of {} pages exceeds the limit of {}.",
                default_preview, max_preview
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CosmosConfig {
        CosmosConfig::builder()
            .download_root(PathBuf::from("downloads"))
            .output_root(PathBuf::from("out"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.size_limit_bytes, 100 * 1024 * 1024);
        assert_eq!(config.image_extensions, vec!["jpg", "jpeg", "png", "webp"]);
        assert_eq!(config.output_format, OutputFormat::Pdf);
        assert_eq!(config.default_preview_pages, 3);
        assert_eq!(config.max_preview_pages, 10);
    }

    #[test]
    fn test_output_path_uses_id_and_format() {
        let id = ContentId::new(123456).unwrap();
        assert_eq!(config().output_path(id), PathBuf::from("out/123456.pdf"));

        let cbz = CosmosConfig::builder()
            .output_root(PathBuf::from("out"))
            .output_format(OutputFormat::Cbz)
            .build()
            .unwrap();
        assert_eq!(cbz.output_path(id), PathBuf::from("out/123456.cbz"));
    }

    #[test]
    fn test_preview_count_is_clamped() {
        let config = config();
        assert_eq!(config.preview_count(None), 3);
        assert_eq!(config.preview_count(Some(0)), 1);
        assert_eq!(config.preview_count(Some(7)), 7);
        assert_eq!(config.preview_count(Some(50)), 10);
    }
}
