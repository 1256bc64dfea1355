use crate::error::{Error, Result};
use crate::generator::{Generator, count_page_bytes, ensure_complete_jpeg, probe_dimensions};
use crate::path_utils::path_to_string_lossy;
use crate::types::get_file_info;
use async_trait::async_trait;
use memmap2::MmapOptions;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tokio::fs;
use tokio::task::spawn_blocking;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A generator for creating CBZ (Comic Book ZIP) files.
///
/// Page images are stored byte-for-byte as `page_0001.<ext>`, `page_0002.<ext>`, ...
/// and a `ComicInfo.xml` carrying the title and page count is appended on save.
pub struct Cbz {
    zip: Option<ZipWriter<File>>,
    options: SimpleFileOptions,
    title: String,
    page_index: usize, // 0-based index for pages added
    size_limit: Option<u64>,
    data_bytes: u64,
}

impl Cbz {
    fn comic_info_xml(&self) -> String {
        let escape_xml = |text: &str| -> String {
            text.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
                .replace('"', "&quot;")
                .replace('\'', "&apos;")
        };

        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <ComicInfo xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
             xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\">\n  \
             <Title>{}</Title>\n  \
             <PageCount>{}</PageCount>\n\
             </ComicInfo>\n",
            escape_xml(&self.title),
            self.page_index
        )
    }
}

/// Extension a page is stored under: the canonical one for known formats
/// (`jpeg` becomes `jpg`), otherwise the file's own, lower-cased.
fn stored_extension(image_path: &Path) -> Result<String> {
    if let Ok((extension, _)) = get_file_info(image_path) {
        return Ok(extension.to_string());
    }
    image_path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| Error::Unsupported(format!("No image extension on {:?}", image_path)))
}

#[async_trait]
impl Generator for Cbz {
    fn new(output_file: &Path, title: &str) -> Result<Self> {
        // Images are already compressed; storing them keeps every page byte-exact
        let options: SimpleFileOptions = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(0o644);

        if let Some(parent) = output_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(output_file)?;

        Ok(Cbz {
            zip: Some(ZipWriter::new(file)),
            options,
            title: title.to_string(),
            page_index: 0,
            size_limit: None,
            data_bytes: 0,
        })
    }

    async fn add_page(&mut self, image_path: &Path) -> Result<&mut Self> {
        let image_extension =
            stored_extension(image_path).map_err(|e| Error::corrupt_source(image_path, e))?;

        // Reject files whose header does not decode before anything is written
        probe_dimensions(image_path)
            .await
            .map_err(|e| Error::corrupt_source(image_path, e))?;

        let file = fs::File::open(image_path).await.map_err(|e| {
            Error::corrupt_source(
                image_path,
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to open image file '{}': {}",
                        path_to_string_lossy(image_path),
                        e
                    ),
                )),
            )
        })?;

        let file_std = file.into_std().await;

        // Create the read-only memory map
        let mmap = spawn_blocking(move || unsafe { MmapOptions::new().map(&file_std) })
            .await
            .map_err(|e| Error::AsyncTaskError(e.to_string()))?
            .map_err(|e| Error::corrupt_source(image_path, e.into()))?;

        if image_extension == "jpg" {
            ensure_complete_jpeg(image_path, &mmap[..])?;
        }
        count_page_bytes(&mut self.data_bytes, mmap.len() as u64, self.size_limit)?;

        let options = self.options;
        let file_name = format!("page_{:04}.{}", self.page_index + 1, image_extension);

        let zip = match self.zip.as_mut() {
            Some(z) => z,
            None => {
                return Err(Error::Unsupported("Zip writer not available".to_string()));
            }
        };

        // Failures from here on are on the output side and propagate as-is
        zip.start_file(file_name, options)?;
        zip.write_all(&mmap[..])?;

        self.page_index += 1;

        Ok(self)
    }

    fn page_count(&self) -> usize {
        self.page_index
    }

    fn limit_size(&mut self, limit_bytes: u64) {
        self.size_limit = Some(limit_bytes);
    }

    async fn save(mut self) -> Result<()> {
        let xml_bytes = self.comic_info_xml().into_bytes();
        let options = self.options;

        let mut zip = match self.zip.take() {
            Some(z) => z,
            None => {
                return Err(Error::Unsupported("Zip writer not available".to_string()));
            }
        };

        // Finish writing the zip file in a blocking task
        spawn_blocking(move || -> Result<()> {
            zip.start_file("ComicInfo.xml", options)?;
            zip.write_all(&xml_bytes)?;
            zip.finish()?;
            Ok(())
        })
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))??;

        Ok(())
    }
}
