use crate::error::{Error, Result};
use crate::generator::{Generator, count_page_bytes, ensure_complete_jpeg};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use pdf_writer::{Content, Filter, Finish, Name, Pdf as PdfWriter, Rect, Ref, TextStr};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::task::spawn_blocking;

/// Largest page side a PDF viewer is required to accept, in default user units.
const MAX_PAGE_EXTENT: f32 = 14_400.0;
/// Resource name of the single image drawn on each page.
const IMAGE_NAME: Name<'static> = Name(b"Im0");

/// A page image ready to be written into the document.
enum PageImage {
    /// JPEG data embedded as-is.
    Jpeg {
        data: Vec<u8>,
        width: u32,
        height: u32,
        components: u8,
    },
    /// Decoded 8-bit samples, zlib-compressed.
    Raw {
        samples: Vec<u8>,
        alpha: Option<Vec<u8>>,
        width: u32,
        height: u32,
        grayscale: bool,
    },
}

impl PageImage {
    fn dimensions(&self) -> (u32, u32) {
        match self {
            PageImage::Jpeg { width, height, .. } | PageImage::Raw { width, height, .. } => {
                (*width, *height)
            }
        }
    }

    /// Bytes this page adds to the document's image streams.
    fn data_len(&self) -> u64 {
        match self {
            PageImage::Jpeg { data, .. } => data.len() as u64,
            PageImage::Raw { samples, alpha, .. } => {
                (samples.len() + alpha.as_ref().map_or(0, |a| a.len())) as u64
            }
        }
    }
}

/// Frame header fields of a baseline or progressive JPEG.
#[derive(Debug, PartialEq)]
struct JpegHeader {
    width: u32,
    height: u32,
    components: u8,
}

/// A generator for creating PDF documents with one image per page.
///
/// JPEG pages are passed through untouched (`DCTDecode`). Other formats are
/// decoded and stored as Flate-compressed samples, with a soft mask for alpha.
/// Each page measures one point per pixel.
pub struct Pdf {
    writer: PdfWriter,
    output_file: PathBuf,
    title: String,
    catalog_id: Ref,
    page_tree_id: Ref,
    page_ids: Vec<Ref>,
    next_id: i32,
    size_limit: Option<u64>,
    data_bytes: u64,
}

impl Pdf {
    fn alloc(&mut self) -> Ref {
        let id = Ref::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn embed(&mut self, image: PageImage) {
        let (width, height) = image.dimensions();
        let image_id = self.alloc();
        let page_id = self.alloc();
        let content_id = self.alloc();

        match image {
            PageImage::Jpeg {
                data, components, ..
            } => {
                let mut xobject = self.writer.image_xobject(image_id, &data);
                xobject.filter(Filter::DctDecode);
                xobject.width(width as i32);
                xobject.height(height as i32);
                match components {
                    1 => xobject.color_space().device_gray(),
                    4 => {
                        xobject.color_space().device_cmyk();
                        // Adobe CMYK JPEGs store inverted samples
                        xobject.decode([1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
                    }
                    _ => xobject.color_space().device_rgb(),
                }
                xobject.bits_per_component(8);
                xobject.finish();
            }
            PageImage::Raw {
                samples,
                alpha,
                grayscale,
                ..
            } => {
                let mask_id = alpha.as_ref().map(|_| self.alloc());

                let mut xobject = self.writer.image_xobject(image_id, &samples);
                xobject.filter(Filter::FlateDecode);
                xobject.width(width as i32);
                xobject.height(height as i32);
                if grayscale {
                    xobject.color_space().device_gray();
                } else {
                    xobject.color_space().device_rgb();
                }
                xobject.bits_per_component(8);
                if let Some(mask_id) = mask_id {
                    xobject.s_mask(mask_id);
                }
                xobject.finish();

                if let (Some(mask_id), Some(alpha)) = (mask_id, alpha) {
                    let mut mask = self.writer.image_xobject(mask_id, &alpha);
                    mask.filter(Filter::FlateDecode);
                    mask.width(width as i32);
                    mask.height(height as i32);
                    mask.color_space().device_gray();
                    mask.bits_per_component(8);
                    mask.finish();
                }
            }
        }

        let (page_width, page_height) = page_size(width, height);

        let mut page = self.writer.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, page_width, page_height));
        page.parent(self.page_tree_id);
        page.contents(content_id);
        page.resources().x_objects().pair(IMAGE_NAME, image_id);
        page.finish();

        let mut content = Content::new();
        content.save_state();
        content.transform([page_width, 0.0, 0.0, page_height, 0.0, 0.0]);
        content.x_object(IMAGE_NAME);
        content.restore_state();
        self.writer.stream(content_id, &content.finish());

        self.page_ids.push(page_id);
    }
}

#[async_trait]
impl Generator for Pdf {
    fn new(output_file: &Path, title: &str) -> Result<Self> {
        if let Some(parent) = output_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Pdf {
            writer: PdfWriter::new(),
            output_file: output_file.to_path_buf(),
            title: title.to_string(),
            catalog_id: Ref::new(1),
            page_tree_id: Ref::new(2),
            page_ids: Vec::new(),
            next_id: 3,
            size_limit: None,
            data_bytes: 0,
        })
    }

    async fn add_page(&mut self, image_path: &Path) -> Result<&mut Self> {
        let data = fs::read(image_path)
            .await
            .map_err(|e| Error::corrupt_source(image_path, e.into()))?;
        let path = image_path.to_path_buf();

        let image = spawn_blocking(move || prepare_page(&path, data))
            .await
            .map_err(|e| Error::AsyncTaskError(e.to_string()))?
            .map_err(|e| Error::corrupt_source(image_path, e))?;

        count_page_bytes(&mut self.data_bytes, image.data_len(), self.size_limit)?;
        self.embed(image);
        Ok(self)
    }

    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn limit_size(&mut self, limit_bytes: u64) {
        self.size_limit = Some(limit_bytes);
    }

    async fn save(mut self) -> Result<()> {
        if self.page_ids.is_empty() {
            return Err(Error::Unsupported(
                "Cannot write a PDF without pages".to_string(),
            ));
        }

        let info_id = self.alloc();
        self.writer
            .catalog(self.catalog_id)
            .pages(self.page_tree_id);
        self.writer
            .pages(self.page_tree_id)
            .kids(self.page_ids.iter().copied())
            .count(self.page_ids.len() as i32);
        self.writer
            .document_info(info_id)
            .title(TextStr(&self.title))
            .producer(TextStr("jmcosmos"));

        let output_file = self.output_file.clone();
        let bytes = spawn_blocking(move || self.writer.finish())
            .await
            .map_err(|e| Error::AsyncTaskError(e.to_string()))?;

        fs::write(&output_file, bytes).await?;
        Ok(())
    }
}

/// Turns raw file bytes into an embeddable page.
fn prepare_page(path: &Path, data: Vec<u8>) -> Result<PageImage> {
    let format = image::guess_format(&data)?;

    if format == ImageFormat::Jpeg {
        let header = jpeg_header(&data).ok_or_else(|| Error::CorruptSource {
            path: path.to_path_buf(),
            reason: "JPEG frame header is missing or truncated".to_string(),
        })?;
        ensure_complete_jpeg(path, &data)?;
        return Ok(PageImage::Jpeg {
            data,
            width: header.width,
            height: header.height,
            components: header.components,
        });
    }

    let decoded: DynamicImage = image::load_from_memory_with_format(&data, format)?;
    let (width, height) = decoded.dimensions();
    let color = decoded.color();
    let grayscale = !color.has_color();

    let samples = if grayscale {
        decoded.to_luma8().into_raw()
    } else {
        decoded.to_rgb8().into_raw()
    };
    let alpha = if color.has_alpha() {
        let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p.0[3]).collect();
        Some(deflate(&alpha)?)
    } else {
        None
    };

    Ok(PageImage::Raw {
        samples: deflate(&samples)?,
        alpha,
        width,
        height,
        grayscale,
    })
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Page size in points for an image of the given pixel size. Oversized pages
/// are scaled down uniformly; the embedded image keeps its pixels.
fn page_size(width: u32, height: u32) -> (f32, f32) {
    let (w, h) = (width as f32, height as f32);
    let longest = w.max(h);
    if longest > MAX_PAGE_EXTENT {
        let scale = MAX_PAGE_EXTENT / longest;
        (w * scale, h * scale)
    } else {
        (w, h)
    }
}

/// Reads width, height and component count from the first SOF segment.
fn jpeg_header(data: &[u8]) -> Option<JpegHeader> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];

        // Fill bytes and standalone markers carry no length
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        // Start of scan before any frame header
        if marker == 0xDA {
            return None;
        }

        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if length < 2 {
            return None;
        }

        let is_frame = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let segment = data.get(pos + 4..pos + 2 + length)?;
            if segment.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
            let width = u16::from_be_bytes([segment[3], segment[4]]) as u32;
            let components = segment[5];
            if width == 0 || height == 0 || !matches!(components, 1 | 3 | 4) {
                return None;
            }
            return Some(JpegHeader {
                width,
                height,
                components,
            });
        }

        pos += 2 + length;
    }

    None
}
