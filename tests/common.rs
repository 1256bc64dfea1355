//! Common test utilities and constants for the jmcosmos crate.
//!
//! Provides scratch download/output directories, real image files and helpers
//! to age directories so the locator's recency tie-break can be exercised.

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use jmcosmos::error::{Error, Result};
use rand::{Rng, distributions::Alphanumeric};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

#[allow(dead_code)]
pub const TEST_TMP_DIR: &str = "tests/tmp";
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);
#[allow(dead_code)]
pub const LONG_TEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Scratch directories of one test.
#[allow(dead_code)]
pub struct TestDirs {
    pub base_dir: PathBuf,
    pub download_root: PathBuf,
    pub output_root: PathBuf,
}

/// Creates a unique, empty test directory with `downloads` and `outputs`
/// sub-directories.
#[allow(dead_code)]
pub async fn setup_test_dirs(sub_path: &str) -> TestDirs {
    init_logger();

    let rand_string: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let unique_sub_path = format!("{}-{}", sub_path, rand_string);
    let base_dir = PathBuf::from(TEST_TMP_DIR).join(unique_sub_path);
    if base_dir.exists() {
        fs::remove_dir_all(&base_dir).await.unwrap();
    }
    let download_root = base_dir.join("downloads");
    let output_root = base_dir.join("outputs");

    fs::create_dir_all(&download_root).await.unwrap();
    fs::create_dir_all(&output_root).await.unwrap();

    TestDirs {
        base_dir,
        download_root,
        output_root,
    }
}

/// Routes `log` output through the test harness. Safe to call repeatedly.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a solid-color JPEG image at the given path.
#[allow(dead_code)]
pub async fn create_dummy_image(path: &Path, color: Rgb<u8>) -> Result<()> {
    create_sized_image(path, 100, 100, color).await
}

/// Creates a solid-color JPEG image of the given size.
#[allow(dead_code)]
pub async fn create_sized_image(
    path: &Path,
    width: u32,
    height: u32,
    color: Rgb<u8>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let img = RgbImage::from_pixel(width, height, color);
    let path_clone = path.to_path_buf();
    tokio::task::spawn_blocking(move || img.save_with_format(path_clone, image::ImageFormat::Jpeg))
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))?
        .map_err(Error::Image)?;
    Ok(())
}

/// Creates a half-transparent PNG image at the given path.
#[allow(dead_code)]
pub async fn create_transparent_png(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let img = RgbaImage::from_pixel(40, 60, Rgba([0, 128, 255, 128]));
    let path_clone = path.to_path_buf();
    tokio::task::spawn_blocking(move || img.save_with_format(path_clone, image::ImageFormat::Png))
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))?
        .map_err(Error::Image)?;
    Ok(())
}

/// Creates a red JPEG image at the given path.
#[allow(dead_code)]
pub async fn create_dummy_color_image(path: &Path) -> Result<()> {
    create_dummy_image(path, Rgb([255, 0, 0])).await
}

/// Writes bytes that carry an image extension but are not an image.
#[allow(dead_code)]
pub async fn create_corrupt_image(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, b"definitely not an image").await?;
    Ok(())
}

/// Writes a JPEG whose data stops partway through its first scan. The header
/// still decodes, only the end-of-image marker is missing.
#[allow(dead_code)]
pub async fn create_truncated_jpeg(path: &Path) -> Result<()> {
    create_sized_image(path, 64, 64, Rgb([30, 90, 150])).await?;
    let data = fs::read(path).await?;
    let scan_start = data
        .windows(2)
        .position(|w| w == [0xFF, 0xDA])
        .expect("JPEG without a scan");
    fs::write(path, &data[..scan_start + 20]).await?;
    Ok(())
}

/// Creates a small TIFF image at the given path.
#[allow(dead_code)]
pub async fn create_tiff_image(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let img = RgbImage::from_pixel(30, 40, Rgb([0, 200, 100]));
    let path_clone = path.to_path_buf();
    tokio::task::spawn_blocking(move || img.save_with_format(path_clone, image::ImageFormat::Tiff))
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))?
        .map_err(Error::Image)?;
    Ok(())
}

/// Sets the modification time of a file or directory to `age` in the past.
///
/// For a directory, call this after its contents are in place: adding entries
/// bumps its mtime again.
#[allow(dead_code)]
pub fn set_age(path: &Path, age: Duration) {
    let when = SystemTime::now() - age;
    std::fs::File::open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

/// Entry names of a CBZ archive, in archive order.
#[allow(dead_code)]
pub async fn zip_entry_names(path: &Path) -> Vec<String> {
    let file = fs::File::open(path).await.unwrap();
    let file_std = file.into_std().await;
    let mut archive = zip::ZipArchive::new(file_std).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Reads the ComicInfo.xml from a CBZ file and returns its content.
#[allow(dead_code)]
pub async fn get_comic_info_xml(cbz_path: &Path) -> String {
    let file = fs::File::open(cbz_path).await.unwrap();
    let file_std = file.into_std().await;
    let mut archive = zip::ZipArchive::new(file_std).unwrap();
    let mut file = archive.by_name("ComicInfo.xml").unwrap();
    let mut content = String::new();
    std::io::Read::read_to_string(&mut file, &mut content).unwrap();
    content
}

/// Counts page objects in a PDF written by the assembler.
#[allow(dead_code)]
pub async fn pdf_page_count(path: &Path) -> usize {
    let bytes = fs::read(path).await.unwrap();
    assert!(bytes.starts_with(b"%PDF-"), "Not a PDF: {:?}", path);
    String::from_utf8_lossy(&bytes)
        .matches("/Type /Page\n")
        .count()
}
