//! Integration tests for the jmcosmos crate.
//!
//! These tests run whole host commands from a populated download root to a
//! validated document on disk.

use image::Rgb;
use jmcosmos::error::{Error, Result};
use jmcosmos::prelude::*;
use std::time::Duration;
use tokio::time::timeout;

mod common;
use common::{
    LONG_TEST_TIMEOUT, TEST_TIMEOUT, TestDirs, create_corrupt_image, create_dummy_color_image,
    create_sized_image, create_tiff_image, create_transparent_png, create_truncated_jpeg,
    get_comic_info_xml, pdf_page_count, set_age, setup_test_dirs, zip_entry_names,
};

const CONTENT_DIR: &str = "123456 漫画标题";

/// `123456 漫画标题/page1..page9.jpg` plus `第二章/p1.jpg, p2.jpg`.
async fn populate_e2e_content(test_dirs: &TestDirs) -> Result<PathBuf> {
    let content_dir = test_dirs.download_root.join(CONTENT_DIR);
    for n in 1..=9 {
        create_dummy_color_image(&content_dir.join(format!("page{}.jpg", n))).await?;
    }
    create_dummy_color_image(&content_dir.join("第二章").join("p1.jpg")).await?;
    create_dummy_color_image(&content_dir.join("第二章").join("p2.jpg")).await?;
    Ok(content_dir)
}

fn config_for(test_dirs: &TestDirs, format: OutputFormat, limit: u64) -> Result<CosmosConfig> {
    Ok(CosmosConfig::builder()
        .download_root(test_dirs.download_root.clone())
        .output_root(test_dirs.output_root.clone())
        .output_format(format)
        .size_limit_bytes(limit)
        .build()?)
}

fn expected_e2e_pages(content_dir: &Path) -> Vec<PathBuf> {
    let mut pages: Vec<PathBuf> = (1..=9)
        .map(|n| content_dir.join(format!("page{}.jpg", n)))
        .collect();
    pages.push(content_dir.join("第二章").join("p1.jpg"));
    pages.push(content_dir.join("第二章").join("p2.jpg"));
    pages
}

fn partial_of(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

#[tokio::test]
async fn test_e2e_collect_and_assemble_pdf() -> Result<()> {
    let test_dirs = setup_test_dirs("e2e_pdf").await;
    let content_dir = populate_e2e_content(&test_dirs).await?;
    let config = config_for(&test_dirs, OutputFormat::Pdf, 50 * 1024 * 1024)?;
    config.preflight_check()?;
    let id: ContentId = "123456".parse()?;

    let image_set = config.collect(id).await?;
    let pages: Vec<PathBuf> = image_set.pages().cloned().collect();
    assert_eq!(pages, expected_e2e_pages(&content_dir));

    let result = timeout(LONG_TEST_TIMEOUT, config.assemble(id))
        .await
        .expect("Test timed out")?;

    assert_eq!(result.output_path, test_dirs.output_root.join("123456.pdf"));
    assert_eq!(result.page_count, 11);
    assert_eq!(result.page_count, image_set.len());
    assert!(!result.truncated);
    assert!(result.byte_size > 0 && result.byte_size <= 50 * 1024 * 1024);
    assert_eq!(
        std::fs::metadata(&result.output_path)?.len(),
        result.byte_size
    );
    assert_eq!(pdf_page_count(&result.output_path).await, 11);
    assert!(!partial_of(&result.output_path).exists());
    Ok(())
}

#[tokio::test]
async fn test_e2e_assemble_cbz_keeps_page_order_and_bytes() -> Result<()> {
    let test_dirs = setup_test_dirs("e2e_cbz").await;
    let content_dir = populate_e2e_content(&test_dirs).await?;
    let config = config_for(&test_dirs, OutputFormat::Cbz, 50 * 1024 * 1024)?;
    let id = ContentId::new(123456)?;

    let result = timeout(LONG_TEST_TIMEOUT, config.assemble(id))
        .await
        .expect("Test timed out")?;
    assert_eq!(result.output_path, test_dirs.output_root.join("123456.cbz"));
    assert_eq!(result.page_count, 11);

    let names = zip_entry_names(&result.output_path).await;
    let mut expected: Vec<String> = (1..=11).map(|n| format!("page_{:04}.jpg", n)).collect();
    expected.push("ComicInfo.xml".to_string());
    assert_eq!(names, expected);

    let comic_info = get_comic_info_xml(&result.output_path).await;
    assert!(comic_info.contains("<Title>123456</Title>"));
    assert!(comic_info.contains("<PageCount>11</PageCount>"));

    // Pages are stored byte-for-byte in reading order
    let file = std::fs::File::open(&result.output_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    for (index, source) in expected_e2e_pages(&content_dir).iter().enumerate() {
        let mut entry = archive.by_index(index)?;
        assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
        let mut stored = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut stored)?;
        assert_eq!(stored, std::fs::read(source)?);
    }
    Ok(())
}

#[tokio::test]
async fn test_assemble_pdf_with_mixed_formats_and_sizes() -> Result<()> {
    let test_dirs = setup_test_dirs("mixed_formats").await;
    let content_dir = test_dirs.download_root.join("123456");
    create_sized_image(&content_dir.join("001.jpg"), 120, 200, Rgb([10, 20, 30])).await?;
    create_transparent_png(&content_dir.join("002.png")).await?;
    create_sized_image(&content_dir.join("003.jpg"), 300, 90, Rgb([200, 200, 200])).await?;

    let config = config_for(&test_dirs, OutputFormat::Pdf, 10 * 1024 * 1024)?;
    let result = config.assemble(ContentId::new(123456)?).await?;
    assert_eq!(result.page_count, 3);

    let bytes = tokio::fs::read(&result.output_path).await?;
    let text = String::from_utf8_lossy(&bytes);
    assert_eq!(text.matches("/Type /Page\n").count(), 3);
    assert!(text.contains("/DCTDecode"));
    assert!(text.contains("/FlateDecode"));
    assert!(text.contains("/SMask"));
    assert!(text.contains("/MediaBox [0 0 120 200]"));
    assert!(text.contains("/MediaBox [0 0 300 90]"));
    Ok(())
}

#[tokio::test]
async fn test_assemble_too_large_leaves_no_output() -> Result<()> {
    let test_dirs = setup_test_dirs("too_large").await;
    populate_e2e_content(&test_dirs).await?;
    let id = ContentId::new(123456)?;

    for format in [OutputFormat::Pdf, OutputFormat::Cbz] {
        let config = config_for(&test_dirs, format, 100)?;
        let output_path = config.output_path(id);

        let result = timeout(TEST_TIMEOUT, config.assemble(id))
            .await
            .expect("Test timed out");
        match result {
            Err(Error::TooLarge { size, limit }) => {
                assert_eq!(limit, 100);
                assert!(size > limit);
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }
        assert!(!output_path.exists());
        assert!(!partial_of(&output_path).exists());
    }
    Ok(())
}

#[tokio::test]
async fn test_assemble_corrupt_source_identifies_file() -> Result<()> {
    let test_dirs = setup_test_dirs("corrupt_source").await;
    let content_dir = test_dirs.download_root.join("123456");
    create_dummy_color_image(&content_dir.join("001.jpg")).await?;
    create_corrupt_image(&content_dir.join("002.jpg")).await?;
    create_dummy_color_image(&content_dir.join("003.jpg")).await?;
    let id = ContentId::new(123456)?;

    for format in [OutputFormat::Pdf, OutputFormat::Cbz] {
        let config = config_for(&test_dirs, format, 50 * 1024 * 1024)?;
        let output_path = config.output_path(id);

        match config.assemble(id).await {
            Err(e @ Error::CorruptSource { .. }) => {
                assert!(e.is_reportable());
                if let Error::CorruptSource { path, .. } = e {
                    assert_eq!(path, content_dir.join("002.jpg"));
                }
            }
            other => panic!("expected CorruptSource, got {:?}", other),
        }
        assert!(!output_path.exists());
        assert!(!partial_of(&output_path).exists());
    }
    Ok(())
}

#[tokio::test]
async fn test_assemble_rejects_truncated_jpeg() -> Result<()> {
    let test_dirs = setup_test_dirs("truncated_jpeg").await;
    let content_dir = test_dirs.download_root.join("123456");
    create_dummy_color_image(&content_dir.join("001.jpg")).await?;
    create_truncated_jpeg(&content_dir.join("002.jpg")).await?;
    let id = ContentId::new(123456)?;

    for format in [OutputFormat::Pdf, OutputFormat::Cbz] {
        let config = config_for(&test_dirs, format, 50 * 1024 * 1024)?;
        let output_path = config.output_path(id);

        match config.assemble(id).await {
            Err(Error::CorruptSource { path, .. }) => {
                assert_eq!(path, content_dir.join("002.jpg"));
            }
            other => panic!("expected CorruptSource for {:?}, got {:?}", format, other),
        }
        assert!(!output_path.exists());
        assert!(!partial_of(&output_path).exists());
    }
    Ok(())
}

#[tokio::test]
async fn test_assemble_cbz_stores_configured_tiff_pages() -> Result<()> {
    let test_dirs = setup_test_dirs("cbz_tiff").await;
    let content_dir = test_dirs.download_root.join("123456");
    create_dummy_color_image(&content_dir.join("001.jpg")).await?;
    create_tiff_image(&content_dir.join("002.tif")).await?;

    let config = CosmosConfig::builder()
        .download_root(test_dirs.download_root.clone())
        .output_root(test_dirs.output_root.clone())
        .output_format(OutputFormat::Cbz)
        .image_extensions(["jpg", "tif"])
        .build()?;
    let result = config.assemble(ContentId::new(123456)?).await?;
    assert_eq!(result.page_count, 2);

    let names = zip_entry_names(&result.output_path).await;
    assert_eq!(
        names,
        vec!["page_0001.jpg", "page_0002.tif", "ComicInfo.xml"]
    );
    Ok(())
}

#[tokio::test]
async fn test_assemble_reports_not_found() -> Result<()> {
    let test_dirs = setup_test_dirs("assemble_not_found").await;
    create_dummy_color_image(&test_dirs.download_root.join("654321").join("001.jpg")).await?;
    let config = config_for(&test_dirs, OutputFormat::Pdf, 1024 * 1024)?;

    let result = config.assemble(ContentId::new(123456)?).await;
    assert!(matches!(result, Err(Error::NotFound { .. })));

    let report = config.diagnose(ContentId::new(123456)?).await;
    assert!(!report.found);
    Ok(())
}

#[tokio::test]
async fn test_preview_matches_document_order() -> Result<()> {
    let test_dirs = setup_test_dirs("preview").await;
    let content_dir = populate_e2e_content(&test_dirs).await?;
    let config = config_for(&test_dirs, OutputFormat::Pdf, 50 * 1024 * 1024)?;
    let id = ContentId::new(123456)?;
    let expected = expected_e2e_pages(&content_dir);

    assert_eq!(config.preview(id, None).await?, expected[..3].to_vec());
    assert_eq!(config.preview(id, Some(0)).await?, expected[..1].to_vec());
    assert_eq!(config.preview(id, Some(5)).await?, expected[..5].to_vec());
    // Clamped to the configured maximum
    assert_eq!(config.preview(id, Some(500)).await?, expected[..10].to_vec());

    // Preview never writes a document
    assert!(!config.output_path(id).exists());
    Ok(())
}

#[tokio::test]
async fn test_newest_title_directory_is_assembled() -> Result<()> {
    let test_dirs = setup_test_dirs("newest_title").await;
    let stale = test_dirs.download_root.join("某个标题");
    let fresh = test_dirs.download_root.join("某个标题 (1)");
    for n in 1..=4 {
        create_dummy_color_image(&stale.join(format!("{:03}.jpg", n))).await?;
    }
    create_dummy_color_image(&fresh.join("001.jpg")).await?;
    create_dummy_color_image(&fresh.join("002.jpg")).await?;
    set_age(&stale, Duration::from_secs(3 * 24 * 3600));

    let config = config_for(&test_dirs, OutputFormat::Cbz, 50 * 1024 * 1024)?;
    let result = config.assemble(ContentId::new(777777)?).await?;
    assert_eq!(result.page_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_output_info_and_storage_housekeeping() -> Result<()> {
    let test_dirs = setup_test_dirs("storage").await;
    populate_e2e_content(&test_dirs).await?;
    let config = config_for(&test_dirs, OutputFormat::Pdf, 50 * 1024 * 1024)?;
    let id = ContentId::new(123456)?;

    assert!(config.output_info(id).await?.is_none());
    let usage = config.storage_usage(1024 * 1024 * 1024).await?;
    assert_eq!(usage.file_count, 0);
    assert_eq!(usage.total_bytes, 0);

    let result = config.assemble(id).await?;

    let info = config
        .output_info(id)
        .await?
        .expect("document should exist after assembly");
    assert_eq!(info.path, result.output_path);
    assert_eq!(info.byte_size, result.byte_size);
    assert_eq!(info.size_level, SizeLevel::Normal);

    let usage = config.storage_usage(1024 * 1024 * 1024).await?;
    assert_eq!(usage.file_count, 1);
    assert_eq!(usage.total_bytes, result.byte_size);
    assert!(usage.has_space());

    // Fresh documents survive a purge
    let max_age = Duration::from_secs(30 * 24 * 3600);
    assert_eq!(config.purge_outputs(max_age).await?, 0);
    assert!(result.output_path.exists());

    set_age(&result.output_path, Duration::from_secs(31 * 24 * 3600));
    assert_eq!(config.purge_outputs(max_age).await?, 1);
    assert!(!result.output_path.exists());
    assert!(config.output_info(id).await?.is_none());
    Ok(())
}
