mod helpers;

use cleanroom_core::{ObjectDescriptor, ProcessingStatus};
use cleanroom_processing::sanitize::pdf::count_keywords;
use cleanroom_processing::PipelineState;
use helpers::fixtures;
use helpers::{
    setup_test_pipeline, FakeStatusStore, TestStorage, SOURCE_BUCKET, TARGET_BUCKET,
};

fn descriptor(name: &str, size: usize, content_type: &str) -> ObjectDescriptor {
    ObjectDescriptor::new(name, SOURCE_BUCKET, size as u64, content_type)
}

#[tokio::test]
async fn test_clean_pdf_copied_byte_identical() {
    let app = setup_test_pipeline(
        &[],
        TestStorage::new(),
        FakeStatusStore::with_records(&["a.pdf"]),
    );
    let data = fixtures::clean_pdf(1_000_000);
    assert_eq!(data.len(), 1_000_000);
    app.storage
        .put(SOURCE_BUCKET, "a.pdf", "application/pdf", data.clone())
        .await;

    let report = app
        .pipeline
        .process(&descriptor("a.pdf", data.len(), "application/pdf"))
        .await;

    assert_eq!(report.state, PipelineState::Completed);
    assert!(!report.rewritten);
    assert_eq!(report.bytes_written, 1_000_000);
    assert_eq!(report.status_record_found, Some(true));

    let copied = app.storage.raw(TARGET_BUCKET).get_bytes("a.pdf").await.unwrap();
    assert_eq!(copied.as_ref(), data.as_slice());
    assert_eq!(
        app.storage
            .raw(TARGET_BUCKET)
            .content_type("a.pdf")
            .await
            .unwrap()
            .as_deref(),
        Some("application/pdf")
    );

    assert_eq!(app.status.status_of("a.pdf"), Some(ProcessingStatus::Processed));
    assert_eq!(
        app.status.url_of("a.pdf").as_deref(),
        Some("https://storage.googleapis.com/sanitized/a.pdf")
    );

    // Copy is the default: the source stays.
    assert!(app.storage.raw(SOURCE_BUCKET).exists("a.pdf").await.unwrap());
}

#[tokio::test]
async fn test_malicious_pdf_rebuilt() {
    let app = setup_test_pipeline(&[], TestStorage::new(), FakeStatusStore::default());
    let data = fixtures::malicious_pdf();
    app.storage
        .put(SOURCE_BUCKET, "invoice.pdf", "application/pdf", data.clone())
        .await;

    let report = app
        .pipeline
        .process(&descriptor("invoice.pdf", data.len(), "application/pdf"))
        .await;

    assert_eq!(report.state, PipelineState::Completed);
    assert!(report.rewritten);
    assert_eq!(report.status_record_found, Some(false));

    let clean = app
        .storage
        .raw(TARGET_BUCKET)
        .get_bytes("invoice.pdf")
        .await
        .unwrap();
    let doc = lopdf::Document::load_mem(&clean).unwrap();
    assert_eq!(count_keywords(&doc), 0);

    let pages = doc.get_pages();
    assert_eq!(pages.len(), 1);
    let page_id = pages[&1];
    let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
    assert!(page.get(b"Annots").unwrap().as_array().unwrap().is_empty());
    assert!(page.has(b"MediaBox"));
    assert_eq!(doc.get_page_content(page_id).unwrap(), fixtures::PAGE_TEXT);
}

#[tokio::test]
async fn test_png_text_chunk_removed() {
    let app = setup_test_pipeline(
        &[],
        TestStorage::new(),
        FakeStatusStore::with_records(&["b.png"]),
    );
    let data = fixtures::png_with_text();
    assert!(fixtures::png_chunk_types(&data).contains(b"tEXt"));
    app.storage
        .put(SOURCE_BUCKET, "b.png", "image/png", data.clone())
        .await;

    let report = app
        .pipeline
        .process(&descriptor("b.png", data.len(), "image/png"))
        .await;

    assert_eq!(report.state, PipelineState::Completed);
    assert!(report.rewritten);

    let clean = app.storage.raw(TARGET_BUCKET).get_bytes("b.png").await.unwrap();
    let types = fixtures::png_chunk_types(&clean);
    assert!(!types.contains(b"tEXt"));
    assert!(!types.contains(b"zTXt"));
    assert!(!types.contains(b"iTXt"));
    assert_eq!(fixtures::png_pixels(&clean), fixtures::png_samples());
    assert_eq!(
        app.storage
            .raw(TARGET_BUCKET)
            .content_type("b.png")
            .await
            .unwrap()
            .as_deref(),
        Some("image/png")
    );

    assert_eq!(app.status.status_of("b.png"), Some(ProcessingStatus::Processed));
}

#[tokio::test]
async fn test_unsupported_type_rejected_without_io() {
    let app = setup_test_pipeline(
        &[],
        TestStorage::new(),
        FakeStatusStore::with_records(&["c.exe"]),
    );
    let mut data = b"MZ\x90\0".to_vec();
    data.resize(500, 0);
    app.storage
        .put(SOURCE_BUCKET, "c.exe", "application/octet-stream", data)
        .await;

    let report = app
        .pipeline
        .process(&descriptor("c.exe", 500, "application/octet-stream"))
        .await;

    assert_eq!(report.state, PipelineState::Rejected);
    assert_eq!(report.error_code, Some("UNSUPPORTED_CONTENT_TYPE"));
    assert_eq!(report.bytes_written, 0);
    assert_eq!(app.storage.lookups(), 0);
    assert!(!app.storage.raw(TARGET_BUCKET).exists("c.exe").await.unwrap());

    assert_eq!(app.status.status_of("c.exe"), Some(ProcessingStatus::Failed));
}

#[tokio::test]
async fn test_rejection_leaves_status_untouched_when_not_reported() {
    let app = setup_test_pipeline(
        &[("REPORT_REJECTIONS", "false")],
        TestStorage::new(),
        FakeStatusStore::with_records(&["c.exe"]),
    );

    let report = app
        .pipeline
        .process(&descriptor("c.exe", 500, "application/octet-stream"))
        .await;

    assert_eq!(report.state, PipelineState::Rejected);
    assert_eq!(report.status_record_found, None);
    assert_eq!(app.status.write_count(), 0);
    assert_eq!(app.status.status_of("c.exe"), None);
}

#[tokio::test]
async fn test_oversized_object_rejected_without_download() {
    let app = setup_test_pipeline(
        &[("MAX_FILE_SIZE", "1000")],
        TestStorage::new(),
        FakeStatusStore::with_records(&["big.pdf"]),
    );

    let report = app
        .pipeline
        .process(&descriptor("big.pdf", 1001, "application/pdf"))
        .await;

    assert_eq!(report.state, PipelineState::Rejected);
    assert_eq!(report.error_code, Some("FILE_TOO_LARGE"));
    assert_eq!(app.storage.lookups(), 0);
    assert_eq!(app.status.status_of("big.pdf"), Some(ProcessingStatus::Failed));
}

#[tokio::test]
async fn test_upload_failure_leaves_no_destination_object() {
    let app = setup_test_pipeline(
        &[],
        TestStorage::failing_uploads(TARGET_BUCKET, 1),
        FakeStatusStore::with_records(&["large.pdf"]),
    );
    // Two 5 MiB chunks; the second one fails.
    let data = fixtures::clean_pdf(6 * 1024 * 1024);
    app.storage
        .put(SOURCE_BUCKET, "large.pdf", "application/pdf", data.clone())
        .await;

    let report = app
        .pipeline
        .process(&descriptor("large.pdf", data.len(), "application/pdf"))
        .await;

    assert_eq!(report.state, PipelineState::Failed);
    assert_eq!(report.error_code, Some("TRANSFER_FAILED"));
    assert!(!app.storage.raw(TARGET_BUCKET).exists("large.pdf").await.unwrap());
    assert!(app.storage.raw(SOURCE_BUCKET).exists("large.pdf").await.unwrap());
    assert_eq!(app.status.status_of("large.pdf"), Some(ProcessingStatus::Failed));
}

#[tokio::test]
async fn test_delete_source_moves_object() {
    let app = setup_test_pipeline(
        &[("DELETE_SOURCE_AFTER_SANITIZE", "true")],
        TestStorage::new(),
        FakeStatusStore::with_records(&["photo.jpg"]),
    );
    let data = fixtures::jpeg_with_exif();
    assert!(fixtures::jpeg_markers(&data).contains(&0xE1));
    app.storage
        .put(SOURCE_BUCKET, "photo.jpg", "image/jpeg", data.clone())
        .await;

    let report = app
        .pipeline
        .process(&descriptor("photo.jpg", data.len(), "image/jpeg"))
        .await;

    assert_eq!(report.state, PipelineState::Completed);
    assert!(report.source_deleted);
    assert!(!app.storage.raw(SOURCE_BUCKET).exists("photo.jpg").await.unwrap());

    let clean = app
        .storage
        .raw(TARGET_BUCKET)
        .get_bytes("photo.jpg")
        .await
        .unwrap();
    let markers = fixtures::jpeg_markers(&clean);
    assert!(!markers.contains(&0xE1));
    assert!(!markers.contains(&0xFE));
    assert_eq!(fixtures::jpeg_pixels(&clean), fixtures::jpeg_pixels(&data));
}

#[tokio::test]
async fn test_corrupt_image_fails() {
    let app = setup_test_pipeline(
        &[],
        TestStorage::new(),
        FakeStatusStore::with_records(&["broken.png"]),
    );
    let data = b"\x89PNG\r\n\x1a\ntruncated".to_vec();
    app.storage
        .put(SOURCE_BUCKET, "broken.png", "image/png", data.clone())
        .await;

    let report = app
        .pipeline
        .process(&descriptor("broken.png", data.len(), "image/png"))
        .await;

    assert_eq!(report.state, PipelineState::Failed);
    assert_eq!(report.error_code, Some("IMAGE_UNREADABLE"));
    assert!(!app.storage.raw(TARGET_BUCKET).exists("broken.png").await.unwrap());
    assert_eq!(app.status.status_of("broken.png"), Some(ProcessingStatus::Failed));
}

#[tokio::test]
async fn test_objects_processed_concurrently() {
    let app = setup_test_pipeline(&[], TestStorage::new(), FakeStatusStore::default());
    let pdf = fixtures::clean_pdf(4096);
    let png = fixtures::png_with_text();
    app.storage
        .put(SOURCE_BUCKET, "one.pdf", "application/pdf", pdf.clone())
        .await;
    app.storage
        .put(SOURCE_BUCKET, "two.png", "image/png", png.clone())
        .await;

    let one = descriptor("one.pdf", pdf.len(), "application/pdf");
    let two = descriptor("two.png", png.len(), "image/png");
    let three = descriptor("three.exe", 10, "application/x-msdownload");

    let (one, two, three) = tokio::join!(
        app.pipeline.process(&one),
        app.pipeline.process(&two),
        app.pipeline.process(&three),
    );

    assert_eq!(one.state, PipelineState::Completed);
    assert_eq!(two.state, PipelineState::Completed);
    assert_eq!(three.state, PipelineState::Rejected);

    let target = app.storage.raw(TARGET_BUCKET);
    assert!(target.exists("one.pdf").await.unwrap());
    assert!(target.exists("two.png").await.unwrap());
    assert!(!target.exists("three.exe").await.unwrap());
}
