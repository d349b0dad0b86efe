//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use optinexus_server::convert::{
    ConversionGateway, ConversionJob, ConversionType, ConvertedFile, JobStatus,
};
use optinexus_server::storage::{BlobStore, MemoryStore};
use optinexus_server::{router, AppState, ServerConfig, StorageKind};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;

pub const BASE_URL: &str = "http://localhost:3001";

/// PDF with `pages` A4 pages, each showing its page number
pub fn sample_pdf(pages: u32) -> Vec<u8> {
    build_pdf(pages, None)
}

/// Like [`sample_pdf`], but page `n` carries its own MediaBox of width
/// `label_base + n`, so pages stay identifiable after merge and split
pub fn labeled_pdf(pages: u32, label_base: i64) -> Vec<u8> {
    build_pdf(pages, Some(label_base))
}

/// MediaBox width of every page, in page order
pub fn page_labels(pdf: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|&id| {
            let page = doc.get_dictionary(id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            match &media_box[2] {
                Object::Integer(w) => *w,
                Object::Real(w) => w.round() as i64,
                other => panic!("unexpected MediaBox entry {:?}", other),
            }
        })
        .collect()
}

fn build_pdf(pages: u32, label_base: Option<i64>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let kids: Vec<Object> = (0..pages)
        .map(|i| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), Object::Integer(24)]),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(600)]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            };
            if let Some(base) = label_base {
                page.set(
                    "MediaBox",
                    vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(base + i as i64 + 1),
                        Object::Integer(842),
                    ],
                );
            }
            doc.add_object(page).into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(pages as i64),
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn page_count(pdf: &[u8]) -> usize {
    Document::load_mem(pdf).unwrap().get_pages().len()
}

/// Gradient test image encoded as `format`
pub fn sample_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 96])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

/// RGB noise saved as a quality-80 JPEG; hard to shrink further
pub fn noisy_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    let img = ImageBuffer::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 80))
        .unwrap();
    buf
}

/// Router over an in-memory store
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        public_base_url: BASE_URL.to_string(),
        storage: StorageKind::Memory,
        allow_private_urls: true,
        cleanup_interval: std::time::Duration::ZERO,
        ..Default::default()
    }
}

pub fn spawn_app(config: ServerConfig, gateway: Option<Arc<dyn ConversionGateway>>) -> TestApp {
    let store = Arc::new(MemoryStore::new(&config.public_base_url));
    let state = AppState::new(config, store.clone() as Arc<dyn BlobStore>, gateway).unwrap();
    TestApp {
        server: TestServer::new(router(state)).unwrap(),
        store,
    }
}

impl TestApp {
    pub fn new() -> Self {
        spawn_app(test_config(), None)
    }

    /// Upload through `/api/upload` and return the stored URL
    pub async fn upload(&self, name: &str, data: Vec<u8>, mime: &str) -> String {
        let response = self
            .server
            .post("/api/upload")
            .multipart(
                MultipartForm::new()
                    .add_part("file", Part::bytes(data).file_name(name).mime_type(mime)),
            )
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        body["url"].as_str().unwrap().to_string()
    }

    pub async fn upload_pdf(&self, pages: u32) -> String {
        self.upload("sample.pdf", sample_pdf(pages), "application/pdf").await
    }

    pub async fn fetch(&self, url: &str) -> Vec<u8> {
        self.store.get(url).await.unwrap()
    }
}

/// Gateway answering from memory
pub struct FakeGateway {
    pub output: Vec<u8>,
}

#[async_trait]
impl ConversionGateway for FakeGateway {
    async fn convert_bytes(
        &self,
        _data: Vec<u8>,
        filename: &str,
        kind: ConversionType,
    ) -> optinexus_server::Result<ConvertedFile> {
        Ok(ConvertedFile {
            data: self.output.clone(),
            filename: Some(format!("{}.{}", filename, kind.output_format())),
        })
    }

    async fn create_url_job(
        &self,
        _url: &str,
        _kind: ConversionType,
    ) -> optinexus_server::Result<ConversionJob> {
        Ok(ConversionJob {
            id: "job-42".to_string(),
            status: JobStatus::Waiting,
            progress: 0,
            result_url: None,
            error: None,
        })
    }

    async fn job_status(&self, job_id: &str) -> optinexus_server::Result<ConversionJob> {
        Ok(ConversionJob {
            id: job_id.to_string(),
            status: JobStatus::Finished,
            progress: 100,
            result_url: Some("https://storage.example/out.docx".to_string()),
            error: None,
        })
    }
}
