use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, Rgb, RgbImage};
use oar_ocr_gateway::core::config::ParallelPolicy;
use oar_ocr_gateway::core::{LayoutDetection, LayoutDetector, OCRError, Recognition, TextRecognizer};
use oar_ocr_gateway::gateway::pdf::{PagePlanner, PageSink};
use oar_ocr_gateway::gateway::{
    HandlerConfig, InvocationError, ObjectStore, ObjectStoreRouter, PdfError, PdfRasterizer,
    PdfRenderSettings, RequestHandler, RetrievalCause, StorageUri,
};
use oar_ocr_gateway::oarocr::{CacheHandle, ModelCache};
use oar_ocr_gateway::processors::BoundingBox;
use serde_json::{Value, json};
use tempfile::tempdir;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);

/// Reports every 4-connected blob of dark pixels as a text line.
struct InkDetector {
    calls: Arc<AtomicUsize>,
}

impl LayoutDetector for InkDetector {
    fn name(&self) -> &str {
        "ink"
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<LayoutDetection>, OCRError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = image.dimensions();
        let is_ink = |x: u32, y: u32| image.get_pixel(x, y)[0] < 128;
        let mut seen = vec![false; (w * h) as usize];
        let mut found = Vec::new();

        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                if seen[idx] || !is_ink(x, y) {
                    continue;
                }
                seen[idx] = true;
                let (mut x0, mut y0, mut x1, mut y1) = (x, y, x, y);
                let mut stack = vec![(x, y)];
                while let Some((cx, cy)) = stack.pop() {
                    x0 = x0.min(cx);
                    y0 = y0.min(cy);
                    x1 = x1.max(cx);
                    y1 = y1.max(cy);
                    let neighbours = [
                        (cx.wrapping_sub(1), cy),
                        (cx + 1, cy),
                        (cx, cy.wrapping_sub(1)),
                        (cx, cy + 1),
                    ];
                    for (nx, ny) in neighbours {
                        if nx < w && ny < h {
                            let n = (ny * w + nx) as usize;
                            if !seen[n] && is_ink(nx, ny) {
                                seen[n] = true;
                                stack.push((nx, ny));
                            }
                        }
                    }
                }
                found.push(LayoutDetection {
                    bounding_box: BoundingBox::from_coords(
                        x0 as f32,
                        y0 as f32,
                        (x1 + 1) as f32,
                        (y1 + 1) as f32,
                    ),
                    label: "line_main".to_string(),
                    score: 0.9,
                    is_text_line: true,
                    length_hint: None,
                });
            }
        }
        Ok(found)
    }
}

/// Reads one character per 4 pixels of line width, up to its capacity.
/// Each tier uses its own character so tests can tell which tier answered.
struct WidthRecognizer {
    capacity: usize,
    glyph: char,
}

impl TextRecognizer for WidthRecognizer {
    fn name(&self) -> &str {
        "width"
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn recognize(&self, line: &RgbImage) -> Result<Recognition, OCRError> {
        let len = (line.width() as usize / 4).min(self.capacity);
        Ok(Recognition {
            text: std::iter::repeat_n(self.glyph, len).collect(),
            confidence: Some(0.99),
        })
    }
}

struct CrashingRecognizer;

impl TextRecognizer for CrashingRecognizer {
    fn name(&self) -> &str {
        "crashing"
    }

    fn capacity(&self) -> usize {
        100
    }

    fn recognize(&self, _line: &RgbImage) -> Result<Recognition, OCRError> {
        Err(OCRError::image_processing_error(
            "onnx session blew up at /srv/secret/model.onnx",
        ))
    }
}

/// A "PDF" is `%PDF-` followed by one `/Type /Page\n` marker per page.
/// Page `n` renders as a white page with a horizontal bar `20 * n` pixels wide.
struct MarkerRasterizer;

impl PdfRasterizer for MarkerRasterizer {
    fn render_pages(
        &self,
        data: &[u8],
        _settings: &PdfRenderSettings,
        plan: &mut PagePlanner<'_>,
        sink: &mut PageSink<'_>,
    ) -> Result<(), PdfError> {
        let count = match String::from_utf8_lossy(data).matches("/Type /Page\n").count() {
            0 => return Err(PdfError::Empty),
            n => n as u32,
        };
        for page in plan(count)? {
            let mut image = RgbImage::from_pixel(300, 200, WHITE);
            fill(&mut image, 10, 10, 20 * page, 12);
            sink(page, image)?;
        }
        Ok(())
    }
}

struct FixedStore(HashMap<String, Vec<u8>>);

#[async_trait]
impl ObjectStore for FixedStore {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn get(&self, uri: &StorageUri) -> Result<Vec<u8>, InvocationError> {
        match self.0.get(&uri.key) {
            Some(data) => Ok(data.clone()),
            None if uri.key.starts_with("private/") => Err(InvocationError::retrieval(
                uri.to_string(),
                RetrievalCause::PermissionDenied,
                None::<std::io::Error>,
            )),
            None => Err(InvocationError::retrieval(
                uri.to_string(),
                RetrievalCause::NotFound,
                None::<std::io::Error>,
            )),
        }
    }
}

fn fill(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    for yy in y..y + h {
        for xx in x..x + w {
            image.put_pixel(xx, yy, INK);
        }
    }
}

fn encode(image: &RgbImage, format: ImageFormat) -> String {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).expect("encode image");
    STANDARD.encode(buffer.into_inner())
}

fn fake_pdf(pages: usize) -> String {
    let mut data = b"%PDF-1.4\n".to_vec();
    for _ in 0..pages {
        data.extend_from_slice(b"/Type /Page\n");
    }
    STANDARD.encode(data)
}

fn width_cache(calls: Arc<AtomicUsize>) -> CacheHandle {
    ModelCache::from_parts(
        Box::new(InkDetector { calls }),
        vec![
            Box::new(WidthRecognizer {
                capacity: 30,
                glyph: 'a',
            }),
            Box::new(WidthRecognizer {
                capacity: 50,
                glyph: 'b',
            }),
            Box::new(WidthRecognizer {
                capacity: 100,
                glyph: 'c',
            }),
        ],
        &ParallelPolicy::default(),
    )
    .expect("cache")
}

async fn handler_with(
    cache: CacheHandle,
    work_root: &Path,
    stores: ObjectStoreRouter,
) -> RequestHandler {
    RequestHandler::builder(cache, HandlerConfig::default().with_work_root(work_root))
        .object_stores(stores)
        .rasterizer(Arc::new(MarkerRasterizer))
        .build()
        .await
        .expect("handler")
}

async fn handler(work_root: &Path) -> (RequestHandler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = width_cache(calls.clone());
    let handler = handler_with(cache, work_root, ObjectStoreRouter::new()).await;
    (handler, calls)
}

fn leftover_entries(root: &Path) -> usize {
    std::fs::read_dir(root).expect("read work root").count()
}

fn envelope(response: &impl serde::Serialize) -> Value {
    serde_json::to_value(response).expect("serialize response")
}

#[tokio::test]
async fn blank_jpeg_yields_one_empty_page() {
    let root = tempdir().expect("tempdir");
    let (handler, _) = handler(root.path()).await;
    let page = RgbImage::from_pixel(320, 240, WHITE);

    let response = handler
        .handle(json!({"image": encode(&page, ImageFormat::Jpeg)}), Some("blank"))
        .await;

    let body = envelope(&response);
    assert_eq!(body["statusCode"], 200);
    let pages = body["body"]["pages"].as_array().expect("pages");
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0]["page"], 1);
    assert_eq!(pages[0]["imginfo"], json!({"img_width": 320, "img_height": 240}));
    assert_eq!(pages[0]["contents"], json!([]));
    assert_eq!(pages[0]["text"], "");
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn pdf_page_selection_returns_requested_pages_in_order() {
    let root = tempdir().expect("tempdir");
    let (handler, _) = handler(root.path()).await;

    let response = handler
        .handle(json!({"image": fake_pdf(3), "pages": "3,1"}), None)
        .await;

    let body = envelope(&response);
    assert_eq!(body["statusCode"], 200);
    let pages = body["body"]["pages"].as_array().expect("pages");
    let numbers: Vec<u64> = pages.iter().map(|p| p["page"].as_u64().expect("page")).collect();
    assert_eq!(numbers, vec![1, 3]);
    // Page n carries a 20n-pixel bar, read as 5n characters.
    assert_eq!(pages[0]["text"], "a".repeat(5));
    assert_eq!(pages[1]["text"], "a".repeat(15));
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn pdf_without_selection_returns_every_page() {
    let root = tempdir().expect("tempdir");
    let (handler, _) = handler(root.path()).await;

    let response = handler.handle(json!({"image": fake_pdf(4)}), None).await;

    let result = response.result().expect("success");
    let numbers: Vec<u32> = result.pages.iter().map(|p| p.page).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn invalid_payload_is_a_client_error_without_model_calls() {
    let root = tempdir().expect("tempdir");
    let (handler, calls) = handler(root.path()).await;

    let response = handler
        .handle(json!({"image": "not valid base64 or uri"}), None)
        .await;

    assert!((400..500).contains(&response.status_code));
    assert!(envelope(&response)["body"]["error"].is_string());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let root = tempdir().expect("tempdir");
    let (handler, calls) = handler(root.path()).await;

    for raw in [
        json!({}),
        json!({"image": ""}),
        json!({"image": fake_pdf(2), "pages": "1-x"}),
        json!({"image": fake_pdf(2), "pages": "0"}),
    ] {
        let response = handler.handle(raw.clone(), None).await;
        assert_eq!(response.status_code, 400, "{raw}");
    }

    let response = handler.handle_bytes(b"{not json", None).await;
    assert_eq!(response.status_code, 400);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn out_of_range_page_is_a_validation_error() {
    let root = tempdir().expect("tempdir");
    let (handler, calls) = handler(root.path()).await;

    let response = handler
        .handle(json!({"image": fake_pdf(3), "pages": "5"}), None)
        .await;

    assert_eq!(response.status_code, 400);
    let message = envelope(&response)["body"]["error"]
        .as_str()
        .expect("error")
        .to_string();
    assert!(message.contains("out of range"), "{message}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn inaccessible_storage_object_leaves_no_workspace() {
    let root = tempdir().expect("tempdir");
    let calls = Arc::new(AtomicUsize::new(0));
    let mut objects = HashMap::new();
    objects.insert(
        "scans/page.png".to_string(),
        image_bytes(&RgbImage::from_pixel(50, 50, WHITE)),
    );
    let stores = ObjectStoreRouter::new().with_store("s3", Arc::new(FixedStore(objects)));
    let handler = handler_with(width_cache(calls.clone()), root.path(), stores).await;

    let denied = handler
        .handle(json!({"image": "s3://bucket/private/doc.pdf"}), Some("denied"))
        .await;
    assert_eq!(denied.status_code, 403);
    assert_eq!(leftover_entries(root.path()), 0);

    let missing = handler
        .handle(json!({"image": "s3://bucket/missing.pdf"}), None)
        .await;
    assert_eq!(missing.status_code, 404);
    assert_eq!(leftover_entries(root.path()), 0);

    let unsupported = handler
        .handle(json!({"image": "gs://bucket/scans/page.png"}), None)
        .await;
    assert_eq!(unsupported.status_code, 400);

    let found = handler
        .handle(json!({"image": "s3://bucket/scans/page.png"}), None)
        .await;
    assert_eq!(found.status_code, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(leftover_entries(root.path()), 0);
}

fn image_bytes(image: &RgbImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).expect("encode");
    buffer.into_inner()
}

#[tokio::test]
async fn regions_report_their_own_orientation() {
    let root = tempdir().expect("tempdir");
    let (handler, _) = handler(root.path()).await;
    let mut page = RgbImage::from_pixel(400, 300, WHITE);
    fill(&mut page, 20, 20, 120, 14); // horizontal
    fill(&mut page, 350, 20, 16, 160); // vertical

    let response = handler
        .handle(json!({"image": encode(&page, ImageFormat::Png)}), None)
        .await;

    let body = envelope(&response);
    assert_eq!(body["statusCode"], 200);
    let contents = body["body"]["pages"][0]["contents"]
        .as_array()
        .expect("contents");
    assert_eq!(contents.len(), 2);

    let flags: Vec<&str> = contents
        .iter()
        .map(|c| c["isVertical"].as_str().expect("isVertical"))
        .collect();
    assert!(flags.contains(&"true"));
    assert!(flags.contains(&"false"));

    for region in contents {
        assert_eq!(region["isTextline"], "true");
        let corners = region["boundingBox"].as_array().expect("boundingBox");
        assert_eq!(corners.len(), 4);
        assert!(region["confidence"].as_f64().expect("confidence") <= 1.0);
    }

    let horizontal = contents
        .iter()
        .find(|c| c["isVertical"] == "false")
        .expect("horizontal");
    assert_eq!(
        horizontal["boundingBox"],
        json!([[20, 20], [20, 34], [140, 20], [140, 34]])
    );
}

#[tokio::test]
async fn long_lines_escalate_through_the_cascade() {
    let root = tempdir().expect("tempdir");
    let (handler, _) = handler(root.path()).await;
    let mut page = RgbImage::from_pixel(400, 300, WHITE);
    fill(&mut page, 10, 10, 40, 10); // 10 chars
    fill(&mut page, 10, 60, 120, 10); // 30 chars
    fill(&mut page, 10, 110, 200, 10); // 50 chars

    let response = handler
        .handle(json!({"image": encode(&page, ImageFormat::Png)}), None)
        .await;

    let result = response.result().expect("success");
    let texts: Vec<&str> = result.pages[0]
        .contents
        .iter()
        .map(|r| r.text.as_str())
        .collect();
    assert_eq!(texts, vec!["a".repeat(10), "b".repeat(30), "c".repeat(50)]);
    assert_eq!(result.pages[0].text, texts.join("\n"));
}

#[tokio::test]
async fn same_input_gives_identical_results() {
    let root = tempdir().expect("tempdir");
    let (handler, _) = handler(root.path()).await;
    let mut page = RgbImage::from_pixel(400, 300, WHITE);
    fill(&mut page, 20, 20, 150, 12);
    fill(&mut page, 200, 100, 12, 150);
    fill(&mut page, 20, 200, 90, 12);
    let request = json!({"image": encode(&page, ImageFormat::Png)});

    let first = handler.handle(request.clone(), None).await;
    let second = handler.handle(request, None).await;

    assert_eq!(first.status_code, 200);
    assert_eq!(first, second);
}

#[tokio::test]
async fn recognition_failure_is_a_server_error_that_hides_details() {
    let root = tempdir().expect("tempdir");
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = ModelCache::from_parts(
        Box::new(InkDetector {
            calls: calls.clone(),
        }),
        vec![Box::new(CrashingRecognizer)],
        &ParallelPolicy::default(),
    )
    .expect("cache");
    let handler = handler_with(cache, root.path(), ObjectStoreRouter::new()).await;
    let mut page = RgbImage::from_pixel(100, 100, WHITE);
    fill(&mut page, 10, 10, 50, 10);

    let response = handler
        .handle(json!({"image": encode(&page, ImageFormat::Png)}), Some("crash"))
        .await;

    assert_eq!(response.status_code, 500);
    let message = envelope(&response)["body"]["error"]
        .as_str()
        .expect("error")
        .to_string();
    assert_eq!(message, "internal error while processing page 1");
    assert!(!message.contains("/srv/secret"));
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn response_never_contains_workspace_paths() {
    let root = tempdir().expect("tempdir");
    let (handler, _) = handler(root.path()).await;
    let mut page = RgbImage::from_pixel(200, 100, WHITE);
    fill(&mut page, 10, 10, 60, 10);

    let response = handler
        .handle(json!({"image": encode(&page, ImageFormat::Png)}), Some("paths"))
        .await;

    let text = serde_json::to_string(&response).expect("json");
    assert!(!text.contains(&root.path().display().to_string()));
    assert!(!text.contains("page0001"));
}
