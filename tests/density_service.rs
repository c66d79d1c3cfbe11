/// Integration tests for the density service HTTP surface
use anyhow::Result;
use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use common::density::{BoundingBox, Detection, DetectorInfo, FrameResult, SeriesResult};
use density_service::{
    api, decoder::Frame, detector::mock_detector::MockDetector, DensityServiceState,
    PersonDetector, PipelineConfig, SharedDetector,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Reports a single person covering the left half of every frame
struct HalfFrameDetector;

#[async_trait]
impl PersonDetector for HalfFrameDetector {
    fn id(&self) -> &'static str {
        "half_frame"
    }

    fn name(&self) -> &'static str {
        "Half Frame Detector"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn class_labels(&self) -> Vec<String> {
        vec!["person".to_string()]
    }

    async fn init(&mut self, _config: serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(vec![Detection {
            class: "person".to_string(),
            confidence: 0.99,
            bbox: BoundingBox::new(0.0, 0.0, frame.width() as f32 / 2.0, frame.height() as f32),
            metadata: None,
        }])
    }
}

fn test_server(detector: SharedDetector, staging_dir: Option<PathBuf>) -> TestServer {
    let config = PipelineConfig {
        staging_dir,
        ..Default::default()
    };
    let state = DensityServiceState::new("test-node".to_string(), detector, config, 30);
    TestServer::new(api::router(state, MAX_UPLOAD_BYTES)).unwrap()
}

fn mock_server() -> TestServer {
    test_server(Arc::new(RwLock::new(MockDetector::new())), None)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
    .write_to(&mut buffer, ImageFormat::Png)
    .unwrap();
    buffer.into_inner()
}

fn upload(field: &str, bytes: Vec<u8>, filename: &str, mime: &str) -> MultipartForm {
    MultipartForm::new().add_part(field, Part::bytes(bytes).file_name(filename).mime_type(mime))
}

#[tokio::test]
async fn test_count_image_reports_dimensions() {
    let server = mock_server();

    let response = server
        .post("/count")
        .multipart(upload("file", png_bytes(80, 60), "crowd.png", "image/png"))
        .await;

    assert_eq!(response.status_code(), 200);
    let result: FrameResult = response.json();
    assert_eq!((result.width, result.height), (80, 60));
    assert!(result.density >= 0.0);
    assert!(!result.is_degraded());
}

#[tokio::test]
async fn test_count_accepts_image_field_name() {
    let server = mock_server();

    let response = server
        .post("/count")
        .multipart(upload("image", png_bytes(16, 16), "a.png", "image/png"))
        .await;

    assert_eq!(response.status_code(), 200);
    let result: FrameResult = response.json();
    assert_eq!((result.width, result.height), (16, 16));
}

#[tokio::test]
async fn test_count_density_and_overcrowding() {
    let server = test_server(Arc::new(RwLock::new(HalfFrameDetector)), None);

    let response = server
        .post("/count")
        .multipart(upload("file", png_bytes(100, 40), "half.png", "image/png"))
        .await;

    assert_eq!(response.status_code(), 200);
    let result: FrameResult = response.json();
    assert_eq!(result.person_count, 1);
    assert_eq!(result.density, 0.5);
    assert!(result.overcrowded);
}

#[tokio::test]
async fn test_count_is_idempotent() {
    let server = mock_server();
    let bytes = png_bytes(120, 90);

    let first: FrameResult = server
        .post("/count")
        .multipart(upload("file", bytes.clone(), "same.png", "image/png"))
        .await
        .json();
    let second: FrameResult = server
        .post("/count")
        .multipart(upload("file", bytes, "same.png", "image/png"))
        .await
        .json();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_count_undecodable_image_is_degraded() {
    let server = mock_server();

    let response = server
        .post("/count")
        .multipart(upload("file", b"not an image".to_vec(), "broken.jpg", "image/jpeg"))
        .await;

    assert_eq!(response.status_code(), 200);
    let result: FrameResult = response.json();
    assert_eq!(result, FrameResult::degraded());
}

#[tokio::test]
async fn test_zero_byte_video_is_degraded() {
    let staging = tempfile::tempdir().unwrap();
    let server = test_server(
        Arc::new(RwLock::new(MockDetector::new())),
        Some(staging.path().to_path_buf()),
    );

    let single: FrameResult = server
        .post("/count")
        .multipart(upload("file", Vec::new(), "empty.mp4", "video/mp4"))
        .await
        .json();
    assert_eq!(single, FrameResult::degraded());

    let series: SeriesResult = server
        .post("/count_series")
        .multipart(upload("file", Vec::new(), "empty.mp4", "video/mp4"))
        .await
        .json();
    assert!(series.is_empty());

    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_garbage_video_leaves_no_staged_files() {
    let staging = tempfile::tempdir().unwrap();
    let server = test_server(
        Arc::new(RwLock::new(MockDetector::new())),
        Some(staging.path().to_path_buf()),
    );

    let series: SeriesResult = server
        .post("/count_series")
        .multipart(upload("file", b"garbage".to_vec(), "clip.mov", "application/octet-stream"))
        .await
        .json();

    assert!(series.is_empty());
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_series_of_image_matches_count() {
    let server = mock_server();
    let bytes = png_bytes(64, 64);

    let single: FrameResult = server
        .post("/count")
        .multipart(upload("file", bytes.clone(), "still.png", "image/png"))
        .await
        .json();

    let response = server
        .post("/count_series")
        .add_query_param("max_seconds", 5)
        .multipart(upload("file", bytes, "still.png", "image/png"))
        .await;

    assert_eq!(response.status_code(), 200);
    let series: SeriesResult = response.json();
    assert_eq!(series.len(), 1);
    assert_eq!(series.series[0].t_seconds, 0.0);
    assert_eq!(series.series[0].result, single);
}

#[tokio::test]
async fn test_series_flattens_frame_fields() {
    let server = mock_server();

    let response = server
        .post("/count_series")
        .multipart(upload("file", png_bytes(10, 10), "still.png", "image/png"))
        .await;

    let body: serde_json::Value = response.json();
    let item = &body["series"][0];
    assert_eq!(item["t_seconds"], 0.0);
    assert_eq!(item["width"], 10);
    assert!(item.get("person_count").is_some());
    assert!(item.get("overcrowded").is_some());
}

#[tokio::test]
async fn test_series_of_undecodable_image_is_empty() {
    let server = mock_server();

    let series: SeriesResult = server
        .post("/count_series")
        .multipart(upload("file", b"nope".to_vec(), "x.png", "image/png"))
        .await
        .json();

    assert!(series.is_empty());
}

#[tokio::test]
async fn test_series_rejects_non_positive_max_seconds() {
    let server = mock_server();

    for value in [0, -3] {
        let response = server
            .post("/count_series")
            .add_query_param("max_seconds", value)
            .multipart(upload("file", png_bytes(8, 8), "a.png", "image/png"))
            .await;

        assert_eq!(response.status_code(), 400);
        let body: serde_json::Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("max_seconds"));
    }
}

#[tokio::test]
async fn test_missing_file_field_is_bad_request() {
    let server = mock_server();

    let response = server
        .post("/count")
        .multipart(MultipartForm::new().add_text("comment", "no file here"))
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_health_and_readiness() {
    let server = mock_server();

    let health = server.get("/healthz").await;
    assert_eq!(health.status_code(), 200);
    let body: serde_json::Value = health.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["node_id"], "test-node");

    let ready = server.get("/readyz").await;
    assert_eq!(ready.status_code(), 200);
    let body: serde_json::Value = ready.json();
    assert_eq!(body["detector"], "mock_person_detector");
}

#[tokio::test]
async fn test_detector_info() {
    let server = mock_server();

    let response = server.get("/v1/detector").await;
    assert_eq!(response.status_code(), 200);

    let info: DetectorInfo = response.json();
    assert_eq!(info.id, "mock_person_detector");
    assert!(info.class_labels.contains(&"person".to_string()));
}

#[tokio::test]
async fn test_metrics_exposed_after_request() {
    let server = mock_server();

    server
        .post("/count")
        .multipart(upload("file", png_bytes(8, 8), "a.png", "image/png"))
        .await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("density_requests_total"));
}

/// Render a short synthetic clip with ffmpeg
fn render_test_video(dir: &std::path::Path, seconds: u32) -> PathBuf {
    let path = dir.join("clip.mp4");
    let status = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg("testsrc=size=64x48:rate=10")
        .args(["-t", &seconds.to_string(), "-pix_fmt", "yuv420p"])
        .arg(&path)
        .status()
        .expect("failed to run ffmpeg");
    assert!(status.success());
    path
}

/// Requires ffmpeg and ffprobe on PATH
#[tokio::test]
#[ignore]
async fn test_video_series_with_ffmpeg() {
    let work = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let video = std::fs::read(render_test_video(work.path(), 3)).unwrap();
    let server = test_server(
        Arc::new(RwLock::new(MockDetector::new())),
        Some(staging.path().to_path_buf()),
    );

    let single: FrameResult = server
        .post("/count")
        .multipart(upload("file", video.clone(), "clip.mp4", "video/mp4"))
        .await
        .json();
    assert_eq!((single.width, single.height), (64, 48));

    let series: SeriesResult = server
        .post("/count_series")
        .multipart(upload("file", video.clone(), "clip.mp4", "video/mp4"))
        .await
        .json();
    let times: Vec<f64> = series.series.iter().map(|i| i.t_seconds).collect();
    assert_eq!(times, vec![0.0, 1.0, 2.0]);
    assert_eq!(series.series[0].result, single);

    let capped: SeriesResult = server
        .post("/count_series")
        .add_query_param("max_seconds", 2)
        .multipart(upload("file", video, "clip.mp4", "video/mp4"))
        .await
        .json();
    assert_eq!(capped.len(), 2);

    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}
