/// Mock person detector for testing and demonstration purposes
use super::PersonDetector;
use crate::decoder::Frame;
use anyhow::{ensure, Result};
use async_trait::async_trait;
use common::density::{BoundingBox, Detection, PERSON_LABEL};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDetectorConfig {
    /// Confidence threshold for detections (0.0 to 1.0)
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// Classes to emit, in rotation
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,

    /// Upper bound on detections per frame
    #[serde(default = "default_max_detections")]
    pub max_detections: u64,

    /// Simulate processing delay in milliseconds
    #[serde(default)]
    pub simulated_delay_ms: u64,
}

fn default_confidence() -> f32 {
    0.5
}

fn default_classes() -> Vec<String> {
    vec![PERSON_LABEL.to_string(), "car".to_string(), "dog".to_string()]
}

fn default_max_detections() -> u64 {
    3
}

impl Default for MockDetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence(),
            classes: default_classes(),
            max_detections: default_max_detections(),
            simulated_delay_ms: 0,
        }
    }
}

/// Mock person detector.
///
/// Detections are derived from the frame's dimensions and pixel content, so
/// identical frames always yield identical detections.
pub struct MockDetector {
    config: MockDetectorConfig,
}

impl MockDetector {
    pub fn new() -> Self {
        Self {
            config: MockDetectorConfig::default(),
        }
    }

    /// Cheap content fingerprint over a strided sample of the pixel buffer
    fn frame_seed(frame: &Frame) -> u64 {
        frame
            .pixels()
            .as_raw()
            .iter()
            .step_by(61)
            .fold((u64::from(frame.width()) << 32) | u64::from(frame.height()), |acc, &b| {
                acc.wrapping_mul(31).wrapping_add(u64::from(b))
            })
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersonDetector for MockDetector {
    fn id(&self) -> &'static str {
        "mock_person_detector"
    }

    fn name(&self) -> &'static str {
        "Mock Person Detector"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn class_labels(&self) -> Vec<String> {
        self.config.classes.clone()
    }

    async fn init(&mut self, config: serde_json::Value) -> Result<()> {
        if !config.is_null() {
            self.config = serde_json::from_value(config)?;
        }
        ensure!(
            !self.config.classes.is_empty(),
            "mock detector needs at least one class"
        );
        tracing::info!(
            "Initialized MockDetector with confidence threshold: {}",
            self.config.confidence_threshold
        );
        Ok(())
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        if self.config.simulated_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(
                self.config.simulated_delay_ms,
            ))
            .await;
        }

        if frame.width() == 0 || frame.height() == 0 || self.config.max_detections == 0 {
            return Ok(Vec::new());
        }

        let seed = Self::frame_seed(frame);
        let num_detections = (seed % self.config.max_detections) + 1;
        let (w, h) = (u64::from(frame.width()), u64::from(frame.height()));

        let detections = (0..num_detections)
            .map(|i| {
                let class_idx = (seed.wrapping_add(i) % self.config.classes.len() as u64) as usize;
                let mixed = seed.wrapping_mul(7).wrapping_add(i.wrapping_mul(13));

                // Boxes may run past the frame edge, like real detector output
                let x1 = (mixed % w.max(2)) as f32;
                let y1 = ((mixed / 3) % h.max(2)) as f32;
                let box_w = ((mixed % (w / 4 + 1)) + 1) as f32;
                let box_h = ((mixed % (h / 3 + 1)) + 1) as f32;

                let confidence = self.config.confidence_threshold
                    + ((mixed % 50) as f32 / 100.0).min(1.0 - self.config.confidence_threshold);

                Detection {
                    class: self.config.classes[class_idx].clone(),
                    confidence,
                    bbox: BoundingBox::new(x1, y1, x1 + box_w, y1 + box_h),
                    metadata: Some(serde_json::json!({
                        "mock": true,
                        "detection_index": i
                    })),
                }
            })
            .collect();

        Ok(detections)
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down MockDetector");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn frame(width: u32, height: u32, shade: u8) -> Frame {
        Frame::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([shade, shade / 2, 255 - shade]),
        )))
    }

    #[tokio::test]
    async fn test_mock_detector_init() {
        let mut detector = MockDetector::new();
        let config = serde_json::json!({
            "confidence_threshold": 0.7,
            "classes": ["person", "vehicle"],
            "simulated_delay_ms": 10
        });

        detector.init(config).await.unwrap();
        assert_eq!(detector.config.confidence_threshold, 0.7);
        assert_eq!(detector.class_labels(), vec!["person", "vehicle"]);
    }

    #[tokio::test]
    async fn test_mock_detector_rejects_empty_classes() {
        let mut detector = MockDetector::new();
        let result = detector.init(serde_json::json!({ "classes": [] })).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_detector_detect() {
        let detector = MockDetector::new();
        let detections = detector.detect(&frame(320, 240, 90)).await.unwrap();

        assert!(!detections.is_empty());
        assert!(detections.len() <= 3);
        for detection in &detections {
            assert!(detector.supports_label(&detection.class));
            assert!(detection.bbox.x2 > detection.bbox.x1);
            assert!(detection.bbox.y2 > detection.bbox.y1);
        }
    }

    #[tokio::test]
    async fn test_mock_detector_deterministic() {
        let detector = MockDetector::new();
        let frame = frame(1920, 1080, 42);

        let first = detector.detect(&frame).await.unwrap();
        let second = detector.detect(&frame).await.unwrap();

        assert_eq!(first.len(), second.len());
        for (d1, d2) in first.iter().zip(second.iter()) {
            assert_eq!(d1.class, d2.class);
            assert_eq!(d1.confidence, d2.confidence);
            assert_eq!(d1.bbox, d2.bbox);
        }
    }

    #[tokio::test]
    async fn test_mock_detector_empty_frame() {
        let detector = MockDetector::new();
        let detections = detector.detect(&frame(0, 0, 0)).await.unwrap();
        assert!(detections.is_empty());
    }
}
