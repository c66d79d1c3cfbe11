pub mod mock_detector;
#[cfg(feature = "yolov8")]
pub mod yolov8_detector;

use crate::decoder::Frame;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use common::density::{Detection, DetectorInfo};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle to the configured detector
pub type SharedDetector = Arc<RwLock<dyn PersonDetector>>;

/// Core trait that every person detector must implement
#[async_trait]
pub trait PersonDetector: Send + Sync {
    /// Get the unique detector identifier (e.g., "yolov8_detector")
    fn id(&self) -> &'static str;

    /// Get human-readable detector name
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str;

    /// Stable vocabulary of class labels this detector can emit
    fn class_labels(&self) -> Vec<String>;

    /// Whether the detector requires GPU acceleration
    fn requires_gpu(&self) -> bool {
        false
    }

    /// Whether `label` is part of the detector's vocabulary
    fn supports_label(&self, label: &str) -> bool {
        self.class_labels().iter().any(|l| l == label)
    }

    /// Get detector metadata
    fn info(&self) -> DetectorInfo {
        DetectorInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            version: self.version().to_string(),
            class_labels: self.class_labels(),
            requires_gpu: self.requires_gpu(),
        }
    }

    /// Initialize detector with configuration
    async fn init(&mut self, config: serde_json::Value) -> Result<()>;

    /// Run detection on a decoded frame
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Health check - verify the detector is operational
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Shutdown the detector gracefully
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build and initialize the detector named by `detector_id`
pub async fn build_detector(
    detector_id: &str,
    config: serde_json::Value,
) -> Result<SharedDetector> {
    match detector_id {
        "mock" | "mock_person_detector" => {
            let mut detector = mock_detector::MockDetector::new();
            detector.init(config).await?;
            Ok(Arc::new(RwLock::new(detector)))
        }
        #[cfg(feature = "yolov8")]
        "yolov8" | "yolov8_detector" => {
            let mut detector = yolov8_detector::YoloV8Detector::new();
            detector.init(config).await?;
            Ok(Arc::new(RwLock::new(detector)))
        }
        other => Err(anyhow!(
            "Unknown detector '{}' (available: {})",
            other,
            available_detectors().join(", ")
        )),
    }
}

/// Detector identifiers compiled into this build
pub fn available_detectors() -> Vec<&'static str> {
    let mut ids = vec!["mock"];
    if cfg!(feature = "yolov8") {
        ids.push("yolov8");
    }
    ids
}
