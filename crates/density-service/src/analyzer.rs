//! Per-frame density aggregation.
//!
//! Person boxes are clamped to the frame and their areas summed without
//! deduplication, so overlapping boxes count twice and density can exceed 1.0.

use crate::decoder::Frame;
use crate::detector::SharedDetector;
use common::density::{Detection, FrameResult, DEFAULT_DENSITY_THRESHOLD, PERSON_LABEL};
use std::time::Instant;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Density strictly above this is overcrowded
    pub density_threshold: f64,

    /// Detector class label counted as a person
    pub person_label: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            density_threshold: DEFAULT_DENSITY_THRESHOLD,
            person_label: PERSON_LABEL.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct DensityAnalyzer {
    config: AnalyzerConfig,
    detector: SharedDetector,
}

impl DensityAnalyzer {
    pub fn new(config: AnalyzerConfig, detector: SharedDetector) -> Self {
        Self { config, detector }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn detector(&self) -> &SharedDetector {
        &self.detector
    }

    /// Analyze a decoded frame, or produce the degraded result for `None`
    pub async fn analyze(&self, frame: Option<&Frame>) -> FrameResult {
        let Some(frame) = frame else {
            telemetry::metrics::DENSITY_FRAMES_ANALYZED
                .with_label_values(&["degraded"])
                .inc();
            return FrameResult::degraded();
        };

        let detector = self.detector.read().await;
        let detector_id = detector.id();
        let start = Instant::now();
        let detections = detector.detect(frame).await;
        telemetry::metrics::DENSITY_DETECTION_LATENCY
            .with_label_values(&[detector_id])
            .observe(start.elapsed().as_secs_f64());
        drop(detector);

        let detections = match detections {
            Ok(detections) => detections,
            Err(e) => {
                error!(
                    detector = detector_id,
                    width = frame.width(),
                    height = frame.height(),
                    "detector failed on frame: {:#}",
                    e
                );
                telemetry::metrics::DENSITY_FRAMES_ANALYZED
                    .with_label_values(&["detector_error"])
                    .inc();
                return self.aggregate(frame.width(), frame.height(), &[]);
            }
        };

        telemetry::metrics::DENSITY_FRAMES_ANALYZED
            .with_label_values(&["analyzed"])
            .inc();

        let result = self.aggregate(frame.width(), frame.height(), &detections);
        if result.overcrowded {
            telemetry::metrics::DENSITY_OVERCROWDED_FRAMES.inc();
        }

        debug!(
            detector = detector_id,
            detections = detections.len(),
            person_count = result.person_count,
            density = result.density,
            overcrowded = result.overcrowded,
            "analyzed frame"
        );

        result
    }

    /// Fold detections on a `width`x`height` frame into a density verdict
    pub fn aggregate(&self, width: u32, height: u32, detections: &[Detection]) -> FrameResult {
        let (w, h) = (f64::from(width), f64::from(height));

        let (person_count, total_area) = detections
            .iter()
            .filter(|d| d.class == self.config.person_label)
            .fold((0u32, 0f64), |(count, area), d| {
                // Truncate to whole pixels after clamping into the frame
                let x1 = f64::from(d.bbox.x1).clamp(0.0, w).trunc();
                let y1 = f64::from(d.bbox.y1).clamp(0.0, h).trunc();
                let x2 = f64::from(d.bbox.x2).clamp(0.0, w).trunc();
                let y2 = f64::from(d.bbox.y2).clamp(0.0, h).trunc();
                let box_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
                (count + 1, area + box_area)
            });

        let frame_area = (w * h).max(1.0);
        let density = round_density(total_area / frame_area);

        FrameResult {
            person_count,
            density,
            overcrowded: density > self.config.density_threshold,
            width,
            height,
        }
    }
}

/// Round to 4 decimal places for reporting
fn round_density(density: f64) -> f64 {
    (density * 10_000.0).round() / 10_000.0
}
