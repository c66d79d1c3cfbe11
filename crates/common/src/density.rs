//! Density contracts shared by the density service and its clients.
//!
//! This module defines the detection shapes produced by person detectors and
//! the per-frame and per-series results returned to callers.

use serde::{Deserialize, Serialize};

/// Default density above which a frame is reported as overcrowded
pub const DEFAULT_DENSITY_THRESHOLD: f64 = 0.25;

/// Frame rate assumed when a video reports a non-positive rate
pub const DEFAULT_FALLBACK_FRAME_RATE: f64 = 30.0;

/// Default number of seconds sampled by a series request
pub const DEFAULT_MAX_SECONDS: u32 = 30;

/// Class label the detectors use for people
pub const PERSON_LABEL: &str = "person";

/// Bounding box corners in source-frame pixels.
///
/// Coordinates come straight from the detector and may fall outside the
/// frame; consumers clamp before computing areas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

/// Detection result from a person detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Object class/label from the detector's vocabulary
    pub class: String,

    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,

    pub bbox: BoundingBox,

    /// Additional metadata (detector-specific)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Density verdict for a single frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    /// Number of person detections in the frame
    pub person_count: u32,

    /// Summed person box area over frame area, rounded to 4 decimals
    pub density: f64,

    /// Whether `density` is strictly above the configured threshold
    pub overcrowded: bool,

    /// Decoded frame width in pixels
    pub width: u32,

    /// Decoded frame height in pixels
    pub height: u32,
}

impl FrameResult {
    /// The zero-valued result returned when no frame could be decoded
    pub fn degraded() -> Self {
        Self {
            person_count: 0,
            density: 0.0,
            overcrowded: false,
            width: 0,
            height: 0,
        }
    }

    pub fn is_degraded(&self) -> bool {
        *self == Self::degraded()
    }
}

impl Default for FrameResult {
    fn default() -> Self {
        Self::degraded()
    }
}

/// One sample of a density series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesItem {
    /// Sampling timestamp in seconds from the start of the media
    pub t_seconds: f64,

    #[serde(flatten)]
    pub result: FrameResult,
}

/// Ordered density samples, ascending by `t_seconds`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesResult {
    pub series: Vec<SeriesItem>,
}

impl SeriesResult {
    pub fn empty() -> Self {
        Self { series: Vec::new() }
    }

    pub fn single(result: FrameResult) -> Self {
        Self {
            series: vec![SeriesItem {
                t_seconds: 0.0,
                result,
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Detector metadata and capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorInfo {
    /// Detector unique identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    pub version: String,

    /// Class labels the detector can emit
    pub class_labels: Vec<String>,

    /// Whether the detector requires GPU
    pub requires_gpu: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_result_is_all_zero() {
        let result = FrameResult::degraded();
        assert_eq!(result.person_count, 0);
        assert_eq!(result.density, 0.0);
        assert!(!result.overcrowded);
        assert_eq!(result.width, 0);
        assert_eq!(result.height, 0);
        assert!(result.is_degraded());
    }

    #[test]
    fn test_series_item_serializes_flat() {
        let item = SeriesItem {
            t_seconds: 3.0,
            result: FrameResult {
                person_count: 4,
                density: 0.1234,
                overcrowded: false,
                width: 640,
                height: 480,
            },
        };

        let json = serde_json::to_value(item).unwrap();
        assert_eq!(json["t_seconds"], 3.0);
        assert_eq!(json["person_count"], 4);
        assert_eq!(json["width"], 640);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_bounding_box_extent_never_negative() {
        let inverted = BoundingBox::new(50.0, 40.0, 10.0, 20.0);
        assert_eq!(inverted.width(), 0.0);
        assert_eq!(inverted.height(), 0.0);
    }
}
