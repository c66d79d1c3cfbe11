pub mod analyzer;
pub mod api;
pub mod config;
pub mod decoder;
pub mod detector;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod state;

pub use analyzer::{AnalyzerConfig, DensityAnalyzer};
pub use config::DensityServiceConfig;
pub use detector::{build_detector, PersonDetector, SharedDetector};
pub use media::{classify, MediaKind, Upload};
pub use pipeline::{DensityPipeline, PipelineConfig};
pub use state::DensityServiceState;
