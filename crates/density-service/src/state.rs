use crate::detector::SharedDetector;
use crate::media::Upload;
use crate::pipeline::{DensityPipeline, PipelineConfig};
use anyhow::Result;
use common::density::{DetectorInfo, FrameResult, SeriesResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Clone)]
pub struct DensityServiceState {
    inner: Arc<DensityServiceStateInner>,
}

struct DensityServiceStateInner {
    node_id: String,
    detector: SharedDetector,
    pipeline: DensityPipeline,
    default_max_seconds: u32,
}

impl DensityServiceState {
    pub fn new(
        node_id: String,
        detector: SharedDetector,
        config: PipelineConfig,
        default_max_seconds: u32,
    ) -> Self {
        let pipeline = DensityPipeline::new(config, detector.clone());
        Self {
            inner: Arc::new(DensityServiceStateInner {
                node_id,
                detector,
                pipeline,
                default_max_seconds: default_max_seconds.max(1),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn pipeline(&self) -> &DensityPipeline {
        &self.inner.pipeline
    }

    pub fn default_max_seconds(&self) -> u32 {
        self.inner.default_max_seconds
    }

    pub async fn detector_info(&self) -> DetectorInfo {
        self.inner.detector.read().await.info()
    }

    /// Whether the detector reports itself operational
    pub async fn detector_healthy(&self) -> bool {
        let detector = self.inner.detector.read().await;
        match detector.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                error!(detector = detector.id(), "detector health check failed: {:#}", e);
                false
            }
        }
    }

    pub async fn count(&self, upload: &Upload) -> FrameResult {
        let kind = upload.kind();
        telemetry::metrics::DENSITY_REQUESTS
            .with_label_values(&["count", kind.as_str()])
            .inc();

        let start = Instant::now();
        let result = self.inner.pipeline.process_single(upload).await;

        info!(
            node_id = %self.inner.node_id,
            media_kind = kind.as_str(),
            person_count = result.person_count,
            density = result.density,
            overcrowded = result.overcrowded,
            degraded = result.is_degraded(),
            processing_time_ms = start.elapsed().as_millis() as u64,
            "Processed count request"
        );

        result
    }

    pub async fn count_series(&self, upload: &Upload, max_seconds: u32) -> SeriesResult {
        let kind = upload.kind();
        telemetry::metrics::DENSITY_REQUESTS
            .with_label_values(&["count_series", kind.as_str()])
            .inc();

        let start = Instant::now();
        let series = self.inner.pipeline.process_series(upload, max_seconds).await;
        telemetry::metrics::DENSITY_SERIES_SAMPLES.observe(series.len() as f64);

        info!(
            node_id = %self.inner.node_id,
            media_kind = kind.as_str(),
            max_seconds,
            samples = series.len(),
            overcrowded_samples = series.series.iter().filter(|i| i.result.overcrowded).count(),
            processing_time_ms = start.elapsed().as_millis() as u64,
            "Processed series request"
        );

        series
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down density service...");

        let mut detector = self.inner.detector.write().await;
        detector.shutdown().await?;

        info!("Density service shutdown complete");
        Ok(())
    }
}
