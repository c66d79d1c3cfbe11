use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Density Service Metrics ====
    pub static ref DENSITY_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("density_requests_total", "Total number of density requests"),
            &["operation", "media_kind"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_FRAMES_ANALYZED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "density_frames_analyzed_total",
                "Total number of frames passed through the density analyzer",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_OVERCROWDED_FRAMES: IntCounter = {
        let metric = IntCounter::new(
            "density_overcrowded_frames_total",
            "Total number of frames classified as overcrowded",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_DETECTION_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "density_detection_latency_seconds",
                "Latency of person detector invocations",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["detector"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_SERIES_SAMPLES: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "density_series_samples",
                "Number of samples returned per series request",
            )
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_STAGING_CLEANUP_FAILURES: IntCounter = {
        let metric = IntCounter::new(
            "density_staging_cleanup_failures_total",
            "Staged video uploads that could not be removed",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
