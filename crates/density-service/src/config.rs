use crate::analyzer::AnalyzerConfig;
use crate::pipeline::PipelineConfig;
use anyhow::{bail, Context, Result};
use common::density::{
    DEFAULT_DENSITY_THRESHOLD, DEFAULT_FALLBACK_FRAME_RATE, DEFAULT_MAX_SECONDS, PERSON_LABEL,
};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default request body limit (200 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DensityServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this density service instance
    pub node_id: String,

    pub density_threshold: f64,

    pub fallback_frame_rate: f64,

    /// `max_seconds` used when a series request omits it
    pub default_max_seconds: u32,

    pub person_label: String,

    /// Detector identifier passed to `build_detector`
    pub detector: String,

    /// Raw detector configuration handed to `PersonDetector::init`
    pub detector_config: serde_json::Value,

    pub staging_dir: Option<PathBuf>,

    pub max_upload_bytes: usize,
}

impl Default for DensityServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            node_id: "density-service".to_string(),
            density_threshold: DEFAULT_DENSITY_THRESHOLD,
            fallback_frame_rate: DEFAULT_FALLBACK_FRAME_RATE,
            default_max_seconds: DEFAULT_MAX_SECONDS,
            person_label: PERSON_LABEL.to_string(),
            detector: "mock".to_string(),
            detector_config: serde_json::Value::Null,
            staging_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl DensityServiceConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = env::var("DENSITY_SERVICE_ADDR").unwrap_or(defaults.bind_addr);

        let node_id = env::var("NODE_ID").unwrap_or_else(|_| {
            format!(
                "density-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let density_threshold: f64 = parse_var("DENSITY_THRESHOLD", defaults.density_threshold)?;
        if !density_threshold.is_finite() || density_threshold < 0.0 {
            bail!("DENSITY_THRESHOLD must be a non-negative number");
        }

        let fallback_frame_rate: f64 =
            parse_var("FALLBACK_FRAME_RATE", defaults.fallback_frame_rate)?;
        if !fallback_frame_rate.is_finite() || fallback_frame_rate <= 0.0 {
            bail!("FALLBACK_FRAME_RATE must be positive");
        }

        let default_max_seconds: u32 =
            parse_var("DEFAULT_MAX_SECONDS", defaults.default_max_seconds)?;
        if default_max_seconds == 0 {
            bail!("DEFAULT_MAX_SECONDS must be at least 1");
        }

        let person_label = env::var("PERSON_LABEL").unwrap_or(defaults.person_label);
        if person_label.trim().is_empty() {
            bail!("PERSON_LABEL must not be empty");
        }

        let detector = env::var("DETECTOR").unwrap_or(defaults.detector);

        let detector_config = match env::var("DETECTOR_CONFIG") {
            Ok(raw) => serde_json::from_str(&raw).context("Invalid DETECTOR_CONFIG JSON")?,
            Err(_) => defaults.detector_config,
        };

        let staging_dir = env::var("STAGING_DIR").ok().map(PathBuf::from);

        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?;

        Ok(Self {
            bind_addr,
            node_id,
            density_threshold,
            fallback_frame_rate,
            default_max_seconds,
            person_label,
            detector,
            detector_config,
            staging_dir,
            max_upload_bytes,
        })
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            density_threshold: self.density_threshold,
            person_label: self.person_label.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            analyzer: self.analyzer_config(),
            fallback_frame_rate: self.fallback_frame_rate,
            staging_dir: self.staging_dir.clone(),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}
