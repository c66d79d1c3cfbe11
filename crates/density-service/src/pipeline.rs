//! Single-shot and time-sampled density pipelines.
//!
//! Both pipelines are infallible: decode problems degrade to the zero-valued
//! [`FrameResult`] or to a truncated (possibly empty) series.

use crate::analyzer::{AnalyzerConfig, DensityAnalyzer};
use crate::decoder::{self, FrameSource, VideoHandle};
use crate::detector::SharedDetector;
use crate::media::{MediaKind, Upload};
use common::density::{FrameResult, SeriesItem, SeriesResult, DEFAULT_FALLBACK_FRAME_RATE};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub analyzer: AnalyzerConfig,

    /// Substituted when a video reports a frame rate of zero or less
    pub fallback_frame_rate: f64,

    /// Directory for staged video uploads (system temp dir when unset)
    pub staging_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            fallback_frame_rate: DEFAULT_FALLBACK_FRAME_RATE,
            staging_dir: None,
        }
    }
}

#[derive(Clone)]
pub struct DensityPipeline {
    analyzer: DensityAnalyzer,
    fallback_frame_rate: f64,
    staging_dir: Option<PathBuf>,
}

impl DensityPipeline {
    pub fn new(config: PipelineConfig, detector: SharedDetector) -> Self {
        Self {
            analyzer: DensityAnalyzer::new(config.analyzer, detector),
            fallback_frame_rate: config.fallback_frame_rate,
            staging_dir: config.staging_dir,
        }
    }

    pub fn analyzer(&self) -> &DensityAnalyzer {
        &self.analyzer
    }

    /// Density of a still image, or of a video's first frame
    pub async fn process_single(&self, upload: &Upload) -> FrameResult {
        let kind = upload.kind();
        debug!(
            filename = upload.filename.as_deref().unwrap_or_default(),
            media_kind = kind.as_str(),
            size_bytes = upload.bytes.len(),
            "processing single frame"
        );

        match kind {
            MediaKind::Image => match decoder::decode_image(&upload.bytes) {
                Ok(frame) => self.analyzer.analyze(Some(&frame)).await,
                Err(e) => {
                    warn!(error = %e, "image decode failed, returning degraded result");
                    self.analyzer.analyze(None).await
                }
            },
            MediaKind::Video => {
                let Some(mut video) = self.open_video(upload).await else {
                    return self.analyzer.analyze(None).await;
                };

                let frame = match video.read_frame_at(0).await {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "first video frame unreadable");
                        None
                    }
                };
                video.release();

                self.analyzer.analyze(frame.as_ref()).await
            }
        }
    }

    /// One sample per second of video, at most `max_seconds` samples.
    ///
    /// An image yields a one-item series at `t_seconds = 0`.
    pub async fn process_series(&self, upload: &Upload, max_seconds: u32) -> SeriesResult {
        let max_seconds = max_seconds.max(1);
        let kind = upload.kind();
        debug!(
            filename = upload.filename.as_deref().unwrap_or_default(),
            media_kind = kind.as_str(),
            max_seconds = max_seconds,
            "processing series"
        );

        match kind {
            MediaKind::Image => match decoder::decode_image(&upload.bytes) {
                Ok(frame) => SeriesResult::single(self.analyzer.analyze(Some(&frame)).await),
                Err(e) => {
                    warn!(error = %e, "image decode failed, returning empty series");
                    SeriesResult::empty()
                }
            },
            MediaKind::Video => {
                let Some(mut video) = self.open_video(upload).await else {
                    return SeriesResult::empty();
                };

                let series = sample_series(&self.analyzer, &mut video, max_seconds).await;
                video.release();
                series
            }
        }
    }

    async fn open_video(&self, upload: &Upload) -> Option<VideoHandle> {
        let result = decoder::open_video(
            &upload.bytes,
            &upload.suffix(),
            self.staging_dir.as_deref(),
            self.fallback_frame_rate,
        )
        .await;

        match result {
            Ok(video) => Some(video),
            Err(e) => {
                warn!(error = %e, "failed to open video");
                None
            }
        }
    }
}

/// Number of whole seconds to sample.
///
/// Bounded by the video's length when frame count and rate are known;
/// otherwise `max_seconds` is sampled blindly and end of stream stops the loop.
pub fn seconds_to_sample(frame_rate: f64, frame_count: u64, max_seconds: u32) -> u32 {
    let duration = if frame_rate > 0.0 {
        frame_count as f64 / frame_rate
    } else {
        0.0
    };

    if duration > 0.0 {
        f64::from(max_seconds).min(duration.max(1.0)).floor() as u32
    } else {
        max_seconds
    }
}

/// Frame index sampled at second `second`
pub fn frame_index_at(second: u32, frame_rate: f64) -> u64 {
    (f64::from(second) * frame_rate).floor() as u64
}

/// Sample one frame per second from `source` until the bound or the first
/// failed read, whichever comes first.
pub async fn sample_series<S: FrameSource + ?Sized>(
    analyzer: &DensityAnalyzer,
    source: &mut S,
    max_seconds: u32,
) -> SeriesResult {
    let frame_rate = source.frame_rate();
    let seconds = seconds_to_sample(frame_rate, source.frame_count(), max_seconds);
    // `seconds` may be an unchecked caller bound; no up-front reserve
    let mut series = Vec::new();

    for second in 0..seconds {
        let frame_index = frame_index_at(second, frame_rate);

        let frame = match source.read_frame_at(frame_index).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(t_seconds = second, frame_index, "end of stream, stopping series");
                break;
            }
            Err(e) => {
                warn!(t_seconds = second, frame_index, error = %e, "frame read failed, stopping series");
                break;
            }
        };

        let result = analyzer.analyze(Some(&frame)).await;
        series.push(SeriesItem {
            t_seconds: f64::from(second),
            result,
        });
    }

    info!(
        planned = seconds,
        sampled = series.len(),
        frame_rate = frame_rate,
        "series sampling finished"
    );

    SeriesResult { series }
}
