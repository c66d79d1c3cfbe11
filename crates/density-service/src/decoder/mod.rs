//! Frame decoding for still images and staged video uploads.

pub mod staging;

use async_trait::async_trait;
use common::frame_extractor::{self, VideoStreamInfo};
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub use staging::StagedUpload;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("upload is empty")]
    EmptyUpload,

    #[error("invalid image data: {0}")]
    InvalidImage(#[from] image::ImageError),

    #[error("failed to stage upload: {0:#}")]
    Staging(anyhow::Error),

    #[error("failed to probe video: {0:#}")]
    Probe(anyhow::Error),

    #[error("failed to extract frame {index}: {reason:#}")]
    Extract { index: u64, reason: anyhow::Error },

    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A decoded RGB frame, owned by the pipeline step that decoded it
#[derive(Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: image.into_rgb8(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.image
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Decode bytes as a single still image; the format is sniffed from content
pub fn decode_image(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyUpload);
    }

    let image = image::load_from_memory(bytes)?;
    debug!(width = image.width(), height = image.height(), "decoded image");
    Ok(Frame::new(image))
}

/// Random-access frame reader over a video
#[async_trait]
pub trait FrameSource: Send {
    /// Frames per second, always positive
    fn frame_rate(&self) -> f64;

    /// Total frame count, 0 if unknown
    fn frame_count(&self) -> u64;

    /// Seek to `frame_index` and decode it; `Ok(None)` at end of stream
    async fn read_frame_at(&mut self, frame_index: u64) -> Result<Option<Frame>, DecodeError>;
}

/// Open video backed by a staged file.
///
/// Owns the staged file; [`VideoHandle::release`] (or drop) removes it.
#[derive(Debug)]
pub struct VideoHandle {
    staged: StagedUpload,
    stream: VideoStreamInfo,
    frame_rate: f64,
}

impl VideoHandle {
    pub fn path(&self) -> &Path {
        self.staged.path()
    }

    pub fn stream_info(&self) -> &VideoStreamInfo {
        &self.stream
    }

    pub fn release(self) {
        self.staged.release();
    }

    #[cfg(test)]
    pub(crate) fn from_parts(staged: StagedUpload, stream: VideoStreamInfo, frame_rate: f64) -> Self {
        Self {
            staged,
            stream,
            frame_rate,
        }
    }
}

/// Frame rate used for sampling: the reported rate when positive,
/// `fallback` otherwise (including NaN)
pub fn effective_frame_rate(reported: f64, fallback: f64) -> f64 {
    if reported.is_finite() && reported > 0.0 {
        reported
    } else {
        fallback
    }
}

#[async_trait]
impl FrameSource for VideoHandle {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_count(&self) -> u64 {
        self.stream.frame_count
    }

    async fn read_frame_at(&mut self, frame_index: u64) -> Result<Option<Frame>, DecodeError> {
        let path = self.path().to_path_buf();
        let frame_rate = self.frame_rate;
        let png = tokio::task::spawn_blocking(move || {
            frame_extractor::extract_frame_png(&path, frame_index, frame_rate)
        })
        .await?
        .map_err(|reason| DecodeError::Extract {
            index: frame_index,
            reason,
        })?;

        match png {
            Some(data) => Ok(Some(Frame::new(image::load_from_memory(&data)?))),
            None => Ok(None),
        }
    }
}

/// Stage `bytes` to disk and open them as a video.
///
/// A reported frame rate of zero or less is replaced by `fallback_frame_rate`.
/// On any failure the staged file is removed before returning.
pub async fn open_video(
    bytes: &[u8],
    suffix: &str,
    staging_dir: Option<&Path>,
    fallback_frame_rate: f64,
) -> Result<VideoHandle, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyUpload);
    }

    let staged = StagedUpload::stage(bytes, staging_dir, suffix).map_err(DecodeError::Staging)?;

    let path: PathBuf = staged.path().to_path_buf();
    let stream = tokio::task::spawn_blocking(move || frame_extractor::probe_video_stream(&path))
        .await?
        .map_err(DecodeError::Probe)?;

    let frame_rate = effective_frame_rate(stream.frame_rate, fallback_frame_rate);

    debug!(
        path = %staged.path().display(),
        reported_frame_rate = stream.frame_rate,
        frame_rate = frame_rate,
        frame_count = stream.frame_count,
        "opened video"
    );

    Ok(VideoHandle {
        staged,
        stream,
        frame_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn encode(image: RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buffer, format)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_png_dimensions() {
        let bytes = encode(RgbImage::from_pixel(64, 48, Rgb([10, 20, 30])), ImageFormat::Png);
        let frame = decode_image(&bytes).unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.pixels().get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_jpeg_dimensions() {
        let bytes = encode(RgbImage::new(33, 17), ImageFormat::Jpeg);
        let frame = decode_image(&bytes).unwrap();
        assert_eq!((frame.width(), frame.height()), (33, 17));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(DecodeError::InvalidImage(_))
        ));
        assert!(matches!(decode_image(&[]), Err(DecodeError::EmptyUpload)));
    }

    #[test]
    fn test_effective_frame_rate() {
        assert_eq!(effective_frame_rate(25.0, 30.0), 25.0);
        assert_eq!(effective_frame_rate(29.97, 30.0), 29.97);
        assert_eq!(effective_frame_rate(0.0, 30.0), 30.0);
        assert_eq!(effective_frame_rate(-12.0, 30.0), 30.0);
        assert_eq!(effective_frame_rate(f64::NAN, 30.0), 30.0);
        assert_eq!(effective_frame_rate(f64::INFINITY, 30.0), 30.0);
    }

    #[tokio::test]
    async fn test_open_empty_video_fails_without_staging() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_video(&[], ".mp4", Some(dir.path()), 30.0).await;

        assert!(matches!(result, Err(DecodeError::EmptyUpload)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_open_garbage_video_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_video(b"not a video container", ".mp4", Some(dir.path()), 30.0).await;

        // Fails at probe time whether or not ffprobe is installed
        assert!(matches!(result, Err(DecodeError::Probe(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
