//! Frame extraction utilities for staged video files
//!
//! This module wraps `ffprobe` and `ffmpeg` to read stream metadata from a
//! video file and to pull single frames out of it by frame index.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, error};

/// Video stream metadata as reported by ffprobe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoStreamInfo {
    /// Frames per second, 0.0 when the container does not report one
    pub frame_rate: f64,

    /// Total frame count, 0 when unknown
    pub frame_count: u64,

    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
}

/// Probe the first video stream of a file using ffprobe
pub fn probe_video_stream(video_path: &Path) -> Result<VideoStreamInfo> {
    debug!(video = %video_path.display(), "probing video stream");

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames",
            "-of",
            "json",
        ])
        .arg(video_path)
        .stdin(Stdio::null())
        .output()
        .context("failed to execute ffprobe")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe failed: {:?}", output.status);
    }

    let output_str =
        String::from_utf8(output.stdout).context("ffprobe output is not valid UTF-8")?;

    let info = parse_stream_probe(&output_str)?;

    debug!(
        video = %video_path.display(),
        frame_rate = info.frame_rate,
        frame_count = info.frame_count,
        width = info.width,
        height = info.height,
        "probed video stream successfully"
    );

    Ok(info)
}

/// Parse ffprobe's JSON output for a single selected video stream
pub fn parse_stream_probe(json: &str) -> Result<VideoStreamInfo> {
    let probe: ProbeOutput =
        serde_json::from_str(json).context("failed to parse ffprobe output")?;

    let stream = probe
        .streams
        .into_iter()
        .next()
        .context("no video stream found")?;

    let avg_rate = stream
        .avg_frame_rate
        .as_deref()
        .map(parse_frame_rate)
        .unwrap_or(0.0);
    let frame_rate = if avg_rate > 0.0 {
        avg_rate
    } else {
        stream
            .r_frame_rate
            .as_deref()
            .map(parse_frame_rate)
            .unwrap_or(0.0)
    };

    // Matroska and WebM usually leave nb_frames out or report "N/A"
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .unwrap_or(0);

    Ok(VideoStreamInfo {
        frame_rate,
        frame_count,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
///
/// Returns 0.0 for anything unparseable or with a zero denominator.
pub fn parse_frame_rate(rate: &str) -> f64 {
    let rate = rate.trim();
    let parsed = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den == 0.0 {
                0.0
            } else {
                num / den
            }
        }
        None => rate.parse().unwrap_or(0.0),
    };

    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

/// Input-side seek target for `frame_index`, half a frame early so the
/// accurate seek lands on that frame rather than the one after it.
///
/// `None` when `frame_rate` cannot map an index to a timestamp.
pub fn seek_offset_seconds(frame_index: u64, frame_rate: f64) -> Option<f64> {
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return None;
    }
    Some(((frame_index as f64 - 0.5) / frame_rate).max(0.0))
}

/// ffmpeg arguments that write the frame at `frame_index` to stdout as PNG.
///
/// With a usable frame rate ffmpeg seeks on the input and decodes from the
/// nearest keyframe; otherwise it falls back to a `select` filter, which
/// decodes every frame up to the target.
pub fn frame_extraction_args(video_path: &Path, frame_index: u64, frame_rate: f64) -> Vec<String> {
    let mut args = vec!["-v".to_string(), "error".to_string()];

    let seek = seek_offset_seconds(frame_index, frame_rate);
    if let Some(offset) = seek {
        args.push("-ss".to_string());
        args.push(format!("{:.6}", offset));
    }

    args.push("-i".to_string());
    args.push(video_path.to_string_lossy().to_string());

    if seek.is_none() {
        args.push("-vf".to_string());
        args.push(format!("select=eq(n\\,{})", frame_index));
    }

    args.extend(
        ["-frames:v", "1", "-f", "image2pipe", "-c:v", "png", "pipe:1"]
            .iter()
            .map(|a| a.to_string()),
    );
    args
}

/// Extract the frame at `frame_index` as PNG data.
///
/// Returns `Ok(None)` when ffmpeg succeeds but produces no frame, which is
/// how a seek past the last frame shows up.
pub fn extract_frame_png(
    video_path: &Path,
    frame_index: u64,
    frame_rate: f64,
) -> Result<Option<Vec<u8>>> {
    let args = frame_extraction_args(video_path, frame_index, frame_rate);

    debug!(args = ?args, frame_index = frame_index, "spawning ffmpeg for frame extraction");

    let output = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .context("failed to execute ffmpeg")?;

    if !output.status.success() {
        error!(
            video = %video_path.display(),
            frame_index = frame_index,
            status = ?output.status,
            "ffmpeg frame extraction failed"
        );
        anyhow::bail!("ffmpeg exited with error: {:?}", output.status);
    }

    if output.stdout.is_empty() {
        debug!(
            video = %video_path.display(),
            frame_index = frame_index,
            "ffmpeg produced no frame, end of stream"
        );
        return Ok(None);
    }

    debug!(
        video = %video_path.display(),
        frame_index = frame_index,
        size_bytes = output.stdout.len(),
        "frame extracted successfully"
    );

    Ok(Some(output.stdout))
}
