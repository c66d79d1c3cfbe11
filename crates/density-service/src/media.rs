use serde::{Deserialize, Serialize};
use std::path::Path;

/// File extensions handled as video, compared case-insensitively
pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// An uploaded file together with the metadata the transport delivered
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl Upload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Default::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn kind(&self) -> MediaKind {
        classify(
            self.filename.as_deref().unwrap_or_default(),
            self.content_type.as_deref().unwrap_or_default(),
        )
    }

    /// Lowercased extension with a leading dot, or empty
    pub fn suffix(&self) -> String {
        self.filename
            .as_deref()
            .and_then(extension)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default()
    }
}

/// Decide image vs. video handling from upload metadata.
///
/// Anything not recognized as video is treated as an image.
pub fn classify(filename: &str, content_type: &str) -> MediaKind {
    let video_content_type = content_type
        .trim()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("video/"));

    let video_extension =
        extension(filename).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()));

    if video_content_type || video_extension {
        MediaKind::Video
    } else {
        MediaKind::Image
    }
}

fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
