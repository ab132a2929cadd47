//! MIME inference for media URLs.
//!
//! The backend delivers media as bare URLs; the A2A file part needs a MIME
//! type and a filename. Both are derived from the URL path, ignoring any
//! query string.

use std::fmt;

/// The three media categories the backend can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    /// Capitalized label used in the `[<Kind>: <url>]` text fallback.
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "Image",
            MediaKind::Audio => "Audio",
            MediaKind::Video => "Video",
        }
    }

    /// Filename used when the URL has no usable final path segment.
    pub fn default_name(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// MIME type used when the URL extension is unknown.
    pub fn fallback_mime(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Audio => "audio/mpeg",
            MediaKind::Video => "video/mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Strip any query string (and fragment) from a URL.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Lower-cased extension of the URL's final path segment, query ignored.
fn extension(url: &str) -> Option<String> {
    let path = strip_query(url);
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Infer the MIME type for a media URL.
///
/// Unknown extensions fall back to the kind's default. Two URLs differing
/// only in query string always yield the same MIME type.
pub fn infer_mime(kind: MediaKind, url: &str) -> &'static str {
    let Some(ext) = extension(url) else {
        return kind.fallback_mime();
    };

    let known = match kind {
        MediaKind::Image => match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "gif" => Some("image/gif"),
            "webp" => Some("image/webp"),
            "svg" => Some("image/svg+xml"),
            "bmp" => Some("image/bmp"),
            "ico" => Some("image/x-icon"),
            _ => None,
        },
        MediaKind::Audio => match ext.as_str() {
            "mp3" => Some("audio/mpeg"),
            "ogg" => Some("audio/ogg"),
            "wav" => Some("audio/wav"),
            "m4a" => Some("audio/mp4"),
            "aac" => Some("audio/aac"),
            "flac" => Some("audio/flac"),
            "webm" => Some("audio/webm"),
            _ => None,
        },
        MediaKind::Video => match ext.as_str() {
            "mp4" | "m4v" => Some("video/mp4"),
            "webm" => Some("video/webm"),
            "ogg" => Some("video/ogg"),
            "avi" => Some("video/x-msvideo"),
            "mov" => Some("video/quicktime"),
            "mkv" => Some("video/x-matroska"),
            _ => None,
        },
    };

    known.unwrap_or_else(|| kind.fallback_mime())
}

/// Extract a filename from the URL's final path segment.
///
/// Falls back to the kind's default name when the path ends in `/` or the
/// URL has no path.
pub fn file_name(kind: MediaKind, url: &str) -> String {
    let path = strip_query(url);
    // Skip the scheme's double slash so "https://host" yields no segment.
    let after_scheme = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    match after_scheme.split('/').skip(1).last() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => kind.default_name().to_string(),
    }
}
