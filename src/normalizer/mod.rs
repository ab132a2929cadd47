//! Output normalizer — translates one raw backend output into one A2A
//! payload.
//!
//! Pure: no I/O, no suspension. Classification inspects the output's data
//! map in a fixed priority order (media keys, structured UI keys, custom
//! data, plain text); the first matching rule wins. Every normalized output
//! carries at least one text-bearing part, so a text-only downstream
//! consumer never sees an empty event.

pub mod mime;
pub mod render;

use serde_json::{Map, Value};
use tracing::warn;

use crate::types::Part;
use crate::upstream::RawOutput;
use mime::MediaKind;

/// Data-part type label for unrecognized structured payloads.
pub const CUSTOM_DATA_TYPE: &str = "cognigy/data";

/// Media keys in classification priority order, with their URL field.
const MEDIA_KEYS: &[(&str, &str, MediaKind)] = &[
    ("_image", "imageUrl", MediaKind::Image),
    ("_audio", "audioUrl", MediaKind::Audio),
    ("_video", "videoUrl", MediaKind::Video),
];

/// One backend output translated for the A2A surface.
///
/// A tagged union, exhaustively enumerated — consumers discriminate by
/// variant, never by downcasting.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedOutput {
    /// A conversational output: a text part (the human-readable rendering),
    /// optionally followed by a data part with the preserved structured
    /// payload.
    StatusMessage {
        /// Ordered message parts; index 0 is always a text part.
        parts: Vec<Part>,
    },

    /// A binary media output: a file part plus a `[<Kind>: <url>]` text
    /// fallback, with the file fields pre-extracted for artifact metadata.
    Artifact {
        /// Ordered artifact parts: the file part, then the text fallback.
        parts: Vec<Part>,
        /// Inferred MIME type.
        mime_type: String,
        /// Filename taken from the URL's final path segment.
        name: String,
        /// The media URL.
        file_url: String,
    },
}

impl NormalizedOutput {
    /// The parts carried by either variant.
    pub fn parts(&self) -> &[Part] {
        match self {
            NormalizedOutput::StatusMessage { parts } => parts,
            NormalizedOutput::Artifact { parts, .. } => parts,
        }
    }
}

/// Failure to normalize a single output.
///
/// These never fail a whole request: batch flattening and the streaming
/// callback log and skip the one output.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NormalizeError {
    /// A media key was present but its nested URL field was missing/empty.
    #[error("media output '{key}' is missing its URL")]
    MissingMediaUrl {
        /// The media key (`_image` / `_audio` / `_video`).
        key: String,
    },
}

/// Translate one raw backend output into one normalized output.
pub fn normalize(output: &RawOutput) -> Result<NormalizedOutput, NormalizeError> {
    let text = output.text.as_deref().unwrap_or("");

    let Some(data) = output.data.as_ref() else {
        return Ok(plain_text(text));
    };
    let Some(map) = data.as_object() else {
        // Non-object data is forwarded wholesale as a custom payload.
        return Ok(custom_value(text, data));
    };
    if map.is_empty() {
        return Ok(plain_text(text));
    }

    // 1. Media keys — artifact branch.
    for &(key, url_field, kind) in MEDIA_KEYS {
        if let Some(media) = map.get(key) {
            return media_artifact(key, url_field, kind, media);
        }
    }

    // 2. Structured UI keys — status-message branch.
    if let Some(payload) = map.get("_quickReplies") {
        let rendered = render::quick_replies(payload);
        return Ok(structured(text, "quick_replies", payload, rendered));
    }
    if let Some(payload) = map.get("_gallery") {
        // Gallery folds the output text into its own intro line.
        let rendered = render::gallery(payload, output.text.as_deref());
        return Ok(status_message(rendered, Some(data_part("carousel", payload))));
    }
    if let Some(payload) = map.get("_buttons") {
        let rendered = render::buttons(payload);
        return Ok(structured(text, "buttons", payload, rendered));
    }
    if let Some(payload) = map.get("_list") {
        let rendered = render::list(payload);
        return Ok(structured(text, "list", payload, rendered));
    }
    if let Some(payload) = map.get("_adaptiveCard") {
        let rendered = render::adaptive_card(payload);
        return Ok(structured(text, "AdaptiveCard", payload, rendered));
    }

    // 3. Custom / unknown data.
    Ok(custom_map(text, map))
}

/// Map a list of raw outputs into a single flat ordered part sequence.
///
/// Used by the request/response path to pack all outputs into one message.
/// An output that fails to normalize is logged and skipped; empty input (or
/// all outputs skipped) yields a single empty text part.
pub fn flatten_outputs(outputs: &[RawOutput]) -> Vec<Part> {
    let mut parts = Vec::new();
    for (index, output) in outputs.iter().enumerate() {
        match normalize(output) {
            Ok(normalized) => parts.extend_from_slice(normalized.parts()),
            Err(error) => {
                warn!(index, %error, "skipping backend output that failed to normalize");
            }
        }
    }
    if parts.is_empty() {
        parts.push(Part::text(""));
    }
    parts
}

fn plain_text(text: &str) -> NormalizedOutput {
    if text.trim().is_empty() {
        warn!("backend output carried neither text nor data");
        return status_message(String::new(), None);
    }
    status_message(text.to_string(), None)
}

fn media_artifact(
    key: &str,
    url_field: &str,
    kind: MediaKind,
    media: &Value,
) -> Result<NormalizedOutput, NormalizeError> {
    let url = media
        .get(url_field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| NormalizeError::MissingMediaUrl {
            key: key.to_string(),
        })?;

    let mime_type = mime::infer_mime(kind, url).to_string();
    let name = mime::file_name(kind, url);
    let fallback = format!("[{}: {}]", kind.label(), url);

    Ok(NormalizedOutput::Artifact {
        parts: vec![
            Part::file_uri(url, mime_type.clone(), name.clone()),
            Part::text(fallback),
        ],
        mime_type,
        name,
        file_url: url.to_string(),
    })
}

/// Status-message for a structured payload: rendered text (prefixed by the
/// output's own text when both are non-empty) plus the payload preserved
/// verbatim in a data part.
fn structured(text: &str, type_name: &str, payload: &Value, rendered: String) -> NormalizedOutput {
    let text = text.trim();
    let combined = match (text.is_empty(), rendered.is_empty()) {
        (false, false) => format!("{}\n{}", text, rendered),
        (false, true) => text.to_string(),
        _ => rendered,
    };
    status_message(combined, Some(data_part(type_name, payload)))
}

fn custom_map(text: &str, map: &Map<String, Value>) -> NormalizedOutput {
    let text = if !text.trim().is_empty() {
        text.to_string()
    } else {
        map.get("_fallbackText")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };

    let remaining: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| key.as_str() != "_fallbackText" && key.as_str() != "_cognigy")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let data = if remaining.is_empty() {
        None
    } else {
        Some(data_part(CUSTOM_DATA_TYPE, &Value::Object(remaining)))
    };
    status_message(text, data)
}

fn custom_value(text: &str, data: &Value) -> NormalizedOutput {
    status_message(text.to_string(), Some(data_part(CUSTOM_DATA_TYPE, data)))
}

fn status_message(text: String, data: Option<Part>) -> NormalizedOutput {
    let mut parts = vec![Part::text(text)];
    parts.extend(data);
    NormalizedOutput::StatusMessage { parts }
}

fn data_part(type_name: &str, payload: &Value) -> Part {
    Part::data(serde_json::json!({
        "type": type_name,
        "payload": payload,
    }))
}
