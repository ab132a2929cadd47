//! Envelope unwrapping shared by both adapters.
//!
//! The backend wraps structured UI outputs as `data._cognigy._default.<type>`
//! and interleaves internal metadata records (message ids, finish reasons)
//! that carry no user-visible content. Both adapters unwrap before handing
//! records to the normalizer, so the normalizer only ever sees the expected
//! top-level key shape.

use serde_json::{Map, Value};

use super::RawOutput;

/// Structured UI keys recognized under `_cognigy._default`.
const DEFAULT_CHANNEL_KEYS: &[&str] = &[
    "_quickReplies",
    "_gallery",
    "_buttons",
    "_list",
    "_adaptiveCard",
];

/// Media keys recognized at the data root.
const MEDIA_KEYS: &[&str] = &["_image", "_audio", "_video"];

/// JSON-decode a data field that arrived as a string (the REST response
/// path serializes some data maps). Non-string values pass through.
pub fn decode_data(data: Option<Value>) -> Option<Value> {
    match data {
        Some(Value::String(raw)) => match serde_json::from_str(&raw) {
            Ok(decoded) => Some(decoded),
            // Undecodable strings stay as-is; the normalizer forwards them.
            Err(_) => Some(Value::String(raw)),
        },
        other => other,
    }
}

/// Whether a record is internal metadata: empty/absent text AND a data map
/// whose only top-level key is `_cognigy` with no `_default` inside.
///
/// Records whose `_cognigy` sub-map contains `_default` wrap real UI output
/// and are NOT internal.
pub fn is_internal_metadata(output: &RawOutput) -> bool {
    if output.text.as_deref().is_some_and(|t| !t.is_empty()) {
        return false;
    }
    let Some(map) = decode_data(output.data.clone()).and_then(|d| d.as_object().cloned()) else {
        return false;
    };
    if map.is_empty() || !map.keys().all(|key| key == "_cognigy") {
        return false;
    }
    let has_default = map
        .get("_cognigy")
        .and_then(Value::as_object)
        .is_some_and(|inner| inner.contains_key("_default"));
    !has_default
}

/// Unwrap one raw record into zero or more normalizer-ready records.
///
/// - structured content under `_cognigy._default` yields one record per
///   known key, hoisted to the top level with no text (the text is a
///   duplicate of the payload's inner text and is re-rendered downstream);
/// - media keys at the data root are surfaced one record per key;
/// - otherwise non-empty text yields a single text record;
/// - internal metadata yields nothing;
/// - anything else (custom/unknown data) is forwarded unchanged.
pub fn expand_output(output: RawOutput) -> Vec<RawOutput> {
    let text = output.text.clone();
    let data = decode_data(output.data);

    if let Some(map) = data.as_ref().and_then(Value::as_object) {
        if let Some(default_channel) = map
            .get("_cognigy")
            .and_then(Value::as_object)
            .and_then(|inner| inner.get("_default"))
            .and_then(Value::as_object)
        {
            let unwrapped = hoist_keys(default_channel, DEFAULT_CHANNEL_KEYS);
            if !unwrapped.is_empty() {
                return unwrapped;
            }
        }

        let media = hoist_keys(map, MEDIA_KEYS);
        if !media.is_empty() {
            return media;
        }
    }

    if let Some(text) = text.filter(|t| !t.is_empty()) {
        return vec![RawOutput::text_only(text)];
    }

    let record = RawOutput { text: None, data };
    if record.data.is_none() || is_internal_metadata(&record) {
        return Vec::new();
    }
    vec![record]
}

/// One record per known key present in the map, key hoisted to the top level.
fn hoist_keys(map: &Map<String, Value>, keys: &[&str]) -> Vec<RawOutput> {
    keys.iter()
        .filter_map(|key| {
            map.get(*key).map(|payload| {
                RawOutput::data_only(Value::Object(Map::from_iter([(
                    key.to_string(),
                    payload.clone(),
                )])))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_only_record_is_internal() {
        let output = RawOutput::data_only(json!({"_cognigy": {"_messageId": "x"}}));
        assert!(is_internal_metadata(&output));
    }

    #[test]
    fn default_channel_wrapper_is_not_internal() {
        let output = RawOutput::data_only(json!({
            "_cognigy": {"_default": {"_quickReplies": {"text": "Pick"}}}
        }));
        assert!(!is_internal_metadata(&output));
    }

    #[test]
    fn text_record_is_not_internal() {
        let output = RawOutput {
            text: Some("hi".into()),
            data: Some(json!({"_cognigy": {"_messageId": "x"}})),
        };
        assert!(!is_internal_metadata(&output));
    }

    #[test]
    fn string_encoded_data_is_decoded_for_the_check() {
        let output = RawOutput {
            text: Some("".into()),
            data: Some(json!(r#"{"_cognigy": {"_finishReason": "stop"}}"#)),
        };
        assert!(is_internal_metadata(&output));
    }

    #[test]
    fn expand_unwraps_default_channel() {
        let payload = json!({"text": "Pick", "quickReplies": [{"title": "A"}]});
        let output = RawOutput {
            text: Some("Pick".into()),
            data: Some(json!({"_cognigy": {"_default": {"_quickReplies": payload}}})),
        };
        let expanded = expand_output(output);
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].text, None);
        assert_eq!(expanded[0].data, Some(json!({"_quickReplies": payload})));
    }

    #[test]
    fn expand_emits_one_record_per_known_key() {
        let output = RawOutput::data_only(json!({
            "_cognigy": {"_default": {
                "_quickReplies": {"text": "a"},
                "_buttons": {"text": "b"}
            }}
        }));
        let expanded = expand_output(output);
        assert_eq!(expanded.len(), 2);
        assert!(expanded[0].data.as_ref().unwrap().get("_quickReplies").is_some());
        assert!(expanded[1].data.as_ref().unwrap().get("_buttons").is_some());
    }

    #[test]
    fn expand_surfaces_root_media_keys() {
        let output = RawOutput::data_only(json!({
            "_image": {"imageUrl": "https://x/a.png"},
            "_audio": {"audioUrl": "https://x/a.mp3"}
        }));
        let expanded = expand_output(output);
        assert_eq!(expanded.len(), 2);
        assert!(expanded[0].data.as_ref().unwrap().get("_image").is_some());
        assert!(expanded[1].data.as_ref().unwrap().get("_audio").is_some());
    }

    #[test]
    fn expand_passes_plain_text_through() {
        let expanded = expand_output(RawOutput::text_only("Hello"));
        assert_eq!(expanded, vec![RawOutput::text_only("Hello")]);
    }

    #[test]
    fn expand_drops_internal_metadata() {
        let output = RawOutput {
            text: Some("".into()),
            data: Some(json!({"_cognigy": {"_messageId": "x", "_finishReason": "stop"}})),
        };
        assert!(expand_output(output).is_empty());
    }

    #[test]
    fn expand_forwards_custom_data() {
        let output = RawOutput::data_only(json!({"orderId": 42}));
        let expanded = expand_output(output.clone());
        assert_eq!(expanded, vec![output]);
    }

    #[test]
    fn expand_drops_fully_empty_records() {
        let output = RawOutput { text: Some(String::new()), data: None };
        assert!(expand_output(output).is_empty());
    }
}
