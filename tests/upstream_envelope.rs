//! Envelope unwrapping and internal-metadata rules, as both adapters apply
//! them.

use serde_json::json;

use cognigy_a2a_gateway::upstream::envelope::{expand_output, is_internal_metadata};
use cognigy_a2a_gateway::upstream::RawOutput;

#[test]
fn metadata_entries_are_internal_unless_they_wrap_a_default_channel() {
    let plain_metadata = RawOutput {
        text: Some(String::new()),
        data: Some(json!({"_cognigy": {"_messageId": "m", "_finishReason": "stop"}})),
    };
    assert!(is_internal_metadata(&plain_metadata));

    let wrapping = RawOutput {
        text: Some(String::new()),
        data: Some(json!({"_cognigy": {"_default": {"_buttons": {"text": "Go"}}}})),
    };
    assert!(!is_internal_metadata(&wrapping));
}

#[test]
fn extra_top_level_keys_disqualify_the_internal_match() {
    let output = RawOutput {
        text: None,
        data: Some(json!({"_cognigy": {"_messageId": "m"}, "orderId": 1})),
    };
    assert!(!is_internal_metadata(&output));
}

#[test]
fn string_encoded_data_is_decoded_before_both_rules() {
    let raw = json!({"_cognigy": {"_messageId": "m"}}).to_string();
    let output = RawOutput {
        text: None,
        data: Some(json!(raw)),
    };
    assert!(is_internal_metadata(&output));
    assert!(expand_output(output).is_empty());
}

#[test]
fn default_channel_unwrap_discards_duplicate_text() {
    let payload = json!({"text": "Pick", "quickReplies": [{"title": "A"}]});
    let output = RawOutput {
        text: Some("Pick".to_string()),
        data: Some(json!({"_cognigy": {"_default": {"_quickReplies": payload}}})),
    };
    let expanded = expand_output(output);
    assert_eq!(expanded.len(), 1);
    // The raw text is not re-emitted; the normalizer re-renders it from the
    // payload.
    assert_eq!(expanded[0].text, None);
    assert_eq!(expanded[0].data, Some(json!({"_quickReplies": payload})));
}

#[test]
fn one_entry_per_known_key_in_declaration_order() {
    let output = RawOutput::data_only(json!({"_cognigy": {"_default": {
        "_adaptiveCard": {"body": []},
        "_quickReplies": {"quickReplies": []},
        "_gallery": {"items": []}
    }}}));
    let expanded = expand_output(output);
    let keys: Vec<&str> = expanded
        .iter()
        .map(|entry| {
            entry
                .data
                .as_ref()
                .and_then(|d| d.as_object())
                .and_then(|m| m.keys().next())
                .map(String::as_str)
                .unwrap()
        })
        .collect();
    assert_eq!(keys, vec!["_quickReplies", "_gallery", "_adaptiveCard"]);
}

#[test]
fn root_media_keys_surface_with_no_text() {
    let output = RawOutput {
        text: Some("ignored".to_string()),
        data: Some(json!({"_video": {"videoUrl": "https://x/v.mp4"}})),
    };
    let expanded = expand_output(output);
    assert_eq!(expanded.len(), 1);
    assert_eq!(expanded[0].text, None);
    assert!(expanded[0].data.as_ref().unwrap().get("_video").is_some());
}

#[test]
fn bare_text_passes_through_and_custom_data_is_forwarded() {
    assert_eq!(
        expand_output(RawOutput::text_only("hi")),
        vec![RawOutput::text_only("hi")]
    );

    let custom = RawOutput::data_only(json!({"orderId": 42, "_fallbackText": "fb"}));
    assert_eq!(expand_output(custom.clone()), vec![custom]);
}
