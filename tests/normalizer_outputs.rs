//! Normalizer classification and flattening, exercised through the public
//! API with wire-shape assertions.

use serde_json::json;

use cognigy_a2a_gateway::normalizer::{flatten_outputs, normalize, NormalizedOutput};
use cognigy_a2a_gateway::types::Part;
use cognigy_a2a_gateway::upstream::RawOutput;

#[test]
fn audio_and_video_artifacts_infer_mime_and_name() {
    let audio = normalize(&RawOutput::data_only(
        json!({"_audio": {"audioUrl": "https://cdn.example/clip.flac?sig=abc"}}),
    ))
    .unwrap();
    match audio {
        NormalizedOutput::Artifact {
            mime_type, name, ..
        } => {
            assert_eq!(mime_type, "audio/flac");
            assert_eq!(name, "clip.flac");
        }
        other => panic!("expected artifact, got {:?}", other),
    }

    let video = normalize(&RawOutput::data_only(
        json!({"_video": {"videoUrl": "https://cdn.example/"}}),
    ))
    .unwrap();
    match video {
        NormalizedOutput::Artifact {
            mime_type, name, file_url, ..
        } => {
            assert_eq!(mime_type, "video/mp4");
            assert_eq!(name, "video");
            assert_eq!(file_url, "https://cdn.example/");
        }
        other => panic!("expected artifact, got {:?}", other),
    }
}

#[test]
fn artifact_part_order_is_file_then_fallback() {
    let out = normalize(&RawOutput::data_only(
        json!({"_image": {"imageUrl": "https://cdn.example/a.webp"}}),
    ))
    .unwrap();
    let parts = out.parts();
    assert!(matches!(parts[0], Part::File { .. }));
    assert_eq!(parts[1], Part::text("[Image: https://cdn.example/a.webp]"));
}

#[test]
fn structured_payload_round_trips_deep_equal() {
    let payload = json!({
        "text": "Pick a room",
        "quickReplies": [
            {"title": "Suite", "imageUrl": "https://cdn.example/suite.jpg", "payload": {"roomId": 7}},
            {"title": "Twin"}
        ]
    });
    let out = normalize(&RawOutput::data_only(json!({"_quickReplies": payload}))).unwrap();
    match &out.parts()[1] {
        Part::Data { data, .. } => assert_eq!(data["payload"], payload),
        other => panic!("expected data part, got {:?}", other),
    }
}

#[test]
fn every_variant_carries_text() {
    let samples = vec![
        RawOutput::text_only("plain"),
        RawOutput::data_only(json!({"_image": {"imageUrl": "https://x/a.png"}})),
        RawOutput::data_only(json!({"_buttons": {"buttons": [{"title": "Go"}]}})),
        RawOutput::data_only(json!({"_adaptiveCard": {"body": []}})),
        RawOutput::data_only(json!({"anything": [1, 2, 3]})),
        RawOutput { text: None, data: None },
    ];
    for sample in &samples {
        let out = normalize(sample).unwrap();
        assert!(
            out.parts().iter().any(|p| matches!(p, Part::Text { .. })),
            "no text part for {:?}",
            sample
        );
    }
}

#[test]
fn flatten_packs_outputs_in_order() {
    let parts = flatten_outputs(&[
        RawOutput::text_only("one"),
        RawOutput::data_only(json!({"_image": {"imageUrl": "https://x/a.png"}})),
        RawOutput::text_only("two"),
    ]);
    // one text + (file + fallback) + one text
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], Part::text("one"));
    assert!(matches!(parts[1], Part::File { .. }));
    assert_eq!(parts[3], Part::text("two"));
}

#[test]
fn flatten_survives_a_poison_output() {
    let parts = flatten_outputs(&[
        RawOutput::data_only(json!({"_audio": {}})),
        RawOutput::text_only("still here"),
    ]);
    assert_eq!(parts, vec![Part::text("still here")]);
}

#[test]
fn flatten_of_nothing_is_one_empty_text_part() {
    assert_eq!(flatten_outputs(&[]), vec![Part::text("")]);
    // All-poison input degrades the same way.
    let parts = flatten_outputs(&[RawOutput::data_only(json!({"_video": {}}))]);
    assert_eq!(parts, vec![Part::text("")]);
}
