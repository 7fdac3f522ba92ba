//! External tests for the Gemini wire types: request serialization and
//! response deserialization.

use serde_json::json;
use source_analyst::attachment::Attachment;
use source_analyst::conversation::Exchange;
use source_analyst::gemini::*;

fn attachment() -> Attachment {
    Attachment::from_bytes("talk.mp3", "audio/mpeg", b"ID3", 1024).expect("attachment")
}

// -- Request serialization ----------------------------------------------------

#[test]
fn test_request_uses_camel_case_keys() {
    let req = GeminiRequest {
        contents: build_chat_contents(&[], "hello", None),
        system_instruction: Some(GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text {
                text: "be precise".into(),
            }],
        }),
        generation_config: Some(GeminiGenerationConfig {
            temperature: 0.2,
            response_mime_type: None,
            response_schema: None,
        }),
    };
    let value = serde_json::to_value(&req).expect("serialize");
    assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be precise");
    assert!(value["systemInstruction"].get("role").is_none());
    assert!(value["generationConfig"].get("responseSchema").is_none());
    assert_eq!(value["contents"][0]["role"], "user");
    assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
}

#[test]
fn test_inline_data_serializes_as_blob() {
    let contents = build_chat_contents(&[], "summarize", Some(&attachment()));
    let value = serde_json::to_value(&contents).expect("serialize");
    let blob = &value[0]["parts"][0]["inlineData"];
    assert_eq!(blob["mimeType"], "audio/mpeg");
    assert_eq!(blob["data"], "SUQz");
    assert_eq!(value[0]["parts"][1]["text"], "summarize");
}

#[test]
fn test_history_alternates_roles() {
    let prior = vec![
        Exchange {
            user: "q1".into(),
            model: "a1".into(),
        },
        Exchange {
            user: "q2".into(),
            model: "a2".into(),
        },
    ];
    let contents = build_chat_contents(&prior, "q3", Some(&attachment()));
    let roles: Vec<_> = contents
        .iter()
        .map(|c| c.role.clone().unwrap_or_default())
        .collect();
    assert_eq!(roles, ["user", "model", "user", "model", "user"]);
    let value = serde_json::to_value(&contents).expect("serialize");
    assert!(value[0]["parts"][0].get("inlineData").is_some());
    assert!(value[4]["parts"][0].get("inlineData").is_none());
}

#[test]
fn test_structured_config_carries_schema() {
    let cfg = GeminiGenerationConfig {
        temperature: 0.5,
        response_mime_type: Some("application/json".into()),
        response_schema: Some(json!({ "type": "ARRAY" })),
    };
    let value = serde_json::to_value(&cfg).expect("serialize");
    assert_eq!(value["responseMimeType"], "application/json");
    assert_eq!(value["responseSchema"]["type"], "ARRAY");
}

// -- Response deserialization -------------------------------------------------

#[test]
fn test_response_text_joins_parts_and_skips_thoughts() {
    let resp: GeminiResponse = serde_json::from_value(json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "Hello " },
                    { "text": "world" }
                ]
            },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "totalTokenCount": 12 }
    }))
    .expect("deserialize");
    assert_eq!(resp.text(), "Hello world");
}

#[test]
fn test_response_without_candidates_is_empty() {
    let resp: GeminiResponse = serde_json::from_value(json!({})).expect("deserialize");
    assert!(resp.candidates.is_empty());
    assert_eq!(resp.text(), "");
}

#[test]
fn test_error_body_deserializes() {
    let resp: GeminiResponse = serde_json::from_value(json!({
        "error": { "code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED" }
    }))
    .expect("deserialize");
    let err = resp.error.expect("error body");
    assert_eq!(err.code, 429);
    assert_eq!(err.message, "Resource exhausted");
}

#[test]
fn test_sse_accumulator_over_split_events() {
    let mut acc = SseAccumulator::new();
    let first = acc.push(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Intro\\n\"}]}}]}\n\ndata: {\"cand");
    assert_eq!(first.len(), 1);
    let rest = acc.push(b"idates\":[{\"content\":{\"parts\":[{\"text\":\":::WORKSPACE_SAVE: x\"}]}}]}\n\n");
    let texts: Vec<String> = rest.into_iter().map(|r| r.expect("text")).collect();
    assert_eq!(texts, vec!["Intro\n:::WORKSPACE_SAVE: x".to_string()]);
    assert_eq!(acc.text(), "Intro\n:::WORKSPACE_SAVE: x");
}
