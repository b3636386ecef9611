/// Deserialization tests for completion payloads shaped like real service
/// responses, plus the request body we send.
#[cfg(test)]
mod unit {
    use crate::types::{ChatMessage, CompletionRequest, CompletionResponse, ResponseBlock};
    use crate::GeneratedCode;

    fn parse(json: &str) -> CompletionResponse {
        serde_json::from_str(json).expect("failed to parse response")
    }

    #[test]
    fn parse_full_response() {
        let json = r#"{
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-5",
            "content": [{"type": "text", "text": "```python\nprint(df.shape)\n```"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 812, "output_tokens": 64}
        }"#;
        let resp = parse(json);
        assert_eq!(resp.id.as_deref(), Some("msg_01"));
        assert_eq!(resp.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(resp.usage.as_ref().map(|u| u.output_tokens), Some(64));
        assert_eq!(resp.text(), "```python\nprint(df.shape)\n```");
    }

    #[test]
    fn parse_minimal_response() {
        let resp = parse(r#"{"content": []}"#);
        assert!(resp.id.is_none());
        assert!(resp.usage.is_none());
        assert_eq!(resp.text(), "");
    }

    #[test]
    fn unknown_block_types_are_skipped() {
        let resp = parse(
            r#"{"content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "answer"}
            ]}"#,
        );
        assert!(matches!(resp.content[0], ResponseBlock::Other));
        assert_eq!(resp.text(), "answer");
    }

    #[test]
    fn request_omits_unset_temperature() {
        let req = CompletionRequest {
            model: "m".into(),
            max_tokens: 100,
            temperature: None,
            messages: vec![ChatMessage::user("hi")],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("temperature").is_none());
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hi");
    }

    #[test]
    fn generated_code_prefers_sanitized_text() {
        let code = GeneratedCode::new("%matplotlib inline\nprint(1)", "d");
        assert_eq!(code.code(), "%matplotlib inline\nprint(1)");
        let code = code.with_sanitized("# %matplotlib inline\nprint(1)");
        assert_eq!(code.code(), "# %matplotlib inline\nprint(1)");
        assert_eq!(code.raw_text, "%matplotlib inline\nprint(1)");
    }
}
