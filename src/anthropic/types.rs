//! Request and response types for the Anthropic Messages API.
//!
//! Everything derives `Serialize` and `Deserialize` to match the JSON of the
//! `v1/messages` endpoint.

use serde::{Deserialize, Serialize};

/// Request body for `/v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    /// Model identifier (e.g. "claude-sonnet-4-5-20250929").
    pub model: String,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Conversation turns.
    pub messages: Vec<Message>,
}

impl MessagesRequest {
    /// Single-turn request with the prompt as the user message.
    pub fn user(model: &str, max_tokens: u32, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            messages: vec![Message {
                role: "user".into(),
                content: prompt.to_string(),
            }],
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "user" or "assistant".
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Response from `/v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Response id assigned by the API.
    pub id: String,
    /// Content blocks.
    pub content: Vec<ContentBlock>,
    /// Model that produced the response.
    pub model: String,
    /// Why generation stopped (e.g. "end_turn", "max_tokens").
    pub stop_reason: Option<String>,
    /// Input and output token counts.
    pub usage: Usage,
}

impl MessagesResponse {
    /// Concatenated text blocks; other block types are skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// One content block of a response.
///
/// `content_type` maps to the JSON `"type"` field. Blocks without text
/// (e.g. "thinking") get an empty `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

/// Token usage for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_request_has_single_message() {
        let req = MessagesRequest::user("claude-sonnet-4-5-20250929", 5000, "Translate this");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_tokens"], 5000);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Translate this");
    }

    #[test]
    fn text_joins_only_text_blocks() {
        let api_json = r#"{
            "id": "msg_123",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Awakening "},
                {"type": "text", "text": "mind"}
            ],
            "model": "claude-sonnet-4-5-20250929",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 15}
        }"#;
        let resp: MessagesResponse = serde_json::from_str(api_json).unwrap();
        assert_eq!(resp.text(), "Awakening mind");
        assert!(resp.content[0].text.is_empty());
    }

    #[test]
    fn content_block_type_field_renames_correctly() {
        let block = ContentBlock {
            content_type: "text".into(),
            text: "hello".into(),
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type""#));
        assert!(!json.contains("content_type"));
    }

    #[test]
    fn messages_response_null_stop_reason() {
        let json = r#"{
            "id": "msg_456",
            "content": [],
            "model": "test",
            "stop_reason": null,
            "usage": {"input_tokens": 0, "output_tokens": 0}
        }"#;
        let resp: MessagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.stop_reason, None);
        assert_eq!(resp.text(), "");
    }
}
