use serde::{Deserialize, Serialize};

// ─── Wire types ───────────────────────────────────────────────────────────

/// Request body for a messages-style completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Response body. Only text blocks are of interest; anything else the
/// service adds later deserializes as [`ResponseBlock::Other`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub content: Vec<ResponseBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Concatenated text of every text block, in order.
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|b| match b {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect();
        parts.join("\n")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ─── GeneratedCode ────────────────────────────────────────────────────────

/// Analysis code produced for one task.
///
/// `raw_text` is the code exactly as extracted from the service response.
/// `sanitized_text` stays `None` until the sanitizer has run over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitized_text: Option<String>,
    pub description: String,
    /// `true` when the response could not be parsed and the built-in
    /// dataset summary was substituted.
    #[serde(default)]
    pub fallback: bool,
}

impl GeneratedCode {
    pub fn new(raw_text: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            sanitized_text: None,
            description: description.into(),
            fallback: false,
        }
    }

    pub fn with_sanitized(mut self, sanitized: impl Into<String>) -> Self {
        self.sanitized_text = Some(sanitized.into());
        self
    }

    /// The text that should be executed: sanitized when available.
    pub fn code(&self) -> &str {
        self.sanitized_text.as_deref().unwrap_or(&self.raw_text)
    }
}
