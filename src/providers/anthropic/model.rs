use serde::{Deserialize, Serialize};

use crate::{errors::DispatchError, providers::DispatchResult, session::Turn};

/// Anthropic Messages API request.
///
/// Same `{model, messages}` core as the generic payload, plus the
/// `max_tokens` field Anthropic rejects requests without.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

/// Message structure for chat conversations
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: String, // "user" or "assistant"
    pub content: String,
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }
    }
}

/// Response body of the Messages API
#[derive(Deserialize, Debug)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Content block within a response
#[derive(Deserialize, Debug, Clone)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub type_field: String, // "text", "tool_use", ...
    #[serde(default)]
    pub text: Option<String>,
}

/// Token usage information
#[derive(Deserialize, Debug, Clone)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl AnthropicResponse {
    /// Take `content[0].text` and report usage as input plus output tokens
    pub fn into_dispatch_result(self) -> Result<DispatchResult, DispatchError> {
        let block = self
            .content
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::response("No content in Anthropic response"))?;

        let content = block.text.ok_or_else(|| {
            DispatchError::response(format!("Anthropic content block of type '{}' has no text", block.type_field))
        })?;

        Ok(DispatchResult {
            content,
            token_usage: self.usage.map(|u| u.input_tokens + u.output_tokens),
            resolved_model_name: self.model,
        })
    }
}
