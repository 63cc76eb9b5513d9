use serde::{Deserialize, Serialize};

use crate::{errors::DispatchError, providers::DispatchResult, session::Turn};

// OpenAI-style data structures, shared by OpenAI and DeepSeek endpoints

/// Generic `{model, messages}` payload, forwarded as-is
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

impl From<&Turn> for OpenAIMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct OpenAIResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

#[derive(Deserialize, Debug)]
pub struct OpenAIChoice {
    pub message: OpenAIReplyMessage,
}

/// Reply message; `content` is null when the model answered with tool calls only
#[derive(Deserialize, Debug)]
pub struct OpenAIReplyMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct OpenAIUsage {
    pub total_tokens: u64,
}

impl OpenAIResponse {
    /// Take `choices[0].message.content`, `usage.total_tokens` and the echoed model
    pub fn into_dispatch_result(self) -> Result<DispatchResult, DispatchError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::response("No choices in OpenAI response"))?;

        let content = choice
            .message
            .content
            .ok_or_else(|| DispatchError::response("OpenAI response has no message content"))?;

        Ok(DispatchResult {
            content,
            token_usage: self.usage.map(|u| u.total_tokens),
            resolved_model_name: self.model,
        })
    }
}
