use serde::{Deserialize, Serialize};

use crate::{
    errors::DispatchError,
    providers::DispatchResult,
    session::{Role, Turn},
};

/// Echoed model name used when the response carries none
pub const DEFAULT_GEMINI_MODEL: &str = "gemini";

// Gemini-specific data structures for API communication

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeminiContent {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeminiPart {
    #[serde(default)]
    pub text: String,
}

impl GeminiRequest {
    /// Rewrite the whole turn history into `contents`, assistant turns as "model"
    pub fn from_history(history: &[Turn]) -> Self {
        let contents = history
            .iter()
            .map(|turn| GeminiContent {
                role: gemini_role(turn.role).to_string(),
                parts: vec![GeminiPart { text: turn.content.clone() }],
            })
            .collect();

        Self { contents }
    }
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

#[derive(Deserialize, Debug)]
pub struct GeminiResponse {
    pub candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(alias = "modelVersion", default)]
    pub model: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct GeminiCandidate {
    pub content: GeminiContent,
    #[serde(rename = "finishReason", default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UsageMetadata {
    #[serde(rename = "totalTokenCount")]
    pub total_token_count: Option<u64>,
}

impl GeminiResponse {
    /// Take `candidates[0].content.parts[0].text`.
    ///
    /// Usage and model name are optional in Gemini replies and fall back to
    /// 0 and "gemini" instead of failing the turn.
    pub fn into_dispatch_result(self) -> Result<DispatchResult, DispatchError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::response("No candidates in Gemini response"))?;

        let part = candidate.content.parts.into_iter().next().ok_or_else(|| {
            DispatchError::response(format!(
                "Gemini candidate has no content parts (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;

        let tokens = self
            .usage_metadata
            .and_then(|u| u.total_token_count)
            .unwrap_or(0);

        Ok(DispatchResult {
            content: part.text,
            token_usage: Some(tokens),
            resolved_model_name: Some(self.model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string())),
        })
    }
}
