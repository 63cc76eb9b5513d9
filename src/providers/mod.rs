pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod registry;

use reqwest::{Url, header::HeaderMap};
use serde::Serialize;
use serde_json::Value;

use crate::{
    catalog::{ModelConfig, ProviderConfig},
    errors::DispatchError,
    session::Turn,
};
use self::{
    anthropic::{AnthropicRequest, AnthropicResponse},
    gemini::{GeminiRequest, GeminiResponse},
    openai::{OpenAIRequest, OpenAIResponse},
};

// Re-export registry for easier access
pub use registry::{AdapterKind, AdapterRegistry, classify};

/// Normalized result of one successful exchange, whatever the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub content: String,
    pub token_usage: Option<u64>,
    pub resolved_model_name: Option<String>,
}

/// Provider-native request body.
///
/// Serialized untagged, so each variant goes over the wire exactly in its
/// provider's own shape.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RequestBody {
    OpenAI(OpenAIRequest),
    Anthropic(AnthropicRequest),
    Gemini(GeminiRequest),
}

/// Provider-native success body. An adapter decodes straight into its own
/// variant; there is no guessing from which keys happen to be present.
#[derive(Debug)]
pub enum ProviderReply {
    OpenAI(OpenAIResponse),
    Anthropic(AnthropicResponse),
    Gemini(GeminiResponse),
}

impl ProviderReply {
    pub fn into_result(self) -> Result<DispatchResult, DispatchError> {
        match self {
            ProviderReply::OpenAI(res) => res.into_dispatch_result(),
            ProviderReply::Anthropic(res) => res.into_dispatch_result(),
            ProviderReply::Gemini(res) => res.into_dispatch_result(),
        }
    }
}

/// Parse the configured provider URL
pub fn base_url(provider: &ProviderConfig) -> Result<Url, DispatchError> {
    Url::parse(&provider.base_url).map_err(|e| {
        DispatchError::transport(format!("invalid URL for provider '{}': {}", provider.name, e))
    })
}

/// Per-provider strategy for shaping requests and reading responses.
///
/// Adapters are stateless. Provider settings, and with them the API key, are
/// borrowed for the duration of one call only.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    fn build_headers(&self, provider: &ProviderConfig, model_name: &str) -> Result<HeaderMap, DispatchError>;

    fn build_request_body(&self, model: &ModelConfig, history: &[Turn]) -> RequestBody;

    /// Request URL. Parts taken from the model name or the key are encoded.
    fn endpoint(&self, provider: &ProviderConfig, model_name: &str) -> Result<Url, DispatchError>;

    /// Decode an error-free success body into this adapter's reply variant
    fn decode(&self, body: Value) -> Result<ProviderReply, serde_json::Error>;

    /// Classify a raw HTTP outcome.
    ///
    /// Order matters: status first, then an embedded `error` object, and only
    /// then the success-path fields.
    fn parse_response(&self, status: u16, body: &str) -> Result<DispatchResult, DispatchError> {
        let parsed = serde_json::from_str::<Value>(body);

        if status != 200 {
            let message = parsed.ok().as_ref().and_then(embedded_error);
            return Err(DispatchError::http(status, message));
        }

        let value = parsed
            .map_err(|e| DispatchError::response(format!("Failed to process response: {}", e)))?;

        if let Some(message) = embedded_error(&value) {
            return Err(DispatchError::ResponseError(message));
        }

        let reply = self
            .decode(value)
            .map_err(|e| DispatchError::response(format!("Unknown response format: {}", e)))?;

        reply.into_result()
    }
}

/// Extract the message of a top-level `error` member, if the body has one
pub fn embedded_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Object(map) => Some(
            map.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        ),
        Value::String(message) => Some(message.clone()),
        _ => None,
    }
}
