// Anthropic Adapter Implementation
use reqwest::{
    Url,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde_json::Value;

use crate::{
    catalog::{ModelConfig, ProviderConfig},
    errors::DispatchError,
    providers::{AdapterKind, ProviderAdapter, ProviderReply, RequestBody, base_url, anthropic::*},
    session::Turn,
};

/// Value sent in the `anthropic-version` header
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic adapter
///
/// Authenticates with `x-api-key` instead of a bearer token and injects
/// `max_tokens` from the model settings into every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Anthropic
    }

    fn build_headers(&self, provider: &ProviderConfig, _model_name: &str) -> Result<HeaderMap, DispatchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut key = HeaderValue::from_str(&provider.api_key)
            .map_err(|_| DispatchError::transport(format!("API key of provider '{}' is not a valid header value", provider.name)))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        Ok(headers)
    }

    fn build_request_body(&self, model: &ModelConfig, history: &[Turn]) -> RequestBody {
        RequestBody::Anthropic(AnthropicRequest {
            model: model.name.clone(),
            messages: history.iter().map(Message::from).collect(),
            max_tokens: model.max_tokens,
        })
    }

    fn endpoint(&self, provider: &ProviderConfig, _model_name: &str) -> Result<Url, DispatchError> {
        base_url(provider)
    }

    fn decode(&self, body: Value) -> Result<ProviderReply, serde_json::Error> {
        serde_json::from_value::<AnthropicResponse>(body).map(ProviderReply::Anthropic)
    }
}
