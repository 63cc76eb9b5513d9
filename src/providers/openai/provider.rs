use reqwest::{
    Url,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde_json::Value;

use crate::{
    catalog::{ModelConfig, ProviderConfig},
    errors::DispatchError,
    providers::{AdapterKind, ProviderAdapter, ProviderReply, RequestBody, base_url, openai::*},
    session::Turn,
};

/// OpenAI-compatible adapter (OpenAI, DeepSeek, o-series reasoning models)
///
/// Bearer auth, the generic payload without any additions, and the provider
/// URL used verbatim as the endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAIAdapter;

impl ProviderAdapter for OpenAIAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::OpenAICompatible
    }

    fn build_headers(&self, provider: &ProviderConfig, _model_name: &str) -> Result<HeaderMap, DispatchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", provider.api_key))
            .map_err(|_| DispatchError::transport(format!("API key of provider '{}' is not a valid header value", provider.name)))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        Ok(headers)
    }

    fn build_request_body(&self, model: &ModelConfig, history: &[Turn]) -> RequestBody {
        RequestBody::OpenAI(OpenAIRequest {
            model: model.name.clone(),
            messages: history.iter().map(OpenAIMessage::from).collect(),
        })
    }

    fn endpoint(&self, provider: &ProviderConfig, _model_name: &str) -> Result<Url, DispatchError> {
        base_url(provider)
    }

    fn decode(&self, body: Value) -> Result<ProviderReply, serde_json::Error> {
        serde_json::from_value::<OpenAIResponse>(body).map(ProviderReply::OpenAI)
    }
}
