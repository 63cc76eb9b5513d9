use reqwest::{
    Url,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde_json::Value;

use crate::{
    catalog::{ModelConfig, ProviderConfig},
    errors::DispatchError,
    providers::{AdapterKind, ProviderAdapter, ProviderReply, RequestBody, base_url, gemini::*},
    session::Turn,
};

/// Google Gemini adapter
///
/// No auth header at all: the key rides in the `key` query parameter of a
/// per-model `:generateContent` endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiAdapter;

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Gemini
    }

    fn build_headers(&self, _provider: &ProviderConfig, _model_name: &str) -> Result<HeaderMap, DispatchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_request_body(&self, _model: &ModelConfig, history: &[Turn]) -> RequestBody {
        RequestBody::Gemini(GeminiRequest::from_history(history))
    }

    /// `{base_url}/{model}:generateContent?key={key}` with the base URL
    /// pointing at the `models` collection
    fn endpoint(&self, provider: &ProviderConfig, model_name: &str) -> Result<Url, DispatchError> {
        let mut url = base_url(provider)?;
        url.path_segments_mut()
            .map_err(|_| {
                DispatchError::transport(format!("invalid URL for provider '{}': not a base URL", provider.name))
            })?
            .pop_if_empty()
            .push(&format!("{}:generateContent", model_name));
        url.query_pairs_mut().append_pair("key", &provider.api_key);
        Ok(url)
    }

    fn decode(&self, body: Value) -> Result<ProviderReply, serde_json::Error> {
        serde_json::from_value::<GeminiResponse>(body).map(ProviderReply::Gemini)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::AUTHORIZATION;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn provider() -> ProviderConfig {
        ProviderConfig {
            name: "google".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/".to_string(),
            api_key: "AIza-test".to_string(),
            models: vec![],
        }
    }

    fn model() -> ModelConfig {
        ModelConfig {
            name: "gemini-1.5-pro".to_string(),
            timeout_seconds: 90,
            max_tokens: 4096,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_history_becomes_contents() {
        let history = vec![Turn::user("hi"), Turn::assistant("hello")];
        let body = serde_json::to_value(GeminiAdapter.build_request_body(&model(), &history)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "hello"}]}
                ]
            })
        );
    }

    #[test]
    fn test_key_in_query_not_headers() {
        let headers = GeminiAdapter.build_headers(&provider(), "gemini-1.5-pro").unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
        assert!(headers.get("x-api-key").is_none());
        assert_eq!(
            GeminiAdapter.endpoint(&provider(), "gemini-1.5-pro").unwrap().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent?key=AIza-test"
        );
    }

    #[test]
    fn test_key_with_reserved_characters_is_encoded() {
        let provider = ProviderConfig {
            api_key: "ab+cd&alt=sse#frag".to_string(),
            ..provider()
        };
        let url = GeminiAdapter.endpoint(&provider, "gemini-1.5-pro").unwrap();

        assert_eq!(url.path(), "/v1beta/models/gemini-1.5-pro:generateContent");
        assert_eq!(url.fragment(), None);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("key".to_string(), "ab+cd&alt=sse#frag".to_string())]);
    }

    #[test]
    fn test_base_url_without_trailing_slash() {
        let provider = ProviderConfig {
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            ..provider()
        };
        let url = GeminiAdapter.endpoint(&provider, "gemini-1.5-pro").unwrap();
        assert_eq!(url.path(), "/v1beta/models/gemini-1.5-pro:generateContent");
    }

    #[test]
    fn test_parse_success() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Bonjour"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 3, "totalTokenCount": 7},
            "modelVersion": "gemini-1.5-pro-002"
        });
        let result = GeminiAdapter.parse_response(200, &body.to_string()).unwrap();
        assert_eq!(result.content, "Bonjour");
        assert_eq!(result.token_usage, Some(7));
        assert_eq!(result.resolved_model_name.as_deref(), Some("gemini-1.5-pro-002"));
    }

    #[test]
    fn test_missing_usage_and_model_default() {
        let body = json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "ok"}]}}]
        });
        let result = GeminiAdapter.parse_response(200, &body.to_string()).unwrap();
        assert_eq!(result.token_usage, Some(0));
        assert_eq!(result.resolved_model_name.as_deref(), Some("gemini"));
    }

    #[test]
    fn test_blocked_candidate_without_parts() {
        let body = json!({"candidates": [{"content": {"role": "model"}, "finishReason": "SAFETY"}]});
        let err = GeminiAdapter.parse_response(200, &body.to_string()).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_embedded_error_message() {
        let body = json!({"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}});
        let err = GeminiAdapter.parse_response(200, &body.to_string()).unwrap_err();
        assert_eq!(err, DispatchError::ResponseError("API key not valid.".to_string()));
    }
}
