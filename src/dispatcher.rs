use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::Instrument;

use crate::{
    catalog::CatalogIndex,
    config::HttpClientConfig,
    errors::{AppError, DispatchError},
    metrics::{DispatchRecord, MetricsCollector},
    providers::{AdapterRegistry, DispatchResult},
    session::{ChatDispatch, Turn},
};

/// Resolves a model, shapes the request for its provider and performs the
/// single HTTP attempt.
#[derive(Clone)]
pub struct Dispatcher {
    catalog: Arc<CatalogIndex>,
    adapters: AdapterRegistry,
    client: Client,
    metrics: MetricsCollector,
}

/// Build the shared outbound client.
///
/// No global timeout is set here; each request carries its model's own.
pub fn build_http_client(config: &HttpClientConfig) -> Result<Client, AppError> {
    Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_seconds))
        .build()
        .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))
}

impl Dispatcher {
    pub fn new(catalog: Arc<CatalogIndex>, client: Client) -> Self {
        Self {
            catalog,
            adapters: AdapterRegistry::new(),
            client,
            metrics: MetricsCollector::new(),
        }
    }

    /// Share an existing collector instead of the private default one
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn catalog(&self) -> &Arc<CatalogIndex> {
        &self.catalog
    }

    /// 向模型发送完整对话历史
    ///
    /// ## 内部实现逻辑
    /// 1. 在目录中解析模型，失败返回`UnknownModel`
    /// 2. 按模型名选择适配器，失败返回`UnresolvedAdapter`
    /// 3. 由适配器构造请求头、请求体和端点
    /// 4. 以模型配置的超时时间发送一次POST，不重试
    /// 5. 超时 -> `Timeout`；其他传输错误 -> `TransportError`；
    ///    其余交给适配器的`parse_response`分类
    pub async fn send(&self, model_name: &str, history: &[Turn]) -> Result<DispatchResult, DispatchError> {
        let start = self.metrics.record_dispatch_start();
        let result = self.execute(model_name, history).await;

        let provider = self
            .catalog
            .resolve(model_name)
            .map(|(p, _)| p.name.as_str())
            .unwrap_or("unknown");
        let record = match &result {
            Ok(reply) => DispatchRecord::Success { tokens: reply.token_usage },
            Err(err) => DispatchRecord::Failure { kind: err.kind() },
        };
        self.metrics.record_dispatch_end(start, provider, model_name, record).await;

        result
    }

    async fn execute(&self, model_name: &str, history: &[Turn]) -> Result<DispatchResult, DispatchError> {
        let (provider, model) = self
            .catalog
            .resolve(model_name)
            .ok_or_else(|| DispatchError::UnknownModel(model_name.to_string()))?;
        let adapter = self.adapters.adapter_for(model_name)?;

        let headers = adapter.build_headers(provider, model_name)?;
        let body = adapter.build_request_body(model, history);
        // The Gemini endpoint embeds the key; it must never reach a log line
        let url = adapter.endpoint(provider, model_name)?;
        let timeout = Duration::from_secs(model.timeout_seconds);

        let span = tracing::info_span!(
            "dispatch",
            model = %model_name,
            provider = %provider.name,
            adapter = ?adapter.kind(),
        );

        async move {
            tracing::info!(turns = history.len(), timeout_seconds = model.timeout_seconds, "Sending request");

            let response = self
                .client
                .post(url)
                .headers(headers)
                .json(&body)
                .timeout(timeout)
                .send()
                .await
                .map_err(classify_transport_error)?;

            let status = response.status().as_u16();
            let text = response.text().await.map_err(classify_transport_error)?;

            let result = adapter.parse_response(status, &text);
            match &result {
                Ok(reply) => tracing::info!(
                    status,
                    tokens = reply.token_usage,
                    resolved_model = reply.resolved_model_name.as_deref().unwrap_or("-"),
                    "Response received"
                ),
                Err(err) => tracing::warn!(status, error_kind = err.kind(), error = %err, "Provider call failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Timeouts are their own class; everything else is a transport failure.
/// The URL is stripped because Gemini URLs carry the key.
fn classify_transport_error(err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        DispatchError::Timeout
    } else {
        DispatchError::transport(err.without_url().to_string())
    }
}

#[async_trait]
impl ChatDispatch for Dispatcher {
    async fn send(&self, model_name: &str, history: &[Turn]) -> Result<DispatchResult, DispatchError> {
        Dispatcher::send(self, model_name, history).await
    }
}
