use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use figment::{Figment, providers::{Format, Toml}};
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{AppError, DispatchError};

/// Label of the synthetic selector entry at index 0
pub const NO_MODEL_SELECTED: &str = "select model";

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 90;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Per-model run-time settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    /// Attributes the gateway does not interpret, kept verbatim
    pub extra: BTreeMap<String, String>,
}

/// One provider block plus all of its models, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<ModelConfig>,
}

/// Read-only index from model name to its provider and model settings.
///
/// Built once at startup and shared behind an `Arc`; nothing mutates it
/// afterwards.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    providers: Vec<ProviderConfig>,
    /// model name -> (provider position, model position)
    index: HashMap<String, (usize, usize)>,
    /// Selector entries; position 0 is the "no model selected" sentinel
    selector: Vec<String>,
}

// Raw document shapes. Numeric attributes stay as JSON values so both
// `timeout = 60` and `timeout = "60"` are accepted and anything else is
// reported with the model name attached.
#[derive(Deserialize, Debug)]
struct RawCatalog {
    #[serde(default)]
    providers: Vec<RawProvider>,
}

#[derive(Deserialize, Debug)]
struct RawProvider {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    key: String,
    models: Option<Vec<RawModel>>,
}

#[derive(Deserialize, Debug)]
struct RawModel {
    #[serde(default)]
    name: String,
    timeout: Option<Value>,
    max_tokens: Option<Value>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl CatalogIndex {
    /// 从目录文件加载提供商与模型索引
    ///
    /// ## 功能说明
    /// 读取TOML格式的目录文件，按文档顺序建立 模型名 -> (提供商, 模型配置) 的索引，
    /// 并生成以"select model"占位项开头的选择列表
    ///
    /// ## 错误处理
    /// 文件缺失、格式错误、提供商缺少url/key/models、模型缺少名称、
    /// 数值属性非法、模型名跨提供商重复，均返回`AppError::ConfigError`
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Configuration file not found: {} ({})", path.display(), e)))?;

        let index = Self::from_toml_str(&contents)
            .map_err(|e| AppError::config(format!("Failed to load {}: {:#}", path.display(), e)))?;

        tracing::info!(
            path = %path.display(),
            providers = index.providers.len(),
            models = index.model_count(),
            "Provider catalog loaded"
        );

        Ok(index)
    }

    /// Parse a catalog document held in memory
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawCatalog = Figment::from(Toml::string(contents))
            .extract()
            .context("Malformed catalog document")?;

        let mut providers = Vec::with_capacity(raw.providers.len());
        for raw_provider in raw.providers {
            providers.push(build_provider(raw_provider)?);
        }

        Self::from_providers(providers)
    }

    /// Build the index from already-validated provider blocks
    pub fn from_providers(providers: Vec<ProviderConfig>) -> Result<Self> {
        if providers.is_empty() {
            bail!("At least one provider must be configured");
        }

        let mut index = HashMap::new();
        let mut selector = vec![NO_MODEL_SELECTED.to_string()];

        for (p, provider) in providers.iter().enumerate() {
            if providers[..p].iter().any(|other| other.name == provider.name) {
                bail!("Provider '{}' is defined more than once", provider.name);
            }
            for (m, model) in provider.models.iter().enumerate() {
                if index.insert(model.name.clone(), (p, m)).is_some() {
                    bail!(
                        "Model '{}' is defined more than once (again under provider '{}')",
                        model.name, provider.name
                    );
                }
                selector.push(model.name.clone());
            }
        }

        Ok(Self { providers, index, selector })
    }

    /// Look up the provider and model configuration for `model_name`
    pub fn resolve(&self, model_name: &str) -> Option<(&ProviderConfig, &ModelConfig)> {
        let &(p, m) = self.index.get(model_name)?;
        let provider = &self.providers[p];
        Some((provider, &provider.models[m]))
    }

    /// Selector entries, sentinel first, then every model in document order
    pub fn selector(&self) -> &[String] {
        &self.selector
    }

    /// Map a selector position to a routable model name.
    ///
    /// Index 0 is the sentinel and yields `NoModelSelected`; positions past the
    /// end yield `UnknownModel`.
    pub fn model_at(&self, index: usize) -> Result<&str, DispatchError> {
        match index {
            0 => Err(DispatchError::NoModelSelected),
            i => self
                .selector
                .get(i)
                .map(String::as_str)
                .ok_or_else(|| DispatchError::UnknownModel(format!("#{}", i))),
        }
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn model_count(&self) -> usize {
        self.selector.len() - 1
    }
}

fn build_provider(raw: RawProvider) -> Result<ProviderConfig> {
    let name = raw.name.trim().to_string();
    if name.is_empty() {
        bail!("A provider block has no name");
    }

    let base_url = raw.url.trim().to_string();
    let api_key = raw.key.trim().to_string();
    if base_url.is_empty() || api_key.is_empty() {
        bail!("<{}> needs url and key entries", name);
    }
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        bail!("<{}> url must start with http:// or https://", name);
    }
    // Keys travel in headers, so reject anything a header cannot carry
    HeaderValue::from_str(&api_key)
        .map_err(|_| anyhow!("<{}> key contains characters not allowed in an HTTP header", name))?;

    let raw_models = raw
        .models
        .ok_or_else(|| anyhow!("<{}> is missing the models section", name))?;

    let models = raw_models
        .into_iter()
        .map(|m| build_model(&name, m))
        .collect::<Result<Vec<_>>>()?;

    Ok(ProviderConfig { name, base_url, api_key, models })
}

fn build_model(provider: &str, raw: RawModel) -> Result<ModelConfig> {
    let name = raw.name.trim().to_string();
    if name.is_empty() {
        bail!("A model entry under <{}> has no name", provider);
    }

    let timeout_seconds = match raw.timeout {
        Some(v) => positive_int(&v)
            .ok_or_else(|| anyhow!("Non-integer attribute 'timeout' in model \"{}\"", name))?,
        None => DEFAULT_TIMEOUT_SECONDS,
    };

    let max_tokens = match raw.max_tokens {
        Some(v) => positive_int(&v)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| anyhow!("Non-integer attribute 'max_tokens' in model \"{}\"", name))?,
        None => DEFAULT_MAX_TOKENS,
    };

    let extra = raw
        .extra
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, text)
        })
        .collect();

    Ok(ModelConfig { name, timeout_seconds, max_tokens, extra })
}

fn positive_int(value: &Value) -> Option<u64> {
    let n = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    (n > 0).then_some(n)
}
