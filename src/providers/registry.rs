use std::sync::Arc;
use serde::Serialize;

use crate::errors::DispatchError;
use super::{
    ProviderAdapter,
    anthropic::AnthropicAdapter,
    gemini::GeminiAdapter,
    openai::OpenAIAdapter,
};

/// Closed set of adapter families a model name can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Anthropic,
    Gemini,
    OpenAICompatible,
    /// No pattern matched; dispatch must fail instead of guessing
    Unresolved,
}

/// 根据模型名称判断适配器类型
///
/// ## 功能说明
/// 纯函数，对任意输入都返回结果。只看模型名本身，与模型定义在哪个提供商块下无关
///
/// ## 匹配策略（不区分大小写，按顺序）
/// 1. 包含"claude" -> Anthropic
/// 2. 包含"gemini" -> Gemini
/// 3. 包含"gpt"、以"o"加数字开头（o1、o3-mini等推理模型）或包含"deepseek" -> OpenAI兼容
/// 4. 其余 -> Unresolved
///
/// ## 执行例子
/// ```rust,ignore
/// assert_eq!(classify("claude-3-haiku"), AdapterKind::Anthropic);
/// assert_eq!(classify("o1-preview"), AdapterKind::OpenAICompatible);
/// assert_eq!(classify("llama-3"), AdapterKind::Unresolved);
/// ```
pub fn classify(model_name: &str) -> AdapterKind {
    let lower = model_name.to_lowercase();

    if lower.contains("claude") {
        AdapterKind::Anthropic
    } else if lower.contains("gemini") {
        AdapterKind::Gemini
    } else if lower.contains("gpt") || is_reasoning_family(&lower) || lower.contains("deepseek") {
        AdapterKind::OpenAICompatible
    } else {
        AdapterKind::Unresolved
    }
}

/// "o" followed by a digit at the start of the name
fn is_reasoning_family(lower: &str) -> bool {
    let mut chars = lower.chars();
    chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// Adapter registry that hands out the strategy for a model name
///
/// One shared instance per adapter family; adapters hold no state.
#[derive(Clone)]
pub struct AdapterRegistry {
    anthropic: Arc<dyn ProviderAdapter>,
    gemini: Arc<dyn ProviderAdapter>,
    openai: Arc<dyn ProviderAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            anthropic: Arc::new(AnthropicAdapter),
            gemini: Arc::new(GeminiAdapter),
            openai: Arc::new(OpenAIAdapter),
        }
    }

    /// Adapter for a classified kind, `None` for `Unresolved`
    pub fn get(&self, kind: AdapterKind) -> Option<Arc<dyn ProviderAdapter>> {
        match kind {
            AdapterKind::Anthropic => Some(self.anthropic.clone()),
            AdapterKind::Gemini => Some(self.gemini.clone()),
            AdapterKind::OpenAICompatible => Some(self.openai.clone()),
            AdapterKind::Unresolved => None,
        }
    }

    /// 根据模型名称获取对应的适配器
    ///
    /// ## 返回值
    /// - `Ok(Arc<dyn ProviderAdapter>)`: 匹配到的适配器
    /// - `Err(DispatchError::UnresolvedAdapter)`: 模型名不符合任何已知模式
    pub fn adapter_for(&self, model_name: &str) -> Result<Arc<dyn ProviderAdapter>, DispatchError> {
        self.get(classify(model_name))
            .ok_or_else(|| DispatchError::UnresolvedAdapter(model_name.to_string()))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
