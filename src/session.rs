use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::CatalogIndex,
    errors::{AppError, DispatchError, panic_message},
    providers::DispatchResult,
};

/// Author of a turn
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of the conversation. Never edited after creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Anything that can carry a full history to a model and bring back one reply.
///
/// The production implementation is [`crate::dispatcher::Dispatcher`].
#[async_trait]
pub trait ChatDispatch: Send + Sync {
    async fn send(&self, model_name: &str, history: &[Turn]) -> Result<DispatchResult, DispatchError>;
}

/// Conversation state for a single user: ordered turns plus the selected model.
///
/// History only grows by complete User/Assistant pairs. A failed exchange
/// leaves it exactly as it was before the call.
pub struct ConversationSession {
    catalog: Arc<CatalogIndex>,
    dispatcher: Arc<dyn ChatDispatch>,
    history: Vec<Turn>,
    model_index: usize,
}

impl ConversationSession {
    /// New empty session with the "no model selected" sentinel active
    pub fn new(catalog: Arc<CatalogIndex>, dispatcher: Arc<dyn ChatDispatch>) -> Self {
        Self {
            catalog,
            dispatcher,
            history: Vec::new(),
            model_index: 0,
        }
    }

    /// 提交一轮用户输入
    ///
    /// ## 内部实现逻辑
    /// 1. 未选择模型时直接返回`NoModelSelected`，不修改历史，也不访问网络
    /// 2. 先乐观地追加用户消息，再把包含该消息的完整历史交给分发器
    /// 3. 成功：追加助手回复并返回结果
    /// 4. 失败：把历史截回调用前的长度，返回分类后的错误；分发器panic按响应错误处理
    ///
    /// ## 返回值
    /// - `Ok(DispatchResult)`: 回复内容、token用量、模型回显名
    /// - `Err(DispatchError)`: 分类错误，历史已回滚
    pub async fn submit_user_turn(&mut self, text: &str) -> Result<DispatchResult, DispatchError> {
        let model_name = self.catalog.model_at(self.model_index)?.to_string();

        let checkpoint = self.history.len();
        self.history.push(Turn::user(text));

        let reply = AssertUnwindSafe(self.dispatcher.send(&model_name, &self.history))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(DispatchError::response(format!(
                    "Dispatch failed: {}",
                    panic_message(&*payload)
                )))
            });

        match reply {
            Ok(result) => {
                self.history.push(Turn::assistant(result.content.clone()));
                tracing::debug!(
                    model = %model_name,
                    turns = self.history.len(),
                    "Turn completed"
                );
                Ok(result)
            }
            Err(err) => {
                self.history.truncate(checkpoint);
                tracing::warn!(
                    model = %model_name,
                    error_kind = err.kind(),
                    error = %err,
                    "Turn failed, user message rolled back"
                );
                Err(err)
            }
        }
    }

    /// Select a model by its selector position.
    ///
    /// Index 0 is accepted and disables routing again. Out-of-range indices
    /// are rejected and leave the selection untouched.
    pub fn select_model(&mut self, index: usize) -> Result<usize, AppError> {
        if index >= self.catalog.selector().len() {
            return Err(AppError::validation(format!(
                "Model index {} is out of range (0..{})",
                index,
                self.catalog.selector().len()
            )));
        }
        self.model_index = index;
        tracing::info!(index, model = %self.catalog.selector()[index], "Model selected");
        Ok(index)
    }

    /// Name of the selected model, `None` while the sentinel is active
    pub fn current_model(&self) -> Option<&str> {
        self.catalog.model_at(self.model_index).ok()
    }

    pub fn model_index(&self) -> usize {
        self.model_index
    }

    pub fn is_model_selected(&self) -> bool {
        self.model_index > 0
    }

    /// Drop every turn; model selection is kept
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Snapshot copy of the history
    pub fn history(&self) -> Vec<Turn> {
        self.history.clone()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn catalog(&self) -> &Arc<CatalogIndex> {
        &self.catalog
    }
}
