use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::{
    catalog::CatalogIndex,
    gateway::{AsyncGateway, Completion, Operation, Outcome},
    session::Turn,
};

/// Event text written to the transcript when no message is given
pub const DEFAULT_RESET_MESSAGE: &str = "Conversation history cleared";

/// Observable state a front-end binds to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub answer_text: String,
    pub question_text: String,
    pub num_tokens: u64,
    pub available_models: Vec<String>,
    pub model_index: usize,
}

/// 前端控制器
///
/// 把前端命令转换为网关操作，并在操作完成时（忙碌标志清除之前）更新`ViewState`
pub struct AdvisorController {
    gateway: AsyncGateway,
    view: Arc<watch::Sender<ViewState>>,
}

impl AdvisorController {
    pub fn new(gateway: AsyncGateway, catalog: &CatalogIndex) -> Self {
        let initial = ViewState {
            available_models: catalog.selector().to_vec(),
            ..ViewState::default()
        };
        let (view, _) = watch::channel(initial);

        Self {
            gateway,
            view: Arc::new(view),
        }
    }

    pub fn submit_question(&self, text: impl Into<String>) -> Completion {
        self.submit(Operation::SendQuestion(text.into()))
    }

    pub fn select_model(&self, index: usize) -> Completion {
        self.submit(Operation::SelectModel(index))
    }

    pub fn reset_history(&self, message: Option<String>) -> Completion {
        let message = message.unwrap_or_else(|| DEFAULT_RESET_MESSAGE.to_string());
        self.submit(Operation::ResetHistory(message))
    }

    pub fn request_voice(&self) -> Completion {
        self.submit(Operation::VoiceToText)
    }

    pub fn speak(&self, text: impl Into<String>) -> Completion {
        self.submit(Operation::TextToVoice(text.into()))
    }

    fn submit(&self, op: Operation) -> Completion {
        let view = self.view.clone();
        self.gateway.submit_with(op, move |outcome| {
            view.send_if_modified(|state| apply_outcome(state, outcome));
        })
    }

    /// Current view state
    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.gateway.is_busy()
    }

    pub fn history(&self) -> Vec<Turn> {
        self.gateway.history()
    }

    pub fn gateway(&self) -> &AsyncGateway {
        &self.gateway
    }
}

/// Fold a finished operation into the view. Returns whether anything changed.
fn apply_outcome(state: &mut ViewState, outcome: &Outcome) -> bool {
    let before = state.clone();

    match outcome {
        Outcome::Answer { reply, .. } => {
            match reply {
                Ok(result) => {
                    state.answer_text = result.content.clone();
                    // Providers that report no usage leave the last count in place
                    if let Some(tokens) = result.token_usage {
                        state.num_tokens = tokens;
                    }
                }
                Err(err) => state.answer_text = err.to_string(),
            }
        }
        Outcome::Transcribed { text } => state.question_text = text.clone(),
        Outcome::ModelSelected { current, .. } => state.model_index = *current,
        Outcome::Spoken | Outcome::HistoryReset => {}
    }

    *state != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::DispatchError, providers::DispatchResult};

    #[test]
    fn test_answer_updates_text_and_tokens() {
        let mut state = ViewState::default();
        let changed = apply_outcome(
            &mut state,
            &Outcome::Answer {
                question: "q".to_string(),
                reply: Ok(DispatchResult {
                    content: "a".to_string(),
                    token_usage: Some(12),
                    resolved_model_name: None,
                }),
            },
        );
        assert!(changed);
        assert_eq!(state.answer_text, "a");
        assert_eq!(state.num_tokens, 12);
    }

    #[test]
    fn test_failure_shows_error_text_and_keeps_tokens() {
        let mut state = ViewState { num_tokens: 7, ..ViewState::default() };
        apply_outcome(
            &mut state,
            &Outcome::Answer {
                question: "q".to_string(),
                reply: Err(DispatchError::Timeout),
            },
        );
        assert_eq!(state.answer_text, "Request timed out!");
        assert_eq!(state.num_tokens, 7);
    }

    #[test]
    fn test_voice_and_selection() {
        let mut state = ViewState::default();
        apply_outcome(&mut state, &Outcome::Transcribed { text: "hello".to_string() });
        apply_outcome(
            &mut state,
            &Outcome::ModelSelected { requested: 3, current: 3, accepted: true },
        );
        assert_eq!(state.question_text, "hello");
        assert_eq!(state.model_index, 3);

        assert!(!apply_outcome(&mut state, &Outcome::HistoryReset));
    }
}
