use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    errors::{AppError, DispatchError, panic_message},
    providers::DispatchResult,
    session::{ConversationSession, Turn},
    speech::{SpeechToText, TextToSpeech, strip_recognized_prefix},
    transcript::TranscriptSink,
};

/// Work that can be queued on the lane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    SendQuestion(String),
    VoiceToText,
    TextToVoice(String),
    SelectModel(usize),
    /// Clear the history and write the message to the transcript
    ResetHistory(String),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::SendQuestion(_) => "send_question",
            Operation::VoiceToText => "voice_to_text",
            Operation::TextToVoice(_) => "text_to_voice",
            Operation::SelectModel(_) => "select_model",
            Operation::ResetHistory(_) => "reset_history",
        }
    }
}

/// Result of one finished operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Answer {
        question: String,
        #[serde(serialize_with = "serialize_reply")]
        reply: Result<DispatchResult, DispatchError>,
    },
    Transcribed {
        text: String,
    },
    Spoken,
    ModelSelected {
        requested: usize,
        current: usize,
        accepted: bool,
    },
    HistoryReset,
}

fn serialize_reply<S>(reply: &Result<DispatchResult, DispatchError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    #[derive(Serialize)]
    #[serde(rename_all = "snake_case")]
    enum Shape<'a> {
        Ok(&'a DispatchResult),
        Error { message: String, kind: &'static str },
    }

    match reply {
        Ok(result) => Shape::Ok(result).serialize(serializer),
        Err(err) => Shape::Error { message: err.to_string(), kind: err.kind() }.serialize(serializer),
    }
}

impl Outcome {
    /// Text a front-end shows as the answer, if this outcome carries one
    pub fn answer_text(&self) -> Option<String> {
        match self {
            Outcome::Answer { reply: Ok(result), .. } => Some(result.content.clone()),
            Outcome::Answer { reply: Err(err), .. } => Some(err.to_string()),
            _ => None,
        }
    }
}

/// Out-of-band collaborators the worker talks to
#[derive(Clone)]
pub struct Collaborators {
    pub transcript: Arc<dyn TranscriptSink>,
    pub speech_to_text: Arc<dyn SpeechToText>,
    pub text_to_speech: Arc<dyn TextToSpeech>,
}

type Done = Box<dyn FnOnce(Outcome) + Send>;

struct Job {
    id: Uuid,
    op: Operation,
    done: Done,
}

/// Awaitable side of a submission. Resolves exactly once.
#[derive(Debug)]
pub struct Completion {
    id: Uuid,
    rx: oneshot::Receiver<Outcome>,
}

impl Completion {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn wait(self) -> Result<Outcome, AppError> {
        self.rx.await.map_err(|_| AppError::LaneClosed)
    }
}

/// Single-worker lane that owns the conversation session.
///
/// Submissions run one at a time in FIFO order. The busy counter is raised
/// on submit and lowered only after the submission's callback has returned.
pub struct AsyncGateway {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<watch::Sender<usize>>,
    history: watch::Receiver<Vec<Turn>>,
}

impl AsyncGateway {
    /// 启动工作线程，并把会话的所有权交给它
    ///
    /// ## 内部实现逻辑
    /// 1. 创建无界mpsc通道作为FIFO队列
    /// 2. 创建`watch`通道发布排队数量和历史快照
    /// 3. 在tokio任务中逐个执行作业；每个作业完成后先发布历史快照，
    ///    再调用完成回调，最后递减排队数量
    pub fn spawn(session: ConversationSession, collaborators: Collaborators) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        let (history_tx, history) = watch::channel(session.history());

        let worker = Worker {
            session,
            collaborators,
            history: history_tx,
        };
        tokio::spawn(worker.run(rx, pending.clone()));

        Self { tx, pending, history }
    }

    /// Queue an operation; the outcome is only available through the handle
    pub fn submit(&self, op: Operation) -> Completion {
        self.submit_with(op, |_| {})
    }

    /// Queue an operation with a callback that runs on the worker before the
    /// handle resolves and before the busy counter drops. A panicking callback
    /// is logged and the handle still resolves.
    pub fn submit_with<F>(&self, op: Operation, callback: F) -> Completion
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (reply_tx, rx) = oneshot::channel();

        let done: Done = Box::new(move |outcome| {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(&outcome))) {
                tracing::error!(
                    submission = %id,
                    panic = %panic_message(&*payload),
                    "Completion callback panicked"
                );
            }
            // Caller may have dropped the handle; the callback already ran
            let _ = reply_tx.send(outcome);
        });

        self.pending.send_modify(|n| *n += 1);
        tracing::debug!(submission = %id, op = op.name(), "Operation queued");

        if self.tx.send(Job { id, op, done }).is_err() {
            // The job (and its reply sender) is dropped, so `wait` reports LaneClosed
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            tracing::error!(submission = %id, "Worker lane is gone, submission dropped");
        }

        Completion { id, rx }
    }

    pub fn is_busy(&self) -> bool {
        *self.pending.borrow() > 0
    }

    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Receiver over the number of queued or running operations
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.pending.subscribe()
    }

    /// Wait until nothing is queued or running
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        // Only fails if the sender is gone, which `self` rules out
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// History as of the last finished operation
    pub fn history(&self) -> Vec<Turn> {
        self.history.borrow().clone()
    }

    pub fn subscribe_history(&self) -> watch::Receiver<Vec<Turn>> {
        self.history.clone()
    }
}

struct Worker {
    session: ConversationSession,
    collaborators: Collaborators,
    history: watch::Sender<Vec<Turn>>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>, pending: Arc<watch::Sender<usize>>) {
        tracing::info!("Worker lane started");

        while let Some(Job { id, op, done }) = rx.recv().await {
            let span = tracing::info_span!("lane", submission = %id, op = op.name());
            let outcome = match AssertUnwindSafe(self.execute(op.clone()).instrument(span))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(&*payload);
                    tracing::error!(submission = %id, op = op.name(), panic = %message, "Operation panicked");
                    self.fallback(op, &message)
                }
            };

            self.history.send_replace(self.session.history());
            done(outcome);
            pending.send_modify(|n| *n = n.saturating_sub(1));
        }

        tracing::info!("Worker lane stopped");
    }

    /// Outcome reported when an operation panicked instead of finishing
    fn fallback(&self, op: Operation, message: &str) -> Outcome {
        match op {
            Operation::SendQuestion(question) => Outcome::Answer {
                question,
                reply: Err(DispatchError::response(format!("Dispatch failed: {}", message))),
            },
            Operation::VoiceToText => Outcome::Transcribed {
                text: format!("Speech to text conversion failed: {}", message),
            },
            Operation::TextToVoice(_) => Outcome::Spoken,
            Operation::SelectModel(requested) => Outcome::ModelSelected {
                requested,
                current: self.session.model_index(),
                accepted: false,
            },
            Operation::ResetHistory(_) => Outcome::HistoryReset,
        }
    }

    async fn execute(&mut self, op: Operation) -> Outcome {
        match op {
            Operation::SendQuestion(question) => {
                let reply = self.session.submit_user_turn(&question).await;
                if let Ok(result) = &reply {
                    let model = result
                        .resolved_model_name
                        .as_deref()
                        .or(self.session.current_model())
                        .unwrap_or_default();
                    let tokens = result.token_usage.unwrap_or(0);
                    if let Err(e) = self
                        .collaborators
                        .transcript
                        .log_conversation(&question, &result.content, model, tokens)
                    {
                        tracing::warn!(error = %e, "Failed to write transcript");
                    }
                }
                Outcome::Answer { question, reply }
            }
            Operation::VoiceToText => {
                let engine = self.collaborators.speech_to_text.clone();
                let text = match tokio::task::spawn_blocking(move || engine.listen()).await {
                    Ok(text) => strip_recognized_prefix(&text).to_string(),
                    Err(e) => {
                        tracing::warn!(error = %e, "Speech recognition task failed");
                        format!("Speech to text conversion failed: {}", e)
                    }
                };
                Outcome::Transcribed { text }
            }
            Operation::TextToVoice(text) => {
                let engine = self.collaborators.text_to_speech.clone();
                match tokio::task::spawn_blocking(move || engine.speak(&text)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "Text to speech conversion failed"),
                    Err(e) => tracing::warn!(error = %e, "Speech synthesis task failed"),
                }
                Outcome::Spoken
            }
            Operation::SelectModel(requested) => {
                let accepted = match self.session.select_model(requested) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "Model selection rejected");
                        false
                    }
                };
                Outcome::ModelSelected {
                    requested,
                    current: self.session.model_index(),
                    accepted,
                }
            }
            Operation::ResetHistory(message) => {
                self.session.reset();
                if let Err(e) = self.collaborators.transcript.log_event(&message) {
                    tracing::warn!(error = %e, "Failed to write transcript");
                }
                tracing::info!("Conversation history cleared");
                Outcome::HistoryReset
            }
        }
    }
}
