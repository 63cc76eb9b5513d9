mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ai_advisor::{
    AsyncGateway, ChatDispatch, Collaborators, ConversationSession, DispatchError, DispatchResult,
    Dispatcher, Operation, Outcome, Turn,
    speech::{SpeechToText, TextToSpeech, UnavailableSpeech},
    transcript::ChatLogger,
};
use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{Entry, RecordingSink, catalog_for, offline_catalog};

/// Fake backend that sleeps and records when each call ran
struct Timed {
    delay: Duration,
    spans: Mutex<Vec<(String, Instant, Instant)>>,
}

impl Timed {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay, spans: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl ChatDispatch for Timed {
    async fn send(&self, model_name: &str, history: &[Turn]) -> Result<DispatchResult, DispatchError> {
        let question = history.last().map(|t| t.content.clone()).unwrap_or_default();
        let start = Instant::now();
        tokio::time::sleep(self.delay).await;
        let end = Instant::now();
        self.spans.lock().unwrap().push((question.clone(), start, end));

        if question.contains("fail") {
            return Err(DispatchError::http(500, None));
        }
        Ok(DispatchResult {
            content: format!("answer to {}", question),
            token_usage: Some(7),
            resolved_model_name: Some(format!("{}-resolved", model_name)),
        })
    }
}

fn spawn(dispatch: Arc<dyn ChatDispatch>, sink: Arc<RecordingSink>) -> AsyncGateway {
    let session = ConversationSession::new(offline_catalog(), dispatch);
    AsyncGateway::spawn(
        session,
        Collaborators {
            transcript: sink,
            speech_to_text: Arc::new(UnavailableSpeech),
            text_to_speech: Arc::new(UnavailableSpeech),
        },
    )
}

#[tokio::test]
async fn test_lane_never_overlaps_and_keeps_fifo_order() {
    let backend = Timed::new(Duration::from_millis(40));
    let gateway = spawn(backend.clone(), Arc::new(RecordingSink::default()));

    gateway.submit(Operation::SelectModel(1));
    let handles: Vec<_> = (0..5)
        .map(|i| gateway.submit(Operation::SendQuestion(format!("q{}", i))))
        .collect();

    for handle in handles {
        handle.wait().await.unwrap();
    }

    let spans = backend.spans.lock().unwrap().clone();
    let order: Vec<_> = spans.iter().map(|(q, _, _)| q.as_str()).collect();
    assert_eq!(order, vec!["q0", "q1", "q2", "q3", "q4"]);

    for pair in spans.windows(2) {
        let (_, _, previous_end) = pair[0];
        let (_, next_start, _) = pair[1];
        assert!(next_start >= previous_end, "two submissions ran concurrently");
    }
}

#[tokio::test]
async fn test_busy_until_last_completion() {
    let backend = Timed::new(Duration::from_millis(30));
    let gateway = spawn(backend, Arc::new(RecordingSink::default()));

    assert!(!gateway.is_busy());
    gateway.submit(Operation::SelectModel(1));
    gateway.submit(Operation::SendQuestion("a".to_string()));
    let last = gateway.submit(Operation::SendQuestion("b".to_string()));

    assert!(gateway.is_busy());
    assert_eq!(gateway.pending(), 3);

    last.wait().await.unwrap();
    gateway.wait_idle().await;
    assert!(!gateway.is_busy());
}

#[tokio::test]
async fn test_every_submission_completes_exactly_once() {
    let backend = Timed::new(Duration::from_millis(5));
    let gateway = spawn(backend, Arc::new(RecordingSink::default()));
    let calls = Arc::new(Mutex::new(Vec::new()));

    let ops = vec![
        Operation::SendQuestion("before selection".to_string()),
        Operation::SelectModel(1),
        Operation::SendQuestion("ok".to_string()),
        Operation::SendQuestion("fail".to_string()),
        Operation::VoiceToText,
        Operation::TextToVoice("read this".to_string()),
        Operation::ResetHistory("cleared".to_string()),
    ];
    let count = ops.len();

    let handles: Vec<_> = ops
        .into_iter()
        .map(|op| {
            let calls = calls.clone();
            gateway.submit_with(op.clone(), move |_| calls.lock().unwrap().push(op))
        })
        .collect();

    for handle in handles {
        handle.wait().await.unwrap();
    }
    gateway.wait_idle().await;

    assert_eq!(calls.lock().unwrap().len(), count);
}

#[tokio::test]
async fn test_transcript_only_for_successes_and_resets() {
    let backend = Timed::new(Duration::from_millis(1));
    let sink = Arc::new(RecordingSink::default());
    let gateway = spawn(backend, sink.clone());

    gateway.submit(Operation::SendQuestion("no model yet".to_string()));
    gateway.submit(Operation::SelectModel(1));
    gateway.submit(Operation::SendQuestion("hello".to_string()));
    gateway.submit(Operation::SendQuestion("please fail".to_string()));
    gateway.submit(Operation::ResetHistory("New topic".to_string()));
    gateway.wait_idle().await;

    assert_eq!(
        sink.entries(),
        vec![
            Entry::Conversation {
                user: "hello".to_string(),
                assistant: "answer to hello".to_string(),
                model: "gpt-4o-resolved".to_string(),
                tokens: 7,
            },
            Entry::Event("New topic".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_failed_turn_leaves_published_history_untouched() {
    let backend = Timed::new(Duration::from_millis(1));
    let gateway = spawn(backend, Arc::new(RecordingSink::default()));

    gateway.submit(Operation::SelectModel(1));
    gateway.submit(Operation::SendQuestion("first".to_string())).wait().await.unwrap();
    let before = gateway.history();

    let outcome = gateway
        .submit(Operation::SendQuestion("fail now".to_string()))
        .wait()
        .await
        .unwrap();

    assert_eq!(outcome.answer_text().as_deref(), Some("Error code: 500"));
    assert_eq!(gateway.history(), before);
    assert_eq!(before.len(), 2);
}

struct Recognizer(&'static str);

impl SpeechToText for Recognizer {
    fn listen(&self) -> String {
        std::thread::sleep(Duration::from_millis(20));
        self.0.to_string()
    }
}

struct PanickingVoice;

impl TextToSpeech for PanickingVoice {
    fn speak(&self, _text: &str) -> anyhow::Result<()> {
        panic!("audio device vanished");
    }
}

#[tokio::test]
async fn test_speech_runs_on_lane_and_strips_prefix() {
    let session = ConversationSession::new(offline_catalog(), Timed::new(Duration::ZERO));
    let gateway = AsyncGateway::spawn(
        session,
        Collaborators {
            transcript: Arc::new(RecordingSink::default()),
            speech_to_text: Arc::new(Recognizer("You said: what time is it")),
            text_to_speech: Arc::new(PanickingVoice),
        },
    );

    let voice = gateway.submit(Operation::VoiceToText);
    let spoken = gateway.submit(Operation::TextToVoice("hi".to_string()));
    let after = gateway.submit(Operation::SelectModel(2));

    assert_eq!(
        voice.wait().await.unwrap(),
        Outcome::Transcribed { text: "what time is it".to_string() }
    );
    assert_eq!(spoken.wait().await.unwrap(), Outcome::Spoken);
    assert!(matches!(
        after.wait().await.unwrap(),
        Outcome::ModelSelected { accepted: true, current: 2, .. }
    ));
}

#[tokio::test]
async fn test_end_to_end_with_file_transcript() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "Paris"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.txt");

    let catalog = catalog_for(&server.uri());
    let dispatcher = Arc::new(Dispatcher::new(catalog.clone(), reqwest::Client::new()));
    let session = ConversationSession::new(catalog, dispatcher);
    let gateway = AsyncGateway::spawn(
        session,
        Collaborators {
            transcript: Arc::new(ChatLogger::open(&log_path).unwrap()),
            speech_to_text: Arc::new(UnavailableSpeech),
            text_to_speech: Arc::new(UnavailableSpeech),
        },
    );

    // Sentinel selection: fails locally and is not logged
    gateway.submit(Operation::SendQuestion("ignored".to_string()));
    gateway.submit(Operation::SelectModel(1));
    gateway.submit(Operation::SendQuestion("Capital of France?".to_string()));
    gateway.wait_idle().await;

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(!contents.contains("ignored"));
    assert!(contents.contains(
        "* User:\nCapital of France?\n\n* Advisor (gpt-4o-2024-08-06):\nParis\n\n* Total used tokens:\n6\n"
    ));
    assert_eq!(
        gateway.history(),
        vec![Turn::user("Capital of France?"), Turn::assistant("Paris")]
    );
}

#[tokio::test]
async fn test_panicking_callback_does_not_stall_lane() {
    let backend = Timed::new(Duration::from_millis(1));
    let gateway = spawn(backend, Arc::new(RecordingSink::default()));

    let first = gateway.submit_with(Operation::SelectModel(1), |_| panic!("front-end bug"));
    let question = gateway.submit(Operation::SendQuestion("still there?".to_string()));
    let select = gateway.submit(Operation::SelectModel(2));

    assert!(matches!(
        first.wait().await.unwrap(),
        Outcome::ModelSelected { accepted: true, current: 1, .. }
    ));
    assert_eq!(
        question.wait().await.unwrap().answer_text().as_deref(),
        Some("answer to still there?")
    );
    assert!(matches!(
        select.wait().await.unwrap(),
        Outcome::ModelSelected { accepted: true, current: 2, .. }
    ));

    tokio::time::timeout(Duration::from_secs(1), gateway.wait_idle())
        .await
        .expect("busy counter must drain");
    assert!(!gateway.is_busy());
}

/// Backend whose `send` panics for questions mentioning "boom"
struct Exploding;

#[async_trait]
impl ChatDispatch for Exploding {
    async fn send(&self, _model_name: &str, history: &[Turn]) -> Result<DispatchResult, DispatchError> {
        let question = history.last().map(|t| t.content.clone()).unwrap_or_default();
        if question.contains("boom") {
            panic!("backend exploded");
        }
        Ok(DispatchResult {
            content: format!("fine: {}", question),
            token_usage: Some(1),
            resolved_model_name: None,
        })
    }
}

#[tokio::test]
async fn test_panicking_backend_rolls_back_and_lane_survives() {
    let sink = Arc::new(RecordingSink::default());
    let gateway = spawn(Arc::new(Exploding), sink.clone());

    gateway.submit(Operation::SelectModel(1));
    gateway.submit(Operation::SendQuestion("first".to_string())).wait().await.unwrap();
    let before = gateway.history();

    let outcome = gateway
        .submit(Operation::SendQuestion("boom".to_string()))
        .wait()
        .await
        .unwrap();
    match outcome {
        Outcome::Answer { reply: Err(err), .. } => {
            assert_eq!(err.kind(), "response_error");
            assert!(err.to_string().contains("backend exploded"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(gateway.history(), before);

    let after = gateway
        .submit(Operation::SendQuestion("second".to_string()))
        .wait()
        .await
        .unwrap();
    assert_eq!(after.answer_text().as_deref(), Some("fine: second"));

    gateway.wait_idle().await;
    assert!(!gateway.is_busy());
    assert_eq!(gateway.history().len(), 4);
    assert_eq!(sink.entries().len(), 2);
}
