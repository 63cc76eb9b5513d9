use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    catalog::CatalogIndex,
    config::{ServerConfig, Settings},
    controller::AdvisorController,
    dispatcher::{Dispatcher, build_http_client},
    errors::{AppError, AppResult},
    gateway::{AsyncGateway, Collaborators, Outcome},
    metrics::MetricsCollector,
    session::{ChatDispatch, ConversationSession},
    speech::UnavailableSpeech,
    transcript::ChatLogger,
};

/// 应用程序状态 - 在所有请求处理器之间共享
///
/// 控制器拥有唯一的会话工作通道；目录和指标只读共享
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogIndex>,
    pub controller: Arc<AdvisorController>,
    pub metrics: MetricsCollector,
}

impl AppState {
    /// 根据运行设置组装完整运行时
    ///
    /// ## 内部实现逻辑
    /// 1. 加载提供商目录（失败即为致命的配置错误）
    /// 2. 创建共享HTTP客户端和分发器
    /// 3. 打开对话记录文件并写入会话标题
    /// 4. 启动网关工作通道并创建控制器
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        let catalog = Arc::new(CatalogIndex::load(&settings.catalog_path)?);
        let client = build_http_client(&settings.http)?;
        let metrics = MetricsCollector::new();
        let dispatcher = Dispatcher::new(catalog.clone(), client).with_metrics(metrics.clone());

        let transcript = ChatLogger::open(&settings.transcript_path).map_err(|e| {
            AppError::config(format!(
                "Failed to open transcript {}: {}",
                settings.transcript_path.display(),
                e
            ))
        })?;

        let collaborators = Collaborators {
            transcript: Arc::new(transcript),
            speech_to_text: Arc::new(UnavailableSpeech),
            text_to_speech: Arc::new(UnavailableSpeech),
        };

        Ok(Self::assemble(catalog, Arc::new(dispatcher), collaborators, metrics))
    }

    /// Wire a session, lane and controller around any dispatch backend
    pub fn assemble(
        catalog: Arc<CatalogIndex>,
        dispatcher: Arc<dyn ChatDispatch>,
        collaborators: Collaborators,
        metrics: MetricsCollector,
    ) -> Self {
        let session = ConversationSession::new(catalog.clone(), dispatcher);
        let gateway = AsyncGateway::spawn(session, collaborators);
        let controller = Arc::new(AdvisorController::new(gateway, &catalog));

        Self {
            catalog,
            controller,
            metrics,
        }
    }
}

/// Create the main application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Conversation commands
        .route("/v1/question", post(question_handler))
        .route("/v1/model", post(select_model_handler))
        .route("/v1/reset", post(reset_handler))
        .route("/v1/voice", post(voice_handler))
        .route("/v1/speech", post(speech_handler))
        // Observation
        .route("/v1/state", get(state_handler))
        .route("/v1/models", get(list_models_handler))
        .route("/v1/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Start the HTTP control surface
pub async fn start_server(state: AppState, config: &ServerConfig) -> AppResult<()> {
    let app = create_app(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::config(format!("Failed to bind to {}: {}", addr, e)))?;

    tracing::info!("AI Advisor control surface listening on {}", addr);
    tracing::info!("Available endpoints:");
    tracing::info!("  POST /v1/question - Ask the selected model");
    tracing::info!("  POST /v1/model    - Select model by index");
    tracing::info!("  POST /v1/reset    - Clear conversation history");
    tracing::info!("  POST /v1/voice    - Capture a question by voice");
    tracing::info!("  POST /v1/speech   - Read text aloud");
    tracing::info!("  GET  /v1/state    - View state, busy flag and history");
    tracing::info!("  GET  /v1/models   - Model selector");
    tracing::info!("  GET  /v1/metrics  - Dispatch metrics");

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub index: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
}

fn unexpected(outcome: Outcome) -> AppError {
    AppError::internal(format!("Unexpected outcome from worker lane: {:?}", outcome))
}

// Request Handlers

/// Submit a question and wait for its turn on the lane
async fn question_handler(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> AppResult<Json<Value>> {
    if request.text.trim().is_empty() {
        return Err(AppError::validation("Question text must not be empty"));
    }

    let outcome = state.controller.submit_question(request.text).wait().await?;
    match outcome {
        Outcome::Answer { question, reply } => {
            let result = reply?;
            Ok(Json(json!({
                "question": question,
                "answer": result.content,
                "token_usage": result.token_usage,
                "resolved_model_name": result.resolved_model_name,
            })))
        }
        other => Err(unexpected(other)),
    }
}

async fn select_model_handler(
    State(state): State<AppState>,
    Json(request): Json<SelectModelRequest>,
) -> AppResult<Json<Value>> {
    let outcome = state.controller.select_model(request.index).wait().await?;
    match outcome {
        Outcome::ModelSelected { requested, current, accepted } => {
            if !accepted {
                return Err(AppError::validation(format!(
                    "Model index {} is out of range (0..{})",
                    requested,
                    state.catalog.selector().len()
                )));
            }
            Ok(Json(json!({
                "model_index": current,
                "model": state.catalog.model_at(current).ok(),
            })))
        }
        other => Err(unexpected(other)),
    }
}

/// Body is optional; an empty body uses the default event text
async fn reset_handler(State(state): State<AppState>, body: Bytes) -> AppResult<Json<Value>> {
    let request = if body.is_empty() {
        ResetRequest::default()
    } else {
        serde_json::from_slice::<ResetRequest>(&body)
            .map_err(|e| AppError::bad_request(format!("Invalid reset request: {}", e)))?
    };

    let outcome = state.controller.reset_history(request.message).wait().await?;
    match outcome {
        Outcome::HistoryReset => Ok(Json(json!({ "status": "reset" }))),
        other => Err(unexpected(other)),
    }
}

async fn voice_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let outcome = state.controller.request_voice().wait().await?;
    match outcome {
        Outcome::Transcribed { text } => Ok(Json(json!({ "text": text }))),
        other => Err(unexpected(other)),
    }
}

async fn speech_handler(
    State(state): State<AppState>,
    Json(request): Json<SpeechRequest>,
) -> AppResult<Json<Value>> {
    let outcome = state.controller.speak(request.text).wait().await?;
    match outcome {
        Outcome::Spoken => Ok(Json(json!({ "status": "spoken" }))),
        other => Err(unexpected(other)),
    }
}

async fn state_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "view": state.controller.view(),
        "busy": state.controller.is_busy(),
        "history": state.controller.history(),
    }))
}

/// Model selector in display order; entry 0 is the "no model" placeholder
async fn list_models_handler(State(state): State<AppState>) -> Json<Value> {
    let data: Vec<Value> = state
        .catalog
        .selector()
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let provider = (index > 0)
                .then(|| state.catalog.resolve(name))
                .flatten()
                .map(|(p, _)| p.name.clone());
            json!({
                "index": index,
                "id": name,
                "provider": provider,
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
        "selected": state.controller.view().model_index,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.metrics.get_metrics_summary().await))
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "ai-advisor",
        "version": env!("CARGO_PKG_VERSION"),
        "providers_configured": state.catalog.providers().len(),
        "models_configured": state.catalog.model_count(),
        "busy": state.controller.is_busy(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
