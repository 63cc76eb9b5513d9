use std::path::PathBuf;

use ai_advisor::{
    AppError, AppResult, AppState, Outcome, load_settings, start_server,
    config::{DEFAULT_SETTINGS_FILE, LoggingConfig},
};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{StreamExt, wrappers::LinesStream};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Multi-provider LLM advisor
#[derive(Parser, Debug)]
#[command(name = "ai-advisor", version, about)]
struct Cli {
    /// Settings file (merged with AI_ADVISOR_* environment variables)
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the HTTP control surface (default)
    Serve,
    /// Line-based conversation in the terminal
    Chat,
}

/// 主函数 - AI顾问的入口点
///
/// 负责加载设置、初始化日志系统、组装运行时，然后进入所选前端
#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = load_settings(&cli.settings)
        .map_err(|e| AppError::config(format!("加载设置失败: {:#}", e)))?;

    init_tracing(&settings.logging)?;

    tracing::info!(
        catalog = %settings.catalog_path.display(),
        transcript = %settings.transcript_path.display(),
        "AI Advisor starting up"
    );

    // 目录缺失或格式错误在这里终止启动
    let state = AppState::from_settings(&settings)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => start_server(state, &settings.server).await,
        Command::Chat => run_chat(state).await,
    }
}

/// 初始化结构化日志系统
///
/// `RUST_LOG`优先；否则使用设置中的级别。输出写到stderr，以免和终端对话混在一起
fn init_tracing(config: &LoggingConfig) -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ai_advisor={},tower_http=info", config.level)));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format.as_str() {
        "json" => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        "pretty" => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| AppError::config(format!("Failed to initialize tracing: {}", e)))?;

    tracing::debug!(format = %config.format, "Structured logging system initialized");
    Ok(())
}

/// One line typed at the chat prompt
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand {
    Ask(String),
    Models,
    Model(usize),
    Reset(Option<String>),
    Voice,
    Speak(String),
    History,
    Quit,
    Empty,
    Invalid(String),
}

fn parse_command(line: &str) -> ChatCommand {
    let line = line.trim();
    if line.is_empty() {
        return ChatCommand::Empty;
    }
    if !line.starts_with('/') {
        return ChatCommand::Ask(line.to_string());
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => ChatCommand::Quit,
        "/models" => ChatCommand::Models,
        "/history" => ChatCommand::History,
        "/voice" => ChatCommand::Voice,
        "/model" => match rest.parse() {
            Ok(index) => ChatCommand::Model(index),
            Err(_) => ChatCommand::Invalid("usage: /model N".to_string()),
        },
        "/reset" => ChatCommand::Reset((!rest.is_empty()).then(|| rest.to_string())),
        "/speak" if !rest.is_empty() => ChatCommand::Speak(rest.to_string()),
        "/speak" => ChatCommand::Invalid("usage: /speak TEXT".to_string()),
        other => ChatCommand::Invalid(format!("unknown command {}", other)),
    }
}

async fn run_chat(state: AppState) -> AppResult<()> {
    let controller = state.controller.clone();
    print_models(&state);
    println!("Type a question, or /models, /model N, /reset [msg], /voice, /speak TEXT, /history, /quit");

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    while let Some(line) = lines.next().await {
        let line = line.map_err(|e| AppError::internal(format!("Failed to read stdin: {}", e)))?;

        let completion = match parse_command(&line) {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => break,
            ChatCommand::Invalid(message) => {
                println!("{}", message);
                continue;
            }
            ChatCommand::Models => {
                print_models(&state);
                continue;
            }
            ChatCommand::History => {
                for turn in controller.history() {
                    println!("[{}] {}", turn.role.as_str(), turn.content);
                }
                continue;
            }
            ChatCommand::Ask(text) => controller.submit_question(text),
            ChatCommand::Model(index) => controller.select_model(index),
            ChatCommand::Reset(message) => controller.reset_history(message),
            ChatCommand::Voice => controller.request_voice(),
            ChatCommand::Speak(text) => controller.speak(text),
        };

        match completion.wait().await? {
            Outcome::Answer { reply, .. } => match reply {
                Ok(result) => println!(
                    "\n{}\n\n({} tokens, {})",
                    result.content,
                    result.token_usage.unwrap_or(0),
                    result.resolved_model_name.as_deref().unwrap_or("unknown model")
                ),
                Err(err) => println!("{}", err),
            },
            Outcome::Transcribed { text } => println!("Heard: {}", text),
            Outcome::Spoken => {}
            Outcome::ModelSelected { requested, current, accepted } => {
                if accepted {
                    println!("Using {}", state.catalog.selector()[current]);
                } else {
                    println!("No model at index {}", requested);
                }
            }
            Outcome::HistoryReset => println!("History cleared"),
        }
    }

    Ok(())
}

fn print_models(state: &AppState) {
    let selected = state.controller.view().model_index;
    for (index, name) in state.catalog.selector().iter().enumerate() {
        let marker = if index == selected { "*" } else { " " };
        println!("{} {:>2}  {}", marker, index, name);
    }
}
