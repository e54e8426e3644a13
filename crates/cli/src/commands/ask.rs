use std::fs;
use std::path::Path;
use std::sync::Arc;

use boardsight_agent::{AgentRuntime, ChatCompletionsClient, RuntimeOptions};
use boardsight_core::config::{AppConfig, LoadOptions, LogFormat};
use boardsight_core::{ConfiguredBoard, ConversationTurn, PipelineState, QueryRequest};
use boardsight_monday::MondayClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::commands::{CommandResult, FailureClass};

pub fn run(question: &str, history_path: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("ask", FailureClass::ConfigValidation, format!("configuration issue: {error}"));
        }
    };
    init_logging(&config);

    let history = match history_path.map(read_history).transpose() {
        Ok(history) => history.unwrap_or_default(),
        Err(message) => return CommandResult::failure("ask", FailureClass::History, message),
    };

    let source = match MondayClient::from_config(&config.monday) {
        Ok(source) => source,
        Err(error) => return CommandResult::failure("ask", FailureClass::DataSource, error.to_string()),
    };
    let llm = match ChatCompletionsClient::from_config(&config.llm) {
        Ok(llm) => llm,
        Err(error) => return CommandResult::failure("ask", FailureClass::LanguageModel, error.to_string()),
    };
    let agent = AgentRuntime::new(
        Arc::new(source),
        Arc::new(llm),
        ConfiguredBoard::from_map(&config.monday.boards),
        RuntimeOptions::from_config(&config),
    );

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let message = format!("failed to initialize async runtime: {error}");
            return CommandResult::failure("ask", FailureClass::RuntimeInit, message);
        }
    };

    let request = QueryRequest { message: question.to_string(), history };
    let envelope = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        agent.handle(request, cancel).await
    });

    let failed = envelope.action_trace.last().is_some_and(|entry| entry.stage == PipelineState::Failed);
    match serde_json::to_string_pretty(&envelope) {
        Ok(output) => CommandResult { exit_code: u8::from(failed), output },
        Err(error) => CommandResult::failure("ask", FailureClass::Serialization, error.to_string()),
    }
}

fn read_history(path: &Path) -> Result<Vec<ConversationTurn>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("could not read history file `{}`: {error}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|error| format!("history file `{}` is not a turn list: {error}", path.display()))
}

/// Diagnostics go to stderr so stdout stays a single JSON document.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
