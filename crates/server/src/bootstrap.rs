use std::sync::Arc;

use boardsight_agent::{AgentRuntime, ChatCompletionsClient, RuntimeOptions};
use boardsight_core::config::{AppConfig, ConfigError, LoadOptions};
use boardsight_core::{ConfiguredBoard, ModelError, SourceError};
use boardsight_monday::MondayClient;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("data source client could not be built: {0}")]
    DataSource(#[source] SourceError),
    #[error("language model client could not be built: {0}")]
    LanguageModel(#[source] ModelError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let source = MondayClient::from_config(&config.monday).map_err(BootstrapError::DataSource)?;
    let llm = ChatCompletionsClient::from_config(&config.llm).map_err(BootstrapError::LanguageModel)?;
    let boards = ConfiguredBoard::from_map(&config.monday.boards);

    info!(
        event_name = "system.bootstrap.clients_ready",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        llm_model = %config.llm.model,
        boards = boards.len(),
        "data source and language model clients initialized"
    );

    let agent_runtime =
        AgentRuntime::new(Arc::new(source), Arc::new(llm), boards, RuntimeOptions::from_config(&config));
    Ok(Application { config, agent_runtime })
}
