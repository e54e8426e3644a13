use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["boardsight.toml", "config/boardsight.toml"];

/// Board keys with a dedicated environment override.
pub const KNOWN_BOARD_KEYS: [&str; 2] = ["deals", "workorders"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub monday: MondayConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct MondayConfig {
    pub api_url: String,
    pub api_token: SecretString,
    pub api_version: String,
    pub page_size: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Board key (`deals`, `workorders`, ...) → monday.com board id.
    pub boards: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: f32,
    pub plan_max_tokens: u32,
    pub answer_max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub history_turns: usize,
    pub max_quality_issues: usize,
    pub max_distinct_values: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Groq,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    /// OpenAI-compatible chat endpoint root for the provider.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub monday_api_token: Option<String>,
    pub server_port: Option<u16>,
    pub boards: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            monday: MondayConfig {
                api_url: "https://api.monday.com/v2".to_string(),
                api_token: String::new().into(),
                api_version: "2024-10".to_string(),
                page_size: 500,
                timeout_secs: 30,
                max_retries: 2,
                retry_base_delay_ms: 500,
                boards: BTreeMap::new(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Groq,
                api_key: None,
                base_url: None,
                model: "llama-3.3-70b-versatile".to_string(),
                timeout_secs: 30,
                max_retries: 1,
                temperature: 0.1,
                plan_max_tokens: 1024,
                answer_max_tokens: 2048,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 7860,
                graceful_shutdown_secs: 15,
            },
            pipeline: PipelineConfig { history_turns: 10, max_quality_issues: 20, max_distinct_values: 40 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected groq|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Environment variable that overrides the board id for `key`.
pub fn board_env_key(key: &str) -> String {
    format!("BOARDSIGHT_MONDAY_{}_BOARD_ID", key.to_ascii_uppercase())
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(monday) = patch.monday {
            if let Some(api_url) = monday.api_url {
                self.monday.api_url = api_url;
            }
            if let Some(monday_api_token_value) = monday.api_token {
                self.monday.api_token = secret_value(monday_api_token_value);
            }
            if let Some(api_version) = monday.api_version {
                self.monday.api_version = api_version;
            }
            if let Some(page_size) = monday.page_size {
                self.monday.page_size = page_size;
            }
            if let Some(timeout_secs) = monday.timeout_secs {
                self.monday.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = monday.max_retries {
                self.monday.max_retries = max_retries;
            }
            if let Some(retry_base_delay_ms) = monday.retry_base_delay_ms {
                self.monday.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(boards) = monday.boards {
                self.monday.boards.extend(boards);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(plan_max_tokens) = llm.plan_max_tokens {
                self.llm.plan_max_tokens = plan_max_tokens;
            }
            if let Some(answer_max_tokens) = llm.answer_max_tokens {
                self.llm.answer_max_tokens = answer_max_tokens;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(history_turns) = pipeline.history_turns {
                self.pipeline.history_turns = history_turns;
            }
            if let Some(max_quality_issues) = pipeline.max_quality_issues {
                self.pipeline.max_quality_issues = max_quality_issues;
            }
            if let Some(max_distinct_values) = pipeline.max_distinct_values {
                self.pipeline.max_distinct_values = max_distinct_values;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BOARDSIGHT_MONDAY_API_URL") {
            self.monday.api_url = value;
        }
        if let Some(value) = read_env("BOARDSIGHT_MONDAY_API_TOKEN") {
            self.monday.api_token = secret_value(value);
        }
        if let Some(value) = read_env("BOARDSIGHT_MONDAY_API_VERSION") {
            self.monday.api_version = value;
        }
        if let Some(value) = read_env("BOARDSIGHT_MONDAY_PAGE_SIZE") {
            self.monday.page_size = parse_u32("BOARDSIGHT_MONDAY_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("BOARDSIGHT_MONDAY_TIMEOUT_SECS") {
            self.monday.timeout_secs = parse_u64("BOARDSIGHT_MONDAY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("BOARDSIGHT_MONDAY_MAX_RETRIES") {
            self.monday.max_retries = parse_u32("BOARDSIGHT_MONDAY_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("BOARDSIGHT_MONDAY_RETRY_BASE_DELAY_MS") {
            self.monday.retry_base_delay_ms = parse_u64("BOARDSIGHT_MONDAY_RETRY_BASE_DELAY_MS", &value)?;
        }
        for key in KNOWN_BOARD_KEYS {
            if let Some(value) = read_env(&board_env_key(key)) {
                self.monday.boards.insert(key.to_string(), value);
            }
        }

        if let Some(value) = read_env("BOARDSIGHT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("BOARDSIGHT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("BOARDSIGHT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("BOARDSIGHT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("BOARDSIGHT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("BOARDSIGHT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("BOARDSIGHT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("BOARDSIGHT_LLM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("BOARDSIGHT_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("BOARDSIGHT_LLM_TEMPERATURE", &value)?;
        }

        if let Some(value) = read_env("BOARDSIGHT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("BOARDSIGHT_SERVER_PORT").map(|value| ("BOARDSIGHT_SERVER_PORT", value));
        if let Some((key, value)) = port.or_else(|| read_env("PORT").map(|value| ("PORT", value))) {
            self.server.port = parse_u16(key, &value)?;
        }
        if let Some(value) = read_env("BOARDSIGHT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs = parse_u64("BOARDSIGHT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("BOARDSIGHT_PIPELINE_HISTORY_TURNS") {
            self.pipeline.history_turns = parse_usize("BOARDSIGHT_PIPELINE_HISTORY_TURNS", &value)?;
        }
        if let Some(value) = read_env("BOARDSIGHT_PIPELINE_MAX_QUALITY_ISSUES") {
            self.pipeline.max_quality_issues = parse_usize("BOARDSIGHT_PIPELINE_MAX_QUALITY_ISSUES", &value)?;
        }
        if let Some(value) = read_env("BOARDSIGHT_PIPELINE_MAX_DISTINCT_VALUES") {
            self.pipeline.max_distinct_values = parse_usize("BOARDSIGHT_PIPELINE_MAX_DISTINCT_VALUES", &value)?;
        }

        let log_level = read_env("BOARDSIGHT_LOGGING_LEVEL").or_else(|| read_env("BOARDSIGHT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("BOARDSIGHT_LOGGING_FORMAT").or_else(|| read_env("BOARDSIGHT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(monday_api_token) = overrides.monday_api_token {
            self.monday.api_token = secret_value(monday_api_token);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        self.monday.boards.extend(overrides.boards);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_monday(&self.monday)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_pipeline(&self.pipeline)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// First existing config file, either the explicit path or one of [`CONFIG_FILE_CANDIDATES`].
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key).map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_monday(monday: &MondayConfig) -> Result<(), ConfigError> {
    if !monday.api_url.starts_with("http://") && !monday.api_url.starts_with("https://") {
        return Err(ConfigError::Validation("monday.api_url must start with http:// or https://".to_string()));
    }

    if monday.api_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "monday.api_token is required. Get it from monday.com > Avatar > Developers > My access tokens"
                .to_string(),
        ));
    }

    if monday.boards.is_empty() {
        return Err(ConfigError::Validation(format!(
            "monday.boards must name at least one board (e.g. set `{}`)",
            board_env_key(KNOWN_BOARD_KEYS[0])
        )));
    }
    for (key, board_id) in &monday.boards {
        let board_id = board_id.trim();
        if board_id.is_empty() || !board_id.chars().all(|character| character.is_ascii_digit()) {
            return Err(ConfigError::Validation(format!(
                "monday.boards.{key} must be a numeric board id (found `{board_id}`)"
            )));
        }
    }

    if monday.page_size == 0 || monday.page_size > 500 {
        return Err(ConfigError::Validation("monday.page_size must be in range 1..=500".to_string()));
    }

    if monday.timeout_secs == 0 || monday.timeout_secs > 300 {
        return Err(ConfigError::Validation("monday.timeout_secs must be in range 1..=300".to_string()));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation("llm.timeout_secs must be in range 1..=300".to_string()));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation("llm.temperature must be in range 0.0..=2.0".to_string()));
    }

    if llm.plan_max_tokens == 0 || llm.answer_max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.plan_max_tokens and llm.answer_max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.provider.requires_api_key() {
        let missing = llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for the {} provider",
                llm.provider.as_str()
            )));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.max_quality_issues == 0 {
        return Err(ConfigError::Validation("pipeline.max_quality_issues must be greater than zero".to_string()));
    }

    if pipeline.max_distinct_values == 0 {
        return Err(ConfigError::Validation("pipeline.max_distinct_values must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation("logging.level must be one of trace|debug|info|warn|error".to_string())),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    monday: Option<MondayPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    pipeline: Option<PipelinePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct MondayPatch {
    api_url: Option<String>,
    api_token: Option<String>,
    api_version: Option<String>,
    page_size: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    boards: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    temperature: Option<f32>,
    plan_max_tokens: Option<u32>,
    answer_max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    history_turns: Option<usize>,
    max_quality_issues: Option<usize>,
    max_distinct_values: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
