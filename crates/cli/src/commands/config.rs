use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use boardsight_core::config::{board_env_key, resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    render(&config, resolve_config_path(None))
}

/// Renders every effective value with the layer it came from.
pub fn render(config: &AppConfig, config_file_path: Option<PathBuf>) -> String {
    let sources = Sources { doc: load_config_file_doc(config_file_path.as_deref()), path: config_file_path };

    let monday = &config.monday;
    let mut entries = vec![
        entry("monday.api_url", &monday.api_url, "BOARDSIGHT_MONDAY_API_URL"),
        entry("monday.api_token", redact_token(monday.api_token.expose_secret()), "BOARDSIGHT_MONDAY_API_TOKEN"),
        entry("monday.api_version", &monday.api_version, "BOARDSIGHT_MONDAY_API_VERSION"),
        entry("monday.page_size", monday.page_size.to_string(), "BOARDSIGHT_MONDAY_PAGE_SIZE"),
        entry("monday.timeout_secs", monday.timeout_secs.to_string(), "BOARDSIGHT_MONDAY_TIMEOUT_SECS"),
        entry("monday.max_retries", monday.max_retries.to_string(), "BOARDSIGHT_MONDAY_MAX_RETRIES"),
        entry(
            "monday.retry_base_delay_ms",
            monday.retry_base_delay_ms.to_string(),
            "BOARDSIGHT_MONDAY_RETRY_BASE_DELAY_MS",
        ),
    ];
    for (key, board_id) in &monday.boards {
        entries.push(entry(&format!("monday.boards.{key}"), board_id, &board_env_key(key)));
    }

    let llm = &config.llm;
    let llm_api_key = match &llm.api_key {
        Some(key) => redact_token(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    entries.extend(vec![
        entry("llm.provider", llm.provider.as_str(), "BOARDSIGHT_LLM_PROVIDER"),
        entry("llm.model", &llm.model, "BOARDSIGHT_LLM_MODEL"),
        entry("llm.base_url", llm.effective_base_url(), "BOARDSIGHT_LLM_BASE_URL"),
        entry("llm.api_key", llm_api_key, "BOARDSIGHT_LLM_API_KEY"),
        entry("llm.timeout_secs", llm.timeout_secs.to_string(), "BOARDSIGHT_LLM_TIMEOUT_SECS"),
        entry("llm.max_retries", llm.max_retries.to_string(), "BOARDSIGHT_LLM_MAX_RETRIES"),
        entry("llm.temperature", llm.temperature.to_string(), "BOARDSIGHT_LLM_TEMPERATURE"),
        entry("server.bind_address", &config.server.bind_address, "BOARDSIGHT_SERVER_BIND_ADDRESS"),
        entry("server.port", config.server.port.to_string(), "BOARDSIGHT_SERVER_PORT"),
        entry(
            "pipeline.history_turns",
            config.pipeline.history_turns.to_string(),
            "BOARDSIGHT_PIPELINE_HISTORY_TURNS",
        ),
        entry(
            "pipeline.max_quality_issues",
            config.pipeline.max_quality_issues.to_string(),
            "BOARDSIGHT_PIPELINE_MAX_QUALITY_ISSUES",
        ),
        entry("logging.level", &config.logging.level, "BOARDSIGHT_LOGGING_LEVEL"),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            "BOARDSIGHT_LOGGING_FORMAT",
        ),
    ]);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.iter().map(|entry| {
        render_line(&entry.key_path, &entry.value, sources.field_source(&entry.key_path, &entry.env_key))
    }));
    lines.join("\n")
}

struct Entry {
    key_path: String,
    value: String,
    env_key: String,
}

fn entry(key_path: &str, value: impl ToString, env_key: &str) -> Entry {
    Entry { key_path: key_path.to_string(), value: value.to_string(), env_key: env_key.to_string() }
}

struct Sources {
    doc: Option<Value>,
    path: Option<PathBuf>,
}

impl Sources {
    fn field_source(&self, key_path: &str, env_key: &str) -> String {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
