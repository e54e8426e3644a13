pub mod ask;
pub mod config;
pub mod doctor;

use serde::Serialize;

/// What a command prints to stdout and the process exit code it maps to.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// Why a command stopped before producing its normal output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    ConfigValidation,
    History,
    DataSource,
    LanguageModel,
    RuntimeInit,
    Serialization,
}

impl FailureClass {
    /// 2 for operator input, 3 for client setup, 4 for output encoding.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::ConfigValidation | Self::History => 2,
            Self::DataSource | Self::LanguageModel | Self::RuntimeInit => 3,
            Self::Serialization => 4,
        }
    }
}

#[derive(Debug, Serialize)]
struct FailurePayload<'a> {
    command: &'a str,
    status: &'static str,
    error_class: FailureClass,
    message: String,
}

impl CommandResult {
    pub fn printed(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn failure(command: &str, class: FailureClass, message: impl Into<String>) -> Self {
        let payload = FailurePayload { command, status: "error", error_class: class, message: message.into() };
        let output = serde_json::to_string(&payload).unwrap_or_else(|error| {
            format!(
                "{{\"command\":\"{command}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
        Self { exit_code: class.exit_code(), output }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{CommandResult, FailureClass};

    #[test]
    fn failures_carry_their_class_and_exit_code() {
        let result = CommandResult::failure("ask", FailureClass::LanguageModel, "llm.api_key is required");
        assert_eq!(result.exit_code, 3);

        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "language_model");
        assert_eq!(payload["message"], "llm.api_key is required");
    }
}
