use boardsight_core::config::{AppConfig, LoadOptions};
use boardsight_core::{ConfiguredBoard, DataSource};
use boardsight_monday::MondayClient;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()).map_err(|error| error.to_string()));
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(config: Result<AppConfig, String>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_llm_credentials(&config));
            checks.extend(check_monday(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error));
            for name in ["llm_credentials", "monday_connectivity", "board_access"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Credentials are checked locally; probing the model would spend tokens.
fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    let has_key = llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty());
    let endpoint = llm.effective_base_url();

    if llm.provider.requires_api_key() && !has_key {
        return DoctorCheck::fail("llm_credentials", format!("{} requires llm.api_key", llm.provider.as_str()));
    }

    let credentials = if has_key { "api key present" } else { "no api key required" };
    DoctorCheck::pass(
        "llm_credentials",
        format!("{} model `{}` at {endpoint}; {credentials}", llm.provider.as_str(), llm.model),
    )
}

fn check_monday(config: &AppConfig) -> Vec<DoctorCheck> {
    let client = match MondayClient::from_config(&config.monday) {
        Ok(client) => client,
        Err(error) => {
            return vec![
                DoctorCheck::fail("monday_connectivity", format!("failed to build client: {error}")),
                DoctorCheck::skipped("board_access", "the monday.com client could not be built"),
            ];
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail("monday_connectivity", format!("failed to initialize async runtime: {error}")),
                DoctorCheck::skipped("board_access", "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let connectivity = match client.account_name().await {
            Ok(account) => {
                DoctorCheck::pass("monday_connectivity", format!("authenticated to account `{account}`"))
            }
            Err(error) => {
                return vec![
                    DoctorCheck::fail("monday_connectivity", error.to_string()),
                    DoctorCheck::skipped("board_access", "monday.com is not reachable"),
                ];
            }
        };

        let mut unreadable = Vec::new();
        let mut readable = Vec::new();
        for board in ConfiguredBoard::from_map(&config.monday.boards) {
            match client.fetch_board(&board.board_id).await {
                Ok(source_board) => readable.push(format!("{} ({})", board.key, source_board.name)),
                Err(error) => unreadable.push(format!("{}: {error}", board.key)),
            }
        }

        let board_access = if unreadable.is_empty() {
            DoctorCheck::pass("board_access", format!("readable: {}", readable.join(", ")))
        } else {
            DoctorCheck::fail("board_access", format!("unreadable: {}", unreadable.join("; ")))
        };
        vec![connectivity, board_access]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
