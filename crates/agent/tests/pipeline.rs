//! End-to-end pipeline runs against deterministic data-source and model stubs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use boardsight_agent::llm::{LlmClient, Prompt};
use boardsight_agent::{AgentRuntime, BackoffPolicy, RuntimeOptions};
use boardsight_core::domain::item::ItemGroup;
use boardsight_core::domain::schema::{SourceBoard, SourceColumn};
use boardsight_core::{
    BoardId, ConfiguredBoard, ConversationTurn, DataSource, ModelError, PipelineFailure, QueryRequest,
    RawItem, ResponseEnvelope, SourceError,
};
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

const DEALS: &str = "1001";
const WORK_ORDERS: &str = "2002";

fn column(title: &str, column_type: &str) -> SourceColumn {
    SourceColumn { id: title.to_lowercase().replace(' ', "_"), title: title.to_string(), column_type: column_type.to_string() }
}

fn item(name: &str, fields: &[(&str, &str)]) -> RawItem {
    RawItem {
        id: name.to_lowercase().replace(' ', "-"),
        name: name.to_string(),
        group: ItemGroup::default(),
        fields: fields
            .iter()
            .map(|(field, value)| (field.to_string(), (!value.is_empty()).then(|| value.to_string())))
            .collect(),
    }
}

#[derive(Default)]
struct StubSource {
    boards: BTreeMap<String, (SourceBoard, Vec<RawItem>)>,
    /// Board id → number of item fetches that succeed before every later one fails.
    items_fail_after: BTreeMap<String, usize>,
    down: BTreeSet<String>,
    /// Board id → time an item fetch takes before answering.
    item_delays: BTreeMap<String, Duration>,
    item_calls: Mutex<BTreeMap<String, usize>>,
    /// Board ids in the order their item fetches finished.
    completed: Mutex<Vec<String>>,
}

impl StubSource {
    fn standard() -> Self {
        let deals = SourceBoard {
            board_id: BoardId::from(DEALS),
            name: "Deal Funnel".to_string(),
            columns: vec![
                column("Name", "name"),
                column("Deal Stage", "status"),
                column("Sector/service", "dropdown"),
                column("Masked Deal value", "numbers"),
                column("Close Date (A)", "date"),
            ],
        };
        let deal_items = vec![
            item(
                "Solar Farm",
                &[
                    ("Deal Stage", "Open"),
                    ("Sector/service", "renewables"),
                    ("Masked Deal value", "₹1.2Cr"),
                    ("Close Date (A)", "26th Feb 2026"),
                ],
            ),
            item(
                "Coal Survey",
                &[
                    ("Deal Stage", "Open"),
                    ("Sector/service", "Mining"),
                    ("Masked Deal value", "3.5K"),
                    ("Close Date (A)", "31/02/2026"),
                ],
            ),
        ];

        let orders = SourceBoard {
            board_id: BoardId::from(WORK_ORDERS),
            name: "Work Order Tracker".to_string(),
            columns: vec![column("Name", "name"), column("Sector", "text")],
        };
        let order_items = vec![item("WO-1", &[("Sector", "Mining")])];

        let mut boards = BTreeMap::new();
        boards.insert(DEALS.to_string(), (deals, deal_items));
        boards.insert(WORK_ORDERS.to_string(), (orders, order_items));
        Self { boards, ..Self::default() }
    }
}

#[async_trait]
impl DataSource for StubSource {
    async fn fetch_board(&self, board_id: &BoardId) -> Result<SourceBoard, SourceError> {
        if self.down.contains(board_id.as_str()) {
            return Err(SourceError::Unavailable("connection refused".to_string()));
        }
        self.boards
            .get(board_id.as_str())
            .map(|(board, _)| board.clone())
            .ok_or_else(|| SourceError::BoardNotFound(board_id.clone()))
    }

    async fn fetch_items(&self, board_id: &BoardId) -> Result<Vec<RawItem>, SourceError> {
        let calls = {
            let mut calls = self.item_calls.lock().expect("lock");
            let count = calls.entry(board_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(delay) = self.item_delays.get(board_id.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        self.completed.lock().expect("lock").push(board_id.to_string());
        if self.down.contains(board_id.as_str())
            || self.items_fail_after.get(board_id.as_str()).is_some_and(|limit| calls > *limit)
        {
            return Err(SourceError::Unavailable("upstream 502".to_string()));
        }
        self.boards
            .get(board_id.as_str())
            .map(|(_, items)| items.clone())
            .ok_or_else(|| SourceError::BoardNotFound(board_id.clone()))
    }
}

/// Answers planning prompts (JSON mode) and composition prompts from separate scripts.
struct StubLlm {
    plan: Result<String, ModelError>,
    answer: Result<String, ModelError>,
    delay: Duration,
    answer_prompts: Mutex<Vec<Prompt>>,
}

impl StubLlm {
    fn new(plan: &str) -> Self {
        Self {
            plan: Ok(plan.to_string()),
            answer: Ok("Renewables pipeline stands at ₹1.2Cr.".to_string()),
            delay: Duration::ZERO,
            answer_prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ModelError> {
        tokio::time::sleep(self.delay).await;
        if prompt.expect_json {
            return self.plan.clone();
        }
        self.answer_prompts.lock().expect("lock").push(prompt.clone());
        self.answer.clone()
    }
}

fn runtime(source: StubSource, llm: Arc<StubLlm>) -> AgentRuntime {
    let options = RuntimeOptions {
        fetch: BackoffPolicy::new(1, 1, Duration::from_secs(2)),
        model: BackoffPolicy::new(1, 1, Duration::from_secs(2)),
        today: NaiveDate::from_ymd_opt(2026, 2, 27),
        ..RuntimeOptions::default()
    };
    let boards = vec![ConfiguredBoard::new("deals", DEALS), ConfiguredBoard::new("workorders", WORK_ORDERS)];
    AgentRuntime::new(Arc::new(source), llm, boards, options)
}

fn request(message: &str) -> QueryRequest {
    QueryRequest { message: message.to_string(), history: vec![ConversationTurn::user("hi")] }
}

fn trace(envelope: &ResponseEnvelope) -> Vec<String> {
    envelope.action_trace.iter().map(ToString::to_string).collect()
}

const RENEWABLES_PLAN: &str = r#"{"boards":["deals"],
  "filters":[{"field":"Sector/service","operator":"equals","value":"Renewables"}],
  "metrics":[{"name":"pipeline_value","aggregation":"sum","target_field":"Masked Deal value"},
             {"name":"latest_close","aggregation":"max","target_field":"Close Date (A)"}],
  "analysis_type":"summary"}"#;

const BOTH_BOARDS_PLAN: &str =
    r#"{"boards":["deals","workorders"],"metrics":[{"name":"records","aggregation":"count"}]}"#;

#[tokio::test]
async fn answers_from_cleaned_metrics_and_reports_quality() {
    let llm = Arc::new(StubLlm::new(RENEWABLES_PLAN));
    let envelope = runtime(StubSource::standard(), llm.clone()).handle(request("energy pipeline?"), CancellationToken::new()).await;

    assert_eq!(envelope.answer, "Renewables pipeline stands at ₹1.2Cr.");
    let quality = &envelope.data_quality_report;
    assert_eq!(quality.total_items, 2);
    assert_eq!(quality.unparseable_dates, 1);
    assert!(quality.issues.iter().any(|issue| issue.contains("31/02/2026")));

    let prompts = llm.answer_prompts.lock().expect("lock");
    let user = prompts[0].last_user_message().expect("composer prompt");
    assert!(user.contains("- pipeline_value = ₹1.2Cr"), "{user}");
    assert!(user.contains("- latest_close = 2026-02-26"), "{user}");
    assert!(prompts[0].messages[0].content.contains("50% of items had unparseable dates"));

    let trace = trace(&envelope);
    assert_eq!(trace.first().map(String::as_str), Some("[ok] planning: reading 2 board schemas"));
    assert_eq!(trace.last().map(String::as_str), Some("[ok] done: answer ready"));
    for stage in ["fetching", "cleaning", "aggregating", "composing"] {
        assert!(trace.iter().any(|entry| entry.starts_with(&format!("[ok] {stage}:"))), "missing {stage}");
    }
}

#[tokio::test]
async fn partial_fetch_failure_still_answers_from_the_healthy_board() {
    let mut source = StubSource::standard();
    // The schema read succeeds; every item fetch after it fails.
    source.items_fail_after.insert(WORK_ORDERS.to_string(), 1);
    let envelope = runtime(source, Arc::new(StubLlm::new(BOTH_BOARDS_PLAN)))
        .handle(request("how many records do we have?"), CancellationToken::new())
        .await;

    let trace = trace(&envelope);
    assert!(trace.contains(&"[ok] fetching: Deal Funnel: 2 items".to_string()), "{trace:#?}");
    assert!(
        trace.contains(&"[fail] fetching: Work Order Tracker: unavailable; continuing without it".to_string()),
        "{trace:#?}"
    );
    assert_eq!(trace.last().map(String::as_str), Some("[ok] done: answer ready"));
    assert_eq!(envelope.data_quality_report.total_items, 2);
}

#[tokio::test]
async fn fetch_entries_follow_plan_order_not_completion_order() {
    let mut source = StubSource::standard();
    source.item_delays.insert(DEALS.to_string(), Duration::from_millis(200));
    let source = Arc::new(source);
    let options = RuntimeOptions {
        fetch: BackoffPolicy::new(0, 1, Duration::from_secs(2)),
        model: BackoffPolicy::new(0, 1, Duration::from_secs(2)),
        ..RuntimeOptions::default()
    };
    let boards = vec![ConfiguredBoard::new("deals", DEALS), ConfiguredBoard::new("workorders", WORK_ORDERS)];
    let envelope = AgentRuntime::new(source.clone(), Arc::new(StubLlm::new(BOTH_BOARDS_PLAN)), boards, options)
        .handle(request("how many records do we have?"), CancellationToken::new())
        .await;

    // Schema sampling reads items too; the last two completions are the planned fetches.
    let completed = source.completed.lock().expect("lock").clone();
    assert_eq!(completed[completed.len() - 2..], [WORK_ORDERS.to_string(), DEALS.to_string()]);
    let fetched = trace(&envelope)
        .into_iter()
        .filter(|entry| entry.starts_with("[ok] fetching: ") && entry.ends_with(" items"))
        .collect::<Vec<_>>();
    assert_eq!(
        fetched,
        vec!["[ok] fetching: Deal Funnel: 2 items".to_string(), "[ok] fetching: Work Order Tracker: 1 items".to_string()]
    );
}

#[tokio::test]
async fn every_board_failing_ends_in_a_user_facing_failure() {
    let mut source = StubSource::standard();
    source.items_fail_after.insert(DEALS.to_string(), 1);
    source.items_fail_after.insert(WORK_ORDERS.to_string(), 1);
    let envelope = runtime(source, Arc::new(StubLlm::new(BOTH_BOARDS_PLAN)))
        .handle(request("how many records do we have?"), CancellationToken::new())
        .await;

    let expected = PipelineFailure::AllBoardsFailed { rate_limited: false };
    assert_eq!(envelope.answer, expected.user_message());
    assert!(!envelope.answer.contains("502"));
    assert_eq!(
        trace(&envelope).last().map(String::as_str),
        Some("[fail] failed: every requested board failed to fetch")
    );
}

#[tokio::test]
async fn unreadable_schema_boards_are_skipped_during_planning() {
    let mut source = StubSource::standard();
    source.down.insert(WORK_ORDERS.to_string());
    let envelope = runtime(source, Arc::new(StubLlm::new(RENEWABLES_PLAN)))
        .handle(request("energy pipeline?"), CancellationToken::new())
        .await;

    let trace = trace(&envelope);
    assert!(trace.contains(&"[fail] planning: schema for workorders: unavailable; skipping board".to_string()));
    assert_eq!(trace.last().map(String::as_str), Some("[ok] done: answer ready"));
}

#[tokio::test]
async fn clarification_skips_fetching_and_cleaning() {
    let llm = StubLlm::new(r#"{"needs_clarification":true,"clarification_question":"Which board do you mean?"}"#);
    let envelope = runtime(StubSource::standard(), Arc::new(llm)).handle(request("tell me something"), CancellationToken::new()).await;

    assert_eq!(envelope.answer, "Which board do you mean?");
    assert!(envelope.data_quality_report.is_empty());
    let trace = trace(&envelope);
    assert!(!trace.iter().any(|entry| entry.contains("fetching:") || entry.contains("cleaning:")));
    assert_eq!(trace.last().map(String::as_str), Some("[ok] clarifying: asked the user to clarify the question"));
}

#[tokio::test]
async fn planner_model_outage_fails_with_capacity_message() {
    let llm = StubLlm { plan: Err(ModelError::RateLimited("429".to_string())), ..StubLlm::new("") };
    let envelope = runtime(StubSource::standard(), Arc::new(llm)).handle(request("pipeline?"), CancellationToken::new()).await;

    assert!(envelope.answer.contains("temporarily at capacity"));
    assert!(envelope.data_quality_report.is_empty());
    assert_eq!(
        trace(&envelope).last().map(String::as_str),
        Some("[fail] failed: the language model was unavailable while planning")
    );
}

#[tokio::test]
async fn composer_outage_degrades_to_templated_summary() {
    let llm = StubLlm { answer: Err(ModelError::Timeout(30)), ..StubLlm::new(RENEWABLES_PLAN) };
    let envelope = runtime(StubSource::standard(), Arc::new(llm)).handle(request("energy pipeline?"), CancellationToken::new()).await;

    assert!(envelope.answer.contains("- pipeline_value: ₹1.2Cr"), "{}", envelope.answer);
    assert!(envelope.answer.contains("Data quality:"), "{}", envelope.answer);
    let trace = trace(&envelope);
    assert!(trace.contains(&"[fail] composing: language model unavailable; answered with a templated summary".to_string()));
    assert_eq!(trace.last().map(String::as_str), Some("[ok] done: answer ready"));
}

#[tokio::test]
async fn cancellation_aborts_outstanding_model_calls() {
    let llm = StubLlm { delay: Duration::from_secs(10), ..StubLlm::new(RENEWABLES_PLAN) };
    let runtime = runtime(StubSource::standard(), Arc::new(llm));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let envelope = tokio::time::timeout(Duration::from_secs(1), runtime.handle(request("pipeline?"), cancel))
        .await
        .expect("cancellation should end the request promptly");

    assert_eq!(envelope.answer, PipelineFailure::Cancelled.user_message());
    assert_eq!(trace(&envelope).last().map(String::as_str), Some("[fail] failed: request cancelled"));
}

#[tokio::test]
async fn blank_message_is_answered_with_a_clarification() {
    let envelope = runtime(StubSource::standard(), Arc::new(StubLlm::new(RENEWABLES_PLAN)))
        .handle(request("   "), CancellationToken::new())
        .await;
    assert!(envelope.answer.contains("more specific"));
    assert!(envelope.data_quality_report.is_empty());
}
