//! Pipeline orchestration for a single request.
//!
//! `handle` walks the [`PipelineMachine`] from planning to a terminal state, records an
//! [`ActionTrace`] entry per stage, and always returns a [`ResponseEnvelope`]: failures
//! become a user-facing answer, never an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use boardsight_core::cleaning::dates::DateParser;
use boardsight_core::config::AppConfig;
use boardsight_core::domain::plan::DEFAULT_CLARIFICATION;
use boardsight_core::{
    ActionTrace, BoardSchema, ConfiguredBoard, DataCleaner, DataSource, MetricEngine,
    PipelineFailure, PipelineMachine, PipelineState, QualityReport, QueryPlan, QueryRequest,
    ResponseEnvelope, SchemaProvider, SourceError,
};
use chrono::NaiveDate;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::composer::{AnswerSource, ResponseComposer};
use crate::conversation::ConversationWindow;
use crate::llm::LlmClient;
use crate::planner::QueryPlanner;
use crate::retry::BackoffPolicy;

#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// Retry and timeout policy for data-source calls.
    pub fetch: BackoffPolicy,
    /// Retry and timeout policy for language-model calls.
    pub model: BackoffPolicy,
    pub history_turns: usize,
    pub plan_max_tokens: u32,
    pub answer_max_tokens: u32,
    pub max_quality_issues: usize,
    pub max_distinct_values: usize,
    pub today: Option<NaiveDate>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RuntimeOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fetch: BackoffPolicy::new(
                config.monday.max_retries,
                config.monday.retry_base_delay_ms,
                Duration::from_secs(config.monday.timeout_secs),
            ),
            model: BackoffPolicy::new(config.llm.max_retries, 500, Duration::from_secs(config.llm.timeout_secs)),
            history_turns: config.pipeline.history_turns,
            plan_max_tokens: config.llm.plan_max_tokens,
            answer_max_tokens: config.llm.answer_max_tokens,
            max_quality_issues: config.pipeline.max_quality_issues,
            max_distinct_values: config.pipeline.max_distinct_values,
            today: None,
        }
    }
}

/// Mutable state of one request: where it is, what it did, what cleaning found.
struct RequestRun {
    machine: PipelineMachine,
    trace: ActionTrace,
    quality: QualityReport,
}

impl RequestRun {
    fn new(correlation_id: String) -> Self {
        Self {
            machine: PipelineMachine::new(),
            trace: ActionTrace::new(correlation_id),
            quality: QualityReport::default(),
        }
    }

    fn enter(&mut self, stage: PipelineState, message: impl Into<String>) -> Result<(), PipelineFailure> {
        self.machine.advance(stage)?;
        self.trace.ok(stage, message);
        Ok(())
    }

    fn fail(&mut self, failure: &PipelineFailure) {
        if let Err(error) = self.machine.advance(PipelineState::Failed) {
            warn!(
                event_name = "pipeline.failure.late",
                correlation_id = %self.trace.correlation_id(),
                error = %error,
                "failure after the request reached a terminal state"
            );
        }
        self.trace.fail(PipelineState::Failed, failure_summary(failure));
    }
}

fn failure_summary(failure: &PipelineFailure) -> &'static str {
    match failure {
        PipelineFailure::SchemaUnavailable { .. } => "no board schema could be retrieved",
        PipelineFailure::AllBoardsFailed { .. } => "every requested board failed to fetch",
        PipelineFailure::Planning(_) => "the language model was unavailable while planning",
        PipelineFailure::Transition(_) => "internal pipeline error",
        PipelineFailure::Cancelled => "request cancelled",
    }
}

/// Short, caller-safe description of a source failure.
fn source_failure_summary(error: &SourceError) -> String {
    match error {
        SourceError::Unavailable(_) => "unavailable".to_string(),
        SourceError::RateLimited(_) => "rate limited".to_string(),
        SourceError::BoardNotFound(_) => "board not found".to_string(),
        SourceError::Timeout(secs) => format!("timed out after {secs}s"),
    }
}

fn describe_plan(plan: &QueryPlan, schemas: &[BoardSchema]) -> String {
    let boards = plan
        .boards
        .iter()
        .map(|id| {
            schemas
                .iter()
                .find(|schema| &schema.board_id == id)
                .map_or_else(|| id.to_string(), |schema| schema.name.clone())
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "plan: query {boards}; {} filters, {} metrics, {} analysis",
        plan.filters.len(),
        plan.metrics.len(),
        plan.analysis_type.as_str()
    )
}

/// Runs the planning → fetch → clean → aggregate → compose pipeline.
#[derive(Clone)]
pub struct AgentRuntime {
    source: Arc<dyn DataSource>,
    boards: Vec<ConfiguredBoard>,
    schemas: SchemaProvider,
    planner: QueryPlanner,
    composer: ResponseComposer,
    cleaner: DataCleaner,
    dates: DateParser,
    fetch_policy: BackoffPolicy,
    max_quality_issues: usize,
}

impl AgentRuntime {
    pub fn new(
        source: Arc<dyn DataSource>,
        llm: Arc<dyn LlmClient>,
        boards: Vec<ConfiguredBoard>,
        options: RuntimeOptions,
    ) -> Self {
        let dates = DateParser::standard();
        let cleaner = DataCleaner::new(dates.clone());
        let window = ConversationWindow::new(options.history_turns);
        let mut planner = QueryPlanner::new(llm.clone(), options.model, window, options.plan_max_tokens);
        let mut composer = ResponseComposer::new(llm, options.model, window, options.answer_max_tokens);
        if let Some(today) = options.today {
            planner = planner.with_today(today);
            composer = composer.with_today(today);
        }

        Self {
            schemas: SchemaProvider::new(source.clone(), cleaner.clone(), options.max_distinct_values),
            source,
            boards,
            planner,
            composer,
            cleaner,
            dates,
            fetch_policy: options.fetch,
            max_quality_issues: options.max_quality_issues,
        }
    }

    pub fn boards(&self) -> &[ConfiguredBoard] {
        &self.boards
    }

    pub fn board(&self, key: &str) -> Option<&ConfiguredBoard> {
        self.boards.iter().find(|board| board.key.eq_ignore_ascii_case(key.trim()))
    }

    /// Live schema of one configured board, under the fetch retry policy.
    pub async fn describe(&self, board: &ConfiguredBoard) -> Result<BoardSchema, SourceError> {
        self.fetch_policy.retry("describe_board", move || self.schemas.describe(board)).await
    }

    pub async fn handle(&self, request: QueryRequest, cancel: CancellationToken) -> ResponseEnvelope {
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(
            event_name = "pipeline.request.received",
            correlation_id = %correlation_id,
            history_turns = request.history.len(),
            "query received"
        );

        let mut run = RequestRun::new(correlation_id);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineFailure::Cancelled),
            outcome = self.run(&request, &mut run) => outcome,
        };

        let answer = match outcome {
            Ok(answer) => answer,
            Err(failure) => {
                warn!(
                    event_name = "pipeline.request.failed",
                    correlation_id = %run.trace.correlation_id(),
                    error = %failure,
                    "request failed"
                );
                run.fail(&failure);
                failure.user_message().to_string()
            }
        };

        run.quality.truncate_issues(self.max_quality_issues);
        info!(
            event_name = "pipeline.request.completed",
            correlation_id = %run.trace.correlation_id(),
            state = run.machine.state().as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query completed"
        );
        ResponseEnvelope { answer, action_trace: run.trace.into_entries(), data_quality_report: run.quality }
    }

    async fn run(&self, request: &QueryRequest, run: &mut RequestRun) -> Result<String, PipelineFailure> {
        if request.message.trim().is_empty() {
            run.trace.ok(PipelineState::Planning, "empty question");
            run.enter(PipelineState::Clarifying, "asked the user what they would like to know")?;
            return Ok(DEFAULT_CLARIFICATION.to_string());
        }

        run.trace.ok(PipelineState::Planning, format!("reading {} board schemas", self.boards.len()));
        let schemas = self.describe_boards(run).await?;

        let plan = self
            .planner
            .plan(&request.message, &request.history, &schemas)
            .await
            .map_err(PipelineFailure::Planning)?;
        if plan.needs_clarification {
            run.enter(PipelineState::Clarifying, "asked the user to clarify the question")?;
            return Ok(plan.clarification_text().to_string());
        }
        run.trace.ok(PipelineState::Planning, describe_plan(&plan, &schemas));

        let selected = plan
            .boards
            .iter()
            .filter_map(|id| schemas.iter().find(|schema| &schema.board_id == id))
            .collect::<Vec<_>>();
        run.enter(PipelineState::Fetching, format!("fetching items from {} boards", selected.len()))?;
        let fetches = selected.iter().map(|schema| {
            let board_id = &schema.board_id;
            self.fetch_policy.retry("fetch_items", move || self.source.fetch_items(board_id))
        });
        let results = join_all(fetches).await;

        let mut fetched = Vec::new();
        let mut rate_limited = false;
        for (schema, result) in selected.into_iter().zip(results) {
            match result {
                Ok(items) => {
                    run.trace.ok(PipelineState::Fetching, format!("{}: {} items", schema.name, items.len()));
                    fetched.push((schema, items));
                }
                Err(error) => {
                    rate_limited |= error.is_rate_limited();
                    warn!(
                        event_name = "source.fetch.failed",
                        correlation_id = %run.trace.correlation_id(),
                        board_id = %schema.board_id,
                        error = %error,
                        "board fetch failed"
                    );
                    run.trace.fail(
                        PipelineState::Fetching,
                        format!("{}: {}; continuing without it", schema.name, source_failure_summary(&error)),
                    );
                }
            }
        }
        if fetched.is_empty() {
            return Err(PipelineFailure::AllBoardsFailed { rate_limited });
        }

        let mut cleaned = Vec::new();
        for (schema, items) in &fetched {
            let (items, report) = self.cleaner.clean(items, schema);
            run.quality.merge(&report);
            cleaned.extend(items);
        }
        let cleaning_note = match run.quality.summary() {
            summary if summary.is_empty() => format!("cleaned {} items", cleaned.len()),
            summary => summary,
        };
        run.enter(PipelineState::Cleaning, cleaning_note)?;

        let engine = MetricEngine::new(self.dates.clone()).with_schemas(&schemas);
        let metrics = engine.compute(&cleaned, &plan);
        let excluded = metrics.iter().map(|metric| metric.excluded).sum::<usize>();
        run.enter(
            PipelineState::Aggregating,
            format!("computed {} metrics over {} items ({excluded} exclusions)", metrics.len(), cleaned.len()),
        )?;

        run.enter(PipelineState::Composing, "generating the briefing")?;
        let composition = self.composer.compose(&request.message, &request.history, &metrics, &run.quality).await;
        if composition.source == AnswerSource::Fallback {
            run.trace.fail(
                PipelineState::Composing,
                "language model unavailable; answered with a templated summary",
            );
        }

        run.enter(PipelineState::Done, "answer ready")?;
        Ok(composition.answer)
    }

    /// Describes every configured board concurrently; failures are traced and skipped.
    async fn describe_boards(&self, run: &mut RequestRun) -> Result<Vec<BoardSchema>, PipelineFailure> {
        let results = join_all(self.boards.iter().map(|board| self.describe(board))).await;

        let mut schemas = Vec::new();
        let mut rate_limited = false;
        for (board, result) in self.boards.iter().zip(results) {
            match result {
                Ok(schema) => schemas.push(schema),
                Err(error) => {
                    rate_limited |= error.is_rate_limited();
                    warn!(
                        event_name = "source.schema.failed",
                        correlation_id = %run.trace.correlation_id(),
                        board_id = %board.board_id,
                        error = %error,
                        "board schema unavailable"
                    );
                    run.trace.fail(
                        PipelineState::Planning,
                        format!("schema for {}: {}; skipping board", board.key, source_failure_summary(&error)),
                    );
                }
            }
        }

        if schemas.is_empty() {
            return Err(PipelineFailure::SchemaUnavailable { rate_limited });
        }
        let names = schemas
            .iter()
            .map(|schema| format!("{} ({} fields)", schema.name, schema.fields.len()))
            .collect::<Vec<_>>()
            .join(", ");
        run.trace.ok(PipelineState::Planning, format!("retrieved schemas: {names}"));
        Ok(schemas)
    }
}
