//! Query planning: utterance + history + live schemas → validated [`QueryPlan`].
//!
//! The model sees every board's fields together with the cleaned distinct values of its
//! categorical fields, so it maps user vocabulary ("energy") onto real labels
//! ("Renewables") itself. Its JSON is then resolved against those schemas; anything that
//! does not resolve is a [`PlanParseError`] and earns one corrective retry.

use std::fmt::Write as _;
use std::sync::Arc;

use boardsight_core::domain::item::NAME_FIELD;
use boardsight_core::domain::plan::{AnalysisType, FilterValue, Operand, DEFAULT_CLARIFICATION};
use boardsight_core::{
    Aggregation, BoardId, BoardSchema, ConversationTurn, FieldKind, Filter, FilterOperator,
    MetricSpec, ModelError, PlanParseError, QueryPlan,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::conversation::ConversationWindow;
use crate::llm::{ChatMessage, LlmClient, Prompt};
use crate::retry::BackoffPolicy;

pub const REPHRASE_CLARIFICATION: &str = "I had trouble understanding your question. Could you rephrase it? I need to create a clear plan to query the right data.";

const PLANNER_RULES: &str = r#"RULES:
1. Return ONLY one JSON object. No markdown, no code fences, no commentary.
2. Shape:
{"boards":["<board key or id>"],
 "filters":[{"field":"<field>","operator":"equals|contains|greater_than|less_than|in_range|in_set","value":<value>}],
 "metrics":[{"name":"<snake_case name>","aggregation":"sum|average|count|count_distinct|min|max|breakdown_by","target_field":"<field or null>","category_field":"<field, breakdown_by only>","board":"<optional board key>"}],
 "analysis_type":"summary|comparison|trend|detail|risk",
 "needs_clarification":false,
 "clarification_question":null}
3. Set needs_clarification to true ONLY when the question is genuinely ambiguous, for example "tell me something" or "help me". Never ask for clarification on normal business questions such as "how is our pipeline?"; plan those.
4. Include only the boards relevant to the question.
5. Add filters only for sectors, statuses, owners, dates or amounts the user actually mentions.
6. Filter values for fields with listed values MUST be one of those exact values. Map user wording to the closest listed value (e.g. "energy" maps to "Renewables").
7. in_range takes {"min":..,"max":..} (either bound may be null); in_set takes an array. Dates are written YYYY-MM-DD.
8. sum and average need a numeric target_field; min and max need a numeric or date target_field; count needs no target_field.
9. analysis_type: "summary" for overviews, "comparison" for comparing segments, "trend" for time-based analysis, "detail" for item lists, "risk" for stalling or overdue work.
10. The pseudo-field "name" is each item's own name."#;

/// Turns a user utterance into a [`QueryPlan`] with one corrective retry.
#[derive(Clone)]
pub struct QueryPlanner {
    llm: Arc<dyn LlmClient>,
    policy: BackoffPolicy,
    window: ConversationWindow,
    max_tokens: u32,
    today: Option<NaiveDate>,
}

enum AttemptFailure {
    Parse(PlanParseError),
    Model(ModelError),
}

impl QueryPlanner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        policy: BackoffPolicy,
        window: ConversationWindow,
        max_tokens: u32,
    ) -> Self {
        Self { llm, policy, window, max_tokens, today: None }
    }

    /// Pins the date the prompt reports as today.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Returns `Err` only when the model itself stayed unavailable; unusable output
    /// always degrades to a clarification plan.
    pub async fn plan(
        &self,
        utterance: &str,
        history: &[ConversationTurn],
        schemas: &[BoardSchema],
    ) -> Result<QueryPlan, ModelError> {
        if utterance.trim().is_empty() {
            return Ok(QueryPlan::clarification(DEFAULT_CLARIFICATION));
        }

        let mut base = Prompt::new(system_prompt(schemas, self.today()), self.max_tokens).json();
        for message in self.window.messages(history) {
            base.push(message);
        }
        base.push(ChatMessage::user(utterance.trim()));

        let mut prompt = base.clone();
        let mut last_failure = None;
        for attempt in 0..=self.policy.max_retries {
            match self.policy.attempt(self.llm.complete(&prompt)).await {
                Ok(text) => match parse_plan(&text, schemas) {
                    Ok(plan) => {
                        debug!(
                            event_name = "planner.plan.parsed",
                            attempt,
                            boards = plan.boards.len(),
                            metrics = plan.metrics.len(),
                            needs_clarification = plan.needs_clarification,
                            "query plan parsed"
                        );
                        return Ok(plan);
                    }
                    Err(error) => {
                        warn!(
                            event_name = "planner.parse_failed",
                            attempt,
                            error = %error,
                            "model output is not a usable plan"
                        );
                        prompt = base.clone().with_message(ChatMessage::assistant(text)).with_message(
                            ChatMessage::user(corrective_message(&error)),
                        );
                        last_failure = Some(AttemptFailure::Parse(error));
                    }
                },
                Err(error) => {
                    warn!(
                        event_name = "planner.model_failed",
                        attempt,
                        error = %error,
                        "planner model call failed"
                    );
                    if attempt < self.policy.max_retries {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                    last_failure = Some(AttemptFailure::Model(error));
                }
            }
        }

        match last_failure {
            Some(AttemptFailure::Model(error)) => Err(error),
            Some(AttemptFailure::Parse(_)) | None => Ok(QueryPlan::clarification(REPHRASE_CLARIFICATION)),
        }
    }
}

fn corrective_message(error: &PlanParseError) -> String {
    format!(
        "That reply could not be used as a query plan: {error}. Reply again with ONLY a JSON object in the shape from the rules, using only the boards and fields listed."
    )
}

pub fn system_prompt(schemas: &[BoardSchema], today: NaiveDate) -> String {
    let mut prompt = String::from(
        "You are a query planner for a business intelligence system connected to monday.com boards. \
         Turn the user's question into a JSON query plan.\n\nAVAILABLE BOARDS:\n",
    );
    for schema in schemas {
        let _ = writeln!(prompt, "Board \"{}\" (key: {}, id: {})", schema.name, schema.key, schema.board_id);
        let _ = writeln!(prompt, "  - {NAME_FIELD} [text]");
        for (name, field) in &schema.fields {
            let unit = field.unit.as_deref().map(|unit| format!(", {unit}")).unwrap_or_default();
            match &field.distinct_values {
                Some(values) => {
                    let _ = writeln!(prompt, "  - {name} [{}{unit}]: {}", field.kind.as_str(), values.join(", "));
                }
                None => {
                    let _ = writeln!(prompt, "  - {name} [{}{unit}]", field.kind.as_str());
                }
            }
        }
    }
    let _ = write!(
        prompt,
        "\n{PLANNER_RULES}\n\nToday's date is {}. Use it for relative dates such as \"this quarter\" or \"overdue\".",
        today.format("%Y-%m-%d")
    );
    prompt
}

#[derive(Debug, Deserialize)]
struct PlanDraft {
    #[serde(default, alias = "boards_to_query")]
    boards: Vec<Value>,
    #[serde(default)]
    filters: Value,
    #[serde(default)]
    metrics: Vec<MetricDraft>,
    #[serde(default)]
    analysis_type: Option<String>,
    #[serde(default)]
    needs_clarification: bool,
    #[serde(default)]
    clarification_question: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilterDraft {
    field: String,
    #[serde(alias = "op")]
    operator: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct MetricDraft {
    #[serde(default)]
    name: Option<String>,
    aggregation: String,
    #[serde(default)]
    target_field: Option<String>,
    #[serde(default, alias = "group_by", alias = "breakdown_by")]
    category_field: Option<String>,
    #[serde(default)]
    board: Option<Value>,
}

/// Extracts, deserializes, and validates a plan from raw model output.
pub fn parse_plan(text: &str, schemas: &[BoardSchema]) -> Result<QueryPlan, PlanParseError> {
    let json = extract_json_object(text).ok_or(PlanParseError::NoJson)?;
    let draft: PlanDraft =
        serde_json::from_str(json).map_err(|error| PlanParseError::Malformed(error.to_string()))?;

    if draft.needs_clarification {
        let question = draft.clarification_question.unwrap_or_default();
        return Ok(QueryPlan::clarification(question));
    }

    let mut selected: Vec<&BoardSchema> = Vec::new();
    for reference in &draft.boards {
        let schema = resolve_board(reference, schemas)?;
        if !selected.iter().any(|chosen| chosen.board_id == schema.board_id) {
            selected.push(schema);
        }
    }
    if selected.is_empty() {
        return Err(PlanParseError::NoBoards);
    }
    let scope = PlanScope { boards: selected };

    let filters = filter_drafts(draft.filters)?
        .into_iter()
        .map(|filter| scope.filter(filter))
        .collect::<Result<Vec<_>, _>>()?;

    if draft.metrics.is_empty() {
        return Err(PlanParseError::NoMetrics);
    }
    let metrics = draft
        .metrics
        .into_iter()
        .map(|metric| scope.metric(metric, schemas))
        .collect::<Result<Vec<_>, _>>()?;

    let analysis_type = draft.analysis_type.as_deref().and_then(AnalysisType::parse).unwrap_or_default();

    Ok(QueryPlan {
        boards: scope.boards.iter().map(|schema| schema.board_id.clone()).collect(),
        filters,
        metrics,
        analysis_type,
        needs_clarification: false,
        clarification_question: None,
    })
}

/// Slice from the first `{` to the last `}`, tolerating code fences and prose.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn reference_text(reference: &Value) -> Option<String> {
    match reference {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn resolve_board<'a>(reference: &Value, schemas: &'a [BoardSchema]) -> Result<&'a BoardSchema, PlanParseError> {
    let text = reference_text(reference).ok_or_else(|| PlanParseError::UnknownBoard(reference.to_string()))?;
    schemas.iter().find(|schema| schema.answers_to(&text)).ok_or(PlanParseError::UnknownBoard(text))
}

/// Accepts the list form and the `{field: value}` shorthand; nulls in the shorthand are
/// unset filters.
fn filter_drafts(value: Value) -> Result<Vec<FilterDraft>, PlanParseError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => {
            serde_json::from_value(value).map_err(|error| PlanParseError::Malformed(error.to_string()))
        }
        Value::Object(entries) => Ok(entries
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(field, value)| {
                let operator = if value.is_array() { "in_set" } else { "equals" };
                FilterDraft { field, operator: operator.to_string(), value }
            })
            .collect()),
        other => Err(PlanParseError::Malformed(format!("filters must be a list, got {other}"))),
    }
}

fn operand(value: &Value) -> Option<Operand> {
    match value {
        Value::Number(number) => number.as_f64().map(Operand::Number),
        Value::String(text) if !text.trim().is_empty() => Some(Operand::Text(text.trim().to_string())),
        _ => None,
    }
}

fn operands(values: &[Value]) -> Option<Vec<Operand>> {
    values.iter().map(operand).collect()
}

fn aggregation_kind(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
        "sum" | "total" => Some("sum"),
        "average" | "avg" | "mean" => Some("average"),
        "count" => Some("count"),
        "count_distinct" | "distinct_count" | "unique" => Some("count_distinct"),
        "min" | "minimum" | "earliest" => Some("min"),
        "max" | "maximum" | "latest" => Some("max"),
        "breakdown_by" | "breakdown" | "group_by" => Some("breakdown_by"),
        _ => None,
    }
}

struct PlanScope<'a> {
    boards: Vec<&'a BoardSchema>,
}

impl<'a> PlanScope<'a> {
    /// Canonical field name and kind, looked up on `board` or on every selected board.
    fn field(&self, name: &str, board: Option<&BoardId>) -> Result<(String, FieldKind), PlanParseError> {
        let name = name.trim();
        if name.eq_ignore_ascii_case(NAME_FIELD) {
            return Ok((NAME_FIELD.to_string(), FieldKind::Text));
        }
        self.boards
            .iter()
            .filter(|schema| board.map_or(true, |board| &schema.board_id == board))
            .find_map(|schema| {
                let canonical = schema.resolve_field(name)?;
                let kind = schema.field(canonical)?.kind;
                Some((canonical.to_string(), kind))
            })
            .ok_or_else(|| PlanParseError::UnknownField { field: name.to_string() })
    }

    fn filter(&self, draft: FilterDraft) -> Result<Filter, PlanParseError> {
        let (field, _) = self.field(&draft.field, None)?;
        let invalid =
            |reason: &str| PlanParseError::InvalidFilter { field: field.clone(), reason: reason.to_string() };
        let mut operator = FilterOperator::parse(&draft.operator)
            .ok_or_else(|| invalid(&format!("unknown operator `{}`", draft.operator)))?;

        let value = match (operator, &draft.value) {
            (FilterOperator::InRange, Value::Object(bounds)) => {
                let min = bounds.get("min").filter(|bound| !bound.is_null());
                let max = bounds.get("max").filter(|bound| !bound.is_null());
                if min.is_none() && max.is_none() {
                    return Err(invalid("in_range needs a min or a max"));
                }
                let bound = |value: Option<&Value>| match value {
                    Some(value) => {
                        operand(value).map(Some).ok_or_else(|| invalid("range bounds must be numbers or text"))
                    }
                    None => Ok(None),
                };
                FilterValue::Range { min: bound(min)?, max: bound(max)? }
            }
            (FilterOperator::InRange, Value::Array(bounds)) if bounds.len() == 2 => {
                FilterValue::Set(operands(bounds).ok_or_else(|| invalid("range bounds must be numbers or text"))?)
            }
            (FilterOperator::InRange, _) => return Err(invalid("in_range expects {min, max} or [min, max]")),
            (FilterOperator::InSet | FilterOperator::Equals, Value::Array(members)) => {
                if members.is_empty() {
                    return Err(invalid("in_set needs at least one value"));
                }
                operator = FilterOperator::InSet;
                FilterValue::Set(operands(members).ok_or_else(|| invalid("set members must be numbers or text"))?)
            }
            (_, Value::Array(_) | Value::Object(_)) => return Err(invalid("expected a single value")),
            (_, scalar) => {
                FilterValue::One(operand(scalar).ok_or_else(|| invalid("missing or non-scalar value"))?)
            }
        };

        Ok(Filter { field, operator, value })
    }

    fn metric(&self, draft: MetricDraft, schemas: &[BoardSchema]) -> Result<MetricSpec, PlanParseError> {
        let label = draft.name.clone().unwrap_or_else(|| draft.aggregation.clone());
        let invalid = |reason: String| PlanParseError::InvalidMetric { metric: label.clone(), reason };

        let board = match &draft.board {
            None | Some(Value::Null) => None,
            Some(reference) => {
                let schema = resolve_board(reference, schemas)?;
                if !self.boards.iter().any(|chosen| chosen.board_id == schema.board_id) {
                    return Err(invalid(format!("board `{}` is not part of the plan", schema.key)));
                }
                Some(schema.board_id.clone())
            }
        };

        let target = match draft.target_field.as_deref().map(str::trim).filter(|field| !field.is_empty()) {
            Some(field) => Some(self.field(field, board.as_ref())?),
            None => None,
        };

        let kind = aggregation_kind(&draft.aggregation)
            .ok_or_else(|| invalid(format!("unknown aggregation `{}`", draft.aggregation)))?;
        let aggregation = match kind {
            "sum" => Aggregation::Sum,
            "average" => Aggregation::Average,
            "count" => Aggregation::Count,
            "count_distinct" => Aggregation::CountDistinct,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            _ => {
                let category = draft
                    .category_field
                    .as_deref()
                    .ok_or_else(|| invalid("breakdown_by needs a category_field".to_string()))?;
                let (category_field, _) = self.field(category, board.as_ref())?;
                Aggregation::BreakdownBy { category_field }
            }
        };

        let numeric_target =
            aggregation.requires_number() || matches!(aggregation, Aggregation::BreakdownBy { .. });
        match (&aggregation, &target) {
            (_, None) if aggregation.requires_number() => {
                return Err(invalid(format!("{} needs a numeric target_field", aggregation.as_str())));
            }
            (Aggregation::Min | Aggregation::Max | Aggregation::CountDistinct, None) => {
                return Err(invalid(format!("{} needs a target_field", aggregation.as_str())));
            }
            (_, Some((field, kind))) if numeric_target && *kind != FieldKind::Number => {
                return Err(invalid(format!("`{field}` is not numeric")));
            }
            (Aggregation::Min | Aggregation::Max, Some((field, kind)))
                if !matches!(kind, FieldKind::Number | FieldKind::Date) =>
            {
                return Err(invalid(format!("`{field}` is neither numeric nor a date")));
            }
            _ => {}
        }

        let target_field = target.map(|(field, _)| field);
        let name = draft
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_metric_name(&aggregation, target_field.as_deref()));

        Ok(MetricSpec { name, aggregation, target_field, board })
    }
}

fn default_metric_name(aggregation: &Aggregation, target: Option<&str>) -> String {
    let subject = match (aggregation, target) {
        (Aggregation::BreakdownBy { category_field }, _) => category_field.as_str(),
        (_, Some(target)) => target,
        (_, None) => "items",
    };
    let slug = subject
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    format!("{}_{slug}", aggregation.as_str())
}
