use serde::{Deserialize, Serialize};

use crate::domain::schema::BoardId;

pub const DEFAULT_CLARIFICATION: &str =
    "Could you be more specific about what you'd like to know?";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    Summary,
    Comparison,
    Trend,
    Detail,
    Risk,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Comparison => "comparison",
            Self::Trend => "trend",
            Self::Detail => "detail",
            Self::Risk => "risk",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "summary" => Some(Self::Summary),
            "comparison" => Some(Self::Comparison),
            "trend" => Some(Self::Trend),
            "detail" => Some(Self::Detail),
            "risk" => Some(Self::Risk),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    InRange,
    InSet,
}

impl FilterOperator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "equals" | "eq" | "=" | "==" | "is" => Some(Self::Equals),
            "contains" | "like" => Some(Self::Contains),
            "greater_than" | "gt" | ">" | "after" => Some(Self::GreaterThan),
            "less_than" | "lt" | "<" | "before" => Some(Self::LessThan),
            "in_range" | "between" | "range" => Some(Self::InRange),
            "in_set" | "in" | "one_of" | "any_of" => Some(Self::InSet),
            _ => None,
        }
    }
}

/// Literal a filter compares against. Dates travel as ISO text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Number(f64),
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(Operand),
    Range { min: Option<Operand>, max: Option<Operand> },
    Set(Vec<Operand>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "aggregation", rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Average,
    Count,
    CountDistinct,
    Min,
    Max,
    BreakdownBy {
        #[serde(alias = "group_by")]
        category_field: String,
    },
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Average => "average",
            Self::Count => "count",
            Self::CountDistinct => "count_distinct",
            Self::Min => "min",
            Self::Max => "max",
            Self::BreakdownBy { .. } => "breakdown_by",
        }
    }

    /// Aggregations that need a numeric target field.
    pub fn requires_number(&self) -> bool {
        matches!(self, Self::Sum | Self::Average)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    #[serde(flatten)]
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
    /// Restricts the metric to one board; `None` spans every planned board.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<BoardId>,
}

/// Structured intent for one request. Immutable once produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub boards: Vec<BoardId>,
    pub filters: Vec<Filter>,
    pub metrics: Vec<MetricSpec>,
    pub analysis_type: AnalysisType,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
}

impl QueryPlan {
    pub fn clarification(question: impl Into<String>) -> Self {
        Self {
            needs_clarification: true,
            clarification_question: Some(question.into()),
            ..Self::default()
        }
    }

    pub fn clarification_text(&self) -> &str {
        self.clarification_question
            .as_deref()
            .filter(|question| !question.trim().is_empty())
            .unwrap_or(DEFAULT_CLARIFICATION)
    }
}
