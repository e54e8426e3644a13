pub mod cleaning;
pub mod config;
pub mod domain;
pub mod errors;
pub mod metrics;
pub mod pipeline;
pub mod source;
pub mod trace;

pub use cleaning::DataCleaner;
pub use domain::conversation::{ConversationTurn, Role};
pub use domain::envelope::{QueryRequest, ResponseEnvelope};
pub use domain::item::{CleanValue, CleanedItem, RawItem};
pub use domain::metric::{MetricResult, MetricValue};
pub use domain::plan::{Aggregation, Filter, FilterOperator, MetricSpec, QueryPlan};
pub use domain::quality::QualityReport;
pub use domain::schema::{BoardId, BoardSchema, FieldDef, FieldKind};
pub use errors::{InterfaceError, ModelError, PipelineFailure, PlanParseError, SourceError};
pub use metrics::MetricEngine;
pub use pipeline::{PipelineMachine, PipelineState};
pub use source::{ConfiguredBoard, DataSource, SchemaProvider};
pub use trace::{ActionTrace, TraceEntry};
