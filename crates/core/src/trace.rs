use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::pipeline::PipelineState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceOutcome {
    Success,
    Failure,
}

impl TraceOutcome {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Success => "[ok]",
            Self::Failure => "[fail]",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    pub stage: PipelineState,
    pub outcome: TraceOutcome,
    pub message: String,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.outcome.marker(), self.stage, self.message)
    }
}

impl Serialize for TraceEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Ordered, request-scoped log of pipeline stage transitions.
///
/// Each record is mirrored to `tracing` under the request's correlation id.
#[derive(Clone, Debug)]
pub struct ActionTrace {
    correlation_id: String,
    entries: Vec<TraceEntry>,
}

impl ActionTrace {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), entries: Vec::new() }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn ok(&mut self, stage: PipelineState, message: impl Into<String>) {
        self.record(stage, TraceOutcome::Success, message.into());
    }

    pub fn fail(&mut self, stage: PipelineState, message: impl Into<String>) {
        self.record(stage, TraceOutcome::Failure, message.into());
    }

    fn record(&mut self, stage: PipelineState, outcome: TraceOutcome, message: String) {
        match outcome {
            TraceOutcome::Success => info!(
                event_name = "pipeline.trace",
                correlation_id = %self.correlation_id,
                stage = stage.as_str(),
                "{message}"
            ),
            TraceOutcome::Failure => warn!(
                event_name = "pipeline.trace",
                correlation_id = %self.correlation_id,
                stage = stage.as_str(),
                "{message}"
            ),
        }
        self.entries.push(TraceEntry { stage, outcome, message });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::PipelineState;

    use super::{ActionTrace, TraceOutcome};

    #[test]
    fn entries_keep_insertion_order_and_markers() {
        let mut trace = ActionTrace::new("req-7");
        trace.ok(PipelineState::Planning, "reading schemas");
        trace.fail(PipelineState::Fetching, "board 42 unavailable");
        trace.ok(PipelineState::Cleaning, "cleaning 10 items");

        let rendered = trace.entries().iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec![
                "[ok] planning: reading schemas",
                "[fail] fetching: board 42 unavailable",
                "[ok] cleaning: cleaning 10 items",
            ]
        );
        assert_eq!(trace.entries()[1].outcome, TraceOutcome::Failure);
        assert_eq!(trace.correlation_id(), "req-7");
    }
}
