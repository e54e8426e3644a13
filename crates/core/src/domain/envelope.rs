use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationTurn;
use crate::domain::quality::QualityReport;
use crate::trace::TraceEntry;

/// Inbound wire contract from the chat frontend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

/// Outbound wire contract to the chat frontend.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub answer: String,
    pub action_trace: Vec<TraceEntry>,
    pub data_quality_report: QualityReport,
}

#[cfg(test)]
mod tests {
    use crate::domain::quality::QualityReport;
    use crate::pipeline::PipelineState;
    use crate::trace::ActionTrace;

    use super::{QueryRequest, ResponseEnvelope};

    #[test]
    fn request_history_defaults_to_empty() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"message":"How is the pipeline?"}"#).expect("parse");
        assert!(request.history.is_empty());
    }

    #[test]
    fn envelope_serializes_trace_as_strings() {
        let mut trace = ActionTrace::new("req-1");
        trace.ok(PipelineState::Planning, "reading 2 board schemas");

        let envelope = ResponseEnvelope {
            answer: "done".to_string(),
            action_trace: trace.into_entries(),
            data_quality_report: QualityReport::default(),
        };
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["action_trace"][0], "[ok] planning: reading 2 board schemas");
        assert_eq!(json["data_quality_report"]["summary"], "");
    }
}
