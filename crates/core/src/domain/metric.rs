use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::schema::BoardId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Date(NaiveDate),
    /// No eligible items; serialized as `null`.
    NoData,
}

impl MetricValue {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub name: String,
    pub aggregation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<BoardId>,
    pub value: MetricValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BTreeMap<String, f64>>,
    /// Items that passed the filters and contributed to `value`.
    pub eligible: usize,
    /// Items dropped because a filtered or aggregated field was unparseable.
    pub excluded: usize,
}

#[cfg(test)]
mod tests {
    use super::{MetricResult, MetricValue};

    #[test]
    fn no_data_serializes_as_null() {
        let result = MetricResult {
            name: "avg_deal".to_string(),
            aggregation: "average".to_string(),
            board_id: None,
            value: MetricValue::NoData,
            unit: None,
            breakdown: None,
            eligible: 0,
            excluded: 0,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert!(json["value"].is_null());
        assert!(json.get("breakdown").is_none());
    }
}
