use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::schema::BoardId;

/// Field name under which the item's own name is exposed to filters and breakdowns.
pub const NAME_FIELD: &str = "name";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemGroup {
    pub id: String,
    pub title: String,
}

/// One board row as returned by the data source. Empty text arrives as `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub group: ItemGroup,
    pub fields: BTreeMap<String, Option<String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Original,
    Normalized,
    Missing,
    Unparseable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CleanValue {
    Date(NaiveDate),
    Number(f64),
    Category(String),
    Text(String),
    Missing,
    /// Original text preserved verbatim.
    Unparseable(String),
}

impl CleanValue {
    pub fn is_unparseable(&self) -> bool {
        matches!(self, Self::Unparseable(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    /// Label used for text comparison and grouping; `None` for missing or unparseable values.
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Date(date) => Some(date.format("%Y-%m-%d").to_string()),
            Self::Number(value) => Some(format_plain_number(*value)),
            Self::Category(label) | Self::Text(label) => Some(label.clone()),
            Self::Missing | Self::Unparseable(_) => None,
        }
    }
}

fn format_plain_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CleanedField {
    pub raw: Option<String>,
    pub value: CleanValue,
    pub provenance: Provenance,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CleanedItem {
    pub board_id: BoardId,
    pub id: String,
    pub name: String,
    pub group: ItemGroup,
    pub fields: BTreeMap<String, CleanedField>,
}

impl CleanedItem {
    /// Value of `field`, with the item name reachable as [`NAME_FIELD`].
    /// `None` means the field does not exist on this item's board.
    pub fn value(&self, field: &str) -> Option<CleanValue> {
        if let Some(cleaned) = self.fields.get(field) {
            return Some(cleaned.value.clone());
        }
        if field == NAME_FIELD {
            return Some(CleanValue::Text(self.name.clone()));
        }
        None
    }
}
