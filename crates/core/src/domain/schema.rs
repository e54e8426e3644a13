use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(pub String);

impl BoardId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BoardId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for BoardId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Semantic type a field is coerced into during cleaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Date,
    Number,
    Category,
    Text,
    /// Unclassified columns, kept verbatim.
    Passthrough,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Number => "number",
            Self::Category => "category",
            Self::Text => "text",
            Self::Passthrough => "passthrough",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub kind: FieldKind,
    /// Column type as reported by the data source (`date`, `numbers`, `status`, ...).
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Column as reported by the data source, before classification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub id: String,
    pub title: String,
    pub column_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBoard {
    pub board_id: BoardId,
    pub name: String,
    pub columns: Vec<SourceColumn>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSchema {
    pub board_id: BoardId,
    /// Configured short key (`deals`, `workorders`) the board is known by.
    pub key: String,
    pub name: String,
    pub fields: BTreeMap<String, FieldDef>,
}

impl BoardSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Case-insensitive lookup returning the canonical field name.
    pub fn resolve_field(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.fields.get_key_value(name) {
            return Some(key.as_str());
        }
        let wanted = name.trim().to_lowercase();
        self.fields.keys().find(|key| key.to_lowercase() == wanted).map(String::as_str)
    }

    /// True when `reference` names this board by id, key, or display name.
    pub fn answers_to(&self, reference: &str) -> bool {
        let reference = reference.trim();
        self.board_id.as_str() == reference
            || self.key.eq_ignore_ascii_case(reference)
            || self.name.eq_ignore_ascii_case(reference)
    }
}
