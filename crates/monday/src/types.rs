use std::collections::BTreeMap;

use boardsight_core::domain::item::{ItemGroup, RawItem};
use boardsight_core::domain::schema::{BoardId, SourceBoard, SourceColumn};
use serde::Deserialize;

/// GraphQL envelope: monday.com answers 200 with an `errors` array on query failures.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
    /// Legacy top-level error shape (`error_code` / `error_message`).
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub extensions: Option<ErrorExtensions>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorExtensions {
    #[serde(default)]
    pub code: Option<String>,
}

impl GraphQlError {
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref().and_then(|extensions| extensions.code.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct BoardsData {
    #[serde(default)]
    pub boards: Vec<BoardNode>,
}

#[derive(Debug, Deserialize)]
pub struct BoardNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnNode>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnNode {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

#[derive(Debug, Deserialize)]
pub struct FirstPageData {
    #[serde(default)]
    pub boards: Vec<FirstPageBoard>,
}

#[derive(Debug, Deserialize)]
pub struct FirstPageBoard {
    pub items_page: ItemsPage,
}

#[derive(Debug, Deserialize)]
pub struct NextPageData {
    pub next_items_page: ItemsPage,
}

#[derive(Debug, Deserialize)]
pub struct ItemsPage {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemNode>,
}

#[derive(Debug, Deserialize)]
pub struct ItemNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub group: Option<GroupNode>,
    #[serde(default)]
    pub column_values: Vec<ColumnValueNode>,
}

#[derive(Debug, Deserialize)]
pub struct GroupNode {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ColumnValueNode {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub column: Option<ColumnTitle>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnTitle {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountData {
    pub me: Me,
}

#[derive(Debug, Deserialize)]
pub struct Me {
    pub name: String,
    #[serde(default)]
    pub account: Option<Account>,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub name: String,
}

impl BoardNode {
    pub fn into_source_board(self) -> SourceBoard {
        SourceBoard {
            board_id: BoardId::from(self.id),
            name: self.name,
            columns: self
                .columns
                .into_iter()
                .map(|column| SourceColumn { id: column.id, title: column.title, column_type: column.column_type })
                .collect(),
        }
    }
}

impl ItemNode {
    /// Keys column values by title (falling back to the column id); empty text is missing.
    pub fn into_raw_item(self) -> RawItem {
        let fields = self
            .column_values
            .into_iter()
            .map(|value| {
                let title = value.column.map(|column| column.title).unwrap_or(value.id);
                let text = value.text.filter(|text| !text.is_empty());
                (title, text)
            })
            .collect::<BTreeMap<_, _>>();
        let group = self
            .group
            .map(|group| ItemGroup { id: group.id, title: group.title })
            .unwrap_or_default();
        RawItem { id: self.id, name: self.name, group, fields }
    }
}

#[cfg(test)]
mod tests {
    use super::{GraphQlResponse, ItemNode};

    #[test]
    fn items_are_keyed_by_column_title_with_empty_text_missing() {
        let node: ItemNode = serde_json::from_value(serde_json::json!({
            "id": "11",
            "name": "Solar Farm",
            "group": {"id": "topics", "title": "Q1"},
            "column_values": [
                {"id": "deal_stage", "text": "Open", "column": {"title": "Deal Stage"}},
                {"id": "close_date", "text": "", "column": {"title": "Close Date (A)"}},
                {"id": "orphan", "text": "x"}
            ]
        }))
        .expect("item");

        let item = node.into_raw_item();
        assert_eq!(item.group.title, "Q1");
        assert_eq!(item.fields.get("Deal Stage"), Some(&Some("Open".to_string())));
        assert_eq!(item.fields.get("Close Date (A)"), Some(&None));
        assert_eq!(item.fields.get("orphan"), Some(&Some("x".to_string())));
    }

    #[test]
    fn error_codes_are_read_from_extensions() {
        let response: GraphQlResponse<serde_json::Value> = serde_json::from_str(
            r#"{"errors":[{"message":"Complexity budget exhausted","extensions":{"code":"COMPLEXITY_BUDGET_EXHAUSTED"}}]}"#,
        )
        .expect("response");
        assert!(response.data.is_none());
        assert_eq!(response.errors[0].code(), Some("COMPLEXITY_BUDGET_EXHAUSTED"));
    }
}
