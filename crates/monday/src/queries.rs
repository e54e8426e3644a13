pub const BOARD_QUERY: &str = r#"query ($boardIds: [ID!]!) {
  boards(ids: $boardIds) {
    id
    name
    columns { id title type }
  }
}"#;

const ITEM_FIELDS: &str = r#"cursor
    items {
      id
      name
      group { id title }
      column_values { id text column { title } }
    }"#;

pub fn first_items_page_query() -> String {
    format!(
        "query ($boardIds: [ID!]!, $limit: Int!) {{\n  boards(ids: $boardIds) {{\n    items_page(limit: $limit) {{\n    {ITEM_FIELDS}\n    }}\n  }}\n}}"
    )
}

pub fn next_items_page_query() -> String {
    format!(
        "query ($cursor: String!, $limit: Int!) {{\n  next_items_page(cursor: $cursor, limit: $limit) {{\n    {ITEM_FIELDS}\n  }}\n}}"
    )
}

pub const ACCOUNT_QUERY: &str = "query { me { name account { name } } }";

#[cfg(test)]
mod tests {
    use super::{first_items_page_query, next_items_page_query};

    #[test]
    fn item_queries_share_the_selection_set() {
        let first = first_items_page_query();
        let next = next_items_page_query();
        assert!(first.contains("items_page(limit: $limit)"));
        assert!(next.contains("next_items_page(cursor: $cursor, limit: $limit)"));
        for query in [&first, &next] {
            assert!(query.contains("column_values { id text column { title } }"));
            assert_eq!(query.matches('{').count(), query.matches('}').count());
        }
    }
}
