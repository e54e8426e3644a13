use std::time::Duration;

use async_trait::async_trait;
use boardsight_core::config::MondayConfig;
use boardsight_core::domain::schema::SourceBoard;
use boardsight_core::{BoardId, DataSource, RawItem, SourceError};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::queries::{first_items_page_query, next_items_page_query, ACCOUNT_QUERY, BOARD_QUERY};
use crate::types::{
    AccountData, BoardsData, FirstPageData, GraphQlError, GraphQlResponse, NextPageData,
};

/// Error codes and message fragments monday.com uses for throttling.
const RATE_LIMIT_MARKERS: [&str; 5] =
    ["complexity", "rate_limit", "rate limit", "ratelimit", "too many requests"];

#[derive(Clone, Debug)]
pub struct MondayClient {
    http: reqwest::Client,
    api_url: String,
    api_token: SecretString,
    api_version: String,
    page_size: u32,
    timeout: Duration,
}

impl MondayClient {
    pub fn new(
        api_url: impl Into<String>,
        api_token: SecretString,
        api_version: impl Into<String>,
        page_size: u32,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SourceError::Unavailable(format!("http client: {error}")))?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            api_token,
            api_version: api_version.into(),
            page_size: page_size.max(1),
            timeout,
        })
    }

    pub fn from_config(config: &MondayConfig) -> Result<Self, SourceError> {
        Self::new(
            config.api_url.clone(),
            config.api_token.clone(),
            config.api_version.clone(),
            config.page_size,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Name of the account the token belongs to; used as a connectivity probe.
    pub async fn account_name(&self) -> Result<String, SourceError> {
        let data: AccountData = self.execute(ACCOUNT_QUERY, json!({})).await?;
        Ok(data.me.account.map(|account| account.name).unwrap_or(data.me.name))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, SourceError> {
        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", self.api_token.expose_secret())
            .header("API-Version", &self.api_version)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Unavailable(format!("HTTP {status}: {body}")));
        }

        let envelope: GraphQlResponse<T> =
            response.json().await.map_err(|error| self.transport_error(error))?;
        if !envelope.errors.is_empty() {
            return Err(graphql_error(&envelope.errors));
        }
        if let Some(code) = envelope.error_code {
            let message = envelope.error_message.unwrap_or_default();
            return Err(classify_message(format!("{code}: {message}")));
        }
        envelope
            .data
            .ok_or_else(|| SourceError::Unavailable("response carried no data".to_string()))
    }

    fn transport_error(&self, error: reqwest::Error) -> SourceError {
        if error.is_timeout() {
            SourceError::Timeout(self.timeout.as_secs())
        } else {
            SourceError::Unavailable(error.to_string())
        }
    }
}

fn graphql_error(errors: &[GraphQlError]) -> SourceError {
    let message = errors
        .iter()
        .map(|error| match error.code() {
            Some(code) => format!("{code}: {}", error.message),
            None => error.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ");
    warn!(
        event_name = "source.graphql.errors",
        errors = errors.len(),
        %message,
        "monday.com returned errors"
    );
    classify_message(message)
}

fn classify_message(message: String) -> SourceError {
    let lowered = message.to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        SourceError::RateLimited(message)
    } else {
        SourceError::Unavailable(message)
    }
}

#[async_trait]
impl DataSource for MondayClient {
    async fn fetch_board(&self, board_id: &BoardId) -> Result<SourceBoard, SourceError> {
        let variables = json!({ "boardIds": [board_id.as_str()] });
        let data: BoardsData = self.execute(BOARD_QUERY, variables).await?;
        let board = data
            .boards
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::BoardNotFound(board_id.clone()))?;
        Ok(board.into_source_board())
    }

    async fn fetch_items(&self, board_id: &BoardId) -> Result<Vec<RawItem>, SourceError> {
        let variables = json!({ "boardIds": [board_id.as_str()], "limit": self.page_size });
        let first: FirstPageData = self.execute(&first_items_page_query(), variables).await?;
        let mut page = first
            .boards
            .into_iter()
            .next()
            .map(|board| board.items_page)
            .ok_or_else(|| SourceError::BoardNotFound(board_id.clone()))?;

        let mut items = Vec::new();
        let mut pages = 1_usize;
        loop {
            items.extend(page.items.into_iter().map(|node| node.into_raw_item()));
            let Some(cursor) = page.cursor.filter(|cursor| !cursor.is_empty()) else {
                break;
            };
            let variables = json!({ "cursor": cursor, "limit": self.page_size });
            let next: NextPageData = self.execute(&next_items_page_query(), variables).await?;
            page = next.next_items_page;
            pages += 1;
        }

        debug!(
            event_name = "source.items.fetched",
            board_id = %board_id,
            items = items.len(),
            pages,
            "fetched board items"
        );
        Ok(items)
    }
}
