//! Presto client REST protocol: `POST /v1/statement`, then follow `nextUri`
//! until the server stops returning one.

use super::{QueryOutput, Warehouse, WarehouseError};
use crate::config::WarehouseConfig;
use serde::Deserialize;
use std::time::Duration;

/// One page of a statement response. Only the fields the client reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementPage {
    pub id: Option<String>,
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<PrestoColumn>>,
    #[serde(default)]
    pub data: Option<Vec<Vec<serde_json::Value>>>,
    pub error: Option<PrestoError>,
}

#[derive(Debug, Deserialize)]
pub struct PrestoColumn {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrestoError {
    pub message: String,
    pub error_name: Option<String>,
}

/// Folds statement pages into a [`QueryOutput`].
#[derive(Debug, Default)]
pub struct PageCollector {
    output: QueryOutput,
}

impl PageCollector {
    /// Absorb one page; returns the next URI to fetch, if any.
    pub fn absorb(&mut self, page: StatementPage) -> Result<Option<String>, WarehouseError> {
        if let Some(error) = page.error {
            let name = error.error_name.unwrap_or_else(|| "QUERY_FAILED".into());
            return Err(WarehouseError::Query(format!("{}: {}", name, error.message)));
        }
        if let Some(columns) = page.columns {
            if self.output.columns.is_empty() {
                self.output.columns = columns.into_iter().map(|c| c.name).collect();
            }
        }
        if let Some(data) = page.data {
            let width = self.output.columns.len();
            if let Some(bad) = data.iter().find(|row| row.len() != width) {
                return Err(WarehouseError::Decode(format!(
                    "row has {} cells but {} columns were announced",
                    bad.len(),
                    width
                )));
            }
            self.output.rows.extend(data);
        }
        Ok(page.next_uri)
    }

    pub fn finish(self) -> QueryOutput {
        self.output
    }
}

pub struct PrestoClient {
    client: reqwest::Client,
    config: WarehouseConfig,
    token: Option<String>,
}

impl PrestoClient {
    pub fn new(config: WarehouseConfig, token: Option<String>) -> Result<Self, WarehouseError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            token,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("X-Presto-User", &self.config.user);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_page(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<StatementPage, WarehouseError> {
        let response = self.authorize(request).send().await?.error_for_status()?;
        response
            .json::<StatementPage>()
            .await
            .map_err(|e| WarehouseError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Warehouse for PrestoClient {
    async fn execute(&self, sql: &str) -> Result<QueryOutput, WarehouseError> {
        let url = format!("{}/v1/statement", self.config.url.trim_end_matches('/'));
        let request = self
            .client
            .post(&url)
            .header("X-Presto-Catalog", &self.config.catalog)
            .header("X-Presto-Schema", &self.config.schema)
            .body(sql.to_string());

        let mut collector = PageCollector::default();
        let first = self.fetch_page(request).await?;
        let query_id = first.id.clone().unwrap_or_default();
        tracing::debug!("Presto query {} submitted", query_id);

        let mut next = collector.absorb(first)?;
        let mut pages = 1usize;
        while let Some(uri) = next {
            let page = self.fetch_page(self.client.get(&uri)).await?;
            next = collector.absorb(page)?;
            pages += 1;
        }

        let output = collector.finish();
        tracing::info!(
            "Presto query {} finished: {} row(s) over {} page(s)",
            query_id,
            output.rows.len(),
            pages
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn page(value: serde_json::Value) -> StatementPage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_collector_follows_pages() {
        let mut collector = PageCollector::default();
        let next = collector
            .absorb(page(json!({
                "id": "q1",
                "nextUri": "http://presto/v1/statement/q1/1",
                "stats": {"state": "QUEUED"}
            })))
            .unwrap();
        assert_eq!(next.as_deref(), Some("http://presto/v1/statement/q1/1"));

        let next = collector
            .absorb(page(json!({
                "id": "q1",
                "nextUri": "http://presto/v1/statement/q1/2",
                "columns": [{"name": "id", "type": "bigint"}, {"name": "name", "type": "varchar"}],
                "data": [[1, "a"]]
            })))
            .unwrap();
        assert!(next.is_some());

        let next = collector
            .absorb(page(json!({
                "id": "q1",
                "columns": [{"name": "id", "type": "bigint"}, {"name": "name", "type": "varchar"}],
                "data": [[2, "b"]]
            })))
            .unwrap();
        assert_eq!(next, None);

        let output = collector.finish();
        assert_eq!(output.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(output.rows, vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]]);
    }

    #[test]
    fn test_collector_surfaces_query_error() {
        let mut collector = PageCollector::default();
        let err = collector
            .absorb(page(json!({
                "id": "q2",
                "error": {"message": "line 1:8: Column 'x' cannot be resolved", "errorName": "COLUMN_NOT_FOUND"}
            })))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "query failed: COLUMN_NOT_FOUND: line 1:8: Column 'x' cannot be resolved"
        );
    }

    #[test]
    fn test_collector_rejects_ragged_rows() {
        let mut collector = PageCollector::default();
        let err = collector
            .absorb(page(json!({
                "columns": [{"name": "a"}],
                "data": [[1, 2]]
            })))
            .unwrap_err();
        assert!(matches!(err, WarehouseError::Decode(_)));
    }
}
