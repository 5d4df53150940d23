//! Snowflake SQL API (v2): `POST /api/v2/statements`, poll the statement
//! handle while it answers `202`, then fetch the remaining result
//! partitions.

use super::{QueryOutput, Warehouse, WarehouseError};
use crate::config::SnowflakeConfig;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

/// Body of every statement response: result, progress and error share it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    pub code: Option<String>,
    pub message: Option<String>,
    pub statement_handle: Option<String>,
    pub result_set_meta_data: Option<ResultSetMetaData>,
    pub data: Option<Vec<Vec<serde_json::Value>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetMetaData {
    pub row_type: Vec<RowType>,
    #[serde(default)]
    pub partition_info: Vec<serde::de::IgnoredAny>,
}

#[derive(Debug, Deserialize)]
pub struct RowType {
    pub name: String,
}

impl StatementResponse {
    fn failure(self, status: StatusCode) -> WarehouseError {
        let code = self.code.unwrap_or_else(|| status.as_u16().to_string());
        let message = self.message.unwrap_or_else(|| "no message".into());
        WarehouseError::Query(format!("{}: {}", code, message))
    }
}

/// Rows gathered across the partitions of one result set.
#[derive(Debug)]
pub struct ResultSet {
    output: QueryOutput,
    partitions: usize,
}

impl ResultSet {
    /// Start from the first partition, which carries the metadata.
    pub fn first(response: StatementResponse) -> Result<Self, WarehouseError> {
        let meta = response
            .result_set_meta_data
            .ok_or_else(|| WarehouseError::Decode("result has no resultSetMetaData".into()))?;
        let mut set = Self {
            output: QueryOutput {
                columns: meta.row_type.into_iter().map(|c| c.name).collect(),
                rows: Vec::new(),
            },
            partitions: meta.partition_info.len().max(1),
        };
        set.extend(response.data.unwrap_or_default())?;
        Ok(set)
    }

    pub fn extend(&mut self, data: Vec<Vec<serde_json::Value>>) -> Result<(), WarehouseError> {
        let width = self.output.columns.len();
        if let Some(bad) = data.iter().find(|row| row.len() != width) {
            return Err(WarehouseError::Decode(format!(
                "row has {} cells but {} columns were announced",
                bad.len(),
                width
            )));
        }
        self.output.rows.extend(data);
        Ok(())
    }

    /// Partition indexes still to fetch.
    pub fn remaining(&self) -> std::ops::Range<usize> {
        1..self.partitions
    }

    pub fn finish(self) -> QueryOutput {
        self.output
    }
}

pub struct SnowflakeClient {
    client: reqwest::Client,
    config: SnowflakeConfig,
    token: Option<String>,
}

impl SnowflakeClient {
    pub fn new(config: SnowflakeConfig, token: Option<String>) -> Result<Self, WarehouseError> {
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
        let request = request.header(reqwest::header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => request
                .bearer_auth(token)
                .header("X-Snowflake-Authorization-Token-Type", &self.config.token_type),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, StatementResponse), WarehouseError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let parsed = serde_json::from_str::<StatementResponse>(&body).map_err(|e| {
            WarehouseError::Decode(format!("HTTP {}: {} ({})", status, e, body.trim()))
        })?;
        Ok((status, parsed))
    }
}

#[async_trait::async_trait]
impl Warehouse for SnowflakeClient {
    async fn execute(&self, sql: &str) -> Result<QueryOutput, WarehouseError> {
        let base = self
            .config
            .base_url()
            .ok_or_else(|| WarehouseError::Query("Snowflake account is not configured".into()))?;
        let statements = format!("{}/api/v2/statements", base);
        let body = StatementRequest {
            statement: sql,
            timeout: self.config.timeout_secs,
            warehouse: self.config.warehouse.as_deref(),
            database: self.config.database.as_deref(),
            schema: self.config.schema.as_deref(),
            role: self.config.role.as_deref(),
        };

        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);
        let (mut status, mut response) = self.send(self.client.post(&statements).json(&body)).await?;
        let handle = response.statement_handle.clone().unwrap_or_default();
        tracing::debug!("Snowflake statement {} submitted", handle);

        while status == StatusCode::ACCEPTED {
            if Instant::now() >= deadline {
                return Err(WarehouseError::Query(format!(
                    "statement {} still running after {}s",
                    handle, self.config.timeout_secs
                )));
            }
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
            (status, response) = self
                .send(self.client.get(format!("{}/{}", statements, handle)))
                .await?;
        }
        if status != StatusCode::OK {
            return Err(response.failure(status));
        }

        let mut set = ResultSet::first(response)?;
        for partition in set.remaining() {
            let url = format!("{}/{}", statements, handle);
            let (status, page) = self
                .send(self.client.get(&url).query(&[("partition", partition)]))
                .await?;
            if status != StatusCode::OK {
                return Err(page.failure(status));
            }
            set.extend(page.data.unwrap_or_default())?;
        }

        let output = set.finish();
        tracing::info!(
            "Snowflake statement {} finished: {} row(s)",
            handle,
            output.rows.len()
        );
        Ok(output)
    }
}
