//! # Warehouse
//!
//! Every SQL statement the hub runs goes through a [`Warehouse`]. Log
//! queries and criteria rows go to Presto ([`presto::PrestoClient`]);
//! operational reports go to Snowflake ([`snowflake::SnowflakeClient`]).
//! Tests substitute canned outputs.

pub mod criteria;
pub mod presto;
pub mod snowflake;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("warehouse request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("query failed: {0}")]
    Query(String),
    #[error("unexpected warehouse response: {0}")]
    Decode(String),
}

/// Column names plus rows of JSON cells, in result order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryOutput {
    /// `"{first column}: {first cell}"`, the one-line summary posted in chat.
    pub fn headline(&self) -> Option<String> {
        let column = self.columns.first()?;
        let cell = self.rows.first()?.first()?;
        Some(format!("{}: {}", column, cell_text(cell)))
    }
}

/// Render a cell as plain text: strings unquoted, null empty.
pub fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
pub trait Warehouse: Send + Sync {
    /// Run one statement to completion and collect every row.
    async fn execute(&self, sql: &str) -> Result<QueryOutput, WarehouseError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headline_uses_first_cell() {
        let output = QueryOutput {
            columns: vec!["Total Ad Requests".into(), "x".into()],
            rows: vec![vec![json!(1234), json!("a")], vec![json!(1), json!("b")]],
        };
        assert_eq!(output.headline().as_deref(), Some("Total Ad Requests: 1234"));
        assert_eq!(QueryOutput::default().headline(), None);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&json!("abc")), "abc");
        assert_eq!(cell_text(&json!(null)), "");
        assert_eq!(cell_text(&json!(1.5)), "1.5");
        assert_eq!(cell_text(&json!(true)), "true");
    }
}
