//! Query finder: ranks past LQS queries by how many of the requested field
//! keywords they touch.

use super::{sql_literal, Engine, ReportError, ReportQuery};
use crate::params::SqlIdentifier;
use serde::{Deserialize, Serialize};

const TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFinder {
    pub keywords: Vec<SqlIdentifier>,
}

impl QueryFinder {
    /// Parse a comma-separated keyword list as typed into the modal.
    /// Blank entries are dropped and duplicates collapse to the first one.
    pub fn parse(input: &str) -> Result<Self, ReportError> {
        let mut keywords: Vec<SqlIdentifier> = Vec::new();
        for raw in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let keyword: SqlIdentifier = raw.parse()?;
            if !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        if keywords.is_empty() {
            return Err(ReportError::NoKeywords);
        }
        Ok(Self { keywords })
    }
}

impl ReportQuery for QueryFinder {
    fn title(&self) -> &'static str {
        "Query Finder"
    }

    fn engine(&self) -> Engine {
        Engine::Snowflake
    }

    fn sql(&self) -> Result<String, ReportError> {
        if self.keywords.is_empty() {
            return Err(ReportError::NoKeywords);
        }
        let values = self
            .keywords
            .iter()
            .map(|k| format!("({})", sql_literal(k.as_str())))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "WITH input_keywords (keyword) AS (
    VALUES {values}
),
matches AS (
    SELECT
        t.query,
        count(DISTINCT k.keyword) AS matched_keywords_count,
        cardinality(t.field_names_presto) AS total_columns_in_query
    FROM FW_OPERATIONAL_DATA.LQS_QUERY_HISTORY.ETL_QUERY_HISTORY t
    CROSS JOIN UNNEST(t.field_names_presto) AS f (field_name)
    JOIN input_keywords k ON lower(f.field_name) LIKE '%' || lower(k.keyword) || '%'
    WHERE t.query_type_presto = 'SELECT' AND t.state_presto = 'FINISHED'
    GROUP BY t.query, t.field_names_presto
)
SELECT
    query,
    matched_keywords_count,
    total_columns_in_query,
    CAST(matched_keywords_count AS DOUBLE) / total_columns_in_query AS match_score
FROM matches
ORDER BY matched_keywords_count DESC, match_score DESC
LIMIT {TOP_N}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_trims_and_dedups() {
        let finder = QueryFinder::parse(" placement_id, ,network_id,placement_id ").unwrap();
        let keywords: Vec<&str> = finder.keywords.iter().map(SqlIdentifier::as_str).collect();
        assert_eq!(keywords, vec!["placement_id", "network_id"]);
    }

    #[test]
    fn test_parse_rejects_empty_and_unsafe_input() {
        assert_eq!(QueryFinder::parse(" , ").unwrap_err(), ReportError::NoKeywords);
        assert!(matches!(
            QueryFinder::parse("ok, x' OR '1'='1"),
            Err(ReportError::Param(_))
        ));
    }

    #[test]
    fn test_sql_lists_keywords_and_limits_to_top_ten() {
        let sql = QueryFinder::parse("profile,asset_id").unwrap().sql().unwrap();
        assert!(sql.contains("VALUES ('profile'), ('asset_id')"));
        assert!(sql.ends_with("LIMIT 10"));
    }
}
