//! # Report Assembly
//!
//! Pure SQL builders for every report the bot can run. Builders only accept
//! validated parameters from [`crate::params`], so the text they produce
//! never contains raw user input.

pub mod finder;
pub mod lqs;
pub mod tickets;

pub use finder::QueryFinder;
pub use lqs::{AckColumn, AckReport, AdRequestCount, TransactionsQuery};
pub use tickets::{Organization, TicketColumn, TicketPriority, TicketReport};

use crate::params::{ParamError, PlacementId};
use crate::resolver::{CombinedFilter, Resolution};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error("{0} report needs at least one column")]
    NoColumns(&'static str),
    #[error("ticket report needs at least one organization")]
    NoOrganizations,
    #[error("query finder needs at least one keyword")]
    NoKeywords,
    #[error("unknown {what} option '{value}'")]
    UnknownOption { what: &'static str, value: String },
}

/// Query engine a report's SQL is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// Presto over the ad-serving log tables.
    Presto,
    /// Snowflake over the operational data (tickets, query history).
    Snowflake,
}

/// A report that renders to a single SQL statement.
pub trait ReportQuery {
    /// Short human name, used in chat replies and log lines.
    fn title(&self) -> &'static str;

    fn sql(&self) -> Result<String, ReportError>;

    fn engine(&self) -> Engine {
        Engine::Presto
    }
}

/// Every report the JSON API and the CLI can render, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportRequest {
    AdRequestCount(AdRequestCount),
    Transactions(TransactionsQuery),
    Ack(AckReport),
    Tickets(TicketReport),
    QueryFinder(QueryFinder),
}

impl ReportRequest {
    fn query(&self) -> &dyn ReportQuery {
        match self {
            Self::AdRequestCount(r) => r,
            Self::Transactions(r) => r,
            Self::Ack(r) => r,
            Self::Tickets(r) => r,
            Self::QueryFinder(r) => r,
        }
    }

    pub fn title(&self) -> &'static str {
        self.query().title()
    }

    pub fn render(&self) -> Result<String, ReportError> {
        self.query().sql()
    }

    pub fn engine(&self) -> Engine {
        self.query().engine()
    }

    /// The placement a report is scoped to, if any.
    pub fn placement(&self) -> Option<PlacementId> {
        match self {
            Self::AdRequestCount(r) => Some(r.placement_id),
            Self::Transactions(r) => Some(r.placement_id),
            Self::Ack(r) => Some(r.placement_id),
            Self::Tickets(_) | Self::QueryFinder(_) => None,
        }
    }
}

/// The `WHERE` clause built from a placement's resolved criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementFilterQuery {
    pub placement_id: PlacementId,
    pub where_clause: String,
}

impl PlacementFilterQuery {
    pub fn new(placement_id: PlacementId, filter: &CombinedFilter) -> Self {
        Self {
            placement_id,
            where_clause: format!("WHERE {}", filter.sql()),
        }
    }

    /// `None` for a placement with no usable criteria.
    pub fn from_resolution(placement_id: PlacementId, resolution: &Resolution) -> Option<Self> {
        resolution.filter().map(|f| Self::new(placement_id, f))
    }

    /// Chat reply carrying the clause in a code block.
    pub fn message(&self) -> String {
        format!("Generated Query: ```{}```", self.where_clause)
    }
}

/// Quote a string as a SQL literal, doubling embedded single quotes.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SHA-256 of the SQL text, lowercase hex.
pub fn fingerprint(sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    format!("{:x}", digest)
}

/// Delivery dashboard for a placement over the last 30 days.
pub fn pqm_link(placement_id: PlacementId) -> String {
    format!(
        "https://pqm.fwmrm.net/d/ZMbWHksWk/ad-osi-monitor-placement-delivery-detail?\
         orgId=1&var-ad_tree_node_id={placement_id}&var-granularity=30m\
         &var-datasource=ad_osi__ops_feed&var-change_history_table=placement_change_history\
         &from=now-30d&to=now"
    )
}
