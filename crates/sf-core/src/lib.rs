//! # sf-core — The "Engine" of SLACKFLAKE
//!
//! Turns a placement's targeting-criteria tree into an executable SQL
//! WHERE fragment, and assembles the report queries the bot sends to the
//! warehouse.
//!
//! The engine is three pieces, leaves first:
//!
//! - [`catalog`] — static table of criteria types, each with its target
//!   column(s) and predicate [`Shape`](catalog::Shape).
//! - [`compiler`] — pure function from `(spec, negative, values)` to one
//!   predicate fragment.
//! - [`resolver`] — fetches the criteria rows for a placement through a
//!   [`CriteriaSource`](resolver::CriteriaSource), folds them into nodes and
//!   joins the compiled fragments with `AND`.
//!
//! Everything here is synchronous and free of I/O apart from the one
//! injected fetch. Report assembly lives in [`report`].

pub mod catalog;
pub mod compiler;
pub mod params;
pub mod report;
pub mod resolver;

pub use catalog::{Catalog, CatalogError, CriteriaTypeSpec, Shape};
pub use compiler::{compile, CompileError, CompiledPredicate};
pub use params::{DateRange, NetworkId, ParamError, PlacementId, SqlIdentifier};
pub use report::{
    fingerprint, pqm_link, Engine, PlacementFilterQuery, ReportError, ReportQuery, ReportRequest,
};
pub use resolver::{
    criteria_rows_query, group_rows, CombinedFilter, CriteriaNode, CriteriaRow, CriteriaSource,
    EmptyValuePolicy, NodePredicate, Relation, Resolution, ResolveError, Resolver, SkipReason,
    SkippedNode, SourceError,
};
