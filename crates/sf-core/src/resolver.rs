//! # Criteria Tree Resolver
//!
//! Folds a placement's targeting-criteria tree into one combined WHERE
//! fragment:
//!
//! 1. one [`CriteriaSource::fetch_criteria_rows`] call (denormalized, one
//!    row per value per node),
//! 2. rows grouped into [`CriteriaNode`]s,
//! 3. each node compiled through the [`Catalog`] and [`compile`],
//! 4. fragments joined with `" AND "` in ascending node-id order.
//!
//! No retries: a failed fetch is surfaced to the caller immediately.

use crate::catalog::Catalog;
use crate::compiler::{compile, CompileError, CompiledPredicate};
use crate::params::PlacementId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Error type returned by a [`CriteriaSource`].
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// The one external read the resolver depends on.
pub trait CriteriaSource: Send + Sync {
    /// All criteria rows under the placement's root criteria id.
    fn fetch_criteria_rows(&self, placement_id: PlacementId)
        -> Result<Vec<CriteriaRow>, SourceError>;
}

/// Join operator recorded on a criteria node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relation {
    #[default]
    And,
    Or,
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(format!("unknown relation '{}'", other)),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// One fetched row: a single value of a single criteria node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaRow {
    pub node_id: i64,
    pub node_name: String,
    /// `None` when the node has no item assignment.
    pub criteria_type_id: Option<String>,
    pub relation: Relation,
    pub negative: bool,
    pub value: Option<String>,
}

/// A targeting rule with all of its values collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriteriaNode {
    pub id: i64,
    pub name: String,
    pub criteria_type_id: Option<String>,
    pub relation: Relation,
    pub negative: bool,
    pub values: BTreeSet<String>,
}

/// Group denormalized rows by `(node_id, criteria_type_id)`, in ascending
/// node-id order. Node metadata is taken from the first row seen.
pub fn group_rows(rows: impl IntoIterator<Item = CriteriaRow>) -> Vec<CriteriaNode> {
    let mut nodes: BTreeMap<(i64, Option<String>), CriteriaNode> = BTreeMap::new();
    for row in rows {
        let key = (row.node_id, row.criteria_type_id.clone());
        let node = nodes.entry(key).or_insert_with(|| CriteriaNode {
            id: row.node_id,
            name: row.node_name.clone(),
            criteria_type_id: row.criteria_type_id.clone(),
            relation: row.relation,
            negative: row.negative,
            values: BTreeSet::new(),
        });
        if let Some(value) = row.value {
            let value = value.trim();
            if !value.is_empty() {
                node.values.insert(value.to_string());
            }
        }
    }
    nodes.into_values().collect()
}

/// What to do with a recognized node that has no values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyValuePolicy {
    /// Drop the node and keep going.
    Skip,
    /// Abort the whole resolve with [`ResolveError::EmptyValueSet`].
    #[default]
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoCriteriaType,
    UnknownType,
    EmptyValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedNode {
    pub node_id: i64,
    pub criteria_type_id: Option<String>,
    pub reason: SkipReason,
}

/// A compiled predicate tagged with the node it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePredicate {
    pub node_id: i64,
    pub node_name: String,
    pub predicate: CompiledPredicate,
}

/// Non-empty result of a resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedFilter {
    pub predicates: Vec<NodePredicate>,
    pub skipped: Vec<SkippedNode>,
}

impl CombinedFilter {
    /// The WHERE fragment, without the `WHERE` keyword.
    pub fn sql(&self) -> String {
        self.predicates
            .iter()
            .map(|p| p.predicate.sql.as_str())
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl fmt::Display for CombinedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

/// Outcome of [`Resolver::resolve`]. An empty tree is not an error; the
/// caller decides whether "no filter" is acceptable for its report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Filter(CombinedFilter),
    EmptyTree { skipped: Vec<SkippedNode> },
}

impl Resolution {
    pub fn filter(&self) -> Option<&CombinedFilter> {
        match self {
            Self::Filter(filter) => Some(filter),
            Self::EmptyTree { .. } => None,
        }
    }

    pub fn skipped(&self) -> &[SkippedNode] {
        match self {
            Self::Filter(filter) => &filter.skipped,
            Self::EmptyTree { skipped } => skipped,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to fetch criteria rows for placement {placement_id}: {source}")]
    Upstream {
        placement_id: PlacementId,
        #[source]
        source: SourceError,
    },
    #[error("criteria node {node_id} of type '{type_id}' has no values")]
    EmptyValueSet { node_id: i64, type_id: String },
    #[error("failed to compile criteria node {node_id}: {source}")]
    Compile {
        node_id: i64,
        #[source]
        source: CompileError,
    },
}

/// Compiles criteria trees against a shared catalog.
pub struct Resolver {
    catalog: Arc<Catalog>,
    source: Arc<dyn CriteriaSource>,
    policy: EmptyValuePolicy,
}

impl Resolver {
    pub fn new(
        catalog: Arc<Catalog>,
        source: Arc<dyn CriteriaSource>,
        policy: EmptyValuePolicy,
    ) -> Self {
        Self {
            catalog,
            source,
            policy,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn policy(&self) -> EmptyValuePolicy {
        self.policy
    }

    /// Fetch and compile the criteria tree of one placement.
    pub fn resolve(&self, placement_id: PlacementId) -> Result<Resolution, ResolveError> {
        let rows = self
            .source
            .fetch_criteria_rows(placement_id)
            .map_err(|source| ResolveError::Upstream {
                placement_id,
                source,
            })?;
        tracing::debug!(
            "Fetched {} criteria rows for placement {}",
            rows.len(),
            placement_id
        );

        let resolution = self.compile_nodes(&group_rows(rows))?;
        match &resolution {
            Resolution::Filter(filter) => tracing::info!(
                "Placement {}: {} predicate(s), {} node(s) skipped",
                placement_id,
                filter.predicates.len(),
                filter.skipped.len()
            ),
            Resolution::EmptyTree { skipped } => tracing::info!(
                "Placement {}: no predicates ({} node(s) skipped)",
                placement_id,
                skipped.len()
            ),
        }
        Ok(resolution)
    }

    /// Compile already-grouped nodes. Nodes are processed in ascending id
    /// order regardless of input order.
    pub fn compile_nodes(&self, nodes: &[CriteriaNode]) -> Result<Resolution, ResolveError> {
        let mut ordered: Vec<&CriteriaNode> = nodes.iter().collect();
        ordered.sort_by(|a, b| (a.id, &a.criteria_type_id).cmp(&(b.id, &b.criteria_type_id)));

        let mut predicates = Vec::new();
        let mut skipped = Vec::new();

        for node in ordered {
            let skip = |reason| SkippedNode {
                node_id: node.id,
                criteria_type_id: node.criteria_type_id.clone(),
                reason,
            };

            let Some(type_id) = node.criteria_type_id.as_deref() else {
                skipped.push(skip(SkipReason::NoCriteriaType));
                continue;
            };

            let Ok(spec) = self.catalog.lookup(type_id) else {
                tracing::debug!("Node {}: unknown criteria type '{}'", node.id, type_id);
                skipped.push(skip(SkipReason::UnknownType));
                continue;
            };

            if node.values.is_empty() {
                match self.policy {
                    EmptyValuePolicy::Skip => {
                        tracing::warn!("Node {}: type '{}' has no values, skipped", node.id, type_id);
                        skipped.push(skip(SkipReason::EmptyValues));
                        continue;
                    }
                    EmptyValuePolicy::Fail => {
                        return Err(ResolveError::EmptyValueSet {
                            node_id: node.id,
                            type_id: type_id.to_string(),
                        });
                    }
                }
            }

            if node.relation == Relation::Or {
                tracing::debug!("Node {}: relation OR joined with AND at top level", node.id);
            }

            let predicate = compile(spec, node.negative, &node.values).map_err(|source| {
                ResolveError::Compile {
                    node_id: node.id,
                    source,
                }
            })?;
            predicates.push(NodePredicate {
                node_id: node.id,
                node_name: node.name.clone(),
                predicate,
            });
        }

        if predicates.is_empty() {
            Ok(Resolution::EmptyTree { skipped })
        } else {
            Ok(Resolution::Filter(CombinedFilter {
                predicates,
                skipped,
            }))
        }
    }
}

/// SQL returning the denormalized criteria rows of a placement, one row
/// per value per node, in the column order
/// `id, name, criteria_type, relation, negative, criteria_value`.
pub fn criteria_rows_query(placement_id: PlacementId) -> String {
    format!(
        "SELECT
    tc.id,
    tc.name,
    lct.criteria_type,
    tc.relation,
    tc.negative,
    CAST(tcia.criteria_value AS VARCHAR) AS criteria_value
FROM oltp.fwmrm_oltp.targeting_criteria tc
LEFT JOIN oltp.fwmrm_oltp.targeting_criteria_item_assignment tcia
    ON tcia.targeting_criteria_id = tc.id
LEFT JOIN oltp.fwmrm_oltp.lu_criteria_type lct
    ON lct.id = tcia.criteria_type_id
WHERE tc.root_criteria_id = (
    SELECT criteria_id
    FROM oltp.fwmrm_oltp.ad_tree_node
    WHERE id = {placement_id}
)
ORDER BY tc.id"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct FakeSource {
        rows: Vec<CriteriaRow>,
        calls: Mutex<usize>,
    }

    impl FakeSource {
        fn new(rows: Vec<CriteriaRow>) -> Arc<Self> {
            Arc::new(Self {
                rows,
                calls: Mutex::new(0),
            })
        }
    }

    impl CriteriaSource for FakeSource {
        fn fetch_criteria_rows(
            &self,
            _placement_id: PlacementId,
        ) -> Result<Vec<CriteriaRow>, SourceError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.rows.clone())
        }
    }

    struct FailingSource;

    impl CriteriaSource for FailingSource {
        fn fetch_criteria_rows(
            &self,
            _placement_id: PlacementId,
        ) -> Result<Vec<CriteriaRow>, SourceError> {
            Err("connection refused".into())
        }
    }

    fn row(node_id: i64, type_id: Option<&str>, negative: bool, value: Option<&str>) -> CriteriaRow {
        CriteriaRow {
            node_id,
            node_name: format!("node-{}", node_id),
            criteria_type_id: type_id.map(str::to_string),
            relation: Relation::And,
            negative,
            value: value.map(str::to_string),
        }
    }

    fn resolver(rows: Vec<CriteriaRow>, policy: EmptyValuePolicy) -> Resolver {
        Resolver::new(Arc::new(Catalog::builtin()), FakeSource::new(rows), policy)
    }

    fn placement() -> PlacementId {
        PlacementId::new(4242).unwrap()
    }

    #[test]
    fn test_three_nodes_one_unknown_yields_two_fragments_in_id_order() {
        let rows = vec![
            row(30, Some("POSTAL_CODE"), true, Some("10001")),
            row(10, Some("COUNTRY"), false, Some("840")),
            row(20, Some("WEATHER"), false, Some("sunny")),
            row(10, Some("COUNTRY"), false, Some("124")),
        ];
        let resolution = resolver(rows, EmptyValuePolicy::Fail)
            .resolve(placement())
            .unwrap();
        let filter = resolution.filter().unwrap();

        assert_eq!(
            filter.sql(),
            "transaction__request__visitor__country_id IN (124, 840) AND \
             cardinality(array_intersect(transaction__request__visitor__postal_code_id, ARRAY[10001])) = 0"
        );
        assert_eq!(filter.predicates.len(), 2);
        assert_eq!(
            filter.skipped,
            vec![SkippedNode {
                node_id: 20,
                criteria_type_id: Some("WEATHER".into()),
                reason: SkipReason::UnknownType,
            }]
        );
    }

    #[test]
    fn test_no_rows_is_empty_tree() {
        let resolution = resolver(vec![], EmptyValuePolicy::Fail)
            .resolve(placement())
            .unwrap();
        assert_eq!(resolution, Resolution::EmptyTree { skipped: vec![] });
    }

    #[test]
    fn test_only_untyped_nodes_is_empty_tree() {
        let resolution = resolver(vec![row(1, None, false, None)], EmptyValuePolicy::Fail)
            .resolve(placement())
            .unwrap();
        assert!(resolution.filter().is_none());
        assert_eq!(resolution.skipped()[0].reason, SkipReason::NoCriteriaType);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let rows = vec![
            row(2, Some("STATE"), false, Some("7")),
            row(2, Some("STATE"), false, Some("3")),
            row(1, Some("ASSET"), true, Some("99")),
        ];
        let r = resolver(rows, EmptyValuePolicy::Fail);
        let first = r.resolve(placement()).unwrap().filter().unwrap().sql();
        let second = r.resolve(placement()).unwrap().filter().unwrap().sql();
        assert_eq!(first, second);
        assert!(first.starts_with("video_cro_asset_id NOT IN (99) AND"));
    }

    #[test]
    fn test_empty_values_skip_policy() {
        let rows = vec![
            row(1, Some("COUNTRY"), false, None),
            row(2, Some("CITY"), false, Some("5")),
        ];
        let resolution = resolver(rows, EmptyValuePolicy::Skip)
            .resolve(placement())
            .unwrap();
        let filter = resolution.filter().unwrap();
        assert_eq!(filter.sql(), "transaction__request__visitor__city_id IN (5)");
        assert_eq!(filter.skipped[0].reason, SkipReason::EmptyValues);
    }

    #[test]
    fn test_empty_values_fail_policy() {
        let rows = vec![
            row(1, Some("COUNTRY"), false, None),
            row(2, Some("CITY"), false, Some("5")),
        ];
        let err = resolver(rows, EmptyValuePolicy::Fail)
            .resolve(placement())
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::EmptyValueSet { node_id: 1, ref type_id } if type_id == "COUNTRY"
        ));
    }

    #[test]
    fn test_upstream_failure_is_surfaced_once() {
        let r = Resolver::new(
            Arc::new(Catalog::builtin()),
            Arc::new(FailingSource),
            EmptyValuePolicy::Fail,
        );
        let err = r.resolve(placement()).unwrap_err();
        assert!(matches!(err, ResolveError::Upstream { .. }));
        assert!(err.to_string().contains("placement 4242"));
    }

    #[test]
    fn test_fetch_happens_once_per_resolve() {
        let source = FakeSource::new(vec![row(1, Some("ISP"), false, Some("1"))]);
        let r = Resolver::new(
            Arc::new(Catalog::builtin()),
            source.clone(),
            EmptyValuePolicy::Fail,
        );
        r.resolve(placement()).unwrap();
        assert_eq!(*source.calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_group_rows_merges_values_and_splits_types() {
        let nodes = group_rows(vec![
            row(5, Some("DMA"), false, Some("501")),
            row(5, Some("DMA"), false, Some("501")),
            row(5, Some("DMA"), false, Some(" 803 ")),
            row(5, Some("CITY"), false, Some("1")),
            row(3, None, false, None),
        ]);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].id, 3);
        assert_eq!(nodes[1].criteria_type_id.as_deref(), Some("CITY"));
        assert_eq!(
            nodes[2].values.iter().cloned().collect::<Vec<_>>(),
            vec!["501".to_string(), "803".to_string()]
        );
    }

    #[test]
    fn test_or_relation_is_preserved_but_joined_with_and() {
        let mut a = row(1, Some("COUNTRY"), false, Some("1"));
        a.relation = Relation::Or;
        let b = row(2, Some("STATE"), false, Some("2"));
        let nodes = group_rows(vec![a, b]);
        assert_eq!(nodes[0].relation, Relation::Or);
        let filter = resolver(vec![], EmptyValuePolicy::Fail)
            .compile_nodes(&nodes)
            .unwrap();
        assert!(filter.filter().unwrap().sql().contains(" AND "));
    }

    #[test]
    fn test_relation_parses_case_insensitively() {
        assert_eq!("or".parse::<Relation>().unwrap(), Relation::Or);
        assert_eq!(" AND ".parse::<Relation>().unwrap(), Relation::And);
        assert!("XOR".parse::<Relation>().is_err());
    }

    #[test]
    fn test_criteria_rows_query_is_rooted_at_placement() {
        let sql = criteria_rows_query(placement());
        assert!(sql.contains("WHERE id = 4242"));
        assert!(sql.ends_with("ORDER BY tc.id"));
    }
}
