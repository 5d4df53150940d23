//! # Predicate Compiler
//!
//! Pure string construction: one [`CriteriaTypeSpec`], a negation flag and
//! a set of raw value tokens in, one SQL boolean expression out.
//!
//! Values are deduplicated and sorted ascending (lexicographic on the raw
//! token) before rendering, so the same input always yields byte-identical
//! SQL.

use crate::catalog::{CriteriaTypeSpec, Shape};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("criteria type '{0}' has no values to compile")]
    EmptyValueSet(String),
    #[error("criteria type '{type_id}' needs {expected} target column(s), got {actual}")]
    ColumnArity {
        type_id: String,
        expected: usize,
        actual: usize,
    },
}

/// One rendered predicate fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPredicate {
    pub type_id: String,
    pub negative: bool,
    pub sql: String,
}

impl fmt::Display for CompiledPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Compile one criteria node into its predicate.
///
/// Blank tokens are dropped. Fails with [`CompileError::EmptyValueSet`]
/// when nothing is left, since `IN ()` is not valid SQL.
pub fn compile<I, S>(
    spec: &CriteriaTypeSpec,
    negative: bool,
    values: I,
) -> Result<CompiledPredicate, CompileError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let values: BTreeSet<String> = values
        .into_iter()
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(CompileError::EmptyValueSet(spec.type_id.clone()));
    }
    let csv = values.into_iter().collect::<Vec<_>>().join(", ");

    let sql = match spec.shape {
        Shape::ScalarIn => {
            let [column] = columns::<1>(spec)?;
            in_list(column, negative, &csv)
        }
        Shape::ArrayIntersect => {
            let [column] = columns::<1>(spec)?;
            let op = if negative { "=" } else { ">" };
            format!("cardinality(array_intersect({column}, ARRAY[{csv}])) {op} 0")
        }
        Shape::Asset => {
            // Exclusion must hold on both columns.
            let [first, second] = columns::<2>(spec)?;
            let joiner = if negative { "AND" } else { "OR" };
            format!(
                "{} {joiner} {}",
                in_list(first, negative, &csv),
                in_list(second, negative, &csv)
            )
        }
    };

    Ok(CompiledPredicate {
        type_id: spec.type_id.clone(),
        negative,
        sql,
    })
}

fn in_list(column: &str, negative: bool, csv: &str) -> String {
    let not = if negative { "NOT " } else { "" };
    format!("{column} {not}IN ({csv})")
}

fn columns<const N: usize>(spec: &CriteriaTypeSpec) -> Result<[&str; N], CompileError> {
    let columns: Vec<&str> = spec.target_columns.iter().map(String::as_str).collect();
    columns.try_into().map_err(|cols: Vec<&str>| CompileError::ColumnArity {
        type_id: spec.type_id.clone(),
        expected: N,
        actual: cols.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use pretty_assertions::assert_eq;

    fn spec(shape: Shape, columns: &[&str]) -> CriteriaTypeSpec {
        CriteriaTypeSpec::new("T", shape, columns)
    }

    #[test]
    fn test_scalar_in_sorts_and_dedups() {
        let p = compile(&spec(Shape::ScalarIn, &["x"]), false, ["3", "1", "2", "1"]).unwrap();
        assert_eq!(p.sql, "x IN (1, 2, 3)");
    }

    #[test]
    fn test_scalar_in_negated() {
        let p = compile(&spec(Shape::ScalarIn, &["x"]), true, ["3", "1", "2"]).unwrap();
        assert_eq!(p.sql, "x NOT IN (1, 2, 3)");
        assert!(p.negative);
    }

    #[test]
    fn test_array_intersect_inclusive_and_negated() {
        let s = spec(Shape::ArrayIntersect, &["y"]);
        assert_eq!(
            compile(&s, false, ["5"]).unwrap().sql,
            "cardinality(array_intersect(y, ARRAY[5])) > 0"
        );
        assert_eq!(
            compile(&s, true, ["5"]).unwrap().sql,
            "cardinality(array_intersect(y, ARRAY[5])) = 0"
        );
    }

    #[test]
    fn test_asset_uses_de_morgan_pairing() {
        let catalog = Catalog::builtin();
        let asset = catalog.lookup("ASSET").unwrap();
        assert_eq!(
            compile(asset, false, ["20", "10"]).unwrap().sql,
            "video_cro_asset_id IN (10, 20) OR distributor_asset_id IN (10, 20)"
        );
        assert_eq!(
            compile(asset, true, ["20", "10"]).unwrap().sql,
            "video_cro_asset_id NOT IN (10, 20) AND distributor_asset_id NOT IN (10, 20)"
        );
    }

    #[test]
    fn test_sort_is_lexicographic_on_raw_tokens() {
        let p = compile(&spec(Shape::ScalarIn, &["x"]), false, ["9", "10", "100"]).unwrap();
        assert_eq!(p.sql, "x IN (10, 100, 9)");
    }

    #[test]
    fn test_empty_values_fail() {
        let s = spec(Shape::ScalarIn, &["x"]);
        assert_eq!(
            compile(&s, false, Vec::<String>::new()).unwrap_err(),
            CompileError::EmptyValueSet("T".into())
        );
        assert_eq!(
            compile(&s, false, ["", "  "]).unwrap_err(),
            CompileError::EmptyValueSet("T".into())
        );
    }

    #[test]
    fn test_unvalidated_spec_reports_arity() {
        let bad = spec(Shape::Asset, &["only"]);
        assert_eq!(
            compile(&bad, false, ["1"]).unwrap_err(),
            CompileError::ColumnArity {
                type_id: "T".into(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_catalog_country_renders_real_column() {
        let catalog = Catalog::builtin();
        let country = catalog.lookup("COUNTRY").unwrap();
        assert_eq!(
            compile(country, false, ["840", "124"]).unwrap().to_string(),
            "transaction__request__visitor__country_id IN (124, 840)"
        );
    }
}
