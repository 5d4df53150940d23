//! Adapts a [`Warehouse`] to the resolver's synchronous [`CriteriaSource`].

use super::{cell_text, Warehouse, WarehouseError};
use serde_json::Value;
use sf_core::{criteria_rows_query, CriteriaRow, CriteriaSource, PlacementId, Relation, SourceError};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Blocks on the async warehouse through a runtime handle, so
/// `fetch_criteria_rows` must run off the async workers (inside
/// `spawn_blocking`).
pub struct WarehouseCriteriaSource {
    warehouse: Arc<dyn Warehouse>,
    runtime: Handle,
}

impl WarehouseCriteriaSource {
    pub fn new(warehouse: Arc<dyn Warehouse>, runtime: Handle) -> Self {
        Self { warehouse, runtime }
    }
}

impl CriteriaSource for WarehouseCriteriaSource {
    fn fetch_criteria_rows(&self, placement_id: PlacementId) -> Result<Vec<CriteriaRow>, SourceError> {
        let sql = criteria_rows_query(placement_id);
        let output = self.runtime.block_on(self.warehouse.execute(&sql))?;
        let rows = output
            .rows
            .iter()
            .map(|row| decode_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Decode one `id, name, criteria_type, relation, negative, criteria_value`
/// row.
pub fn decode_row(row: &[Value]) -> Result<CriteriaRow, WarehouseError> {
    let [id, name, criteria_type, relation, negative, value] = row else {
        return Err(WarehouseError::Decode(format!(
            "criteria row has {} cells, expected 6",
            row.len()
        )));
    };

    let node_id = id
        .as_i64()
        .or_else(|| id.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| WarehouseError::Decode(format!("bad criteria id {}", id)))?;

    let relation = match relation {
        Value::Null => Relation::default(),
        Value::String(s) => s.parse().map_err(WarehouseError::Decode)?,
        other => return Err(WarehouseError::Decode(format!("bad relation {}", other))),
    };

    let negative = match negative {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "TRUE"),
        Value::Null => false,
        other => return Err(WarehouseError::Decode(format!("bad negative flag {}", other))),
    };

    let optional_text = |v: &Value| match v {
        Value::Null => None,
        other => Some(cell_text(other)),
    };

    Ok(CriteriaRow {
        node_id,
        node_name: cell_text(name),
        criteria_type_id: optional_text(criteria_type),
        relation,
        negative,
        value: optional_text(value),
    })
}
