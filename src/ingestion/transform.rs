//! Transform functions - derive metric columns and drop duplicate rows

use crate::error::{Result, SchemaError};
use crate::ingestion::types::{Table, TransformStats, Value};
use crate::{inches_to_meters, pounds_to_kilograms};
use std::collections::HashSet;
use tracing::{debug, info};

/// Source and derived column names for the unit conversions
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    pub height_column: String,
    pub weight_column: String,
    pub height_m_column: String,
    pub weight_kg_column: String,
}

impl Default for TransformSpec {
    fn default() -> Self {
        TransformSpec {
            height_column: "height_in".to_string(),
            weight_column: "weight_lb".to_string(),
            height_m_column: "height_m".to_string(),
            weight_kg_column: "weight_kg".to_string(),
        }
    }
}

/// Derive a converted column from a source column
///
/// Nulls stay null. Numeric text is converted; other text is a schema error.
pub fn derive_column(table: &Table, source: &str, convert: fn(f64) -> f64) -> Result<Vec<Value>> {
    let idx = table
        .column_index(source)
        .ok_or_else(|| SchemaError::MissingColumn(source.to_string()))?;

    table
        .rows()
        .iter()
        .enumerate()
        .map(|(row, cells)| match &cells[idx] {
            Value::Null => Ok(Value::Null),
            Value::Number(n) => Ok(Value::Number(convert(*n))),
            Value::Text(s) => match Value::infer(s) {
                Value::Number(n) => Ok(Value::Number(convert(n))),
                Value::Null => Ok(Value::Null),
                Value::Text(_) => Err(SchemaError::NotNumeric {
                    column: source.to_string(),
                    row,
                    value: s.clone(),
                }
                .into()),
            },
        })
        .collect()
}

/// Remove rows equal on every field to an earlier row
/// Returns the number of rows removed
pub fn drop_duplicates(table: &mut Table) -> usize {
    let before = table.len();
    let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(before);
    table.retain_rows(|row| seen.insert(row.to_vec()));
    before - table.len()
}

/// Add `height_m` / `weight_kg` and deduplicate
///
/// Both source columns are validated before anything is derived, so a
/// missing column leaves no partial output.
pub fn transform(mut table: Table, spec: &TransformSpec) -> Result<(Table, TransformStats)> {
    info!("Transforming {} rows", table.len());

    for column in [&spec.height_column, &spec.weight_column] {
        if table.column_index(column).is_none() {
            return Err(SchemaError::MissingColumn(column.clone()).into());
        }
    }

    let heights = derive_column(&table, &spec.height_column, inches_to_meters)?;
    let weights = derive_column(&table, &spec.weight_column, pounds_to_kilograms)?;
    table.set_column(&spec.height_m_column, heights);
    table.set_column(&spec.weight_kg_column, weights);

    let rows_in = table.len();
    let duplicates_removed = drop_duplicates(&mut table);
    if duplicates_removed > 0 {
        debug!("Removed {} duplicate rows", duplicates_removed);
    }

    let stats = TransformStats {
        rows_in,
        duplicates_removed,
        rows_out: table.len(),
    };
    info!("Transformed the data: {}", stats);

    Ok((table, stats))
}
