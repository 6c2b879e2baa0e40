//! Schema reconciliation - merge tables with differing column sets

use crate::ingestion::types::Table;
use tracing::info;

/// Concatenate tables into one whose columns are the union of all inputs
///
/// Columns keep first-seen order and rows keep input order. Cells for columns
/// a source did not have are null. Values are not coerced across sources, so
/// a column may hold numbers from one source and text from another.
pub fn reconcile(tables: Vec<Table>) -> Table {
    let sources = tables.len();
    let mut combined = Table::new();

    for table in tables {
        combined.append(table);
    }

    info!(
        "Reconciled {} source table(s): {} rows, {} columns",
        sources,
        combined.len(),
        combined.columns().len()
    );

    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::types::{Record, Value};

    fn table(rows: &[&[(&str, Value)]]) -> Table {
        let mut table = Table::new();
        for row in rows {
            let record: Record = row.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
            table.push_record(record);
        }
        table
    }

    #[test]
    fn test_union_of_columns_in_first_seen_order() {
        let csv = table(&[&[("name", "A".into()), ("height_in", 70.0.into())]]);
        let json = table(&[&[("weight_lb", 150.0.into()), ("name", "B".into())]]);
        let xml = table(&[&[("team", "red".into()), ("height_in", 60.0.into())]]);

        let combined = reconcile(vec![csv, json, xml]);

        assert_eq!(combined.columns(), &["name", "height_in", "weight_lb", "team"]);
        assert_eq!(combined.len(), 3);
        assert!(combined.rows().iter().all(|r| r.len() == 4));
        assert_eq!(combined.get(1, "height_in"), Some(&Value::Null));
        assert_eq!(combined.get(1, "name"), Some(&Value::Text("B".to_string())));
        assert_eq!(combined.get(2, "team"), Some(&Value::Text("red".to_string())));
    }

    #[test]
    fn test_empty_tables_contribute_nothing() {
        let csv = table(&[&[("name", "A".into())]]);
        let combined = reconcile(vec![Table::new(), csv, Table::new()]);

        assert_eq!(combined.columns(), &["name"]);
        assert_eq!(combined.len(), 1);
    }

    #[test]
    fn test_mixed_types_are_not_coerced() {
        let left = table(&[&[("height_in", 70.0.into())]]);
        let right = table(&[&[("height_in", "seventy".into())]]);

        let combined = reconcile(vec![left, right]);

        assert_eq!(combined.get(0, "height_in"), Some(&Value::Number(70.0)));
        assert_eq!(
            combined.get(1, "height_in"),
            Some(&Value::Text("seventy".to_string()))
        );
    }
}
