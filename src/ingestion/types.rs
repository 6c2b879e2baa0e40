//! Core data types for the ingestion pipeline
//! Tables are dynamically typed: columns are discovered from the sources

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Source formats understood by the readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Json,
    Xml,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 3] = [SourceFormat::Csv, SourceFormat::Json, SourceFormat::Xml];

    pub fn extension(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Json => "json",
            SourceFormat::Xml => "xml",
        }
    }

    /// Match a path by extension, ignoring case
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(self.extension()))
            .unwrap_or(false)
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Csv => write!(f, "CSV"),
            SourceFormat::Json => write!(f, "JSON"),
            SourceFormat::Xml => write!(f, "XML"),
        }
    }
}

/// A discovered input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub format: SourceFormat,
}

/// Single cell value
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    /// Infer a value from raw text: empty is null, numeric text is a number
    pub fn infer(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    // -0.0 and 0.0 must compare and hash the same
    fn number_bits(n: f64) -> u64 {
        if n == 0.0 {
            0.0f64.to_bits()
        } else {
            n.to_bits()
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => {
                Value::number_bits(*a) == Value::number_bits(*b)
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Number(n) => Value::number_bits(*n).hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Option<f64>> for Value {
    fn from(n: Option<f64>) -> Self {
        n.map(Value::Number).unwrap_or(Value::Null)
    }
}

/// One source row as produced by a reader, in field order
pub type Record = Vec<(String, Value)>;

/// Ordered rows sharing one column set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Table::new();
        for column in columns {
            table.ensure_column(&column.into());
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Add a column if absent, back-filling existing rows with nulls
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        self.columns.len() - 1
    }

    /// Append a record; unseen fields become new columns
    pub fn push_record(&mut self, record: Record) {
        let mut row = vec![Value::Null; self.columns.len()];
        for (name, value) in record {
            let idx = self.ensure_column(&name);
            if idx >= row.len() {
                row.resize(idx + 1, Value::Null);
            }
            row[idx] = value;
        }
        self.rows.push(row);
    }

    /// Append every row of `other`, aligning columns by name
    pub fn append(&mut self, other: Table) {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|name| self.ensure_column(name))
            .collect();

        self.rows.reserve(other.rows.len());
        for src in other.rows {
            let mut row = vec![Value::Null; self.columns.len()];
            for (value, &idx) in src.into_iter().zip(&mapping) {
                row[idx] = value;
            }
            self.rows.push(row);
        }
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Replace one column's values, adding the column if needed
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        let idx = self.ensure_column(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }
}

/// Transformation statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformStats {
    pub rows_in: usize,
    pub duplicates_removed: usize,
    pub rows_out: usize,
}

impl std::fmt::Display for TransformStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rows in: {}, duplicates removed: {}, rows out: {}",
            self.rows_in, self.duplicates_removed, self.rows_out
        )
    }
}

/// Load operation statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub table: String,
    pub columns: usize,
    pub inserted: usize,
}

impl std::fmt::Display for LoadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "table: {}, columns: {}, inserted: {}",
            self.table, self.columns, self.inserted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, Value)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_infer_value() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("   "), Value::Null);
        assert_eq!(Value::infer("70"), Value::Number(70.0));
        assert_eq!(Value::infer(" 1.5 "), Value::Number(1.5));
        assert_eq!(Value::infer("Alice"), Value::Text("Alice".to_string()));
        // Non-finite spellings stay text
        assert_eq!(Value::infer("NaN"), Value::Text("NaN".to_string()));
    }

    #[test]
    fn test_signed_zero_equal() {
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
        assert_ne!(Value::Number(1.0), Value::Text("1".to_string()));
    }

    #[test]
    fn test_push_record_backfills_new_columns() {
        let mut table = Table::new();
        table.push_record(record(&[("name", "A".into()), ("height_in", 70.0.into())]));
        table.push_record(record(&[("name", "B".into()), ("team", "red".into())]));

        assert_eq!(table.columns(), &["name", "height_in", "team"]);
        assert_eq!(table.get(0, "team"), Some(&Value::Null));
        assert_eq!(table.get(1, "height_in"), Some(&Value::Null));
        assert_eq!(table.get(1, "team"), Some(&Value::Text("red".to_string())));
        assert!(table.rows().iter().all(|r| r.len() == 3));
    }

    #[test]
    fn test_append_aligns_by_name() {
        let mut left = Table::with_columns(["a", "b"]);
        left.push_record(record(&[("a", 1.0.into()), ("b", 2.0.into())]));

        let mut right = Table::with_columns(["c", "a"]);
        right.push_record(record(&[("c", 3.0.into()), ("a", 4.0.into())]));

        left.append(right);

        assert_eq!(left.columns(), &["a", "b", "c"]);
        assert_eq!(left.rows()[1], vec![4.0.into(), Value::Null, 3.0.into()]);
        assert_eq!(left.rows()[0], vec![1.0.into(), 2.0.into(), Value::Null]);
    }

    #[test]
    fn test_source_format_matches_extension() {
        assert!(SourceFormat::Csv.matches(Path::new("data/a.CSV")));
        assert!(SourceFormat::Json.matches(Path::new("b.json")));
        assert!(!SourceFormat::Xml.matches(Path::new("c.xml.bak")));
        assert!(!SourceFormat::Csv.matches(Path::new("noext")));
    }
}
