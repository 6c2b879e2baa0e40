//! Parse functions - turn CSV, JSON and XML sources into tables

use crate::error::{EtlError, Location, ParseError, Result};
use crate::ingestion::fetch::discover_sources;
use crate::ingestion::types::{Record, SourceFile, SourceFormat, Table, Value};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Layout of an XML source: repeated record elements under the root
#[derive(Debug, Clone, PartialEq)]
pub struct XmlLayout {
    pub record_tag: String,
    pub fields: Vec<XmlField>,
}

/// A required child element and the column it fills
#[derive(Debug, Clone, PartialEq)]
pub struct XmlField {
    pub tag: String,
    pub column: String,
}

impl XmlField {
    pub fn new(tag: impl Into<String>, column: impl Into<String>) -> Self {
        XmlField {
            tag: tag.into(),
            column: column.into(),
        }
    }
}

impl Default for XmlLayout {
    fn default() -> Self {
        XmlLayout {
            record_tag: "person".to_string(),
            fields: vec![
                XmlField::new("name", "name"),
                XmlField::new("height_in", "height_in"),
                XmlField::new("weight_lb", "weight_lb"),
            ],
        }
    }
}

/// Read every source of one format under `path` into a single table
pub fn read_sources(path: &Path, format: SourceFormat, layout: &XmlLayout) -> Result<Table> {
    let files = discover_sources(path, format)?;

    let mut combined = Table::new();
    for file in &files {
        let table = read_file(file, layout)?;
        combined.append(table);
    }

    info!(
        "Data extracted from {}: {} rows from {} file(s)",
        format,
        combined.len(),
        files.len()
    );

    Ok(combined)
}

/// Read one source file with the reader for its format
pub fn read_file(file: &SourceFile, layout: &XmlLayout) -> Result<Table> {
    match file.format {
        SourceFormat::Csv => read_csv(&file.path),
        SourceFormat::Json => read_json(&file.path),
        SourceFormat::Xml => read_xml(&file.path, layout),
    }
}

/// Parse a CSV file with a header row
///
/// Rows shorter than the header get nulls for the missing trailing cells;
/// rows longer than the header are an error.
pub fn read_csv(path: &Path) -> Result<Table> {
    info!("Parsing CSV from {:?}", path);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = Table::with_columns(headers.iter().cloned());
    if table.columns().len() != headers.len() {
        return Err(ParseError::new(path, "duplicate column name in header")
            .at(Location::Line(1))
            .into());
    }

    for result in reader.records() {
        let row = result.map_err(|e| csv_error(path, e))?;
        if row.len() > headers.len() {
            let error = ParseError::new(
                path,
                format!("expected at most {} fields, found {}", headers.len(), row.len()),
            );
            return Err(match row.position() {
                Some(pos) => error.at(Location::Line(pos.line())),
                None => error,
            }
            .into());
        }

        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, raw)| (name.clone(), Value::infer(raw)))
            .collect();
        table.push_record(record);
    }

    info!("Parsed {} rows from {:?}", table.len(), path);

    Ok(table)
}

fn csv_error(path: &Path, err: csv::Error) -> EtlError {
    let location = err.position().map(|pos| Location::Line(pos.line()));

    // csv's own message repeats the position; keep just the reason
    let message = match err.into_kind() {
        csv::ErrorKind::Io(io) => return EtlError::io(path, io),
        csv::ErrorKind::Utf8 { err, .. } => err.to_string(),
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {} fields, found {}", expected_len, len),
        _ => "malformed CSV record".to_string(),
    };

    let parse_error = ParseError::new(path, message);
    match location {
        Some(loc) => parse_error.at(loc).into(),
        None => parse_error.into(),
    }
}

/// Parse a JSON file: newline-delimited objects, one object, or an array of objects
///
/// Nested objects are flattened into dot-separated column names.
pub fn read_json(path: &Path) -> Result<Table> {
    info!("Parsing JSON from {:?}", path);

    let content = fs::read_to_string(path).map_err(|e| EtlError::io(path, e))?;
    let table = parse_json_str(path, &content)?;

    info!("Parsed {} rows from {:?}", table.len(), path);

    Ok(table)
}

fn parse_json_str(path: &Path, content: &str) -> Result<Table> {
    let mut table = Table::new();

    let stream = serde_json::Deserializer::from_str(content).into_iter::<JsonValue>();
    for item in stream {
        let value = item.map_err(|e| json_error(path, &e))?;
        match value {
            JsonValue::Array(items) => {
                for item in items {
                    table.push_record(json_record(path, item)?);
                }
            }
            other => table.push_record(json_record(path, other)?),
        }
    }

    Ok(table)
}

fn json_error(path: &Path, err: &serde_json::Error) -> ParseError {
    // serde_json appends its own position; keep just the reason
    let message = err.to_string();
    let reason = message
        .split(" at line ")
        .next()
        .unwrap_or(&message)
        .to_string();

    ParseError::new(path, reason).at(Location::LineColumn(err.line() as u64, err.column() as u64))
}

fn json_record(path: &Path, value: JsonValue) -> Result<Record> {
    match value {
        JsonValue::Object(map) => {
            let mut record = Record::new();
            for (key, value) in map {
                flatten_json(key, value, &mut record);
            }
            Ok(record)
        }
        other => Err(ParseError::new(
            path,
            format!("expected JSON object, found {}", json_kind(&other)),
        )
        .into()),
    }
}

fn flatten_json(name: String, value: JsonValue, record: &mut Record) {
    match value {
        JsonValue::Object(map) => {
            for (key, nested) in map {
                flatten_json(format!("{}.{}", name, key), nested, record);
            }
        }
        JsonValue::Null => record.push((name, Value::Null)),
        JsonValue::Bool(b) => record.push((name, Value::Text(b.to_string()))),
        JsonValue::Number(n) => record.push((name, n.as_f64().into())),
        JsonValue::String(s) => record.push((name, Value::Text(s))),
        JsonValue::Array(_) => record.push((name, Value::Text(value.to_string()))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Parse an XML file of repeated record elements under one root
///
/// Records missing any configured field are skipped with a warning.
pub fn read_xml(path: &Path, layout: &XmlLayout) -> Result<Table> {
    info!("Parsing XML from {:?}", path);

    let content = fs::read_to_string(path).map_err(|e| EtlError::io(path, e))?;
    let (table, skipped) = parse_xml_str(path, &content, layout)?;

    info!(
        "Parsed {} rows from {:?} ({} skipped)",
        table.len(),
        path,
        skipped
    );

    Ok(table)
}

fn parse_xml_str(path: &Path, content: &str, layout: &XmlLayout) -> Result<(Table, usize)> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let columns = layout.fields.iter().map(|f| f.column.clone());
    let mut table = Table::with_columns(columns);
    let mut skipped = 0;
    let mut seen_root = false;

    // 1 = inside root, 2 = inside a record, 3 = inside a field
    let mut depth = 0usize;
    let mut in_record = false;
    let mut current_field: Option<String> = None;
    let mut text = String::new();
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut record_index = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            ParseError::new(path, e.to_string())
                .at(Location::ByteOffset(reader.buffer_position() as u64))
        })?;

        match event {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                depth += 1;
                if depth == 1 {
                    seen_root = true;
                } else if depth == 2 && tag == layout.record_tag {
                    in_record = true;
                    fields.clear();
                } else if depth == 3 && in_record {
                    current_field = Some(tag);
                    text.clear();
                }
            }
            Event::Empty(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if depth == 0 {
                    seen_root = true;
                } else if depth == 1 && tag == layout.record_tag {
                    // A self-closing record has none of its fields
                    skipped += 1;
                    warn!("Skipping {} record {} in {:?}: no fields", tag, record_index, path);
                    record_index += 1;
                } else if depth == 2 && in_record {
                    fields.entry(tag).or_default();
                }
            }
            Event::Text(t) if depth == 3 && current_field.is_some() => {
                let unescaped = t.unescape().map_err(|e| {
                    ParseError::new(path, e.to_string())
                        .at(Location::ByteOffset(reader.buffer_position() as u64))
                })?;
                text.push_str(&unescaped);
            }
            Event::CData(c) if depth == 3 && current_field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&c));
            }
            Event::End(_) => {
                if depth == 3 {
                    if let Some(tag) = current_field.take() {
                        // First occurrence of a repeated field wins
                        fields.entry(tag).or_insert_with(|| text.clone());
                    }
                } else if depth == 2 && in_record {
                    in_record = false;
                    match xml_record(layout, &fields) {
                        Ok(record) => table.push_record(record),
                        Err(missing) => {
                            skipped += 1;
                            warn!(
                                "Skipping {} record {} in {:?}: missing field {}",
                                layout.record_tag, record_index, path, missing
                            );
                        }
                    }
                    record_index += 1;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(ParseError::new(path, "no root element").into());
    }
    if depth != 0 {
        return Err(ParseError::new(path, "unexpected end of document")
            .at(Location::ByteOffset(content.len() as u64))
            .into());
    }

    Ok((table, skipped))
}

/// Build a record from collected field text, or name the first missing field
fn xml_record<'a>(
    layout: &'a XmlLayout,
    fields: &HashMap<String, String>,
) -> std::result::Result<Record, &'a str> {
    layout
        .fields
        .iter()
        .map(|field| match fields.get(&field.tag) {
            Some(raw) => Ok((field.column.clone(), Value::infer(raw))),
            None => Err(field.tag.as_str()),
        })
        .collect()
}
