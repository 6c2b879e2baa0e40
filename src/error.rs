//! Error types for the ETL run

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Main error type for a run
#[derive(Error, Debug)]
pub enum EtlError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Object store credentials unavailable: {0}")]
    Credential(String),

    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("Load error: {0}")]
    Load(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EtlError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EtlError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors raised while publishing an artifact
    pub fn is_upload_failure(&self) -> bool {
        matches!(self, EtlError::Upload { .. } | EtlError::Credential(_))
    }
}

impl From<sqlx::Error> for EtlError {
    fn from(err: sqlx::Error) -> Self {
        EtlError::Load(err.to_string())
    }
}

/// Malformed source content
#[derive(Error, Debug)]
#[error("Failed to parse {path:?}{}: {message}", location_suffix(.location))]
pub struct ParseError {
    pub path: PathBuf,
    pub location: Option<Location>,
    pub message: String,
}

impl ParseError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ParseError {
            path: path.into(),
            location: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// Where in a source file parsing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Line(u64),
    LineColumn(u64, u64),
    ByteOffset(u64),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Line(line) => write!(f, "line {}", line),
            Location::LineColumn(line, col) => write!(f, "line {}, column {}", line, col),
            Location::ByteOffset(offset) => write!(f, "byte {}", offset),
        }
    }
}

fn location_suffix(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" at {}", loc),
        None => String::new(),
    }
}

/// Table shape does not support the requested derivation
#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("Required column missing: {0}")]
    MissingColumn(String),

    #[error("Column {column} has non-numeric value {value:?} at row {row}")]
    NotNumeric {
        column: String,
        row: usize,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("data/people.csv", "found record with 2 fields")
            .at(Location::Line(4));
        assert_eq!(
            err.to_string(),
            "Failed to parse \"data/people.csv\" at line 4: found record with 2 fields"
        );

        let err = ParseError::new("data/people.xml", "unexpected EOF");
        assert_eq!(
            err.to_string(),
            "Failed to parse \"data/people.xml\": unexpected EOF"
        );
    }

    #[test]
    fn test_upload_failure_classification() {
        let upload = EtlError::Upload {
            key: "raw_data.csv".to_string(),
            message: "timeout".to_string(),
        };
        assert!(upload.is_upload_failure());
        assert!(EtlError::Credential("none".to_string()).is_upload_failure());
        assert!(!EtlError::Load("refused".to_string()).is_upload_failure());
    }
}
