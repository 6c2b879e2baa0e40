//! Fetch functions - locate source files on the local filesystem

use crate::error::{EtlError, Result};
use crate::ingestion::types::{SourceFile, SourceFormat};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Find source files of one format under `path`
///
/// A file path is taken as-is. A directory is scanned (non-recursively) for
/// files with the format's extension, sorted by name. A missing directory
/// yields nothing.
pub fn discover_sources(path: &Path, format: SourceFormat) -> Result<Vec<SourceFile>> {
    if path.is_file() {
        return Ok(vec![SourceFile {
            path: path.to_path_buf(),
            format,
        }]);
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Source directory {:?} does not exist, no {} files", path, format);
            return Ok(Vec::new());
        }
        Err(e) => return Err(EtlError::io(path, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EtlError::io(path, e))?;
        let file_path = entry.path();
        if file_path.is_file() && format.matches(&file_path) {
            debug!("Found {} source: {:?}", format, file_path);
            files.push(SourceFile {
                path: file_path,
                format,
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    info!("Found {} {} file(s) in {:?}", files.len(), format, path);

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_discover_sorted_by_name() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("b.csv"), "x\n1\n").unwrap();
        fs::write(temp.path().join("a.csv"), "x\n1\n").unwrap();
        fs::write(temp.path().join("c.json"), "{}").unwrap();
        fs::create_dir(temp.path().join("nested.csv")).unwrap();

        let files = discover_sources(temp.path(), SourceFormat::Csv).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a.csv", "b.csv"]);
        assert!(files.iter().all(|f| f.format == SourceFormat::Csv));
    }

    #[test]
    fn test_discover_single_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("people.xml");
        fs::write(&path, "<people/>").unwrap();

        let files = discover_sources(&path, SourceFormat::Xml).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, path);
    }

    #[test]
    fn test_discover_missing_or_empty_dir() {
        let temp = tempdir().unwrap();
        assert!(discover_sources(temp.path(), SourceFormat::Json)
            .unwrap()
            .is_empty());
        assert!(discover_sources(&temp.path().join("nope"), SourceFormat::Json)
            .unwrap()
            .is_empty());
    }
}
