//! Local filesystem CSV source and sink

use super::{decode_text, parse_csv, write_csv_bytes, DataSink, DataSource, TextEncoding};
use crate::error::{PipelineError, Result, SourceIoKind};
use polars::prelude::*;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{error, info};

fn map_io_error(err: std::io::Error, path: &str) -> PipelineError {
    let kind = match err.kind() {
        ErrorKind::NotFound => SourceIoKind::NotFound,
        ErrorKind::PermissionDenied => SourceIoKind::PermissionDenied,
        _ => return PipelineError::Io(err),
    };
    error!(path = %path, kind = %kind, "Local file access failed");
    PipelineError::source_io(kind, path, err.to_string())
}

/// Reads CSV files from the local filesystem
#[derive(Debug, Clone)]
pub struct LocalCsvSource {
    encoding: TextEncoding,
    allow_empty: bool,
}

impl Default for LocalCsvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCsvSource {
    /// Create a new UTF-8 source that treats empty files as empty datasets
    pub fn new() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            allow_empty: true,
        }
    }

    /// Set the text encoding
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Whether empty files are a valid empty dataset
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }
}

impl DataSource for LocalCsvSource {
    fn read(&self, key: &str) -> Result<DataFrame> {
        info!(path = %key, "Reading data");
        let bytes = std::fs::read(key).map_err(|e| map_io_error(e, key))?;
        let text = decode_text(bytes, self.encoding, key)?;
        let df = parse_csv(text, key, self.allow_empty)?;
        info!(path = %key, rows = df.height(), cols = df.width(), "Loaded dataset");
        Ok(df)
    }

    fn describe(&self) -> String {
        "local filesystem".to_string()
    }
}

/// Writes CSV files to the local filesystem
#[derive(Debug, Clone, Default)]
pub struct LocalCsvSink;

impl LocalCsvSink {
    pub fn new() -> Self {
        Self
    }
}

impl DataSink for LocalCsvSink {
    fn write(&self, df: &mut DataFrame, destination: &str) -> Result<()> {
        if let Some(parent) = Path::new(destination).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| map_io_error(e, destination))?;
            }
        }
        let bytes = write_csv_bytes(df)?;
        std::fs::write(destination, bytes).map_err(|e| map_io_error(e, destination))?;
        info!(path = %destination, rows = df.height(), "Saved dataset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_not_found() {
        let source = LocalCsvSource::new();
        let err = source.read("/definitely/not/here.csv").unwrap_err();
        assert_eq!(err.source_kind(), Some(SourceIoKind::NotFound));
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let path = path.to_str().unwrap();

        let mut df = df!("price" => &[1.5, 2.5], "rooms" => &[1i64, 2]).unwrap();
        LocalCsvSink::new().write(&mut df, path).unwrap();

        let loaded = LocalCsvSource::new().read(path).unwrap();
        assert!(loaded.equals(&df));
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, b"").unwrap();
        let path = path.to_str().unwrap();

        let df = LocalCsvSource::new().read(path).unwrap();
        assert_eq!(df.height(), 0);

        let err = LocalCsvSource::new().allow_empty(false).read(path).unwrap_err();
        assert_eq!(err.source_kind(), Some(SourceIoKind::EmptyContent));
    }
}
