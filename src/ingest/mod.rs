//! Data ingestion and persistence
//!
//! Reading raw CSV datasets from the local filesystem or an S3 bucket, and
//! writing cleaned datasets back. Every failure is mapped onto a distinct
//! [`SourceIoKind`] so callers can tell a missing object from a permissions
//! problem or a decoding failure.

mod local;
mod s3;
pub mod sigv4;

pub use local::{LocalCsvSink, LocalCsvSource};
pub use s3::{classify_s3_failure, S3Client, S3Config, S3CsvSink, S3CsvSource};
pub use sigv4::AwsCredentials;

use crate::error::{PipelineError, Result, SourceIoKind};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::str::FromStr;
use tracing::{error, warn};

/// Supplies raw tabular data
pub trait DataSource {
    /// Read the dataset stored under `key` (a path or an object key)
    fn read(&self, key: &str) -> Result<DataFrame>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// Persists a dataset
pub trait DataSink {
    /// Write `df` to `destination` (a path or an object key)
    fn write(&self, df: &mut DataFrame, destination: &str) -> Result<()>;
}

/// Text encoding of a CSV payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl FromStr for TextEncoding {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            other => Err(PipelineError::Config(format!("unsupported text encoding '{}'", other))),
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("utf-8"),
            TextEncoding::Latin1 => f.write_str("latin-1"),
        }
    }
}

/// Decode raw bytes into text
pub fn decode_text(bytes: Vec<u8>, encoding: TextEncoding, location: &str) -> Result<String> {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8(bytes).map_err(|e| {
            error!(location = %location, encoding = %encoding, "Failed to decode CSV payload");
            PipelineError::source_io(
                SourceIoKind::Decode,
                location,
                format!(
                    "failed to decode with encoding '{}': {}; try a different encoding (e.g. 'latin-1')",
                    encoding, e
                ),
            )
        }),
        // Every byte is a valid code point in ISO-8859-1
        TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Field values read as missing, in addition to empty fields (pandas `read_csv` defaults)
pub const MISSING_VALUE_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn missing_value_tokens() -> NullValues {
    NullValues::AllColumns(MISSING_VALUE_TOKENS.iter().map(|token| (*token).into()).collect())
}

/// Parse CSV text with a header row into a DataFrame.
///
/// Whitespace-only content is a valid empty dataset unless `allow_empty` is false.
/// Any of [`MISSING_VALUE_TOKENS`] becomes null, so numeric columns stay numeric.
pub fn parse_csv(text: String, location: &str, allow_empty: bool) -> Result<DataFrame> {
    if text.trim().is_empty() {
        if allow_empty {
            warn!(location = %location, "CSV content is empty, returning an empty dataset");
            return Ok(DataFrame::empty());
        }
        error!(location = %location, "CSV content is empty");
        return Err(PipelineError::source_io(
            SourceIoKind::EmptyContent,
            location,
            "CSV content is empty",
        ));
    }

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .map_parse_options(|parse| parse.with_null_values(Some(missing_value_tokens())))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()
        .map_err(|e| {
            error!(location = %location, error = %e, "Failed to parse CSV");
            PipelineError::source_io(SourceIoKind::Decode, location, e.to_string())
        })
}

/// Serialize a DataFrame as CSV with a header row
pub fn write_csv_bytes(df: &mut DataFrame) -> Result<Vec<u8>> {
    let mut buffer: Vec<u8> = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(df)
        .map_err(|e| PipelineError::Serialization(e.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        let text = "price,rooms,city\n100.0,3,Lyon\n250.5,5,Paris\n".to_string();
        let df = parse_csv(text, "mem", true).unwrap();
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("city").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_missing_value_tokens_are_null() {
        let text = "area,rooms,note\n50,2,ok\nNA,3,N/A\nNaN,3,fine\n80,null,None\n".to_string();
        let df = parse_csv(text, "mem", true).unwrap();

        let area = df.column("area").unwrap();
        assert!(crate::utils::is_numeric_dtype(area.dtype()), "area is {}", area.dtype());
        assert_eq!(area.null_count(), 2);
        assert_eq!(df.column("rooms").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("rooms").unwrap().null_count(), 1);
        assert_eq!(df.column("note").unwrap().null_count(), 2);
    }

    #[test]
    fn test_empty_content_is_empty_dataset() {
        let df = parse_csv("  \n".to_string(), "mem", true).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 0);
    }

    #[test]
    fn test_empty_content_strict() {
        let err = parse_csv(String::new(), "mem", false).unwrap_err();
        assert_eq!(err.source_kind(), Some(SourceIoKind::EmptyContent));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = decode_text(vec![0x61, 0xff, 0xfe], TextEncoding::Utf8, "mem").unwrap_err();
        assert_eq!(err.source_kind(), Some(SourceIoKind::Decode));
        assert!(err.to_string().contains("latin-1"));
    }

    #[test]
    fn test_decode_latin1() {
        let text = decode_text(vec![b'c', b'a', b'f', 0xe9], TextEncoding::Latin1, "mem").unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("UTF-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("latin1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);
        assert!("cp1252".parse::<TextEncoding>().is_err());
    }

    #[test]
    fn test_write_csv_bytes() {
        let mut df = df!("a" => &[1i64, 2], "b" => &["x", "y"]).unwrap();
        let bytes = write_csv_bytes(&mut df).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("a,b\n"));
        assert!(text.contains("2,y"));
    }
}
