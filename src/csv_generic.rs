//! Generic CSV ingestion (spec.md §6 `analyze_csv`), ported from the
//! chunked UFM-CSV upload handler.
//!
//! Unlike the dump reader (`dump::reader`), this path makes no assumption
//! about column names or a companion BER file — it just counts rows and
//! keeps the first chunk as a preview, streaming the rest so a
//! multi-gigabyte upload doesn't have to live in memory at once.

use std::fs::File;
use std::path::Path;

use serde_json::{Map, Value};

use crate::dump::cell::parse_cell;
use crate::utils::ApiError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct CsvPreview {
    pub columns: Vec<String>,
    pub row_count: usize,
    pub preview_data: Vec<Map<String, Value>>,
}

/// Stream `file_path` in chunks of `chunk_size` rows, returning the header,
/// the total row count, and up to `preview_rows` rows from the first chunk.
pub fn analyze_csv(file_path: &Path, chunk_size: usize, preview_rows: usize) -> Result<CsvPreview, ApiError> {
    let file = File::open(file_path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(file);

    let columns: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    if columns.is_empty() {
        return Err(ApiError::internal_error("CSV file is empty"));
    }

    let mut row_count = 0usize;
    let mut preview_data = Vec::with_capacity(preview_rows.min(chunk_size));

    for result in reader.records() {
        let record = result?;
        row_count += 1;
        if preview_data.len() < preview_rows {
            let mut row = Map::with_capacity(columns.len());
            for (col, raw) in columns.iter().zip(record.iter()) {
                row.insert(col.clone(), parse_cell(raw).to_json());
            }
            preview_data.push(row);
        }
    }

    Ok(CsvPreview { columns, row_count, preview_data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn counts_rows_and_previews_first_chunk() {
        let file = write_csv("a,b\n1,2\n3,4\n5,6\n");
        let result = analyze_csv(file.path(), 2, 2).unwrap();
        assert_eq!(result.columns, vec!["a", "b"]);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.preview_data.len(), 2);
        assert_eq!(result.preview_data[0].get("a"), Some(&Value::from(1)));
    }

    #[test]
    fn empty_file_is_an_error() {
        let file = write_csv("");
        assert!(analyze_csv(file.path(), 1000, 1000).is_err());
    }
}
