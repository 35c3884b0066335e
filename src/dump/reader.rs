//! Random-access reader over a consolidated `.db_csv` dump.
//!
//! The dump is a single text file made of concatenated `START_<name>` /
//! `END_<name>` regions, each containing a CSV sub-table (spec.md §3, §4.1).
//! The reader scans the file once to build a line-range index, then slices
//! and CSV-parses individual sub-tables on demand. The file is read as
//! `latin-1`: every byte maps 1:1 onto the first 256 Unicode scalar values,
//! so decoding is a straight byte-to-char widen, never a UTF-8 decode.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::dump::cell::{parse_cell, Frame};
use crate::utils::ApiError;

const QUOTE_BYTE: u8 = 0x07;

/// Line range for one sub-table, 1-indexed inclusive of the `START_`/`END_`
/// marker lines themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRange {
    pub start_line: usize,
    pub end_line: usize,
}

impl TableRange {
    /// Number of data rows between the header and the `END_` marker:
    /// `end - start - 2` (marker line + header line are excluded).
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line).saturating_sub(2)
    }
}

/// `table_name -> {start_line, end_line, rows}` (spec.md §4.1 `index()`).
#[derive(Debug, Clone, Default)]
pub struct DumpIndex {
    tables: HashMap<String, TableRange>,
}

impl DumpIndex {
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn range(&self, name: &str) -> Option<TableRange> {
        self.tables.get(name).copied()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }
}

/// Decode a dump file's raw bytes as `latin-1` text.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Scan a dump file once and build its table-range index (spec.md §4.1
/// "Algorithm"). Collapses to the last occurrence per `(name, edge)` and
/// rejects a name with only one edge.
pub fn build_index(path: &Path) -> Result<DumpIndex, ApiError> {
    let bytes = fs::read(path).map_err(|e| {
        ApiError::dataset_not_found(format!("cannot open {}: {e}", path.display()))
    })?;
    let text = decode_latin1(&bytes);

    let mut starts: HashMap<String, usize> = HashMap::new();
    let mut ends: HashMap<String, usize> = HashMap::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(name) = line.strip_prefix("START_") {
            starts.insert(name.trim().to_string(), line_no);
        } else if let Some(name) = line.strip_prefix("END_") {
            ends.insert(name.trim().to_string(), line_no);
        }
    }

    let mut tables = HashMap::new();
    let mut names: Vec<&String> = starts.keys().chain(ends.keys()).collect();
    names.sort();
    names.dedup();
    for name in names {
        let start = starts.get(name);
        let end = ends.get(name);
        match (start, end) {
            (Some(&s), Some(&e)) => {
                if s >= e {
                    return Err(ApiError::corrupt_index(format!(
                        "table {name}: start line {s} >= end line {e}"
                    )));
                }
                tables.insert(name.clone(), TableRange { start_line: s, end_line: e });
            },
            _ => {
                return Err(ApiError::corrupt_index(format!(
                    "table {name}: missing START_ or END_ marker"
                )));
            },
        }
    }

    Ok(DumpIndex { tables })
}

/// Slice and parse one sub-table: header at `start+1`, `line_count()` data
/// rows, CSV dialect per spec.md §4.1 (quote `0x07`, delimiter `,`, leading
/// whitespace trimmed, `N/A`/`ERR` -> null).
pub fn read_table(path: &Path, index: &DumpIndex, table_name: &str) -> Result<Frame, ApiError> {
    let range = index
        .range(table_name)
        .ok_or_else(|| ApiError::table_not_found(table_name.to_string()))?;

    let bytes = fs::read(path).map_err(|e| {
        ApiError::dataset_not_found(format!("cannot open {}: {e}", path.display()))
    })?;
    let text = decode_latin1(&bytes);

    let header_line_no = range.start_line + 1;
    let data_line_count = range.line_count();

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .quote(QUOTE_BYTE)
        .trim(csv::Trim::Headers | csv::Trim::Fields)
        .flexible(true)
        .from_reader(
            text.lines()
                .skip(header_line_no - 1)
                .take(data_line_count + 1)
                .collect::<Vec<_>>()
                .join("\n")
                .as_bytes(),
        );

    let headers = reader.headers().map_err(ApiError::from)?.clone();
    let columns: Vec<String> = headers.iter().map(|s| s.to_string()).collect();

    let mut rows = Vec::with_capacity(data_line_count);
    for record in reader.records() {
        let record = record.map_err(ApiError::from)?;
        let mut row = HashMap::with_capacity(columns.len());
        for (col, value) in columns.iter().zip(record.iter()) {
            row.insert(col.clone(), parse_cell(value));
        }
        rows.push(row);
    }

    Ok(Frame { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_dump() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            concat!(
                "--pm_pause_time 2.0\n",
                "START_NODES\n",
                "NodeGUID,NodeDesc,NodeType\n",
                "0x1,\"host-a\",1\n",
                "0x2,\"switch-a\",2\n",
                "END_NODES\n",
                "START_LINKS\n",
                "NodeGuid1,PortNum1,NodeGuid2,PortNum2\n",
                "0x1,1,0x2,3\n",
                "END_LINKS\n",
            )
        )
        .unwrap();
        file
    }

    #[test]
    fn indexes_two_tables() {
        let file = sample_dump();
        let index = build_index(file.path()).unwrap();
        assert!(index.table_exists("NODES"));
        assert!(index.table_exists("LINKS"));
        assert!(!index.table_exists("MISSING"));
    }

    #[test]
    fn reads_table_rows() {
        let file = sample_dump();
        let index = build_index(file.path()).unwrap();
        let frame = read_table(file.path(), &index, "NODES").unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.columns, vec!["NodeGUID", "NodeDesc", "NodeType"]);
    }

    #[test]
    fn missing_table_is_error() {
        let file = sample_dump();
        let index = build_index(file.path()).unwrap();
        assert!(read_table(file.path(), &index, "NOPE").is_err());
    }

    #[test]
    fn one_sided_marker_is_corrupt() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "START_ONLY\nHeader\nrow\n").unwrap();
        assert!(build_index(file.path()).is_err());
    }
}
