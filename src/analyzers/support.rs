//! Shared plumbing every analyzer builds on: the uniform output shape
//! (spec.md §4.4 "given a Dataset Inventory, return rows/anomalies/summary"),
//! row-to-JSON conversion, and topology annotation.

use serde_json::{Map, Value};

use crate::dump::{normalize_guid, parse_port_number, Cell, Frame, Row, TopologyLookup};
use crate::anomaly::AnomalyFrame;

/// Uniform analyzer output: a display row set, an anomaly frame (usually
/// empty for Family I analyzers), and a summary record.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerOutput {
    pub rows: Vec<Map<String, Value>>,
    pub anomalies: AnomalyFrame,
    pub summary: Map<String, Value>,
}

impl AnalyzerOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build output from a frame with no anomaly logic: every row, a
    /// `total_rows` summary field, no topology annotation. Used by the
    /// pure-display Family I analyzers.
    pub fn passthrough(frame: &Frame) -> Self {
        let rows = frame.to_json_rows();
        let mut summary = Map::new();
        summary.insert("total_rows".into(), Value::from(rows.len()));
        Self { rows, anomalies: AnomalyFrame::new(), summary }
    }
}

pub fn cell_str<'a>(frame: &'a Frame, row: &'a Row, name: &str) -> String {
    frame.get(row, name).to_string()
}

pub fn row_guid(frame: &Frame, row: &Row) -> String {
    normalize_guid(&cell_str(frame, row, "NodeGUID"))
}

pub fn row_port(frame: &Frame, row: &Row) -> Option<u32> {
    parse_port_number(&cell_str(frame, row, "PortNumber"))
}

/// Annotate a row's JSON object with topology fields (spec.md §4.3
/// row-annotator: `Node Name`, `Node Type`, `Attached To GUID`,
/// `Attached To Port`, `Attached To`, `Attached To Type`).
pub fn annotate(obj: &mut Map<String, Value>, topo: &TopologyLookup, guid: &str, port: Option<u32>) {
    let (name, ty, attached_guid, attached_port, attached_name, attached_type) =
        topo.annotate(guid, port);
    if let Some(name) = name {
        obj.insert("Node Name".into(), Value::String(name.to_string()));
    }
    if let Some(ty) = ty {
        obj.insert("Node Type".into(), Value::String(ty.as_str().to_string()));
    }
    if let Some(g) = attached_guid {
        obj.insert("Attached To GUID".into(), Value::String(g.to_string()));
    }
    if let Some(p) = attached_port {
        obj.insert("Attached To Port".into(), Value::from(p));
    }
    if let Some(n) = attached_name {
        obj.insert("Attached To".into(), Value::String(n.to_string()));
    }
    if let Some(t) = attached_type {
        obj.insert("Attached To Type".into(), Value::String(t.as_str().to_string()));
    }
}

/// `int(float(value))` coercion with a zero fallback for integer contexts
/// (spec.md §4.4 edge-case policy).
pub fn cell_i64_or_zero(frame: &Frame, row: &Row, name: &str) -> i64 {
    frame.get(row, name).as_i64_or_zero()
}

pub fn cell_f64_or_zero(frame: &Frame, row: &Row, name: &str) -> f64 {
    frame.get(row, name).as_f64_or_zero()
}

pub fn cell_opt_f64(frame: &Frame, row: &Row, name: &str) -> Option<f64> {
    frame.get(row, name).as_f64()
}

/// GUID cell lookup trying each column name in order, mirroring the
/// `row.get("NodeGuid", row.get("GUID", ...))` fallback chains the Family I
/// services use when a table's GUID column is inconsistently named.
pub fn cell_guid(frame: &Frame, row: &Row, names: &[&str]) -> String {
    for name in names {
        let v = cell_str(frame, row, name);
        if !v.is_empty() {
            return normalize_guid(&v);
        }
    }
    String::new()
}

/// Same fallback-chain lookup for a port-number column.
pub fn cell_port(frame: &Frame, row: &Row, names: &[&str]) -> Option<u32> {
    for name in names {
        if let Some(p) = parse_port_number(&cell_str(frame, row, name)) {
            return Some(p);
        }
    }
    None
}

/// First integer token out of a string cell that may read `"75C"`, `"0x2A"`,
/// `"N/A"` (spec.md §4.4 Family B temperature/alarm parsing).
pub fn first_int_token(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Null => None,
        Cell::Int64(v) => Some(*v),
        Cell::Float64(v) if v.is_finite() => Some(*v as i64),
        Cell::Float64(_) => None,
        Cell::Text(s) => {
            let trimmed = s.trim();
            let digits: String = trimmed
                .chars()
                .take_while(|c| c.is_ascii_hexdigit() || *c == '-')
                .collect();
            if let Some(hex) = trimmed.to_ascii_lowercase().strip_prefix("0x") {
                return i64::from_str_radix(hex, 16).ok();
            }
            let numeric: String = trimmed.chars().take_while(|c| c.is_ascii_digit() || *c == '-').collect();
            if !numeric.is_empty() {
                return numeric.parse::<i64>().ok();
            }
            digits.parse::<i64>().ok()
        },
    }
}
