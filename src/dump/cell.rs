//! The cell sum type and the columnar frame analyzers consume.
//!
//! The source tool represents every sub-table as a generic DataFrame with
//! string-typed cells coerced on demand. Here a sub-table is a `Frame`: a
//! fixed column order plus row vectors of `Cell`, so a consumer pays the
//! coercion cost only for the columns it actually reads.

use std::collections::HashMap;

/// A single table cell. Values stay `Text` until a consumer coerces them —
/// the dump reader never guesses a column's type.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int64(i64),
    Float64(f64),
    Text(String),
}

impl Cell {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// `int(float(value))` coercion rule shared by every analyzer (spec.md
    /// §4.4): empty/NaN/unparseable -> `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Null => None,
            Cell::Int64(v) => Some(*v),
            Cell::Float64(v) if v.is_finite() => Some(*v as i64),
            Cell::Float64(_) => None,
            Cell::Text(s) => parse_numeric_text(s).and_then(|f| {
                if f.is_finite() { Some(f as i64) } else { None }
            }),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Null => None,
            Cell::Int64(v) => Some(*v as f64),
            Cell::Float64(v) => Some(*v),
            Cell::Text(s) => parse_numeric_text(s),
        }
    }

    /// Integer-context conversion: failure yields `0`, matching
    /// spec.md §4.4's "on failure -> 0 for integer contexts".
    pub fn as_i64_or_zero(&self) -> i64 {
        self.as_i64().unwrap_or(0)
    }

    /// Float-context conversion: failure yields `0.0`.
    pub fn as_f64_or_zero(&self) -> f64 {
        self.as_f64().unwrap_or(0.0)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Lossless conversion into a JSON value for payload assembly; numeric
    /// sanitization (NaN/Inf -> null) happens later at the payload boundary
    /// (spec.md §4.7), not here.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Null => serde_json::Value::Null,
            Cell::Int64(v) => serde_json::Value::from(*v),
            Cell::Float64(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Cell::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => write!(f, ""),
            Cell::Int64(v) => write!(f, "{v}"),
            Cell::Float64(v) => write!(f, "{v}"),
            Cell::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Parse a raw dump cell into a `Cell`, applying the NA-token and sentinel
/// rules from spec.md §4.4: `"", "nan", "None", "null"` (case-insensitive)
/// become null; a `0x`-prefixed string parses as hex integer; otherwise an
/// int, then float, parse is attempted; anything else stays text.
pub fn parse_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Cell::Null;
    }
    let lower = trimmed.to_ascii_lowercase();
    if matches!(lower.as_str(), "n/a" | "err" | "nan" | "none" | "null") {
        return Cell::Null;
    }
    if let Some(hex_part) = lower.strip_prefix("0x") {
        if let Ok(v) = i64::from_str_radix(hex_part, 16) {
            return Cell::Int64(v);
        }
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Cell::Int64(v);
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        if v.is_finite() {
            return Cell::Float64(v);
        }
        return Cell::Null;
    }
    Cell::Text(trimmed.trim_matches('"').to_string())
}

fn parse_numeric_text(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if matches!(lower.as_str(), "nan" | "none" | "null" | "n/a" | "err") {
        return None;
    }
    if let Some(hex_part) = lower.strip_prefix("0x") {
        return i64::from_str_radix(hex_part, 16).ok().map(|v| v as f64);
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// A single row: column name -> cell. Preserves the dump's header order via
/// the owning `Frame`; the map itself is for O(1) named access.
pub type Row = HashMap<String, Cell>;

/// A parsed CSV sub-table: header order plus row dictionaries.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Frame {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn get<'a>(&'a self, row: &'a Row, name: &str) -> &'a Cell {
        row.get(name).unwrap_or(&Cell::Null)
    }

    /// Convert every row into a JSON object in header column order (columns
    /// absent from a given row, due to `flexible(true)` parsing, are
    /// omitted rather than padded with null).
    pub fn to_json_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::with_capacity(self.columns.len());
                for col in &self.columns {
                    if let Some(cell) = row.get(col) {
                        obj.insert(col.clone(), cell.to_json());
                    }
                }
                obj
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn na_tokens_become_null() {
        for v in ["N/A", "n/a", "ERR", "err", ""] {
            assert!(parse_cell(v).is_null());
        }
    }

    #[test]
    fn hex_parses_as_int() {
        assert_eq!(parse_cell("0x1F"), Cell::Int64(31));
    }

    #[test]
    fn plain_int_and_float() {
        assert_eq!(parse_cell("42"), Cell::Int64(42));
        assert_eq!(parse_cell("3.5"), Cell::Float64(3.5));
    }

    #[test]
    fn text_falls_through() {
        assert_eq!(parse_cell("Active"), Cell::Text("Active".into()));
        assert_eq!(parse_cell("\"quoted\""), Cell::Text("quoted".into()));
    }

    #[test]
    fn integer_context_zero_on_failure() {
        assert_eq!(Cell::Text("garbage".into()).as_i64_or_zero(), 0);
        assert_eq!(Cell::Null.as_f64_or_zero(), 0.0);
    }
}
