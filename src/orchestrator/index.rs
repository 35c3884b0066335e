//! Anomaly indexing and issue-row filtering (spec.md §4.7 steps 7-8).
//!
//! Builds `(normalized_guid, port_or_null)` key sets from an analyzer's
//! anomaly frame and uses them to split a dataset's full row set into the
//! subset worth surfacing as "issues". Falls back to a generic
//! problem-marker heuristic when a dataset's anomaly index has no strict
//! matches (e.g. a Family I analyzer that never raises anomalies itself).

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::anomaly::AnomalyFrame;
use crate::dump::normalize_guid;

pub type PortKeySet = HashSet<(String, Option<u32>)>;

const HEALTHY_SEVERITY_TOKENS: &[&str] = &["ok", "normal", "healthy", "info", "pass", ""];

fn row_key(row: &Map<String, Value>) -> Option<(String, Option<u32>)> {
    let guid = row.get("NodeGUID")?.as_str()?;
    let port = row.get("PortNumber").and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))).map(|p| p as u32);
    Some((normalize_guid(guid), port))
}

/// Three-tier anomaly index (spec.md §4.8): every `(guid, port)` an analyzer
/// flagged is broadened into `(guid, port)`, `(guid, null)`, and `("", port)`
/// so a later strict lookup can match on guid alone or port alone without
/// the candidate row needing to reproduce the exact pair.
pub fn frame_index(frame: &AnomalyFrame) -> PortKeySet {
    let mut index = PortKeySet::new();
    for row in frame.rows() {
        let guid = normalize_guid(&row.node_guid);
        index.insert((guid.clone(), row.port_number));
        index.insert((guid, None));
        if let Some(port) = row.port_number {
            index.insert((String::new(), Some(port)));
        }
    }
    index
}

/// A row matches the index iff any of its three broadened keys is present
/// (spec.md §4.8): `(guid, port)`, `(guid, null)`, or `("", port)`.
fn row_matches(key: &(String, Option<u32>), index: &PortKeySet) -> bool {
    let (guid, port) = key;
    index.contains(&(guid.clone(), *port))
        || index.contains(&(guid.clone(), None))
        || (port.is_some() && index.contains(&(String::new(), *port)))
}

/// Generic fallback for datasets with no anomaly frame of their own
/// (spec.md §4.7 step 8: "presence of terms like fail, error, linkdown,
/// non-zero numeric counters outside thresholds, severity strings other
/// than the healthy set").
fn looks_like_problem_row(row: &Map<String, Value>) -> bool {
    for (key, value) in row {
        let lower_key = key.to_ascii_lowercase();
        if let Some(text) = value.as_str() {
            let lower = text.to_ascii_lowercase();
            if lower.contains("fail") || lower.contains("error") || lower.contains("linkdown") {
                return true;
            }
            if (lower_key.contains("severity") || lower_key.contains("status"))
                && !HEALTHY_SEVERITY_TOKENS.contains(&lower.as_str())
            {
                return true;
            }
        }
        if (lower_key.contains("counter") || lower_key.contains("error")) && !lower_key.contains("name") {
            if let Some(n) = value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)) {
                if n != 0 {
                    return true;
                }
            }
        }
    }
    false
}

/// Select the issue-row subset of `data` for a given anomaly index,
/// falling back to the generic problem-marker heuristic when the index
/// matches nothing (spec.md §4.7 step 8, invariant P8: issue rows are
/// always a subset of the full row set).
pub fn issue_rows_for(data: &[Map<String, Value>], index: &PortKeySet) -> Vec<Map<String, Value>> {
    let strict: Vec<Map<String, Value>> =
        data.iter().filter(|row| row_key(row).is_some_and(|k| row_matches(&k, index))).cloned().collect();
    if !strict.is_empty() {
        return strict;
    }
    data.iter().filter(|row| looks_like_problem_row(row)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_match_wins_over_heuristic() {
        let mut index = PortKeySet::new();
        index.insert(("0x1".to_string(), Some(1)));
        let rows = vec![
            json!({"NodeGUID": "0x1", "PortNumber": 1, "Severity": "ok"}).as_object().unwrap().clone(),
            json!({"NodeGUID": "0x2", "PortNumber": 2, "Severity": "critical failure"}).as_object().unwrap().clone(),
        ];
        let issues = issue_rows_for(&rows, &index);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].get("NodeGUID").unwrap(), "0x1");
    }

    #[test]
    fn falls_back_to_problem_markers_when_index_empty() {
        let index = PortKeySet::new();
        let rows = vec![
            json!({"NodeGUID": "0x1", "Severity": "ok"}).as_object().unwrap().clone(),
            json!({"NodeGUID": "0x2", "LinkDownedCounter": 3}).as_object().unwrap().clone(),
        ];
        let issues = issue_rows_for(&rows, &index);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].get("NodeGUID").unwrap(), "0x2");
    }
}
