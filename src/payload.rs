//! Final payload assembly (spec.md §6): flattens an [`AnalysisResult`] into
//! the single JSON-safe map an edge (HTTP handler or CLI) returns verbatim.
//!
//! The per-analyzer external keys documented in spec.md §6 don't always
//! match this crate's internal module names (e.g. `mlnx_counters` vs.
//! `mlnx`, `extended_port_info` vs. `port_health`) — [`EXTERNAL_NAMES`] maps
//! internal name -> external key so the wire contract matches spec.md
//! exactly without renaming the analyzer modules themselves.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::orchestrator::AnalysisResult;
use crate::scorer::HealthReport;

/// (internal analyzer/module name, external payload key). Names absent from
/// this table are published under their internal name unchanged.
const EXTERNAL_NAMES: &[(&str, &str)] = &[
    ("mlnx", "mlnx_counters"),
    ("temperature", "temp_alerts"),
    ("port_health", "extended_port_info"),
];

fn external_name(internal: &str) -> &str {
    EXTERNAL_NAMES.iter().find(|(i, _)| *i == internal).map(|(_, e)| *e).unwrap_or(internal)
}

fn health_to_json(health: &HealthReport) -> Value {
    serde_json::to_value(health).unwrap_or(Value::Null)
}

fn rows_to_value(rows: &[Map<String, Value>]) -> Value {
    Value::Array(rows.iter().cloned().map(Value::Object).collect())
}

/// Group the scorer's flat issue list by category for the lightweight
/// warnings view (spec.md §6 `warnings_by_category`/`warnings_summary`).
/// The full per-table ibdiagnet WARNINGS_* taxonomy is out of scope here —
/// those tables already feed their owning analyzer's own anomaly frame, so
/// grouping the scorer's already-computed issues avoids parsing them twice.
fn warnings_views(health: &HealthReport) -> (Value, Value) {
    let mut by_category: HashMap<&'static str, Vec<Value>> = HashMap::new();
    let mut critical = 0usize;
    let mut warning = 0usize;
    let mut info = 0usize;

    for issue in &health.issues {
        let entry = serde_json::to_value(issue).unwrap_or(Value::Null);
        by_category.entry(issue.category).or_default().push(entry);
        match issue.severity {
            "critical" => critical += 1,
            "warning" => warning += 1,
            _ => info += 1,
        }
    }

    let by_category = Value::Object(by_category.into_iter().map(|(k, v)| (k.to_string(), Value::Array(v))).collect());
    let summary = serde_json::json!({"critical": critical, "warning": warning, "info": info, "total": health.issues.len()});
    (by_category, summary)
}

/// Build the full payload map for one analysis run (spec.md §6).
/// `preview_row_limit` is echoed back so the edge can tell the caller how
/// much of each dataset was actually sent, not just how much exists.
pub fn build(result: &AnalysisResult, preview_row_limit: usize) -> Map<String, Value> {
    let mut payload = Map::new();

    payload.insert("health".to_string(), health_to_json(&result.health));

    let brief_len = result.brief.len();
    payload.insert("data".to_string(), rows_to_value(&result.brief));
    payload.insert("data_issue_rows".to_string(), rows_to_value(&result.brief_issue_rows));
    payload.insert("data_total_rows".to_string(), Value::from(brief_len));

    let (warnings_by_category, warnings_summary) = warnings_views(&result.health);
    payload.insert("warnings_by_category".to_string(), warnings_by_category);
    payload.insert("warnings_summary".to_string(), warnings_summary);

    payload.insert("issues".to_string(), serde_json::to_value(&result.health.issues).unwrap_or(Value::Array(vec![])));
    payload.insert("debug_stdout".to_string(), Value::String(String::new()));
    payload.insert("debug_stderr".to_string(), Value::String(String::new()));
    payload.insert("preview_row_limit".to_string(), Value::from(preview_row_limit));

    for (name, view) in &result.datasets {
        let key = external_name(name);
        payload.insert(format!("{key}_data"), rows_to_value(&view.data));
        payload.insert(format!("{key}_issue_rows"), rows_to_value(&view.issue_rows));
        payload.insert(format!("{key}_total_rows"), Value::from(view.total_rows));
        payload.insert(format!("{key}_summary"), Value::Object(view.summary.clone()));
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_name_remaps_known_aliases() {
        assert_eq!(external_name("mlnx"), "mlnx_counters");
        assert_eq!(external_name("temperature"), "temp_alerts");
        assert_eq!(external_name("port_health"), "extended_port_info");
        assert_eq!(external_name("cable"), "cable");
    }
}
