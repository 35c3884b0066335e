//! Family I — flow-control credit watchdog timeouts, ported from
//! `credit_watchdog_service.py`. `CREDIT_WATCHDOG_TIMEOUT_COUNTERS` carries
//! per-VL timeout counts under inconsistently named columns across firmware
//! versions, hence the fallback chains on both GUID and counter columns.

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_guid, cell_i64_or_zero, cell_port, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::DatasetInventory;

fn classify(total_timeouts: i64) -> (&'static str, Option<String>) {
    if total_timeouts > 1000 {
        ("critical", Some(format!("High timeout count: {total_timeouts}")))
    } else if total_timeouts > 100 {
        ("warning", Some(format!("Elevated timeout count: {total_timeouts}")))
    } else if total_timeouts > 0 {
        ("info", Some(format!("Timeouts detected: {total_timeouts}")))
    } else {
        ("normal", None)
    }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let cwd = inventory.read_table("CREDIT_WATCHDOG_TIMEOUT_COUNTERS");
    if cwd.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut entries = Vec::with_capacity(cwd.len());
    let mut total_timeouts = 0i64;
    let mut ports_with_timeouts = 0usize;
    let mut max_timeout_count = 0i64;
    let mut vl_distribution: Map<String, Value> = Map::new();
    let mut vl_totals = std::collections::BTreeMap::new();

    for row in &cwd.rows {
        let guid = cell_guid(&cwd, row, &["NodeGuid", "GUID"]);
        let port = cell_port(&cwd, row, &["PortNum", "PortNumber"]);

        let mut vl_timeouts = Vec::new();
        let mut total_port_timeouts = 0i64;
        for vl in 0..16 {
            for col in [format!("VL{vl}TimeoutCount"), format!("VL{vl}_Timeout"), format!("VL{vl}")] {
                if cwd.has_column(&col) {
                    let count = cell_i64_or_zero(&cwd, row, &col);
                    if count > 0 {
                        vl_timeouts.push((vl, count));
                        total_port_timeouts += count;
                        *vl_totals.entry(vl).or_insert(0i64) += count;
                    }
                    break;
                }
            }
        }
        if total_port_timeouts == 0 {
            let generic = cell_i64_or_zero(&cwd, row, "TimeoutCount").max(cell_i64_or_zero(&cwd, row, "Timeouts"));
            total_port_timeouts = generic;
        }

        let watchdog_enabled = cell_i64_or_zero(&cwd, row, "WatchdogEnabled") != 0 || cell_i64_or_zero(&cwd, row, "Enabled") != 0;
        let watchdog_limit = cell_i64_or_zero(&cwd, row, "WatchdogLimit").max(cell_i64_or_zero(&cwd, row, "Limit"));

        let (severity, issue) = classify(total_port_timeouts);

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("TotalTimeouts".into(), Value::from(total_port_timeouts));
        obj.insert("WatchdogEnabled".into(), Value::from(watchdog_enabled));
        obj.insert("WatchdogLimit".into(), Value::from(watchdog_limit));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issue.unwrap_or_default()));
        for (vl, count) in &vl_timeouts {
            obj.insert(format!("VL{vl}Timeouts"), Value::from(*count));
        }

        total_timeouts += total_port_timeouts;
        if total_port_timeouts > 0 {
            ports_with_timeouts += 1;
        }
        max_timeout_count = max_timeout_count.max(total_port_timeouts);

        let rank = match severity {
            "critical" => 0,
            "warning" => 1,
            "info" => 2,
            _ => 3,
        };
        entries.push((rank, total_port_timeouts, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, obj)| obj).collect();

    for (vl, count) in vl_totals {
        vl_distribution.insert(vl.to_string(), Value::from(count));
    }

    let mut summary = Map::new();
    summary.insert("total_entries".into(), Value::from(cwd.len()));
    summary.insert("ports_with_timeouts".into(), Value::from(ports_with_timeouts));
    summary.insert("total_timeout_events".into(), Value::from(total_timeouts));
    summary.insert("max_timeout_count".into(), Value::from(max_timeout_count));
    summary.insert("affected_vls".into(), Value::from(vl_distribution.len()));
    summary.insert("vl_timeout_distribution".into(), Value::Object(vl_distribution));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_thresholds() {
        assert_eq!(classify(1500).0, "critical");
        assert_eq!(classify(500).0, "warning");
        assert_eq!(classify(5).0, "info");
        assert_eq!(classify(0).0, "normal");
    }
}
