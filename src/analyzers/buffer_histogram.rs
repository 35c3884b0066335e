//! Family I — buffer congestion histograms, ported from
//! `buffer_histogram_service.py`. `PERFORMANCE_HISTOGRAM_BUFFER_DATA` is the
//! primary source: each row is a per-(node, port, VL) histogram whose `bin*`
//! columns bucket congestion samples from least to most congested.
//! `PERFORMANCE_HISTOGRAM_BUFFER_CONTROL` and `PERFORMANCE_HISTOGRAM_INFO`
//! only contribute row counts / per-node enablement to the summary.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::DatasetInventory;

const HIGH_UTILIZATION_THRESHOLD: f64 = 80.0;
const CRITICAL_UTILIZATION_THRESHOLD: f64 = 95.0;

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let buffer_data = inventory.read_table("PERFORMANCE_HISTOGRAM_BUFFER_DATA");
    let buffer_control = inventory.read_table("PERFORMANCE_HISTOGRAM_BUFFER_CONTROL");
    let histogram_info = inventory.read_table("PERFORMANCE_HISTOGRAM_INFO");
    if buffer_data.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = inventory.topology().ok();

    let bin_columns: Vec<String> = buffer_data
        .columns
        .iter()
        .filter(|c| c.starts_with("bin") || c.starts_with("Bin"))
        .cloned()
        .collect();

    let mut high_utilization_count = 0usize;
    let mut critical_utilization_count = 0usize;
    let mut vl_distribution: HashMap<i64, usize> = HashMap::new();
    let mut buffer_type_distribution: HashMap<String, usize> = HashMap::new();
    let mut max_utilization = 0.0f64;
    let mut total_samples = 0i64;

    let mut entries: Vec<(i64, f64, Map<String, Value>)> = Vec::with_capacity(buffer_data.len());

    for row in &buffer_data.rows {
        let mut node_guid = cell_str(&buffer_data, row, "NodeGuid");
        if node_guid.is_empty() {
            node_guid = cell_str(&buffer_data, row, "NodeGUID");
        }
        let port_num = {
            let v = cell_i64_or_zero(&buffer_data, row, "PortNum");
            if v != 0 { v } else { cell_i64_or_zero(&buffer_data, row, "PortNumber") }
        };
        let vl = cell_i64_or_zero(&buffer_data, row, "VL");

        let node_name = topo.and_then(|t| t.node_label(&node_guid)).unwrap_or(&node_guid).to_string();

        let buffer_type = {
            let v = cell_str(&buffer_data, row, "BufferType");
            if !v.is_empty() { v } else { let t = cell_str(&buffer_data, row, "Type"); if t.is_empty() { "Unknown".to_string() } else { t } }
        };
        *buffer_type_distribution.entry(buffer_type.clone()).or_insert(0) += 1;
        *vl_distribution.entry(vl).or_insert(0) += 1;

        let bin_values: Vec<i64> = bin_columns.iter().map(|col| cell_i64_or_zero(&buffer_data, row, col)).collect();
        let total_count: i64 = bin_values.iter().sum();
        total_samples += total_count;

        let (utilization_pct, high_bin_pct, avg_bin) = if total_count > 0 && !bin_values.is_empty() {
            let weighted_sum: i64 = bin_values.iter().enumerate().map(|(i, v)| i as i64 * v).sum();
            let avg_bin = weighted_sum as f64 / total_count as f64;
            let utilization_pct = (avg_bin / (bin_values.len() - 1).max(1) as f64) * 100.0;
            let high_bin_threshold = bin_values.len() * 3 / 4;
            let high_bin_count: i64 = bin_values[high_bin_threshold..].iter().sum();
            let high_bin_pct = high_bin_count as f64 / total_count as f64 * 100.0;
            (utilization_pct, high_bin_pct, avg_bin)
        } else {
            (0.0, 0.0, 0.0)
        };
        max_utilization = max_utilization.max(utilization_pct);

        let mut issues = Vec::new();
        let mut severity = "normal";
        if high_bin_pct >= CRITICAL_UTILIZATION_THRESHOLD {
            issues.push(format!("Critical buffer congestion: {high_bin_pct:.1}% in high bins"));
            severity = "critical";
            critical_utilization_count += 1;
        } else if high_bin_pct >= HIGH_UTILIZATION_THRESHOLD {
            issues.push(format!("High buffer utilization: {high_bin_pct:.1}% in high bins"));
            severity = "warning";
            high_utilization_count += 1;
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(node_guid));
        obj.insert("NodeName".into(), Value::String(node_name));
        obj.insert("PortNumber".into(), Value::from(port_num));
        obj.insert("VL".into(), Value::from(vl));
        obj.insert("BufferType".into(), Value::String(buffer_type));
        obj.insert("TotalSamples".into(), Value::from(total_count));
        obj.insert("AvgBin".into(), Value::from((avg_bin * 100.0).round() / 100.0));
        obj.insert("UtilizationPct".into(), Value::from((utilization_pct * 10.0).round() / 10.0));
        obj.insert("HighBinPct".into(), Value::from((high_bin_pct * 10.0).round() / 10.0));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));
        for (i, val) in bin_values.iter().take(10).enumerate() {
            obj.insert(format!("Bin{i}"), Value::from(*val));
        }

        let rank = match severity { "critical" => 0, "warning" => 1, _ => 2 };
        entries.push((rank, high_bin_pct, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, obj)| obj).collect();

    let mut histogram_nodes_configured = std::collections::HashSet::new();
    for row in &histogram_info.rows {
        histogram_nodes_configured.insert(cell_str(&histogram_info, row, "NodeGuid"));
    }

    let mut vl_dist_sorted: Vec<(i64, usize)> = vl_distribution.into_iter().collect();
    vl_dist_sorted.sort_by_key(|(k, _)| *k);
    let mut buffer_type_sorted: Vec<(String, usize)> = buffer_type_distribution.into_iter().collect();
    buffer_type_sorted.sort_by(|a, b| b.1.cmp(&a.1));

    let mut summary = Map::new();
    summary.insert("total_entries".into(), Value::from(buffer_data.len()));
    summary.insert("total_samples".into(), Value::from(total_samples));
    summary.insert("high_utilization_count".into(), Value::from(high_utilization_count));
    summary.insert("critical_utilization_count".into(), Value::from(critical_utilization_count));
    summary.insert("max_utilization_pct".into(), Value::from((max_utilization * 10.0).round() / 10.0));
    summary.insert("vl_distribution".into(), Value::Object(vl_dist_sorted.into_iter().map(|(k, v)| (k.to_string(), Value::from(v))).collect()));
    summary.insert("buffer_type_distribution".into(), Value::Object(buffer_type_sorted.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("histogram_nodes_configured".into(), Value::from(histogram_nodes_configured.len()));
    summary.insert("control_entries".into(), Value::from(buffer_control.len()));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
