//! Family G — RTT performance histograms, ported from `histogram_service.py`.
//!
//! `PERFORMANCE_HISTOGRAM_PORTS_DATA` stores a fixed set of `bin[N]` buckets
//! plus `min_sampled`/`max_sampled`; median and p99 are estimated by walking
//! the cumulative bucket distribution rather than from raw samples (spec.md
//! §4.4 Family G).

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_f64_or_zero, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory, Frame, Row};

fn bin_columns(frame: &Frame) -> Vec<String> {
    frame.columns.iter().filter(|c| c.starts_with("bin[")).cloned().collect()
}

fn estimate_percentile(frame: &Frame, row: &Row, bins: &[String], total: f64, quantile: f64) -> f64 {
    if total <= 0.0 || bins.is_empty() {
        return 0.0;
    }
    let target = total * quantile;
    let mut cumulative = 0.0;
    let mut selected_idx = bins.len() - 1;
    for (idx, col) in bins.iter().enumerate() {
        cumulative += cell_f64_or_zero(frame, row, col);
        if cumulative >= target {
            selected_idx = idx;
            break;
        }
    }
    let min_val = cell_f64_or_zero(frame, row, "min_sampled");
    let max_val_raw = cell_f64_or_zero(frame, row, "max_sampled");
    let max_val = if max_val_raw != 0.0 { max_val_raw } else { min_val };
    let span = (max_val - min_val).max(1e-6);
    let bucket_fraction = (selected_idx as f64 + 0.5) / bins.len() as f64;
    min_val + span * bucket_fraction
}

fn ratio(p99: f64, median: f64) -> f64 {
    if median <= 0.0 {
        return 0.0;
    }
    p99 / median
}

fn upper_bucket_ratio(frame: &Frame, row: &Row, bins: &[String], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let upper: f64 = bins.iter().rev().take(2).map(|c| cell_f64_or_zero(frame, row, c)).sum();
    upper / total
}

fn is_outlier(ratio: f64, upper_ratio: f64) -> bool {
    ratio >= 3.0 || upper_ratio >= 0.1
}

fn anomaly_weight(p99_ratio: f64, upper_ratio: f64) -> f64 {
    (p99_ratio / 5.0 + upper_ratio * 2.0).clamp(0.1, 5.0)
}

struct PortMetrics {
    guid: String,
    port: Option<u32>,
    median_us: f64,
    p99_us: f64,
    p99_over_median: f64,
    upper_bucket_ratio: f64,
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let frame = inventory.read_table("PERFORMANCE_HISTOGRAM_PORTS_DATA");
    if frame.is_empty() {
        let mut summary = Map::new();
        summary.insert("total_ports".into(), Value::from(0));
        summary.insert("high_p99_ports".into(), Value::from(0));
        summary.insert("upper_bucket_ports".into(), Value::from(0));
        summary.insert("severe_tail_ports".into(), Value::from(0));
        summary.insert("avg_median_us".into(), Value::from(0.0));
        summary.insert("avg_p99_us".into(), Value::from(0.0));
        summary.insert("top_outliers".into(), Value::Array(vec![]));
        return AnalyzerOutput { rows: Vec::new(), anomalies: AnomalyFrame::new(), summary };
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };
    let bins = bin_columns(&frame);

    let mut rows = Vec::with_capacity(frame.len());
    let mut anomalies = AnomalyFrame::new();
    let mut metrics = Vec::with_capacity(frame.len());

    for row in &frame.rows {
        let guid = normalize_guid(&frame.get(row, "NodeGuid").to_string());
        let port = parse_port_number(&frame.get(row, "PortNum").to_string());

        let total: f64 = bins.iter().map(|c| cell_f64_or_zero(&frame, row, c)).sum();
        let median_us = estimate_percentile(&frame, row, &bins, total, 0.5);
        let p99_us = estimate_percentile(&frame, row, &bins, total, 0.99);
        let p99_over_median = ratio(p99_us, median_us);
        let upper_ratio = upper_bucket_ratio(&frame, row, &bins, total);

        let name = topo.node_label(&guid).unwrap_or(&guid).to_string();
        let attached = port.and_then(|p| topo.attached_guid(&guid, p)).and_then(|g| topo.node_label(g));

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("Node Name".into(), Value::String(name));
        if let Some(a) = attached {
            obj.insert("Attached To".into(), Value::String(a.to_string()));
        }
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("RttMedianUs".into(), Value::from(median_us));
        obj.insert("RttP99Us".into(), Value::from(p99_us));
        obj.insert("RttP99OverMedian".into(), Value::from(p99_over_median));
        obj.insert("RttUpperBucketRatio".into(), Value::from(upper_ratio));

        if is_outlier(p99_over_median, upper_ratio) {
            anomalies.push(&guid, port, AnomalyKind::UnusualRttNum, anomaly_weight(p99_over_median, upper_ratio));
        }

        metrics.push(PortMetrics { guid: guid.clone(), port, median_us, p99_us, p99_over_median, upper_bucket_ratio: upper_ratio });
        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_ports".into(), Value::from(rows.len()));
    summary.insert("high_p99_ports".into(), Value::from(metrics.iter().filter(|m| m.p99_over_median >= 3.0).count()));
    summary.insert("upper_bucket_ports".into(), Value::from(metrics.iter().filter(|m| m.upper_bucket_ratio >= 0.1).count()));
    summary.insert("severe_tail_ports".into(), Value::from(metrics.iter().filter(|m| m.p99_over_median >= 5.0).count()));
    let avg_median = if metrics.is_empty() { 0.0 } else { metrics.iter().map(|m| m.median_us).sum::<f64>() / metrics.len() as f64 };
    let avg_p99 = if metrics.is_empty() { 0.0 } else { metrics.iter().map(|m| m.p99_us).sum::<f64>() / metrics.len() as f64 };
    summary.insert("avg_median_us".into(), Value::from(avg_median));
    summary.insert("avg_p99_us".into(), Value::from(avg_p99));

    let mut top = metrics;
    top.sort_by(|a, b| b.p99_over_median.partial_cmp(&a.p99_over_median).unwrap());
    let top_outliers: Vec<Value> = top
        .into_iter()
        .take(5)
        .map(|m| {
            let mut entry = Map::new();
            entry.insert("node_name".into(), Value::String(topo.node_label(&m.guid).unwrap_or(&m.guid).to_string()));
            entry.insert("node_guid".into(), Value::String(m.guid));
            if let Some(p) = m.port {
                entry.insert("port_number".into(), Value::from(p));
            }
            entry.insert("ratio".into(), Value::from(m.p99_over_median));
            entry.insert("upper_ratio".into(), Value::from(m.upper_bucket_ratio));
            entry.insert("median_us".into(), Value::from(m.median_us));
            entry.insert("p99_us".into(), Value::from(m.p99_us));
            Value::Object(entry)
        })
        .collect();
    summary.insert("top_outliers".into(), Value::Array(top_outliers));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outlier_requires_ratio_or_upper_bucket() {
        assert!(is_outlier(3.0, 0.0));
        assert!(is_outlier(0.0, 0.1));
        assert!(!is_outlier(2.9, 0.09));
    }

    #[test]
    fn anomaly_weight_is_clamped() {
        assert_eq!(anomaly_weight(0.0, 0.0), 0.1);
        assert_eq!(anomaly_weight(100.0, 10.0), 5.0);
    }
}
