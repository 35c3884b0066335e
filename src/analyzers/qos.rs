//! Family I — QoS / VL arbitration weight distribution, ported from
//! `qos_service.py`. `VL_ARBITRATION_TABLE` is one row per (port, VL) pair;
//! aggregated here into one record per port.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory};

#[derive(Default)]
struct PortQos {
    vls_used: HashSet<i64>,
    total_weight: i64,
    high_priority_weight: i64,
    low_priority_weight: i64,
    weights: Vec<i64>,
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let vl = inventory.read_table("VL_ARBITRATION_TABLE");
    if vl.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut port_qos: HashMap<(String, i64), PortQos> = HashMap::new();
    let mut order: Vec<(String, i64)> = Vec::new();

    for row in &vl.rows {
        let guid = normalize_guid(&cell_str(&vl, row, "NodeGUID"));
        let port_num = parse_port_number(&cell_str(&vl, row, "PortNum")).unwrap_or(0) as i64;
        let priority = cell_str(&vl, row, "Priority").to_lowercase();
        let vlane = cell_i64_or_zero(&vl, row, "VL");
        let weight = cell_i64_or_zero(&vl, row, "Weight");

        let key = (guid, port_num);
        let entry = port_qos.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            PortQos::default()
        });
        entry.vls_used.insert(vlane);
        entry.total_weight += weight;
        entry.weights.push(weight);
        if priority == "high" {
            entry.high_priority_weight += weight;
        } else {
            entry.low_priority_weight += weight;
        }
    }

    let mut rows = Vec::with_capacity(order.len());
    let mut vl_distribution: HashMap<i64, usize> = HashMap::new();
    let mut single_vl_ports = 0usize;
    let mut high_prio_dominant_ports = 0usize;
    let mut total_vls_sum = 0i64;

    for key in &order {
        let qos = &port_qos[key];
        let (guid, port_num) = key;
        let node_name = topo.node_label(guid).unwrap_or(guid).to_string();

        let vls_used = qos.vls_used.len() as i64;
        let total_weight = qos.total_weight;
        let high_prio_pct = if total_weight > 0 { qos.high_priority_weight as f64 / total_weight as f64 * 100.0 } else { 0.0 };

        let avg_weight = if qos.weights.is_empty() { 0.0 } else { qos.weights.iter().sum::<i64>() as f64 / qos.weights.len() as f64 };
        let weight_variance = if qos.weights.is_empty() {
            0.0
        } else {
            qos.weights.iter().map(|w| (*w as f64 - avg_weight).powi(2)).sum::<f64>() / qos.weights.len() as f64
        };

        let mut severity = "normal";
        let mut issues = Vec::new();
        if vls_used < 2 {
            severity = "info";
            issues.push("Single VL in use".to_string());
            single_vl_ports += 1;
        }
        if high_prio_pct > 80.0 {
            if severity == "normal" {
                severity = "warning";
            }
            issues.push(format!("High priority dominates ({high_prio_pct:.1}%)"));
            high_prio_dominant_ports += 1;
        }
        if weight_variance > 10000.0 {
            if severity == "normal" {
                severity = "warning";
            }
            issues.push("VL weight imbalance detected".to_string());
        }

        *vl_distribution.entry(vls_used).or_insert(0) += 1;
        total_vls_sum += vls_used;

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(node_name));
        obj.insert("PortNumber".into(), Value::from(*port_num));
        obj.insert("VLsUsed".into(), Value::from(vls_used));
        obj.insert("TotalWeight".into(), Value::from(total_weight));
        obj.insert("HighPriorityWeight".into(), Value::from(qos.high_priority_weight));
        obj.insert("LowPriorityWeight".into(), Value::from(qos.low_priority_weight));
        obj.insert("HighPriorityPct".into(), Value::from((high_prio_pct * 10.0).round() / 10.0));
        obj.insert("AvgWeight".into(), Value::from((avg_weight * 10.0).round() / 10.0));
        obj.insert("WeightVariance".into(), Value::from((weight_variance * 10.0).round() / 10.0));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));
        rows.push(obj);
    }
    rows.truncate(2000);

    let total_ports = order.len().max(1) as f64;
    let mut summary = Map::new();
    summary.insert("total_ports_analyzed".into(), Value::from(order.len()));
    summary.insert("avg_vls_per_port".into(), Value::from((total_vls_sum as f64 / total_ports * 10.0).round() / 10.0));
    summary.insert("ports_with_single_vl".into(), Value::from(single_vl_ports));
    summary.insert("ports_with_high_prio_dominant".into(), Value::from(high_prio_dominant_ports));
    summary.insert(
        "vl_distribution".into(),
        Value::Object(vl_distribution.into_iter().map(|(k, v)| (k.to_string(), Value::from(v))).collect()),
    );

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
