//! Family I — granular power sensor readings, ported from
//! `power_sensors_service.py`. `POWER_SENSORS` is a much finer-grained
//! table than the chassis-level `PSU_*` tables `psu.rs` reads.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_f64_or_zero, cell_guid, cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{DatasetInventory, Frame, Row};

const WARNING_UTILIZATION_PCT: f64 = 80.0;
const CRITICAL_UTILIZATION_PCT: f64 = 95.0;

fn cell_f64_fallback(frame: &Frame, row: &Row, names: &[&str]) -> f64 {
    for name in names {
        let v = cell_f64_or_zero(frame, row, name);
        if v != 0.0 {
            return v;
        }
    }
    0.0
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let sensors = inventory.read_table("POWER_SENSORS");
    if sensors.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut entries = Vec::with_capacity(sensors.len());
    let mut sensor_type_distribution: HashMap<String, usize> = HashMap::new();
    let mut sensors_by_node: HashMap<String, usize> = HashMap::new();
    let mut warning_count = 0usize;
    let mut critical_count = 0usize;
    let mut total_power_mw = 0.0;
    let mut max_power_mw = 0.0;

    for row in &sensors.rows {
        let guid = cell_guid(&sensors, row, &["NodeGuid", "GUID"]);
        let sensor_index = cell_i64_or_zero(&sensors, row, "SensorIndex").max(cell_i64_or_zero(&sensors, row, "Index"));
        let mut sensor_name = cell_str(&sensors, row, "SensorName");
        if sensor_name.is_empty() {
            sensor_name = cell_str(&sensors, row, "Name");
        }
        if sensor_name.is_empty() {
            sensor_name = format!("Sensor_{sensor_index}");
        }
        let mut sensor_type = cell_str(&sensors, row, "SensorType");
        if sensor_type.is_empty() {
            sensor_type = cell_str(&sensors, row, "Type");
        }
        if sensor_type.is_empty() {
            sensor_type = "Unknown".to_string();
        }
        *sensor_type_distribution.entry(sensor_type.clone()).or_insert(0) += 1;
        *sensors_by_node.entry(guid.clone()).or_insert(0) += 1;

        let current_power = cell_f64_fallback(&sensors, row, &["CurrentPower", "Power"]);
        let max_power_cap = cell_f64_fallback(&sensors, row, &["MaxPower", "PowerCap"]);
        let min_power = cell_f64_fallback(&sensors, row, &["MinPower"]);
        let avg_power = {
            let v = cell_f64_fallback(&sensors, row, &["AvgPower"]);
            if v != 0.0 { v } else { current_power }
        };
        let voltage = cell_f64_fallback(&sensors, row, &["Voltage"]);
        let current = cell_f64_fallback(&sensors, row, &["Current"]);

        total_power_mw += current_power;
        max_power_mw = max_power_mw.max(current_power);

        let utilization_pct = if max_power_cap > 0.0 { current_power / max_power_cap * 100.0 } else { 0.0 };
        let mut status = cell_str(&sensors, row, "Status");
        if status.is_empty() {
            status = cell_str(&sensors, row, "State");
        }
        if status.is_empty() {
            status = "OK".to_string();
        }

        let mut issues = Vec::new();
        let mut severity = "normal";
        if utilization_pct >= CRITICAL_UTILIZATION_PCT {
            issues.push(format!("Critical power utilization: {utilization_pct:.1}%"));
            severity = "critical";
            critical_count += 1;
        } else if utilization_pct >= WARNING_UTILIZATION_PCT {
            issues.push(format!("High power utilization: {utilization_pct:.1}%"));
            severity = "warning";
            warning_count += 1;
        }
        if !matches!(status.to_ascii_lowercase().as_str(), "ok" | "normal" | "good" | "") {
            issues.push(format!("Sensor status: {status}"));
            if severity == "normal" {
                severity = "warning";
            }
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        obj.insert("SensorIndex".into(), Value::from(sensor_index));
        obj.insert("SensorName".into(), Value::String(sensor_name));
        obj.insert("SensorType".into(), Value::String(sensor_type));
        obj.insert("CurrentPower".into(), Value::from((current_power * 100.0).round() / 100.0));
        obj.insert("MaxPowerCap".into(), Value::from((max_power_cap * 100.0).round() / 100.0));
        obj.insert("MinPower".into(), Value::from((min_power * 100.0).round() / 100.0));
        obj.insert("AvgPower".into(), Value::from((avg_power * 100.0).round() / 100.0));
        obj.insert("UtilizationPct".into(), Value::from((utilization_pct * 10.0).round() / 10.0));
        if voltage != 0.0 {
            obj.insert("Voltage".into(), Value::from((voltage * 1000.0).round() / 1000.0));
        }
        if current != 0.0 {
            obj.insert("Current".into(), Value::from((current * 1000.0).round() / 1000.0));
        }
        obj.insert("Status".into(), Value::String(status));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        let rank = match severity {
            "critical" => 0,
            "warning" => 1,
            _ => 2,
        };
        entries.push((rank, utilization_pct, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.partial_cmp(&a.1).unwrap()));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, obj)| obj).collect();

    let mut summary = Map::new();
    summary.insert("total_sensors".into(), Value::from(sensors.len()));
    summary.insert("unique_nodes".into(), Value::from(sensors_by_node.len()));
    summary.insert("warning_count".into(), Value::from(warning_count));
    summary.insert("critical_count".into(), Value::from(critical_count));
    summary.insert("total_power_mw".into(), Value::from((total_power_mw * 100.0).round() / 100.0));
    summary.insert("total_power_w".into(), Value::from((total_power_mw / 1000.0 * 100.0).round() / 100.0));
    summary.insert("max_sensor_power_mw".into(), Value::from((max_power_mw * 100.0).round() / 100.0));
    let avg_sensors_per_node = sensors.len() as f64 / sensors_by_node.len().max(1) as f64;
    summary.insert("avg_sensors_per_node".into(), Value::from((avg_sensors_per_node * 10.0).round() / 10.0));
    summary.insert(
        "sensor_type_distribution".into(),
        Value::Object(sensor_type_distribution.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
    );

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
