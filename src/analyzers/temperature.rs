//! Family E — device temperature sensors, ported from `temperature_service.py`.
//!
//! Reads `TEMPERATURE_SENSORS` and classifies each sensor against its own
//! `HighThreshold` where present, falling back to fixed critical/warning
//! bands (spec.md §4.4 Family E).

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_f64_or_zero, row_guid, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::DatasetInventory;

const TEMP_CRITICAL_THRESHOLD: f64 = 95.0;
const TEMP_WARNING_THRESHOLD: f64 = 80.0;

fn classify(temperature: f64, high_threshold: f64) -> &'static str {
    if high_threshold > 0.0 && temperature >= high_threshold {
        "critical"
    } else if temperature >= TEMP_CRITICAL_THRESHOLD {
        "critical"
    } else if temperature >= TEMP_WARNING_THRESHOLD {
        "warning"
    } else {
        "normal"
    }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let sensors = inventory.read_table("TEMPERATURE_SENSORS");
    if sensors.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut rows = Vec::with_capacity(sensors.len());
    let mut anomalies = AnomalyFrame::new();
    let mut critical_count = 0usize;
    let mut warning_count = 0usize;
    let mut temps = Vec::new();

    for row in &sensors.rows {
        let guid = row_guid(&sensors, row);
        let sensor_index = sensors.get(row, "SensorIndex").as_i64_or_zero();
        let sensor_name = sensors.get(row, "SensorName").to_string();
        let sensor_name = if sensor_name.is_empty() { "unknown".to_string() } else { sensor_name };
        let temperature = cell_f64_or_zero(&sensors, row, "Temperature");
        let max_temperature = cell_f64_or_zero(&sensors, row, "MaxTemperature");
        let low_threshold = cell_f64_or_zero(&sensors, row, "LowThreshold");
        let high_threshold = cell_f64_or_zero(&sensors, row, "HighThreshold");

        let severity = classify(temperature, high_threshold);
        let utilization_pct = if high_threshold > 0.0 { (temperature / high_threshold * 100.0 * 10.0).round() / 10.0 } else { 0.0 };

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        obj.insert("SensorIndex".into(), Value::from(sensor_index));
        obj.insert("SensorName".into(), Value::String(sensor_name));
        obj.insert("Temperature".into(), Value::from(temperature));
        obj.insert("MaxTemperature".into(), Value::from(max_temperature));
        obj.insert("LowThreshold".into(), Value::from(low_threshold));
        obj.insert("HighThreshold".into(), Value::from(high_threshold));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("UtilizationPct".into(), Value::from(utilization_pct));

        let port = u32::try_from(sensor_index).ok();
        match severity {
            "critical" => {
                anomalies.push(&guid, port, AnomalyKind::TempCritical, 1.0);
                critical_count += 1;
            },
            "warning" => {
                anomalies.push(&guid, port, AnomalyKind::TempWarning, 0.5);
                warning_count += 1;
            },
            _ => {},
        }
        if temperature > 0.0 {
            temps.push(temperature);
        }

        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_sensors".into(), Value::from(rows.len()));
    summary.insert("sensors_with_data".into(), Value::from(temps.len()));
    summary.insert("critical_count".into(), Value::from(critical_count));
    summary.insert("warning_count".into(), Value::from(warning_count));
    summary.insert(
        "avg_temperature".into(),
        Value::from(if temps.is_empty() { 0.0 } else { temps.iter().sum::<f64>() / temps.len() as f64 }),
    );
    summary.insert("max_temperature".into(), Value::from(temps.iter().cloned().fold(0.0_f64, f64::max)));
    summary.insert(
        "min_temperature".into(),
        Value::from(if temps.is_empty() { 0.0 } else { temps.iter().cloned().fold(f64::INFINITY, f64::min) }),
    );

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_threshold_overrides_fixed_bands() {
        assert_eq!(classify(60.0, 50.0), "critical");
    }

    #[test]
    fn fixed_bands_apply_without_threshold() {
        assert_eq!(classify(96.0, 0.0), "critical");
        assert_eq!(classify(85.0, 0.0), "warning");
        assert_eq!(classify(40.0, 0.0), "normal");
    }
}
