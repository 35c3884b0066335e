//! Family E — chassis fan health, ported from `fan_service.py`.
//!
//! Joins `FANS_SPEED` with `FANS_THRESHOLDS` (per sensor) and `FANS_ALERT`
//! (per node) and flags sensors running outside their speed band (spec.md
//! §4.4 Family E).
//!
//! `fan_service.py`'s display path drops every row whose `FanAlert` is zero.
//! As with the cable analyzer, that filtering isn't carried over here: the
//! full sensor set is this analyzer's `rows`, and picking out the issue rows
//! is the orchestrator's job (spec.md §4.7 step 8), not each analyzer's.

use serde_json::{Map, Value};

use crate::analyzers::support::{annotate, cell_f64_or_zero, cell_opt_f64, row_guid, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::{normalize_guid, DatasetInventory, Frame, Row};

fn evaluate_fan(speed: Option<f64>, min_speed: Option<f64>, max_speed: Option<f64>) -> f64 {
    let (Some(speed), Some(min_speed)) = (speed, min_speed) else {
        return 0.0;
    };
    if speed < min_speed {
        return min_speed - speed;
    }
    if let Some(max_speed) = max_speed {
        if speed > max_speed {
            return speed - max_speed;
        }
    }
    0.0
}

fn find_by_guid_and_index<'a>(frame: &'a Frame, guid: &str, sensor_index: i64) -> Option<&'a Row> {
    frame.rows.iter().find(|row| {
        normalize_guid(&frame.get(row, "NodeGuid").to_string()) == guid
            && frame.get(row, "SensorIndex").as_i64_or_zero() == sensor_index
    })
}

fn find_alert_by_guid<'a>(alerts: &'a Frame, guid: &str) -> Option<&'a Row> {
    alerts.rows.iter().find(|row| normalize_guid(&alerts.get(row, "NodeGuid").to_string()) == guid)
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let speeds = inventory.read_table("FANS_SPEED");
    if speeds.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };
    let thresholds = inventory.read_table("FANS_THRESHOLDS");
    let alerts = inventory.read_table("FANS_ALERT");

    let mut rows = Vec::with_capacity(speeds.len());
    let mut anomalies = AnomalyFrame::new();
    let mut alerting = 0usize;

    for row in &speeds.rows {
        let guid = normalize_guid(&speeds.get(row, "NodeGuid").to_string());
        let sensor_index = speeds.get(row, "SensorIndex").as_i64_or_zero();
        let port = sensor_index.max(0) as u32;
        let fan_speed = cell_opt_f64(&speeds, row, "FanSpeed");

        let thr = find_by_guid_and_index(&thresholds, &guid, sensor_index);
        let min_speed = thr.and_then(|r| cell_opt_f64(&thresholds, r, "MinSpeed"));
        let max_speed = thr.and_then(|r| cell_opt_f64(&thresholds, r, "MaxSpeed"));

        let alert_row = find_alert_by_guid(&alerts, &guid);
        let fans_under_limit = alert_row.map(|r| cell_f64_or_zero(&alerts, r, "FansUnderLimit"));
        let fans_over_limit = alert_row.map(|r| cell_f64_or_zero(&alerts, r, "FansOverLimit"));

        let fan_alert = evaluate_fan(fan_speed, min_speed, max_speed);

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("SensorIndex".into(), Value::from(sensor_index));
        obj.insert("PortNumber".into(), Value::from(port));
        annotate(&mut obj, topo, &guid, Some(port));
        obj.insert("FanSpeed".into(), fan_speed.map(Value::from).unwrap_or(Value::Null));
        obj.insert("MinSpeed".into(), min_speed.map(Value::from).unwrap_or(Value::Null));
        obj.insert("MaxSpeed".into(), max_speed.map(Value::from).unwrap_or(Value::Null));
        obj.insert("FanAlert".into(), Value::from(fan_alert));
        obj.insert("FanStatus".into(), Value::String(if fan_alert > 0.0 { "Alert" } else { "OK" }.to_string()));
        if let Some(v) = fans_under_limit {
            obj.insert("FansUnderLimit".into(), Value::from(v));
        }
        if let Some(v) = fans_over_limit {
            obj.insert("FansOverLimit".into(), Value::from(v));
        }

        if fan_alert > 0.0 {
            anomalies.push(&guid, Some(port), AnomalyKind::FanFailure, f64::max(0.1, fan_alert));
            alerting += 1;
        }

        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_sensors".into(), Value::from(rows.len()));
    summary.insert("alerting_sensors".into(), Value::from(alerting));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_speed_reports_deficit() {
        assert_eq!(evaluate_fan(Some(1000.0), Some(1500.0), Some(5000.0)), 500.0);
    }

    #[test]
    fn over_speed_reports_excess() {
        assert_eq!(evaluate_fan(Some(6000.0), Some(1500.0), Some(5000.0)), 1000.0);
    }

    #[test]
    fn within_band_is_zero() {
        assert_eq!(evaluate_fan(Some(2000.0), Some(1500.0), Some(5000.0)), 0.0);
    }

    #[test]
    fn missing_speed_or_min_is_zero() {
        assert_eq!(evaluate_fan(None, Some(1500.0), Some(5000.0)), 0.0);
        assert_eq!(evaluate_fan(Some(2000.0), None, Some(5000.0)), 0.0);
    }
}
