//! Family E — power supply health, ported from `power_service.py`.
//!
//! Reads `POWER_SUPPLIES`, derives a per-unit severity from presence/DC/
//! alert/fan/temperature state strings, and emits `PsuCritical`/`PsuWarning`
//! anomalies (spec.md §4.4 Family E).

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_f64_or_zero, row_guid, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::DatasetInventory;

fn state_is_ok(state: &str) -> bool {
    let lower = state.trim().to_ascii_lowercase();
    lower.is_empty() || lower == "ok"
}

fn state_is_ok_or_unknown(state: &str) -> bool {
    let lower = state.trim().to_ascii_lowercase();
    lower.is_empty() || lower == "ok" || lower == "nan"
}

struct Severity {
    label: &'static str,
    issues: Vec<String>,
}

fn evaluate_severity(is_present: bool, dc_state: &str, alert_state: &str, fan_state: &str, temp_state: &str) -> Severity {
    let mut label = "normal";
    let mut issues = Vec::new();

    if !is_present {
        label = "warning";
        issues.push("PSU not present".to_string());
    } else {
        if !state_is_ok(dc_state) {
            label = "critical";
            issues.push(format!("DC state: {dc_state}"));
        }
        if !state_is_ok_or_unknown(alert_state) {
            label = "critical";
            issues.push(format!("Alert: {alert_state}"));
        }
        if !state_is_ok(fan_state) {
            if label != "critical" {
                label = "warning";
            }
            issues.push(format!("Fan: {fan_state}"));
        }
        if !state_is_ok_or_unknown(temp_state) {
            if label != "critical" {
                label = "warning";
            }
            issues.push(format!("Temp: {temp_state}"));
        }
    }
    Severity { label, issues }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let psus = inventory.read_table("POWER_SUPPLIES");
    if psus.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut rows = Vec::with_capacity(psus.len());
    let mut anomalies = AnomalyFrame::new();
    let mut critical_count = 0usize;
    let mut warning_count = 0usize;
    let mut present_count = 0usize;
    let mut power_values = Vec::new();

    for row in &psus.rows {
        let guid = row_guid(&psus, row);
        let psu_index = psus.get(row, "PSUIndex").as_i64_or_zero();
        let is_present = psus.get(row, "IsPresent").to_string().eq_ignore_ascii_case("yes");
        let dc_state = psus.get(row, "DCState").to_string();
        let alert_state = psus.get(row, "AlertState").to_string();
        let fan_state = psus.get(row, "FanState").to_string();
        let temp_state = psus.get(row, "TemperatureState").to_string();
        let power_consumption = cell_f64_or_zero(&psus, row, "PowerConsumption");
        let power_cap = cell_f64_or_zero(&psus, row, "PowerCap");
        let serial = psus.get(row, "SerialNumber").to_string();

        let severity = evaluate_severity(is_present, &dc_state, &alert_state, &fan_state, &temp_state);

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        obj.insert("PSUIndex".into(), Value::from(psu_index));
        obj.insert("IsPresent".into(), Value::from(is_present));
        obj.insert("DCState".into(), Value::String(dc_state));
        obj.insert("AlertState".into(), Value::String(alert_state));
        obj.insert("FanState".into(), Value::String(fan_state));
        obj.insert("TemperatureState".into(), Value::String(temp_state));
        obj.insert("PowerConsumption".into(), Value::from(power_consumption));
        obj.insert("PowerCap".into(), Value::from(power_cap));
        obj.insert("SerialNumber".into(), Value::String(if serial == "nan" { String::new() } else { serial }));
        obj.insert("Severity".into(), Value::String(severity.label.to_string()));
        obj.insert("Issues".into(), Value::String(severity.issues.join("; ")));

        let port = u32::try_from(psu_index).ok();
        match severity.label {
            "critical" => {
                anomalies.push(&guid, port, AnomalyKind::PsuCritical, 1.0);
                critical_count += 1;
            },
            "warning" => {
                anomalies.push(&guid, port, AnomalyKind::PsuWarning, 0.5);
                warning_count += 1;
            },
            _ => {},
        }
        if is_present {
            present_count += 1;
        }
        if power_consumption > 0.0 {
            power_values.push(power_consumption);
        }

        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_psus".into(), Value::from(rows.len()));
    summary.insert("present_count".into(), Value::from(present_count));
    summary.insert("not_present_count".into(), Value::from(rows.len() - present_count));
    summary.insert("critical_count".into(), Value::from(critical_count));
    summary.insert("warning_count".into(), Value::from(warning_count));
    summary.insert("total_power_consumption".into(), Value::from(power_values.iter().sum::<f64>()));
    summary.insert(
        "avg_power_consumption".into(),
        Value::from(if power_values.is_empty() { 0.0 } else { power_values.iter().sum::<f64>() / power_values.len() as f64 }),
    );

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_psu_is_warning() {
        let sev = evaluate_severity(false, "", "", "", "");
        assert_eq!(sev.label, "warning");
        assert_eq!(sev.issues, vec!["PSU not present".to_string()]);
    }

    #[test]
    fn dc_fault_is_critical() {
        let sev = evaluate_severity(true, "Fault", "", "", "");
        assert_eq!(sev.label, "critical");
    }

    #[test]
    fn fan_issue_alone_is_warning() {
        let sev = evaluate_severity(true, "OK", "", "Degraded", "OK");
        assert_eq!(sev.label, "warning");
    }

    #[test]
    fn all_ok_is_normal() {
        let sev = evaluate_severity(true, "OK", "", "OK", "OK");
        assert_eq!(sev.label, "normal");
        assert!(sev.issues.is_empty());
    }
}
