//! Family D — host adapter inventory and firmware/PSID compliance, ported
//! from `hca_service.py`.
//!
//! Reads `NODES_INFO`, derives a firmware version string and uptime from the
//! hex-encoded info fields, and evaluates each node against an optional
//! per-dataset `fw_matrix.json` compliance policy (spec.md §4.4 Family D).

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::analyzers::support::{annotate, row_guid, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::{Cell, DatasetInventory, Frame, Row};

#[derive(Debug, Deserialize)]
struct FwMatrixFile {
    #[serde(default)]
    policies: Vec<FwPolicyEntry>,
}

#[derive(Debug, Deserialize)]
struct FwPolicyEntry {
    device_type: Option<String>,
    #[serde(default)]
    allowed_psids: Vec<String>,
    #[serde(default)]
    min_fw: String,
    #[serde(default)]
    notes: String,
}

struct FwPolicy {
    allowed_psids: Vec<String>,
    min_fw: String,
    notes: String,
}

type FwMatrix = HashMap<String, FwPolicy>;

/// Loads `<dataset_root>/fw_matrix.json` if present; absent or malformed
/// yields an empty matrix, under which every node is treated as compliant
/// (spec.md §4.4 Family D "policy optional").
fn load_fw_matrix(inventory: &DatasetInventory) -> FwMatrix {
    let path = inventory.dataset_root().join("fw_matrix.json");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return FwMatrix::new();
    };
    let Ok(parsed) = serde_json::from_str::<FwMatrixFile>(&text) else {
        return FwMatrix::new();
    };
    let mut matrix = FwMatrix::new();
    for entry in parsed.policies {
        let device_type = entry.device_type.unwrap_or_default().trim().to_ascii_lowercase();
        let key = if device_type.is_empty() { "*".to_string() } else { device_type };
        matrix.insert(
            key,
            FwPolicy {
                allowed_psids: entry.allowed_psids.iter().map(|p| p.trim().to_ascii_uppercase()).collect(),
                min_fw: entry.min_fw,
                notes: entry.notes,
            },
        );
    }
    matrix
}

fn version_score(version: &str) -> i64 {
    let parts: Vec<&str> = version.split('.').collect();
    let major = parts.first().and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
    let minor = parts.get(1).and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
    let patch = parts.get(2).and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
    major * 1_000_000 + minor * 1_000 + patch
}

struct Compliance {
    psid_ok: bool,
    fw_ok: bool,
    recommended_fw: String,
    notes: String,
    fw_lag: f64,
}

fn evaluate_fw_policy(matrix: &FwMatrix, device_type: &str, psid: &str, fw: &str) -> Compliance {
    let policy = matrix.get(&device_type.trim().to_ascii_lowercase()).or_else(|| matrix.get("*"));
    let Some(policy) = policy else {
        return Compliance { psid_ok: true, fw_ok: true, recommended_fw: String::new(), notes: String::new(), fw_lag: 0.0 };
    };
    let psid_upper = psid.trim().to_ascii_uppercase();
    let psid_ok = policy.allowed_psids.is_empty() || policy.allowed_psids.contains(&psid_upper);

    let mut fw_ok = true;
    let mut fw_lag = 0.0;
    if !policy.min_fw.is_empty() {
        fw_ok = version_score(fw) >= version_score(&policy.min_fw);
        if !fw_ok {
            fw_lag = f64::max(0.1, (version_score(&policy.min_fw) - version_score(fw)) as f64);
        }
    }
    Compliance { psid_ok, fw_ok, recommended_fw: policy.min_fw.clone(), notes: policy.notes.clone(), fw_lag }
}

/// Parse a `0x`-optional hex string cell into an integer, `0` on failure.
fn hex_cell(frame: &Frame, row: &Row, name: &str) -> i64 {
    match frame.get(row, name) {
        Cell::Int64(v) => *v,
        Cell::Text(s) => {
            let trimmed = s.trim();
            let hex_part = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).unwrap_or(trimmed);
            i64::from_str_radix(hex_part, 16).unwrap_or(0)
        },
        _ => 0,
    }
}

/// `str(timedelta(seconds=n))`-equivalent rendering: `H:MM:SS`, prefixed with
/// `"N day(s), "` once `n` passes a full day.
fn format_uptime(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    let days = total_seconds / 86_400;
    let remainder = total_seconds % 86_400;
    let hours = remainder / 3600;
    let minutes = (remainder % 3600) / 60;
    let seconds = remainder % 60;
    if days > 0 {
        let label = if days == 1 { "day" } else { "days" };
        format!("{days} {label}, {hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours}:{minutes:02}:{seconds:02}")
    }
}

fn last_two_digits(cell: &Cell) -> String {
    let text = cell.to_string();
    let trimmed = text.trim();
    if trimmed.len() >= 2 {
        trimmed[trimmed.len() - 2..].to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let nodes = inventory.read_table("NODES_INFO");
    if nodes.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };
    let matrix = load_fw_matrix(inventory);

    let mut rows = Vec::with_capacity(nodes.len());
    let mut anomalies = AnomalyFrame::new();
    let mut psid_violations = 0usize;
    let mut outdated_fw = 0usize;

    for row in &nodes.rows {
        let guid = row_guid(&nodes, row);
        let device_type = nodes.get(row, "HWInfo_DeviceID").to_string();
        let device_type = if device_type.is_empty() { "NA".to_string() } else { device_type };

        let fw_date = format!(
            "{}/{}/{}",
            last_two_digits(nodes.get(row, "FWInfo_Year")),
            last_two_digits(nodes.get(row, "FWInfo_Month")),
            last_two_digits(nodes.get(row, "FWInfo_Day")),
        );
        let major = hex_cell(&nodes, row, "FWInfo_Extended_Major");
        let minor = hex_cell(&nodes, row, "FWInfo_Extended_Minor");
        let sub_minor = hex_cell(&nodes, row, "FWInfo_Extended_SubMinor");
        let fw = format!("{major}.{minor}.{sub_minor:04}");
        let uptime_seconds = hex_cell(&nodes, row, "HWInfo_UpTime");
        let up_time = format_uptime(uptime_seconds);
        let psid = nodes.get(row, "FWInfo_PSID").to_string();

        let compliance = evaluate_fw_policy(&matrix, &device_type, &psid, &fw);

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        annotate(&mut obj, topo, &guid, None);
        obj.insert("Device Type".into(), Value::String(device_type));
        obj.insert("FW".into(), Value::String(fw.clone()));
        obj.insert("FW Date".into(), Value::String(fw_date));
        obj.insert("FWInfo_PSID".into(), Value::String(psid));
        obj.insert("HWInfo_UpTime".into(), Value::String(up_time));
        obj.insert("PSID_Compliant".into(), Value::from(compliance.psid_ok));
        obj.insert("FW_Compliant".into(), Value::from(compliance.fw_ok));
        obj.insert("RecommendedFW".into(), Value::String(compliance.recommended_fw));
        obj.insert("PolicyNotes".into(), Value::String(compliance.notes));

        if !compliance.psid_ok {
            anomalies.push(&guid, None, AnomalyKind::PsidUnsupported, 1.0);
            psid_violations += 1;
        }
        if !compliance.fw_ok {
            anomalies.push(&guid, None, AnomalyKind::FwOutdated, f64::max(0.1, compliance.fw_lag));
            outdated_fw += 1;
        }

        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_hosts".into(), Value::from(rows.len()));
    summary.insert("psid_violations".into(), Value::from(psid_violations));
    summary.insert("outdated_fw".into(), Value::from(outdated_fw));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_scores_order_correctly() {
        assert!(version_score("20.31.1014") > version_score("20.30.9999"));
        assert_eq!(version_score("garbage"), 0);
    }

    #[test]
    fn uptime_formats_days_and_sub_day() {
        assert_eq!(format_uptime(3661), "1:01:01");
        assert_eq!(format_uptime(90_061), "1 day, 1:01:01");
    }

    #[test]
    fn policy_empty_matrix_is_always_compliant() {
        let matrix = FwMatrix::new();
        let result = evaluate_fw_policy(&matrix, "hca", "PSID1", "1.2.3");
        assert!(result.psid_ok);
        assert!(result.fw_ok);
    }
}
