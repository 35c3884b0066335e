//! Family I — lane-level PCIe/physical diagnostics, ported from
//! `per_lane_performance_service.py`. `P_DB4` (per-lane equalizer taps and
//! eye-diagram metrics) is the primary source, grouped by port and reduced
//! to a worst-lane summary per port; when `P_DB4` is empty but `PHY_DB4`
//! carries signal-detect/CDR-lock data, that table is used instead.
//! `P_DB5` is read only to report its row count. Lane-level analysis is 8x
//! more granular than port-level and can isolate a single bad lane in a
//! wide link.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_f64_or_zero, cell_guid, cell_i64_or_zero, cell_port, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{DatasetInventory, Frame, Row};

const TAP_COLUMNS: &[&str] = &[
    "PreCursor", "MainCursor", "PostCursor",
    "PreCursor1", "PreCursor2", "PreCursor3",
    "PostCursor1", "PostCursor2", "PostCursor3",
    "DFE_Tap1", "DFE_Tap2", "DFE_Tap3", "DFE_Tap4",
    "DFE_Tap5", "DFE_Tap6", "DFE_Tap7", "DFE_Tap8",
    "CTLE_Gain", "CTLE_Pole", "CTLE_Zero",
    "VGA_Gain", "AGC_Gain",
];

fn cell_bool(frame: &Frame, row: &Row, name: &str) -> bool {
    let cell = frame.get(row, name);
    match cell.as_i64() {
        Some(v) => v != 0,
        None => matches!(
            cell.as_str().trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "locked" | "detected"
        ),
    }
}

#[derive(Clone)]
struct LaneData {
    lane_num: i64,
    eye_height: f64,
    lane_errors: i64,
    bit_errors: i64,
    symbol_errors: i64,
    snr_db: f64,
    eq_done: bool,
    eq_issues: Vec<String>,
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let p_db4 = inventory.read_table("P_DB4");
    let p_db5 = inventory.read_table("P_DB5");
    let phy_db4 = inventory.read_table("PHY_DB4");
    if p_db4.is_empty() && p_db5.is_empty() && phy_db4.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut total_lanes = 0usize;
    let mut lanes_with_issues = 0usize;
    let mut lanes_with_eq_issues = 0usize;
    let mut ports_analyzed: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut lane_error_distribution: HashMap<i64, usize> = HashMap::new();
    let mut eq_tap_warnings: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<(i64, i64, i64, Map<String, Value>)> = Vec::new();

    if !p_db4.is_empty() {
        let mut port_lane_data: HashMap<String, Vec<LaneData>> = HashMap::new();

        for row in &p_db4.rows {
            let guid = cell_guid(&p_db4, row, &["NodeGuid", "GUID"]);
            let port_num = cell_port(&p_db4, row, &["PortNum", "PortNumber"]).unwrap_or(0);
            let lane_num = cell_i64_or_zero(&p_db4, row, "LaneNum").max(cell_i64_or_zero(&p_db4, row, "Lane"));
            let port_key = format!("{guid}:{port_num}");
            ports_analyzed.insert(port_key.clone());
            total_lanes += 1;

            let mut eq_issues = Vec::new();
            for col in TAP_COLUMNS {
                if p_db4.has_column(col) {
                    let val = cell_f64_or_zero(&p_db4, row, col);
                    if val.abs() > 100.0 {
                        eq_issues.push(format!("{col}={val}"));
                        *eq_tap_warnings.entry((*col).to_string()).or_insert(0) += 1;
                    }
                }
            }
            if !eq_issues.is_empty() {
                lanes_with_eq_issues += 1;
            }

            let mut eye_height = cell_f64_or_zero(&p_db4, row, "EyeHeight");
            if eye_height == 0.0 {
                eye_height = cell_f64_or_zero(&p_db4, row, "EyeHeightMV");
            }
            let lane_errors = {
                let v = cell_i64_or_zero(&p_db4, row, "Errors");
                if v != 0 { v } else { cell_i64_or_zero(&p_db4, row, "LaneErrors") }
            };
            let bit_errors = cell_i64_or_zero(&p_db4, row, "BitErrors");
            let symbol_errors = cell_i64_or_zero(&p_db4, row, "SymbolErrors");
            if lane_errors > 0 || bit_errors > 0 || symbol_errors > 0 {
                *lane_error_distribution.entry(lane_num).or_insert(0) += 1;
                lanes_with_issues += 1;
            }

            let mut snr_db = cell_f64_or_zero(&p_db4, row, "SNR_dB");
            if snr_db == 0.0 {
                snr_db = cell_f64_or_zero(&p_db4, row, "SNR");
            }

            let eq_done = {
                if p_db4.has_column("EQDone") {
                    cell_bool(&p_db4, row, "EQDone")
                } else {
                    cell_bool(&p_db4, row, "EqualizationDone")
                }
            };

            port_lane_data.entry(port_key).or_default().push(LaneData {
                lane_num,
                eye_height,
                eye_width,
                lane_errors,
                bit_errors,
                symbol_errors,
                snr_db,
                eq_done,
                eq_issues,
            });
        }

        for (port_key, lanes) in &port_lane_data {
            let mut parts = port_key.splitn(2, ':');
            let guid = parts.next().unwrap_or("").to_string();
            let port_num: i64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
            let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();
            let num_lanes = lanes.len();

            let worst_lane = lanes.iter().max_by_key(|l| l.lane_errors + l.bit_errors).unwrap();
            let avg_eye_height = lanes.iter().map(|l| l.eye_height).sum::<f64>() / num_lanes.max(1) as f64;
            let min_eye_height = lanes.iter().map(|l| l.eye_height).fold(f64::INFINITY, f64::min);
            let avg_snr = lanes.iter().map(|l| l.snr_db).sum::<f64>() / num_lanes.max(1) as f64;
            let min_snr = lanes.iter().map(|l| l.snr_db).fold(f64::INFINITY, f64::min);

            let total_lane_errors: i64 = lanes.iter().map(|l| l.lane_errors).sum();
            let total_bit_errors: i64 = lanes.iter().map(|l| l.bit_errors).sum();
            let total_symbol_errors: i64 = lanes.iter().map(|l| l.symbol_errors).sum();

            let bad_lanes: Vec<&LaneData> = lanes.iter().filter(|l| l.lane_errors > 0 || !l.eq_issues.is_empty()).collect();
            let eq_issues_lanes: Vec<&LaneData> = lanes.iter().filter(|l| !l.eq_issues.is_empty()).collect();

            let mut issues = Vec::new();
            let mut severity = "normal";
            if total_bit_errors > 0 {
                issues.push(format!("Bit errors: {total_bit_errors} across {} lanes", bad_lanes.len()));
                severity = "critical";
            } else if total_lane_errors > 0 {
                issues.push(format!("Lane errors: {total_lane_errors}"));
                severity = "warning";
            } else if !eq_issues_lanes.is_empty() {
                issues.push(format!("Equalizer issues on {} lanes", eq_issues_lanes.len()));
                severity = "warning";
            } else if min_eye_height.is_finite() && min_eye_height > 0.0 && min_eye_height < 20.0 {
                issues.push(format!("Low min eye height: {min_eye_height}mV (Lane {})", worst_lane.lane_num));
                severity = "warning";
            } else if min_snr.is_finite() && min_snr > 0.0 && min_snr < 12.0 {
                issues.push(format!("Low min SNR: {min_snr:.1}dB"));
                severity = "info";
            }

            let mut obj = Map::new();
            obj.insert("NodeGUID".into(), Value::String(guid.clone()));
            obj.insert("NodeName".into(), Value::String(node_name));
            obj.insert("PortNumber".into(), Value::from(port_num));
            obj.insert("NumLanes".into(), Value::from(num_lanes));
            obj.insert("TotalLaneErrors".into(), Value::from(total_lane_errors));
            obj.insert("TotalBitErrors".into(), Value::from(total_bit_errors));
            obj.insert("TotalSymbolErrors".into(), Value::from(total_symbol_errors));
            obj.insert("LanesWithIssues".into(), Value::from(bad_lanes.len()));
            obj.insert("LanesWithEQIssues".into(), Value::from(eq_issues_lanes.len()));
            obj.insert("AvgEyeHeightMV".into(), Value::from((avg_eye_height * 10.0).round() / 10.0));
            obj.insert("MinEyeHeightMV".into(), Value::from(if min_eye_height.is_finite() { (min_eye_height * 10.0).round() / 10.0 } else { 0.0 }));
            obj.insert("AvgSNR_dB".into(), Value::from((avg_snr * 100.0).round() / 100.0));
            obj.insert("MinSNR_dB".into(), Value::from(if min_snr.is_finite() { (min_snr * 100.0).round() / 100.0 } else { 0.0 }));
            obj.insert("WorstLane".into(), Value::from(worst_lane.lane_num));
            obj.insert("WorstLaneErrors".into(), Value::from(worst_lane.lane_errors));
            obj.insert("AllLanesEQDone".into(), Value::from(lanes.iter().all(|l| l.eq_done)));
            obj.insert("Severity".into(), Value::String(severity.to_string()));
            obj.insert("Issues".into(), Value::String(issues.join("; ")));

            let mut sorted_lanes: Vec<&LaneData> = lanes.iter().collect();
            sorted_lanes.sort_by_key(|l| -(l.lane_errors + l.bit_errors));
            for (i, lane) in sorted_lanes.iter().take(3).enumerate() {
                obj.insert(format!("Lane{i}_Num"), Value::from(lane.lane_num));
                obj.insert(format!("Lane{i}_Errors"), Value::from(lane.lane_errors));
                obj.insert(format!("Lane{i}_EyeH"), Value::from((lane.eye_height * 10.0).round() / 10.0));
                obj.insert(format!("Lane{i}_SNR"), Value::from((lane.snr_db * 100.0).round() / 100.0));
            }
            let rank = match severity { "critical" => 0, "warning" => 1, _ => 2 };
            entries.push((rank, -total_lane_errors, -(bad_lanes.len() as i64), obj));
        }
    } else if !phy_db4.is_empty() {
        let mut port_lane_data: HashMap<String, Vec<(i64, bool, bool)>> = HashMap::new();

        for row in &phy_db4.rows {
            let guid = cell_guid(&phy_db4, row, &["NodeGuid", "GUID"]);
            let port_num = cell_port(&phy_db4, row, &["PortNum", "PortNumber"]).unwrap_or(0);
            let lane_num = cell_i64_or_zero(&phy_db4, row, "LaneNum").max(cell_i64_or_zero(&phy_db4, row, "Lane"));
            let port_key = format!("{guid}:{port_num}");
            ports_analyzed.insert(port_key.clone());
            total_lanes += 1;

            let signal_detect = if phy_db4.has_column("SignalDetect") { cell_bool(&phy_db4, row, "SignalDetect") } else { true };
            let cdr_lock = if phy_db4.has_column("CDRLock") { cell_bool(&phy_db4, row, "CDRLock") } else { true };
            if !signal_detect || !cdr_lock {
                lanes_with_issues += 1;
                *lane_error_distribution.entry(lane_num).or_insert(0) += 1;
            }
            let _ = cell_str(&phy_db4, row, "Status");

            port_lane_data.entry(port_key).or_default().push((lane_num, signal_detect, cdr_lock));
        }

        for (port_key, lanes) in &port_lane_data {
            let mut parts = port_key.splitn(2, ':');
            let guid = parts.next().unwrap_or("").to_string();
            let port_num: i64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
            let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();
            let num_lanes = lanes.len();

            let no_signal = lanes.iter().filter(|(_, sig, _)| !sig).count();
            let no_cdr = lanes.iter().filter(|(_, _, cdr)| !cdr).count();

            let mut issues = Vec::new();
            let mut severity = "normal";
            if no_signal > 0 {
                issues.push(format!("No signal on {no_signal} lanes"));
                severity = "critical";
            } else if no_cdr > 0 {
                issues.push(format!("CDR not locked on {no_cdr} lanes"));
                severity = "warning";
            }

            let mut obj = Map::new();
            obj.insert("NodeGUID".into(), Value::String(guid));
            obj.insert("NodeName".into(), Value::String(node_name));
            obj.insert("PortNumber".into(), Value::from(port_num));
            obj.insert("NumLanes".into(), Value::from(num_lanes));
            obj.insert("LanesNoSignal".into(), Value::from(no_signal));
            obj.insert("LanesNoCDR".into(), Value::from(no_cdr));
            obj.insert("Severity".into(), Value::String(severity.to_string()));
            obj.insert("Issues".into(), Value::String(issues.join("; ")));

            let rank = match severity { "critical" => 0, "warning" => 1, _ => 2 };
            entries.push((rank, 0, 0, obj));
        }
    }

    let critical_ports = entries.iter().filter(|(r, _, _, _)| *r == 0).count();
    let warning_ports = entries.iter().filter(|(r, _, _, _)| *r == 1).count();
    let ports_with_issue = entries.iter().filter(|(_, _, _, o)| o.get("LanesWithIssues").and_then(|v| v.as_i64()).unwrap_or(0) > 0).count();
    let ports_with_eq_issue = entries.iter().filter(|(_, _, _, o)| o.get("LanesWithEQIssues").and_then(|v| v.as_i64()).unwrap_or(0) > 0).count();

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, _, obj)| obj).collect();

    let mut lane_dist_sorted: Vec<(i64, usize)> = lane_error_distribution.into_iter().collect();
    lane_dist_sorted.sort_by_key(|(k, _)| *k);
    let mut eq_warnings_sorted: Vec<(String, usize)> = eq_tap_warnings.into_iter().collect();
    eq_warnings_sorted.sort_by(|a, b| b.1.cmp(&a.1));
    eq_warnings_sorted.truncate(10);

    let mut summary = Map::new();
    summary.insert("total_lanes_analyzed".into(), Value::from(total_lanes));
    summary.insert("total_ports_analyzed".into(), Value::from(ports_analyzed.len()));
    summary.insert("lanes_with_issues".into(), Value::from(lanes_with_issues));
    summary.insert("lanes_with_eq_issues".into(), Value::from(lanes_with_eq_issues));
    summary.insert("issue_rate_pct".into(), Value::from((lanes_with_issues as f64 / total_lanes.max(1) as f64 * 10000.0).round() / 100.0));
    summary.insert(
        "lane_error_distribution".into(),
        Value::Object(lane_dist_sorted.into_iter().map(|(k, v)| (k.to_string(), Value::from(v))).collect()),
    );
    summary.insert(
        "eq_tap_warnings".into(),
        Value::Object(eq_warnings_sorted.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
    );
    summary.insert("p_db4_rows".into(), Value::from(p_db4.len()));
    summary.insert("p_db5_rows".into(), Value::from(p_db5.len()));
    summary.insert("phy_db4_rows".into(), Value::from(phy_db4.len()));
    summary.insert("critical_ports".into(), Value::from(critical_ports));
    summary.insert("warning_ports".into(), Value::from(warning_ports));
    summary.insert("ports_with_lane_issues".into(), Value::from(ports_with_issue));
    summary.insert("ports_with_eq_issues".into(), Value::from(ports_with_eq_issue));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
