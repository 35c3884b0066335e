//! Family I — PCIe link health, ported from `pci_performance_service.py`.
//! `P_DB1` (primary, link caps/status) joins `P_DB2` (extended capabilities)
//! and `P_DB8` (AER counters) keyed by `guid:port`; `WARNINGS_PCI_DEGRADATION_CHECK`
//! supplies an additional degraded-link flag. Unlike most Family I analyzers
//! this one DOES emit anomalies — PCIe degradation bottlenecks HCA throughput.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_guid, cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::{DatasetInventory, Frame, Row};

fn pcie_gen_speed(gen: i64) -> f64 {
    match gen {
        1 => 2.5,
        2 => 5.0,
        3 => 8.0,
        4 => 16.0,
        5 => 32.0,
        6 => 64.0,
        _ => 0.0,
    }
}

fn cell_i64_fallback(frame: &Frame, row: &Row, primary: &str, secondary: &str) -> i64 {
    if frame.has_column(primary) {
        cell_i64_or_zero(frame, row, primary)
    } else {
        cell_i64_or_zero(frame, row, secondary)
    }
}

#[derive(Default, Clone)]
struct ExtInfo {
    max_link_speed: i64,
    max_link_width: i64,
    aspm_support: String,
}

#[derive(Default, Clone)]
struct AerInfo {
    correctable_errors: i64,
    uncorrectable_errors: i64,
    fatal_errors: i64,
    receiver_errors: i64,
    bad_tlp: i64,
    bad_dllp: i64,
    replay_num_rollover: i64,
    replay_timer_timeout: i64,
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let p_db1 = inventory.read_table("P_DB1");
    let p_db2 = inventory.read_table("P_DB2");
    let p_db8 = inventory.read_table("P_DB8");
    let pci_warnings = inventory.read_table("WARNINGS_PCI_DEGRADATION_CHECK");
    if p_db1.is_empty() && p_db2.is_empty() && p_db8.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut p_db2_lookup: HashMap<String, ExtInfo> = HashMap::new();
    for row in &p_db2.rows {
        let guid = cell_guid(&p_db2, row, &["NodeGuid", "GUID"]);
        let port = cell_i64_fallback(&p_db2, row, "PortNum", "PortNumber");
        p_db2_lookup.insert(
            format!("{guid}:{port}"),
            ExtInfo {
                max_link_speed: cell_i64_or_zero(&p_db2, row, "MaxLinkSpeed"),
                max_link_width: cell_i64_or_zero(&p_db2, row, "MaxLinkWidth"),
                aspm_support: cell_str(&p_db2, row, "ASPMSupport"),
            },
        );
    }

    let mut p_db8_lookup: HashMap<String, AerInfo> = HashMap::new();
    for row in &p_db8.rows {
        let guid = cell_guid(&p_db8, row, &["NodeGuid", "GUID"]);
        let port = cell_i64_fallback(&p_db8, row, "PortNum", "PortNumber");
        p_db8_lookup.insert(
            format!("{guid}:{port}"),
            AerInfo {
                correctable_errors: cell_i64_fallback(&p_db8, row, "CorrectableErrors", "CorrErrors"),
                uncorrectable_errors: cell_i64_fallback(&p_db8, row, "UncorrectableErrors", "UncorrErrors"),
                fatal_errors: cell_i64_or_zero(&p_db8, row, "FatalErrors"),
                receiver_errors: cell_i64_fallback(&p_db8, row, "ReceiverErrors", "RxErrors"),
                bad_tlp: cell_i64_or_zero(&p_db8, row, "BadTLP"),
                bad_dllp: cell_i64_or_zero(&p_db8, row, "BadDLLP"),
                replay_num_rollover: cell_i64_or_zero(&p_db8, row, "ReplayNumRollover"),
                replay_timer_timeout: cell_i64_or_zero(&p_db8, row, "ReplayTimerTimeout"),
            },
        );
    }

    let mut degraded_keys: HashSet<String> = HashSet::new();
    for row in &pci_warnings.rows {
        let guid = cell_guid(&pci_warnings, row, &["NodeGUID", "GUID"]);
        let port = cell_i64_or_zero(&pci_warnings, row, "PortNumber");
        degraded_keys.insert(format!("{guid}:{port}"));
    }

    let mut entries = Vec::with_capacity(p_db1.len());
    let mut anomalies = AnomalyFrame::new();
    let mut gen_distribution: HashMap<i64, usize> = HashMap::new();
    let mut width_distribution: HashMap<i64, usize> = HashMap::new();
    let mut degraded_count = 0usize;
    let mut aer_error_count = 0usize;
    let mut total_nodes = 0usize;
    let mut max_gen = 0i64;
    let mut total_bandwidth_gbps = 0.0;

    for row in &p_db1.rows {
        let guid = cell_guid(&p_db1, row, &["NodeGuid", "GUID"]);
        let port_num = cell_i64_fallback(&p_db1, row, "PortNum", "PortNumber");
        let key = format!("{guid}:{port_num}");
        let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();
        total_nodes += 1;

        let link_cap_speed = cell_i64_fallback(&p_db1, row, "LinkCapSpeed", "MaxSpeed");
        let link_cap_width = cell_i64_fallback(&p_db1, row, "LinkCapWidth", "MaxWidth");
        let link_sta_speed = cell_i64_fallback(&p_db1, row, "LinkStaSpeed", "CurrentSpeed");
        let link_sta_width = cell_i64_fallback(&p_db1, row, "LinkStaWidth", "CurrentWidth");

        *gen_distribution.entry(link_sta_speed).or_insert(0) += 1;
        *width_distribution.entry(link_sta_width).or_insert(0) += 1;
        max_gen = max_gen.max(link_sta_speed);

        let speed_gtps = pcie_gen_speed(link_sta_speed);
        let lanes = if link_sta_width > 0 { link_sta_width } else { 1 } as f64;
        let encoding_eff = if link_sta_speed >= 3 { 0.9846 } else { 0.8 };
        let bandwidth_gbps = speed_gtps * lanes * encoding_eff;
        total_bandwidth_gbps += bandwidth_gbps;

        let is_speed_degraded = link_cap_speed > 0 && link_sta_speed < link_cap_speed;
        let is_width_degraded = link_cap_width > 0 && link_sta_width < link_cap_width;
        let is_degraded = is_speed_degraded || is_width_degraded || degraded_keys.contains(&key);
        if is_degraded {
            degraded_count += 1;
        }

        let ext_info = p_db2_lookup.get(&key).cloned().unwrap_or_default();
        let aer_info = p_db8_lookup.get(&key).cloned().unwrap_or_default();
        let total_aer_errors = aer_info.correctable_errors + aer_info.uncorrectable_errors + aer_info.fatal_errors;
        if total_aer_errors > 0 {
            aer_error_count += 1;
        }

        let device_id = cell_str(&p_db1, row, "DeviceID");
        let vendor_id = cell_str(&p_db1, row, "VendorID");

        let mut issues = Vec::new();
        let mut severity = "normal";
        if aer_info.fatal_errors > 0 {
            issues.push(format!("Fatal PCIe errors: {}", aer_info.fatal_errors));
            severity = "critical";
        } else if aer_info.uncorrectable_errors > 0 {
            issues.push(format!("Uncorrectable errors: {}", aer_info.uncorrectable_errors));
            severity = "critical";
        } else if is_speed_degraded {
            issues.push(format!("Speed degraded: Gen{link_sta_speed} < Gen{link_cap_speed}"));
            severity = "critical";
        } else if is_width_degraded {
            issues.push(format!("Width degraded: x{link_sta_width} < x{link_cap_width}"));
            severity = "warning";
        } else if aer_info.correctable_errors > 100 {
            issues.push(format!("High correctable errors: {}", aer_info.correctable_errors));
            severity = "warning";
        } else if aer_info.replay_timer_timeout > 0 {
            issues.push(format!("Replay timeouts: {}", aer_info.replay_timer_timeout));
            severity = "warning";
        }

        if matches!(severity, "critical" | "warning") {
            let port = if port_num > 0 { Some(port_num as u32) } else { None };
            anomalies.push(&guid, port, AnomalyKind::PciDegradation, if is_degraded { 1.0 } else { 0.0 });
            if total_aer_errors > 0 {
                anomalies.push(&guid, port, AnomalyKind::PciAerError, (total_aer_errors as f64 / 100.0).min(1.0));
            }
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(node_name.clone()));
        obj.insert("PortNumber".into(), Value::from(port_num));
        obj.insert("LinkCapSpeed".into(), Value::from(link_cap_speed));
        obj.insert("LinkCapWidth".into(), Value::from(link_cap_width));
        obj.insert("LinkStaSpeed".into(), Value::from(link_sta_speed));
        obj.insert("LinkStaWidth".into(), Value::from(link_sta_width));
        obj.insert("LinkCapSpeedGen".into(), Value::String(if link_cap_speed > 0 { format!("Gen{link_cap_speed}") } else { "N/A".to_string() }));
        obj.insert("LinkStaSpeedGen".into(), Value::String(if link_sta_speed > 0 { format!("Gen{link_sta_speed}") } else { "N/A".to_string() }));
        obj.insert("BandwidthGbps".into(), Value::from((bandwidth_gbps * 100.0).round() / 100.0));
        obj.insert("IsSpeedDegraded".into(), Value::from(is_speed_degraded));
        obj.insert("IsWidthDegraded".into(), Value::from(is_width_degraded));
        obj.insert("IsDegraded".into(), Value::from(is_degraded));
        obj.insert("DeviceID".into(), Value::String(device_id));
        obj.insert("VendorID".into(), Value::String(vendor_id));
        obj.insert("MaxLinkSpeed".into(), Value::from(ext_info.max_link_speed));
        obj.insert("MaxLinkWidth".into(), Value::from(ext_info.max_link_width));
        obj.insert("ASPMSupport".into(), Value::String(ext_info.aspm_support));
        obj.insert("CorrectableErrors".into(), Value::from(aer_info.correctable_errors));
        obj.insert("UncorrectableErrors".into(), Value::from(aer_info.uncorrectable_errors));
        obj.insert("FatalErrors".into(), Value::from(aer_info.fatal_errors));
        obj.insert("ReceiverErrors".into(), Value::from(aer_info.receiver_errors));
        obj.insert("BadTLP".into(), Value::from(aer_info.bad_tlp));
        obj.insert("BadDLLP".into(), Value::from(aer_info.bad_dllp));
        obj.insert("ReplayRollover".into(), Value::from(aer_info.replay_num_rollover));
        obj.insert("ReplayTimeout".into(), Value::from(aer_info.replay_timer_timeout));
        obj.insert("TotalAERErrors".into(), Value::from(total_aer_errors));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        let rank = match severity {
            "critical" => 0,
            "warning" => 1,
            _ => 2,
        };
        entries.push((rank, total_aer_errors, is_degraded, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(b.2.cmp(&a.2)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, _, obj)| obj).collect();

    let total = total_nodes.max(1) as f64;
    let mut gen_dist_sorted: Vec<(i64, usize)> = gen_distribution.into_iter().filter(|(k, _)| *k > 0).collect();
    gen_dist_sorted.sort_by_key(|(k, _)| *k);
    let mut width_dist_sorted: Vec<(i64, usize)> = width_distribution.into_iter().filter(|(k, _)| *k > 0).collect();
    width_dist_sorted.sort_by_key(|(k, _)| *k);

    let mut summary = Map::new();
    summary.insert("total_nodes".into(), Value::from(total_nodes));
    summary.insert("degraded_count".into(), Value::from(degraded_count));
    summary.insert("aer_error_nodes".into(), Value::from(aer_error_count));
    summary.insert("max_pcie_gen".into(), Value::from(max_gen));
    summary.insert(
        "gen_distribution".into(),
        Value::Object(gen_dist_sorted.into_iter().map(|(k, v)| (format!("Gen{k}"), Value::from(v))).collect()),
    );
    summary.insert(
        "width_distribution".into(),
        Value::Object(width_dist_sorted.into_iter().map(|(k, v)| (format!("x{k}"), Value::from(v))).collect()),
    );
    summary.insert("total_bandwidth_tbps".into(), Value::from((total_bandwidth_gbps / 1000.0 * 100.0).round() / 100.0));
    summary.insert("avg_bandwidth_gbps".into(), Value::from((total_bandwidth_gbps / total * 100.0).round() / 100.0));
    summary.insert("degradation_pct".into(), Value::from((degraded_count as f64 / total * 1000.0).round() / 10.0));
    summary.insert("p_db1_rows".into(), Value::from(p_db1.len()));
    summary.insert("p_db2_rows".into(), Value::from(p_db2.len()));
    summary.insert("p_db8_rows".into(), Value::from(p_db8.len()));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_speeds_match_table() {
        assert_eq!(pcie_gen_speed(3), 8.0);
        assert_eq!(pcie_gen_speed(5), 32.0);
        assert_eq!(pcie_gen_speed(99), 0.0);
    }
}
