//! Family F — real-time counter deltas sampled during the diagnostic run,
//! ported from `pm_delta_service.py`.
//!
//! Reads `PM_DELTA`, skips ports with no xmit/rcv/FEC activity during the
//! sampling window, and flags FEC-uncorrectable/relay-error activity
//! (spec.md §4.4 Family F).

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, row_guid, row_port, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::DatasetInventory;

const FEC_UNCORRECTABLE_THRESHOLD: i64 = 10;
const FEC_CORRECTABLE_WARNING: i64 = 100_000;
const MAX_ROWS: usize = 2000;

fn lane_imbalance_pct(lanes: [i64; 4]) -> f64 {
    let max = *lanes.iter().max().unwrap();
    let min = *lanes.iter().min().unwrap();
    if max <= 0 {
        return 0.0;
    }
    (((max - min) as f64 / max as f64) * 100.0 * 10.0).round() / 10.0
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let pm = inventory.read_table("PM_DELTA");
    if pm.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut entries = Vec::new();
    let mut anomalies = AnomalyFrame::new();
    let mut total_xmit_gb = 0.0;
    let mut total_rcv_gb = 0.0;
    let mut total_fec_corrected = 0i64;
    let mut total_fec_uncorrectable = 0i64;
    let mut critical_count = 0usize;
    let mut warning_count = 0usize;
    let mut ports_with_fec_activity = 0usize;
    let mut ports_with_errors = 0usize;

    for row in &pm.rows {
        let guid = row_guid(&pm, row);
        let port = row_port(&pm, row);

        let xmit_data = cell_i64_or_zero(&pm, row, "PortXmitDataExtended");
        let rcv_data = cell_i64_or_zero(&pm, row, "PortRcvDataExtended");
        let xmit_pkts = cell_i64_or_zero(&pm, row, "PortXmitPktsExtended");
        let rcv_pkts = cell_i64_or_zero(&pm, row, "PortRcvPktsExtended");
        let xmit_wait = cell_i64_or_zero(&pm, row, "PortXmitWaitExt");

        let fec_corrected = cell_i64_or_zero(&pm, row, "PortFECCorrectedSymbolCounter");
        let fec_correctable_blocks = cell_i64_or_zero(&pm, row, "PortFECCorrectableBlockCounter");
        let fec_uncorrectable = cell_i64_or_zero(&pm, row, "PortFECUncorrectableBlockCounter");

        let lanes = [
            cell_i64_or_zero(&pm, row, "FECCorrectedSymbolCounterLane[0]"),
            cell_i64_or_zero(&pm, row, "FECCorrectedSymbolCounterLane[1]"),
            cell_i64_or_zero(&pm, row, "FECCorrectedSymbolCounterLane[2]"),
            cell_i64_or_zero(&pm, row, "FECCorrectedSymbolCounterLane[3]"),
        ];

        let relay_errors = cell_i64_or_zero(&pm, row, "PortRcvSwitchRelayErrorsExt");
        let dlid_errors = cell_i64_or_zero(&pm, row, "PortDLIDMappingErrors");

        let total_activity = xmit_data + rcv_data + fec_corrected + fec_uncorrectable;
        if total_activity == 0 {
            continue;
        }

        let mut severity = "normal";
        let mut issues = Vec::new();
        if fec_uncorrectable >= FEC_UNCORRECTABLE_THRESHOLD {
            severity = "critical";
            issues.push(format!("FEC uncorrectable blocks: {fec_uncorrectable}"));
        }
        if fec_corrected >= FEC_CORRECTABLE_WARNING {
            if severity == "normal" {
                severity = "warning";
            }
            issues.push(format!("High FEC corrections: {fec_corrected}"));
        }
        if relay_errors > 0 {
            if severity == "normal" {
                severity = "warning";
            }
            issues.push(format!("Switch relay errors: {relay_errors}"));
        }
        if dlid_errors > 0 {
            if severity == "normal" {
                severity = "warning";
            }
            issues.push(format!("DLID mapping errors: {dlid_errors}"));
        }

        let xmit_gb = if xmit_data > 0 { (xmit_data as f64 / 1024f64.powi(3) * 1000.0).round() / 1000.0 } else { 0.0 };
        let rcv_gb = if rcv_data > 0 { (rcv_data as f64 / 1024f64.powi(3) * 1000.0).round() / 1000.0 } else { 0.0 };

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("XmitDataGB".into(), Value::from(xmit_gb));
        obj.insert("RcvDataGB".into(), Value::from(rcv_gb));
        obj.insert("XmitPkts".into(), Value::from(xmit_pkts));
        obj.insert("RcvPkts".into(), Value::from(rcv_pkts));
        obj.insert("XmitWait".into(), Value::from(xmit_wait));
        obj.insert("FECCorrected".into(), Value::from(fec_corrected));
        obj.insert("FECCorrectableBlocks".into(), Value::from(fec_correctable_blocks));
        obj.insert("FECUncorrectable".into(), Value::from(fec_uncorrectable));
        obj.insert("FECLane0".into(), Value::from(lanes[0]));
        obj.insert("FECLane1".into(), Value::from(lanes[1]));
        obj.insert("FECLane2".into(), Value::from(lanes[2]));
        obj.insert("FECLane3".into(), Value::from(lanes[3]));
        obj.insert("FECLaneImbalancePct".into(), Value::from(lane_imbalance_pct(lanes)));
        obj.insert("RelayErrors".into(), Value::from(relay_errors));
        obj.insert("DLIDErrors".into(), Value::from(dlid_errors));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        if fec_uncorrectable >= FEC_UNCORRECTABLE_THRESHOLD {
            anomalies.push(&guid, port, AnomalyKind::FecUncorrectable, 1.0);
        }
        if relay_errors > 0 {
            anomalies.push(&guid, port, AnomalyKind::RelayError, 0.5);
        }

        total_xmit_gb += xmit_gb;
        total_rcv_gb += rcv_gb;
        total_fec_corrected += fec_corrected;
        total_fec_uncorrectable += fec_uncorrectable;
        if fec_corrected > 0 {
            ports_with_fec_activity += 1;
        }
        if relay_errors > 0 || dlid_errors > 0 {
            ports_with_errors += 1;
        }
        match severity {
            "critical" => critical_count += 1,
            "warning" => warning_count += 1,
            _ => {},
        }

        let rank = match severity {
            "critical" => 0,
            "warning" => 1,
            _ => 2,
        };
        entries.push((rank, fec_uncorrectable, fec_corrected, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(b.2.cmp(&a.2)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(MAX_ROWS).map(|(_, _, _, obj)| obj).collect();

    let mut summary = Map::new();
    summary.insert("total_ports_sampled".into(), Value::from(pm.len()));
    summary.insert("ports_with_activity".into(), Value::from(rows.len()));
    summary.insert("total_xmit_gb".into(), Value::from((total_xmit_gb * 100.0).round() / 100.0));
    summary.insert("total_rcv_gb".into(), Value::from((total_rcv_gb * 100.0).round() / 100.0));
    summary.insert("total_fec_corrected".into(), Value::from(total_fec_corrected));
    summary.insert("total_fec_uncorrectable".into(), Value::from(total_fec_uncorrectable));
    summary.insert("critical_count".into(), Value::from(critical_count));
    summary.insert("warning_count".into(), Value::from(warning_count));
    summary.insert("ports_with_fec_activity".into(), Value::from(ports_with_fec_activity));
    summary.insert("ports_with_errors".into(), Value::from(ports_with_errors));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_imbalance_is_zero_without_traffic() {
        assert_eq!(lane_imbalance_pct([0, 0, 0, 0]), 0.0);
    }

    #[test]
    fn lane_imbalance_reflects_spread() {
        assert_eq!(lane_imbalance_pct([100, 50, 100, 100]), 50.0);
    }
}
