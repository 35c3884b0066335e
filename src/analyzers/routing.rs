//! Family F — adaptive routing and forwarding counters, ported from
//! `routing_service.py`.
//!
//! `RN_COUNTERS` drives the per-port record set; `HBF_PORT_COUNTERS` and
//! `FAST_RECOVERY_COUNTERS` are joined in by `(NodeGUID, PortNumber)`
//! (spec.md §4.4 Family F).

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, row_guid, row_port, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::{DatasetInventory, Frame};

#[derive(Default, Clone, Copy)]
struct HbfCounters {
    static_forwarding: i64,
    hbf_forwarding: i64,
    ar_forwarding: i64,
    hbf_fallback_local: i64,
    hbf_fallback_remote: i64,
}

#[derive(Default, Clone, Copy)]
struct FastRecovery {
    errors: i64,
    warnings: i64,
}

fn build_hbf_lookup(frame: &Frame) -> HashMap<(String, Option<u32>), HbfCounters> {
    let mut lookup = HashMap::new();
    for row in &frame.rows {
        let key = (row_guid(frame, row), row_port(frame, row));
        lookup.insert(
            key,
            HbfCounters {
                static_forwarding: cell_i64_or_zero(frame, row, "rx_pkt_forwarding_static"),
                hbf_forwarding: cell_i64_or_zero(frame, row, "rx_pkt_forwarding_hbf"),
                ar_forwarding: cell_i64_or_zero(frame, row, "rx_pkt_forwarding_ar"),
                hbf_fallback_local: cell_i64_or_zero(frame, row, "rx_pkt_hbf_fallback_local"),
                hbf_fallback_remote: cell_i64_or_zero(frame, row, "rx_pkt_hbf_fallback_remote"),
            },
        );
    }
    lookup
}

fn build_fr_lookup(frame: &Frame) -> HashMap<(String, Option<u32>), FastRecovery> {
    let mut lookup: HashMap<(String, Option<u32>), FastRecovery> = HashMap::new();
    for row in &frame.rows {
        let key = (row_guid(frame, row), row_port(frame, row));
        let entry = lookup.entry(key).or_default();
        entry.errors += cell_i64_or_zero(frame, row, "num_errors");
        entry.warnings += cell_i64_or_zero(frame, row, "num_warnings");
    }
    lookup
}

fn ar_utilization(ar_forwarding: i64, total_forwarded: i64) -> f64 {
    if total_forwarded <= 0 {
        return 0.0;
    }
    ((ar_forwarding as f64 / total_forwarded as f64) * 100.0 * 100.0).round() / 100.0
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let rn = inventory.read_table("RN_COUNTERS");
    let hbf = inventory.read_table("HBF_PORT_COUNTERS");
    let fr = inventory.read_table("FAST_RECOVERY_COUNTERS");

    if rn.is_empty() && hbf.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let hbf_lookup = build_hbf_lookup(&hbf);
    let fr_lookup = build_fr_lookup(&fr);

    let mut rows = Vec::with_capacity(rn.len());
    let mut anomalies = AnomalyFrame::new();
    let mut critical_count = 0usize;
    let mut warning_count = 0usize;
    let mut ports_with_ar = 0usize;
    let mut ports_with_hbf = 0usize;
    let mut total_ar = 0i64;
    let mut total_hbf = 0i64;
    let mut total_static = 0i64;
    let mut total_rn_errors = 0i64;
    let mut total_fr_errors = 0i64;

    for row in &rn.rows {
        let guid = row_guid(&rn, row);
        let port = row_port(&rn, row);
        let key = (guid.clone(), port);

        let rcv_rn_pkt = cell_i64_or_zero(&rn, row, "port_rcv_rn_pkt");
        let xmit_rn_pkt = cell_i64_or_zero(&rn, row, "port_xmit_rn_pkt");
        let rcv_rn_error = cell_i64_or_zero(&rn, row, "port_rcv_rn_error");
        let ar_trials = cell_i64_or_zero(&rn, row, "port_ar_trials");
        let pfrn_error = cell_i64_or_zero(&rn, row, "pfrn_received_error");

        let hbf_data = hbf_lookup.get(&key).copied().unwrap_or_default();
        let fr_data = fr_lookup.get(&key).copied().unwrap_or_default();

        let total_forwarded = hbf_data.static_forwarding + hbf_data.hbf_forwarding + hbf_data.ar_forwarding;
        let ar_utilization_pct = ar_utilization(hbf_data.ar_forwarding, total_forwarded);

        let rn_errors = rcv_rn_error + pfrn_error;
        let mut severity = "normal";
        let mut issues = Vec::new();
        if rn_errors > 0 {
            severity = "warning";
            issues.push(format!("RN errors: {rn_errors}"));
        }
        if fr_data.errors > 0 {
            severity = "critical";
            issues.push(format!("Fast recovery errors: {}", fr_data.errors));
        }
        let hbf_fallback = hbf_data.hbf_fallback_local > 0 || hbf_data.hbf_fallback_remote > 0;
        if hbf_fallback {
            if severity != "critical" {
                severity = "warning";
            }
            issues.push("HBF fallback detected".to_string());
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("RcvRNPackets".into(), Value::from(rcv_rn_pkt));
        obj.insert("XmitRNPackets".into(), Value::from(xmit_rn_pkt));
        obj.insert("RNErrors".into(), Value::from(rn_errors));
        obj.insert("ARTrials".into(), Value::from(ar_trials));
        obj.insert("StaticForwarding".into(), Value::from(hbf_data.static_forwarding));
        obj.insert("HBFForwarding".into(), Value::from(hbf_data.hbf_forwarding));
        obj.insert("ARForwarding".into(), Value::from(hbf_data.ar_forwarding));
        obj.insert("HBFFallbackLocal".into(), Value::from(hbf_data.hbf_fallback_local));
        obj.insert("HBFFallbackRemote".into(), Value::from(hbf_data.hbf_fallback_remote));
        obj.insert("ARUtilizationPct".into(), Value::from(ar_utilization_pct));
        obj.insert("FRErrors".into(), Value::from(fr_data.errors));
        obj.insert("FRWarnings".into(), Value::from(fr_data.warnings));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        if fr_data.errors > 0 {
            anomalies.push(&guid, port, AnomalyKind::RoutingFrError, 1.0);
            total_fr_errors += fr_data.errors;
        }
        if rn_errors > 0 {
            anomalies.push(&guid, port, AnomalyKind::RoutingRnError, 0.5);
            total_rn_errors += rn_errors;
        }
        if hbf_fallback {
            anomalies.push(&guid, port, AnomalyKind::RoutingHbfFallback, 0.5);
        }

        match severity {
            "critical" => critical_count += 1,
            "warning" => warning_count += 1,
            _ => {},
        }
        if hbf_data.ar_forwarding > 0 {
            ports_with_ar += 1;
        }
        if hbf_data.hbf_forwarding > 0 {
            ports_with_hbf += 1;
        }
        total_ar += hbf_data.ar_forwarding;
        total_hbf += hbf_data.hbf_forwarding;
        total_static += hbf_data.static_forwarding;

        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_ports".into(), Value::from(rows.len()));
    summary.insert("ports_with_ar_traffic".into(), Value::from(ports_with_ar));
    summary.insert("ports_with_hbf_traffic".into(), Value::from(ports_with_hbf));
    summary.insert("total_ar_packets".into(), Value::from(total_ar));
    summary.insert("total_hbf_packets".into(), Value::from(total_hbf));
    summary.insert("total_static_packets".into(), Value::from(total_static));
    summary.insert("total_rn_errors".into(), Value::from(total_rn_errors));
    summary.insert("total_fr_errors".into(), Value::from(total_fr_errors));
    summary.insert("critical_count".into(), Value::from(critical_count));
    summary.insert("warning_count".into(), Value::from(warning_count));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ar_utilization_is_zero_with_no_traffic() {
        assert_eq!(ar_utilization(0, 0), 0.0);
    }

    #[test]
    fn ar_utilization_rounds_to_two_places() {
        assert_eq!(ar_utilization(1, 3), 33.33);
    }
}
