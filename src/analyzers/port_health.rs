//! Family F — per-port ICRC/parity/discard/FEC health, ported from
//! `port_health_service.py`.
//!
//! `PORT_GENERAL_COUNTERS` drives the record set; `EXTENDED_PORT_INFO`
//! (unhealthy reason, retransmit mode) and `FEC_MODE` join in by
//! `(NodeGUID, PortNumber)` (spec.md §4.4 Family F).

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_f64_or_zero, cell_i64_or_zero, first_int_token, row_guid, row_port, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory, Frame};

fn raw_guid_port(frame: &Frame, row: &crate::dump::Row) -> (String, Option<u32>) {
    let guid = normalize_guid(&frame.get(row, "NodeGuid").to_string());
    let port = parse_port_number(&frame.get(row, "PortNum").to_string());
    (guid, port)
}

fn fec_mode_name(code: i64) -> String {
    match code {
        0 => "No FEC".to_string(),
        1 => "FireCode FEC".to_string(),
        2 => "RS-FEC (528,514)".to_string(),
        4 => "RS-FEC (544,514)".to_string(),
        8 => "Placeholder RS-FEC".to_string(),
        16 => "Zero Latency FEC".to_string(),
        other => format!("Unknown ({other})"),
    }
}

/// Decode the `UnhealthyReason` bitmask (spec.md §4.4 Family F).
fn decode_unhealthy_reason(reason: i64) -> String {
    if reason == 0 {
        return String::new();
    }
    let bits: &[(i64, &str)] = &[
        (0x1, "DLID routed"),
        (0x2, "SLID routed"),
        (0x4, "Raw traffic not allowed"),
        (0x8, "VL stalled"),
        (0x10, "Loopback"),
        (0x20, "High BER"),
        (0x40, "Credits stall"),
        (0x80, "Link down"),
    ];
    let reasons: Vec<&str> = bits.iter().filter(|(bit, _)| reason & bit != 0).map(|(_, label)| *label).collect();
    if reasons.is_empty() {
        format!("Code {reason}")
    } else {
        reasons.join(", ")
    }
}

struct ExtInfo {
    unhealthy_reason: i64,
    unhealthy_reason_text: String,
    retrans_mode: i64,
    bw_utilization: f64,
}

struct FecInfo {
    fec_active_name: String,
    hdr_fec_enabled: bool,
    ndr_fec_enabled: bool,
}

fn build_ext_info(frame: &Frame) -> HashMap<(String, Option<u32>), ExtInfo> {
    let mut lookup = HashMap::new();
    for row in &frame.rows {
        let key = raw_guid_port(frame, row);
        let unhealthy_reason = cell_i64_or_zero(frame, row, "UnhealthyReason");
        lookup.insert(
            key,
            ExtInfo {
                unhealthy_reason,
                unhealthy_reason_text: decode_unhealthy_reason(unhealthy_reason),
                retrans_mode: cell_i64_or_zero(frame, row, "RetransMode"),
                bw_utilization: cell_f64_or_zero(frame, row, "BwUtilization"),
            },
        );
    }
    lookup
}

fn build_fec_info(frame: &Frame) -> HashMap<(String, Option<u32>), FecInfo> {
    let mut lookup = HashMap::new();
    for row in &frame.rows {
        let key = raw_guid_port(frame, row);
        let fec_active = cell_i64_or_zero(frame, row, "FECActv");
        lookup.insert(
            key,
            FecInfo {
                fec_active_name: fec_mode_name(fec_active),
                hdr_fec_enabled: first_int_token(frame.get(row, "HDRFECEn")).unwrap_or(0) != 0,
                ndr_fec_enabled: first_int_token(frame.get(row, "NDRFECEn")).unwrap_or(0) != 0,
            },
        );
    }
    lookup
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let counters = inventory.read_table("PORT_GENERAL_COUNTERS");
    let ext_info = inventory.read_table("EXTENDED_PORT_INFO");
    let fec = inventory.read_table("FEC_MODE");

    if counters.is_empty() && ext_info.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let ext_lookup = build_ext_info(&ext_info);
    let fec_lookup = build_fec_info(&fec);

    let mut rows = Vec::with_capacity(counters.len());
    let mut anomalies = AnomalyFrame::new();
    let mut icrc_total = 0i64;
    let mut parity_total = 0i64;
    let mut unhealthy_count = 0usize;
    let mut ports_with_errors = 0usize;
    let mut critical_count = 0usize;
    let mut warning_count = 0usize;
    let mut fec_distribution: HashMap<String, usize> = HashMap::new();

    for row in &counters.rows {
        let guid = row_guid(&counters, row);
        let port = row_port(&counters, row);
        let key = (guid.clone(), port);

        let rx_icrc_error = cell_i64_or_zero(&counters, row, "rx_icrc_error");
        let tx_parity_error = cell_i64_or_zero(&counters, row, "tx_parity_error");
        let xmit_discards = cell_i64_or_zero(&counters, row, "contain_n_drain_xmit_discards");
        let rcv_discards = cell_i64_or_zero(&counters, row, "contain_n_drain_rcv_discards");

        let default_ext = ExtInfo { unhealthy_reason: 0, unhealthy_reason_text: String::new(), retrans_mode: 0, bw_utilization: 0.0 };
        let ext = ext_lookup.get(&key).unwrap_or(&default_ext);
        let default_fec = FecInfo { fec_active_name: "Unknown".to_string(), hdr_fec_enabled: false, ndr_fec_enabled: false };
        let fec_info = fec_lookup.get(&key).unwrap_or(&default_fec);

        let mut severity = "normal";
        let mut issues = Vec::new();
        if ext.unhealthy_reason > 0 {
            severity = "critical";
            issues.push(format!("Unhealthy: {}", ext.unhealthy_reason_text));
        }
        if rx_icrc_error > 0 {
            if severity != "critical" {
                severity = "warning";
            }
            issues.push(format!("ICRC errors: {rx_icrc_error}"));
        }
        if tx_parity_error > 0 {
            severity = "critical";
            issues.push(format!("Parity errors: {tx_parity_error}"));
        }
        if xmit_discards > 0 || rcv_discards > 0 {
            if severity != "critical" {
                severity = "warning";
            }
            issues.push(format!("Discards: TX={xmit_discards}, RX={rcv_discards}"));
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("RxICRCErrors".into(), Value::from(rx_icrc_error));
        obj.insert("TxParityErrors".into(), Value::from(tx_parity_error));
        obj.insert("XmitDiscards".into(), Value::from(xmit_discards));
        obj.insert("RcvDiscards".into(), Value::from(rcv_discards));
        obj.insert("UnhealthyReason".into(), Value::from(ext.unhealthy_reason));
        obj.insert("UnhealthyReasonText".into(), Value::String(ext.unhealthy_reason_text.clone()));
        obj.insert("RetransMode".into(), Value::from(ext.retrans_mode));
        obj.insert("BwUtilization".into(), Value::from(ext.bw_utilization));
        obj.insert("FECMode".into(), Value::String(fec_info.fec_active_name.clone()));
        obj.insert("HDRFECEnabled".into(), Value::from(fec_info.hdr_fec_enabled));
        obj.insert("NDRFECEnabled".into(), Value::from(fec_info.ndr_fec_enabled));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        if ext.unhealthy_reason > 0 {
            anomalies.push(&guid, port, AnomalyKind::PortUnhealthy, 1.0);
            unhealthy_count += 1;
        }
        if tx_parity_error > 0 {
            anomalies.push(&guid, port, AnomalyKind::PortParityError, 1.0);
        }
        if rx_icrc_error > 0 {
            anomalies.push(&guid, port, AnomalyKind::PortIcrcError, 0.5);
        }

        icrc_total += rx_icrc_error;
        parity_total += tx_parity_error;
        if rx_icrc_error > 0 || tx_parity_error > 0 {
            ports_with_errors += 1;
        }
        match severity {
            "critical" => critical_count += 1,
            "warning" => warning_count += 1,
            _ => {},
        }
        *fec_distribution.entry(fec_info.fec_active_name.clone()).or_insert(0) += 1;

        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_ports".into(), Value::from(rows.len()));
    summary.insert("total_icrc_errors".into(), Value::from(icrc_total));
    summary.insert("total_parity_errors".into(), Value::from(parity_total));
    summary.insert("unhealthy_ports".into(), Value::from(unhealthy_count));
    summary.insert("ports_with_errors".into(), Value::from(ports_with_errors));
    summary.insert(
        "fec_mode_distribution".into(),
        Value::Object(fec_distribution.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
    );
    summary.insert("critical_count".into(), Value::from(critical_count));
    summary.insert("warning_count".into(), Value::from(warning_count));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_reason_decodes_known_bits() {
        assert_eq!(decode_unhealthy_reason(0x1 | 0x80), "DLID routed, Link down");
        assert_eq!(decode_unhealthy_reason(0), "");
    }

    #[test]
    fn unknown_bit_falls_back_to_code() {
        assert_eq!(decode_unhealthy_reason(0x4000), "Code 16384");
    }

    #[test]
    fn fec_mode_names_match_table() {
        assert_eq!(fec_mode_name(2), "RS-FEC (528,514)");
        assert_eq!(fec_mode_name(99), "Unknown (99)");
    }
}
