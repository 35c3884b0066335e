//! Family I — per-speed FEC support/enablement matrix, ported from
//! `fec_mode_service.py`. Distinct from the `EXTENDED_PORT_INFO`/`FEC_MODE`
//! join consumed inside `port_health.rs`: this is a standalone pass over
//! `FEC_MODE` covering every speed tier, not just the currently active one.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory};

fn fec_mode_name(code: i64) -> String {
    match code {
        0 => "No FEC".to_string(),
        1 => "FireCode FEC".to_string(),
        2 => "RS-FEC (528,514)".to_string(),
        4 => "RS-FEC (544,514)".to_string(),
        6 => "RS-FEC (544,514) + Interleave".to_string(),
        14 => "RS-FEC Interleaved 272".to_string(),
        other => format!("Unknown ({other})"),
    }
}

fn parse_hex(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if let Some(hex) = trimmed.to_ascii_lowercase().strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    trimmed.parse::<f64>().map(|v| v as i64).unwrap_or(0)
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let fec = inventory.read_table("FEC_MODE");
    if fec.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut entries = Vec::with_capacity(fec.len());
    let mut fec_active_distribution: HashMap<String, usize> = HashMap::new();
    let mut mismatch_count = 0usize;
    let mut hdr_capable = 0usize;
    let mut ndr_capable = 0usize;

    for row in &fec.rows {
        let guid = normalize_guid(&cell_str(&fec, row, "NodeGuid"));
        let port_num = parse_port_number(&cell_str(&fec, row, "PortNum"));
        let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();

        let fec_active = cell_i64_or_zero(&fec, row, "FECActv");
        let fec_active_str = fec_mode_name(fec_active);
        *fec_active_distribution.entry(fec_active_str.clone()).or_insert(0) += 1;

        let fdr10_sup = parse_hex(&cell_str(&fec, row, "FDR10FECSup"));
        let fdr10_en = parse_hex(&cell_str(&fec, row, "FDR10FECEn"));
        let edr_sup = parse_hex(&cell_str(&fec, row, "EDRFECSup"));
        let edr_en = parse_hex(&cell_str(&fec, row, "EDRFECEn"));
        let edr20_sup = parse_hex(&cell_str(&fec, row, "EDR20FECSup"));
        let edr20_en = parse_hex(&cell_str(&fec, row, "EDR20FECEn"));
        let hdr_sup = parse_hex(&cell_str(&fec, row, "HDRFECSup"));
        let hdr_en = parse_hex(&cell_str(&fec, row, "HDRFECEn"));
        let ndr_sup = parse_hex(&cell_str(&fec, row, "NDRFECSup"));
        let ndr_en = parse_hex(&cell_str(&fec, row, "NDRFECEn"));

        if hdr_sup > 0 {
            hdr_capable += 1;
        }
        if ndr_sup > 0 {
            ndr_capable += 1;
        }

        let mut issues = Vec::new();
        let mut severity = "normal";
        if hdr_sup > 0 && hdr_en == 0 {
            issues.push("HDR FEC: supported but not enabled".to_string());
        }
        if ndr_sup > 0 && ndr_en == 0 {
            issues.push("NDR FEC: supported but not enabled".to_string());
        }
        if edr_sup > 0 && edr_en == 0 {
            issues.push("EDR FEC: supported but not enabled".to_string());
        }
        if fec_active == 0 && (hdr_sup > 0 || ndr_sup > 0) {
            issues.push("No FEC active on high-speed capable port".to_string());
            severity = "warning";
            mismatch_count += 1;
        }
        if !issues.is_empty() && severity == "normal" {
            severity = "info";
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(node_name.clone()));
        if let Some(p) = port_num {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("FECActive".into(), Value::String(fec_active_str));
        obj.insert("FECActiveCode".into(), Value::from(fec_active));
        obj.insert("FDR10Supported".into(), Value::from(fdr10_sup > 0));
        obj.insert("FDR10Enabled".into(), Value::from(fdr10_en > 0));
        obj.insert("EDRSupported".into(), Value::from(edr_sup > 0));
        obj.insert("EDREnabled".into(), Value::from(edr_en > 0));
        obj.insert("EDR20Supported".into(), Value::from(edr20_sup > 0));
        obj.insert("EDR20Enabled".into(), Value::from(edr20_en > 0));
        obj.insert("HDRSupported".into(), Value::from(hdr_sup > 0));
        obj.insert("HDREnabled".into(), Value::from(hdr_en > 0));
        obj.insert("NDRSupported".into(), Value::from(ndr_sup > 0));
        obj.insert("NDREnabled".into(), Value::from(ndr_en > 0));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        let rank = if severity == "warning" { 1 } else { 2 };
        entries.push((rank, node_name, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, obj)| obj).collect();

    let mut sorted_dist: Vec<(String, usize)> = fec_active_distribution.clone().into_iter().collect();
    sorted_dist.sort_by(|a, b| b.1.cmp(&a.1));
    let ports_without_fec = fec_active_distribution.get("No FEC").copied().unwrap_or(0);
    let ports_with_rs_fec: usize = fec_active_distribution.iter().filter(|(k, _)| k.contains("RS-FEC")).map(|(_, v)| v).sum();

    let mut summary = Map::new();
    summary.insert("total_ports".into(), Value::from(fec.len()));
    summary.insert(
        "fec_active_distribution".into(),
        Value::Object(sorted_dist.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
    );
    summary.insert("ports_without_fec".into(), Value::from(ports_without_fec));
    summary.insert("ports_with_rs_fec".into(), Value::from(ports_with_rs_fec));
    summary.insert("mismatch_count".into(), Value::from(mismatch_count));
    summary.insert("hdr_capable_ports".into(), Value::from(hdr_capable));
    summary.insert("ndr_capable_ports".into(), Value::from(ndr_capable));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fec_mode_names_match_table() {
        assert_eq!(fec_mode_name(0), "No FEC");
        assert_eq!(fec_mode_name(14), "RS-FEC Interleaved 272");
        assert_eq!(fec_mode_name(99), "Unknown (99)");
    }

    #[test]
    fn parses_hex_and_decimal() {
        assert_eq!(parse_hex("0x1"), 1);
        assert_eq!(parse_hex("3"), 3);
    }
}
