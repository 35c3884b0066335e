//! Family I — per-switch adaptive-routing/HBF/PFRN capability inventory,
//! ported from `ar_info_service.py`. `AR_INFO` is switch-scoped (no port
//! column); flags "supported but disabled" combinations as informational.

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, row_guid, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::DatasetInventory;

fn truthy(frame: &crate::dump::Frame, row: &crate::dump::Row, name: &str) -> bool {
    cell_i64_or_zero(frame, row, name) != 0
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let ar = inventory.read_table("AR_INFO");
    if ar.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut rows = Vec::with_capacity(ar.len());
    let (mut ar_supported, mut fr_supported, mut fr_enabled) = (0usize, 0usize, 0usize);
    let (mut hbf_supported, mut hbf_enabled) = (0usize, 0usize);
    let (mut pfrn_supported, mut pfrn_enabled) = (0usize, 0usize);

    for row in &ar.rows {
        let guid = row_guid(&ar, row);
        let is_arn_sup = truthy(&ar, row, "is_arn_sup");
        let is_frn_sup = truthy(&ar, row, "is_frn_sup");
        let is_fr_sup = truthy(&ar, row, "is_fr_sup");
        let fr_en = truthy(&ar, row, "fr_enabled");
        let rn_xmit_en = truthy(&ar, row, "rn_xmit_enabled");
        let is_hbf_sup = truthy(&ar, row, "is_hbf_supported");
        let by_sl_hbf_en = truthy(&ar, row, "by_sl_hbf_en");
        let is_whbf_sup = truthy(&ar, row, "is_whbf_supported");
        let whbf_en = truthy(&ar, row, "whbf_en");
        let is_pfrn_sup = truthy(&ar, row, "is_pfrn_supported");
        let pfrn_en = truthy(&ar, row, "pfrn_enabled");

        if is_arn_sup || is_frn_sup {
            ar_supported += 1;
        }
        if is_fr_sup {
            fr_supported += 1;
        }
        if fr_en {
            fr_enabled += 1;
        }
        if is_hbf_sup {
            hbf_supported += 1;
        }
        if by_sl_hbf_en || whbf_en {
            hbf_enabled += 1;
        }
        if is_pfrn_sup {
            pfrn_supported += 1;
        }
        if pfrn_en {
            pfrn_enabled += 1;
        }

        let mut issues = Vec::new();
        let mut severity = "normal";
        if is_fr_sup && !fr_en {
            issues.push("Fast Recovery supported but disabled".to_string());
            severity = "info";
        }
        if is_hbf_sup && !(by_sl_hbf_en || whbf_en) {
            issues.push("HBF supported but disabled".to_string());
            severity = "info";
        }
        if is_pfrn_sup && !pfrn_en {
            issues.push("PFRN supported but disabled".to_string());
            severity = "info";
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        obj.insert("ARNSupported".into(), Value::from(is_arn_sup));
        obj.insert("FRNSupported".into(), Value::from(is_frn_sup));
        obj.insert("FRSupported".into(), Value::from(is_fr_sup));
        obj.insert("FREnabled".into(), Value::from(fr_en));
        obj.insert("RNXmitEnabled".into(), Value::from(rn_xmit_en));
        obj.insert("HBFSupported".into(), Value::from(is_hbf_sup));
        obj.insert("HBFEnabled".into(), Value::from(by_sl_hbf_en || whbf_en));
        obj.insert("WHBFSupported".into(), Value::from(is_whbf_sup));
        obj.insert("WHBFEnabled".into(), Value::from(whbf_en));
        obj.insert("PFRNSupported".into(), Value::from(is_pfrn_sup));
        obj.insert("PFRNEnabled".into(), Value::from(pfrn_en));
        obj.insert("GroupCapacity".into(), Value::from(cell_i64_or_zero(&ar, row, "group_cap")));
        obj.insert("GroupTop".into(), Value::from(cell_i64_or_zero(&ar, row, "group_top")));
        obj.insert("SubGroupsActive".into(), Value::from(cell_i64_or_zero(&ar, row, "sub_grps_active")));
        obj.insert("GlobalGroups".into(), Value::from(cell_i64_or_zero(&ar, row, "glb_groups")));
        obj.insert("ARVersion".into(), Value::from(cell_i64_or_zero(&ar, row, "ar_version_cap")));
        obj.insert("RNVersion".into(), Value::from(cell_i64_or_zero(&ar, row, "rn_version_cap")));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));
        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_switches".into(), Value::from(ar.len()));
    summary.insert("ar_supported".into(), Value::from(ar_supported));
    summary.insert("fr_supported".into(), Value::from(fr_supported));
    summary.insert("fr_enabled".into(), Value::from(fr_enabled));
    summary.insert("hbf_supported".into(), Value::from(hbf_supported));
    summary.insert("hbf_enabled".into(), Value::from(hbf_enabled));
    summary.insert("pfrn_supported".into(), Value::from(pfrn_supported));
    summary.insert("pfrn_enabled".into(), Value::from(pfrn_enabled));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
