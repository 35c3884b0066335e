//! Family I — hardware inventory and run metadata, ported from
//! `system_info_service.py`. `SYSTEM_GENERAL_INFORMATION` lists per-node
//! serial/part/revision/product data; `RUN_INFO` is a single-row table of
//! ibdiagnet tool versions and invocation arguments folded into the summary.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::DatasetInventory;

fn clean_string(raw: String) -> String {
    let s = raw.trim();
    let s = if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 { &s[1..s.len() - 1] } else { s };
    if s.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        s.to_string()
    }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let sys_df = inventory.read_table("SYSTEM_GENERAL_INFORMATION");
    let run_df = inventory.read_table("RUN_INFO");

    let mut run_info = Map::new();
    if let Some(row) = run_df.rows.first() {
        run_info.insert("ibdiagnet_version".into(), Value::String(clean_string(cell_str(&run_df, row, "IBDIAGNET_Version"))));
        run_info.insert("ibdiag_version".into(), Value::String(clean_string(cell_str(&run_df, row, "IBDIAG_Version"))));
        run_info.insert("ibdm_version".into(), Value::String(clean_string(cell_str(&run_df, row, "IBDM_Version"))));
        run_info.insert("ibis_version".into(), Value::String(clean_string(cell_str(&run_df, row, "IBIS_Version"))));
        run_info.insert("run_date".into(), Value::String(clean_string(cell_str(&run_df, row, "Date"))));
        run_info.insert("run_args".into(), Value::String(clean_string(cell_str(&run_df, row, "Args"))));
    }

    let mut rows = Vec::with_capacity(sys_df.len());
    if !sys_df.is_empty() {
        let topo = inventory.topology().ok();
        for row in &sys_df.rows {
            let node_guid = cell_str(&sys_df, row, "NodeGuid");
            let serial_number = clean_string(cell_str(&sys_df, row, "SerialNumber"));
            let part_number = clean_string(cell_str(&sys_df, row, "PartNumber"));
            let revision = clean_string(cell_str(&sys_df, row, "Revision"));
            let product_name = clean_string(cell_str(&sys_df, row, "ProductName"));

            let node_name = topo.and_then(|t| t.node_label(&node_guid)).unwrap_or(&node_guid).to_string();

            let mut obj = Map::new();
            obj.insert("NodeGUID".into(), Value::String(node_guid));
            obj.insert("NodeName".into(), Value::String(node_name));
            obj.insert("SerialNumber".into(), Value::String(serial_number));
            obj.insert("PartNumber".into(), Value::String(part_number));
            obj.insert("Revision".into(), Value::String(revision));
            obj.insert("ProductName".into(), Value::String(product_name));
            rows.push(obj);
        }
    }
    rows.truncate(2000);

    let mut product_counts: HashMap<String, usize> = HashMap::new();
    let mut revision_counts: HashMap<String, usize> = HashMap::new();
    let mut unique_serials = std::collections::HashSet::new();
    for obj in &rows {
        if let Some(Value::String(p)) = obj.get("ProductName") {
            if !p.is_empty() {
                *product_counts.entry(p.clone()).or_insert(0) += 1;
            }
        }
        if let Some(Value::String(r)) = obj.get("Revision") {
            if !r.is_empty() {
                *revision_counts.entry(r.clone()).or_insert(0) += 1;
            }
        }
        if let Some(Value::String(s)) = obj.get("SerialNumber") {
            if !s.is_empty() {
                unique_serials.insert(s.clone());
            }
        }
    }
    let product_types = product_counts.len();
    let revision_types = revision_counts.len();
    let mut top_products: Vec<(String, usize)> = product_counts.into_iter().collect();
    top_products.sort_by(|a, b| b.1.cmp(&a.1));
    top_products.truncate(10);
    let mut sorted_revisions: Vec<(String, usize)> = revision_counts.into_iter().collect();
    sorted_revisions.sort_by(|a, b| a.0.cmp(&b.0));

    let mut summary = Map::new();
    summary.insert("total_devices".into(), Value::from(rows.len()));
    summary.insert("unique_serials".into(), Value::from(unique_serials.len()));
    summary.insert("product_types".into(), Value::from(product_types));
    summary.insert("revision_types".into(), Value::from(revision_types));
    summary.insert("product_distribution".into(), Value::Object(top_products.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("revisions".into(), Value::Object(sorted_revisions.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    for (k, v) in run_info {
        summary.insert(k, v);
    }

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
