//! Family I — SHARP (Scalable Hierarchical Aggregation and Reduction
//! Protocol) aggregation-node configuration, ported from `sharp_service.py`.
//! `SHARP_AN_INFO` is a per-switch capability table used by AI/ML clusters.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_guid, cell_i64_or_zero, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::DatasetInventory;

const DATA_TYPE_NAMES: &[&str] = &[
    "INT8", "INT16", "INT32", "INT64", "UINT8", "UINT16", "UINT32", "UINT64", "FLOAT16", "FLOAT32", "FLOAT64",
    "BFLOAT16",
];

fn decode_data_types(bitmask: i64) -> Vec<String> {
    let types: Vec<String> =
        DATA_TYPE_NAMES.iter().enumerate().filter(|(i, _)| bitmask & (1 << i) != 0).map(|(_, n)| n.to_string()).collect();
    if types.is_empty() {
        vec!["Unknown".to_string()]
    } else {
        types
    }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let sharp = inventory.read_table("SHARP_AN_INFO");
    if sharp.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut rows = Vec::with_capacity(sharp.len());
    let mut total_tree_capacity = 0i64;
    let mut total_jobs_capacity = 0i64;
    let mut max_qps = 0i64;
    let mut sharp_versions: HashSet<i64> = HashSet::new();
    let mut last_data_types = 0i64;

    for row in &sharp.rows {
        let guid = cell_guid(&sharp, row, &["GUID", "NodeGUID"]);
        let lid = cell_i64_or_zero(&sharp, row, "LID");

        let tree_table_size = cell_i64_or_zero(&sharp, row, "tree_table_size");
        let tree_radix = cell_i64_or_zero(&sharp, row, "tree_radix");
        let group_table_size = cell_i64_or_zero(&sharp, row, "group_table_size");
        let max_group_num = cell_i64_or_zero(&sharp, row, "max_group_num");
        let num_jobs = cell_i64_or_zero(&sharp, row, "num_of_jobs");
        let max_num_qps = cell_i64_or_zero(&sharp, row, "max_num_qps");
        let max_agg_payload = cell_i64_or_zero(&sharp, row, "max_aggregation_payload");
        let num_semaphores = cell_i64_or_zero(&sharp, row, "num_semaphores");
        let line_size = cell_i64_or_zero(&sharp, row, "line_size");

        let sharp_version = cell_i64_or_zero(&sharp, row, "sharp_version_supported_bit_mask");
        let active_class_version = cell_i64_or_zero(&sharp, row, "active_class_version");
        let data_types_supported = cell_i64_or_zero(&sharp, row, "data_types_supported");
        let mtu_support = cell_i64_or_zero(&sharp, row, "mtu_support");

        let endianness = cell_i64_or_zero(&sharp, row, "endianness");
        let reproducibility_disabled = cell_i64_or_zero(&sharp, row, "reproducibility_disable") != 0;
        let an_sat_qp_supported = cell_i64_or_zero(&sharp, row, "an_sat_qp_info_supported") != 0;

        total_tree_capacity += tree_table_size;
        total_jobs_capacity += num_jobs;
        max_qps = max_qps.max(max_num_qps);
        if sharp_version != 0 {
            sharp_versions.insert(sharp_version);
        }
        last_data_types = data_types_supported;

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        obj.insert("LID".into(), Value::from(lid));
        obj.insert("TreeTableSize".into(), Value::from(tree_table_size));
        obj.insert("TreeRadix".into(), Value::from(tree_radix));
        obj.insert("GroupTableSize".into(), Value::from(group_table_size));
        obj.insert("MaxGroupNum".into(), Value::from(max_group_num));
        obj.insert("NumJobs".into(), Value::from(num_jobs));
        obj.insert("MaxQPs".into(), Value::from(max_num_qps));
        obj.insert("MaxAggPayload".into(), Value::from(max_agg_payload));
        obj.insert("NumSemaphores".into(), Value::from(num_semaphores));
        obj.insert("LineSize".into(), Value::from(line_size));
        obj.insert("SharpVersion".into(), Value::from(sharp_version));
        obj.insert("ActiveClassVersion".into(), Value::from(active_class_version));
        obj.insert("DataTypesSupported".into(), Value::from(data_types_supported));
        obj.insert("MTUSupport".into(), Value::from(mtu_support));
        obj.insert("Endianness".into(), Value::String(if endianness != 0 { "Big" } else { "Little" }.to_string()));
        obj.insert("ReproducibilityDisabled".into(), Value::from(reproducibility_disabled));
        obj.insert("ANSatQPSupported".into(), Value::from(an_sat_qp_supported));
        rows.push(obj);
    }
    rows.truncate(2000);

    let total = sharp.len().max(1) as f64;
    let mut summary = Map::new();
    summary.insert("total_sharp_nodes".into(), Value::from(sharp.len()));
    summary.insert("sharp_enabled".into(), Value::from(!sharp.is_empty()));
    summary.insert("total_tree_capacity".into(), Value::from(total_tree_capacity));
    summary.insert("total_jobs_capacity".into(), Value::from(total_jobs_capacity));
    summary.insert("max_qps_per_node".into(), Value::from(max_qps));
    summary.insert("avg_tree_size".into(), Value::from((total_tree_capacity as f64 / total * 10.0).round() / 10.0));
    summary.insert("avg_jobs_per_node".into(), Value::from((total_jobs_capacity as f64 / total * 10.0).round() / 10.0));
    let mut versions: Vec<i64> = sharp_versions.into_iter().collect();
    versions.sort();
    summary.insert("sharp_versions".into(), Value::from(versions));
    summary.insert(
        "data_types_supported".into(),
        Value::from(decode_data_types(last_data_types)),
    );

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_bitmask() {
        assert_eq!(decode_data_types(0b11), vec!["INT8", "INT16"]);
        assert_eq!(decode_data_types(0), vec!["Unknown"]);
    }
}
