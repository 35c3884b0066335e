//! Family I — SR-IOV virtual port inventory, ported from `vports_service.py`.
//! `VNODES` (virtual node descriptors under a physical NodeGuid) is the
//! primary source; `VPORTS` only contributes a per-physical-node count used
//! in the summary.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::DatasetInventory;

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let vnodes = inventory.read_table("VNODES");
    let vports = inventory.read_table("VPORTS");
    if vnodes.is_empty() && vports.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = inventory.topology().ok();

    let mut rows = Vec::with_capacity(vnodes.len());
    let mut vnode_counts: HashMap<String, usize> = HashMap::new();
    let mut vport_counts: HashMap<String, usize> = HashMap::new();

    for row in &vnodes.rows {
        let phys_node_guid = cell_str(&vnodes, row, "NodeGuid");
        let vnode_guid = cell_str(&vnodes, row, "VNodeGuid");
        let vnode_desc = cell_str(&vnodes, row, "VNodeDesc");
        let vport_index = cell_i64_or_zero(&vnodes, row, "VPortIndex");
        let v_num_ports = cell_i64_or_zero(&vnodes, row, "VNumberOfPorts");

        let phys_node_name = topo.and_then(|t| t.node_label(&phys_node_guid)).unwrap_or(&phys_node_guid).to_string();
        *vnode_counts.entry(phys_node_guid.clone()).or_insert(0) += 1;

        let mut obj = Map::new();
        obj.insert("PhysicalNodeGUID".into(), Value::String(phys_node_guid));
        obj.insert("PhysicalNodeName".into(), Value::String(phys_node_name));
        obj.insert("VNodeGUID".into(), Value::String(vnode_guid));
        obj.insert("VNodeDescription".into(), Value::String(if vnode_desc == "nan" { String::new() } else { vnode_desc }));
        obj.insert("VPortIndex".into(), Value::from(vport_index));
        obj.insert("VirtualPorts".into(), Value::from(v_num_ports));
        obj.insert("Type".into(), Value::String("VNode".to_string()));
        rows.push(obj);
    }
    rows.truncate(2000);

    for row in &vports.rows {
        let phys_node_guid = cell_str(&vports, row, "NodeGuid");
        *vport_counts.entry(phys_node_guid).or_insert(0) += 1;
    }

    let total_vnodes = vnodes.len();
    let total_vports = vports.len();
    let vnodes_per_node: Vec<usize> = vnode_counts.values().copied().collect();
    let avg_vnodes = if vnodes_per_node.is_empty() { 0.0 } else { vnodes_per_node.iter().sum::<usize>() as f64 / vnodes_per_node.len() as f64 };
    let max_vnodes = vnodes_per_node.iter().copied().max().unwrap_or(0);

    let mut summary = Map::new();
    summary.insert("total_vnodes".into(), Value::from(total_vnodes));
    summary.insert("total_vports".into(), Value::from(total_vports));
    summary.insert("physical_nodes_with_vnodes".into(), Value::from(vnode_counts.len()));
    summary.insert("physical_nodes_with_vports".into(), Value::from(vport_counts.len()));
    summary.insert("avg_vnodes_per_physical".into(), Value::from((avg_vnodes * 10.0).round() / 10.0));
    summary.insert("max_vnodes_per_physical".into(), Value::from(max_vnodes));
    summary.insert("virtualization_enabled".into(), Value::from(total_vnodes > 0 || total_vports > 0));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
