//! Family I — neighbor-link speed/width agreement, ported from
//! `neighbors_service.py`. `NEIGHBORS_INFO` carries both local and neighbor
//! link properties per row, so mismatches are detected without a join.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory};

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let neighbors = inventory.read_table("NEIGHBORS_INFO");
    if neighbors.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut entries = Vec::with_capacity(neighbors.len());
    let mut node_connections: HashMap<String, usize> = HashMap::new();
    let mut speed_distribution: HashMap<String, usize> = HashMap::new();
    let mut width_distribution: HashMap<String, usize> = HashMap::new();
    let mut port_type_counts: HashMap<String, usize> = HashMap::new();
    let mut mtu_distribution: HashMap<i64, usize> = HashMap::new();
    let mut mismatched_speeds = 0usize;
    let mut mismatched_widths = 0usize;

    for row in &neighbors.rows {
        let guid = normalize_guid(&cell_str(&neighbors, row, "NodeGuid"));
        let port = parse_port_number(&cell_str(&neighbors, row, "PortNum"));
        let neighbor_guid = normalize_guid(&cell_str(&neighbors, row, "NeighborNodeGuid"));
        let neighbor_port = cell_i64_or_zero(&neighbors, row, "NeighborPortNum");

        let local_speed = cell_str(&neighbors, row, "LinkSpeedActive");
        let remote_speed = cell_str(&neighbors, row, "NeighborLinkSpeedActive");
        let local_width = cell_str(&neighbors, row, "LinkWidthActive");
        let remote_width = cell_str(&neighbors, row, "NeighborLinkWidthActive");
        let mtu = cell_i64_or_zero(&neighbors, row, "MTU");
        let port_type = cell_str(&neighbors, row, "PortType");

        *port_type_counts.entry(if port_type.is_empty() { "Unknown".to_string() } else { port_type.clone() }).or_insert(0) += 1;
        *node_connections.entry(guid.clone()).or_insert(0) += 1;
        if !local_speed.is_empty() {
            *speed_distribution.entry(local_speed.clone()).or_insert(0) += 1;
        }
        if !local_width.is_empty() {
            *width_distribution.entry(local_width.clone()).or_insert(0) += 1;
        }
        if mtu > 0 {
            *mtu_distribution.entry(mtu).or_insert(0) += 1;
        }

        let mut issues = Vec::new();
        let mut severity = "normal";
        if !local_speed.is_empty() && !remote_speed.is_empty() && local_speed != remote_speed {
            issues.push(format!("Speed mismatch: {local_speed} vs {remote_speed}"));
            severity = "warning";
            mismatched_speeds += 1;
        }
        if !local_width.is_empty() && !remote_width.is_empty() && local_width != remote_width {
            issues.push(format!("Width mismatch: {local_width} vs {remote_width}"));
            severity = "warning";
            mismatched_widths += 1;
        }

        let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();
        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(node_name.clone()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("NeighborGUID".into(), Value::String(neighbor_guid.clone()));
        obj.insert("NeighborName".into(), Value::String(topo.node_label(&neighbor_guid).unwrap_or(&neighbor_guid).to_string()));
        obj.insert("NeighborPort".into(), Value::from(neighbor_port));
        obj.insert("LinkSpeed".into(), Value::String(local_speed));
        obj.insert("LinkWidth".into(), Value::String(local_width));
        obj.insert("MTU".into(), Value::from(mtu));
        obj.insert("PortType".into(), Value::String(port_type));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        let rank = if severity == "warning" { 0 } else { 1 };
        entries.push((rank, node_name, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, obj)| obj).collect();

    let total_nodes = node_connections.len();
    let avg_connections = if total_nodes == 0 { 0.0 } else { node_connections.values().sum::<usize>() as f64 / total_nodes as f64 };
    let max_connections = node_connections.values().copied().max().unwrap_or(0);

    let mut summary = Map::new();
    summary.insert("total_neighbor_entries".into(), Value::from(neighbors.len()));
    summary.insert("unique_nodes".into(), Value::from(total_nodes));
    summary.insert("avg_connections_per_node".into(), Value::from((avg_connections * 10.0).round() / 10.0));
    summary.insert("max_connections_per_node".into(), Value::from(max_connections));
    summary.insert("mismatched_speeds".into(), Value::from(mismatched_speeds));
    summary.insert("mismatched_widths".into(), Value::from(mismatched_widths));
    summary.insert("speed_distribution".into(), Value::Object(speed_distribution.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("width_distribution".into(), Value::Object(width_distribution.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("port_type_distribution".into(), Value::Object(port_type_counts.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert(
        "mtu_distribution".into(),
        Value::Object(mtu_distribution.into_iter().map(|(k, v)| (k.to_string(), Value::from(v))).collect()),
    );

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
