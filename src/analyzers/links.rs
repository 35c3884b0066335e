//! Family F — node-to-node connectivity, ported from `links_service.py`.
//!
//! Reads `LINKS` directly (it already carries both endpoints per row) and
//! flags asymmetric connections: a reverse link whose recorded far end
//! doesn't point back at the forward link's near end (spec.md §4.4 Family F).

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::analyzers::support::AnalyzerOutput;
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory};

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let links = inventory.read_table("LINKS");
    if links.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut rows = Vec::with_capacity(links.len());
    let mut connections: HashMap<(String, u32), (String, u32)> = HashMap::new();
    let mut node_ports: HashMap<String, HashSet<u32>> = HashMap::new();

    for row in &links.rows {
        let node1 = normalize_guid(&links.get(row, "NodeGuid1").to_string());
        let port1 = parse_port_number(&links.get(row, "PortNum1").to_string()).unwrap_or(0);
        let node2 = normalize_guid(&links.get(row, "NodeGuid2").to_string());
        let port2 = parse_port_number(&links.get(row, "PortNum2").to_string()).unwrap_or(0);

        connections.insert((node1.clone(), port1), (node2.clone(), port2));
        node_ports.entry(node1.clone()).or_default().insert(port1);
        node_ports.entry(node2.clone()).or_default().insert(port2);

        let name1 = topo.node_label(&node1).unwrap_or(&node1).to_string();
        let name2 = topo.node_label(&node2).unwrap_or(&node2).to_string();

        let mut obj = Map::new();
        obj.insert("NodeGUID1".into(), Value::String(node1.clone()));
        obj.insert("NodeName1".into(), Value::String(name1.clone()));
        obj.insert("PortNumber1".into(), Value::from(port1));
        obj.insert("NodeGUID2".into(), Value::String(node2.clone()));
        obj.insert("NodeName2".into(), Value::String(name2.clone()));
        obj.insert("PortNumber2".into(), Value::from(port2));
        obj.insert("LinkDescription".into(), Value::String(format!("{name1}:{port1} <-> {name2}:{port2}")));
        rows.push(obj);
    }

    let mut anomalies = AnomalyFrame::new();
    let mut asymmetric_count = 0usize;
    for ((node1, port1), (node2, port2)) in &connections {
        if let Some(reverse_target) = connections.get(&(node2.clone(), *port2)) {
            if reverse_target != &(node1.clone(), *port1) {
                anomalies.push(node1, Some(*port1), AnomalyKind::LinkAsymmetric, 0.5);
                asymmetric_count += 1;
            }
        }
    }

    let unique_nodes: HashSet<&String> = node_ports.keys().collect();
    let port_counts: Vec<usize> = node_ports.values().map(|s| s.len()).collect();
    let avg_ports = if port_counts.is_empty() {
        0.0
    } else {
        (port_counts.iter().sum::<usize>() as f64 / port_counts.len() as f64 * 10.0).round() / 10.0
    };

    let mut summary = Map::new();
    summary.insert("total_links".into(), Value::from(rows.len()));
    summary.insert("unique_nodes".into(), Value::from(unique_nodes.len()));
    summary.insert("avg_ports_per_node".into(), Value::from(avg_ports));
    summary.insert("max_ports_per_node".into(), Value::from(port_counts.iter().copied().max().unwrap_or(0)));
    summary.insert("min_ports_per_node".into(), Value::from(port_counts.iter().copied().min().unwrap_or(0)));
    summary.insert("asymmetric_links".into(), Value::from(asymmetric_count));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_dump(links: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "START_LINKS\nNodeGuid1,PortNum1,NodeGuid2,PortNum2\n{links}END_LINKS\n").unwrap();
        file
    }

    #[test]
    fn symmetric_links_raise_no_anomaly() {
        let file = sample_dump("0x1,1,0x2,3\n0x2,3,0x1,1\n");
        let inventory = DatasetInventory::new(file.path());
        let out = run(&inventory);
        assert_eq!(out.summary.get("asymmetric_links").unwrap(), &Value::from(0));
    }

    #[test]
    fn one_way_link_is_asymmetric() {
        let file = sample_dump("0x1,1,0x2,3\n0x2,3,0x9,9\n");
        let inventory = DatasetInventory::new(file.path());
        let out = run(&inventory);
        assert!(out.summary.get("asymmetric_links").unwrap().as_u64().unwrap() > 0);
    }
}
