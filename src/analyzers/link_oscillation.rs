//! Family H — link flap (oscillation) detection, ported from
//! `link_oscillation_service.py`.
//!
//! Pairs up both ends of a physical link via topology neighbor lookup,
//! sums `LinkDownedCounter`/`LinkDownedCounterExt` per side, and reports the
//! worst-flapping paths (spec.md §4.4 Family H).

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::AnalyzerOutput;
use crate::anomaly::AnomalyFrame;
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory};

const MAX_ROWS: usize = 200;

fn classify(total_flaps: f64) -> &'static str {
    if total_flaps >= 100.0 {
        "critical"
    } else if total_flaps >= 20.0 {
        "warning"
    } else {
        "info"
    }
}

fn vendor_name(vendor_id: i64, node_desc: &str) -> String {
    match vendor_id {
        713 | 32832 => return "NVIDIA".to_string(),
        4319 => return "OEM".to_string(),
        _ => {},
    }
    let lower = node_desc.to_ascii_lowercase();
    if lower.contains("nvidia") {
        "NVIDIA".to_string()
    } else if lower.contains("mellanox") {
        "Mellanox".to_string()
    } else if vendor_id != 0 {
        format!("Vendor {vendor_id}")
    } else {
        "Unknown".to_string()
    }
}

struct NodeMeta {
    node_desc: String,
    device_id: i64,
    vendor: String,
}

struct Endpoint {
    node_desc: String,
    port_number: u32,
    device_id: i64,
    lid: i64,
    vendor: String,
    link_down_total: f64,
    link_down_ext: f64,
    link_down_base: f64,
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let pm_info = inventory.read_table("PM_INFO");
    if pm_info.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let nodes = inventory.read_table("NODES");
    let mut node_meta: HashMap<String, NodeMeta> = HashMap::new();
    for row in &nodes.rows {
        let guid = normalize_guid(&nodes.get(row, "NodeGUID").to_string());
        if guid.is_empty() {
            continue;
        }
        let desc = nodes.get(row, "NodeDesc").to_string().trim_matches('"').to_string();
        let device_id = nodes.get(row, "DeviceID").as_i64_or_zero();
        let vendor_id = nodes.get(row, "VendorID").as_i64_or_zero();
        node_meta.insert(guid, NodeMeta { vendor: vendor_name(vendor_id, &desc), node_desc: desc, device_id });
    }

    let ports = inventory.read_table("PORTS");
    let mut port_lid: HashMap<(String, u32), i64> = HashMap::new();
    for row in &ports.rows {
        let guid = normalize_guid(&ports.get(row, "NodeGuid").to_string());
        if guid.is_empty() {
            continue;
        }
        if let Some(port_num) = parse_port_number(&ports.get(row, "PortNum").to_string()) {
            port_lid.insert((guid, port_num), ports.get(row, "LID").as_i64_or_zero());
        }
    }

    type PairKey = ((String, u32), (String, u32));
    struct PairEntry {
        node_a: Option<Endpoint>,
        node_b: Option<Endpoint>,
        total_link_flaps: f64,
    }
    let mut pairs: HashMap<PairKey, PairEntry> = HashMap::new();

    for row in &pm_info.rows {
        let guid = normalize_guid(&pm_info.get(row, "NodeGUID").to_string());
        let Some(port_number) = parse_port_number(&pm_info.get(row, "PortNumber").to_string()) else { continue };
        let base = pm_info.get(row, "LinkDownedCounter").as_f64_or_zero();
        let ext = pm_info.get(row, "LinkDownedCounterExt").as_f64_or_zero();
        let total = base + ext;
        if total <= 0.0 {
            continue;
        }

        let Some(neighbor_guid) = topo.attached_guid(&guid, port_number) else { continue };
        let Some(neighbor_port) = topo.attached_port(&guid, port_number) else { continue };
        let neighbor_guid = neighbor_guid.to_string();

        let mut endpoints = [(guid.clone(), port_number), (neighbor_guid.clone(), neighbor_port)];
        endpoints.sort();
        let key: PairKey = (endpoints[0].clone(), endpoints[1].clone());

        let meta = node_meta.get(&guid);
        let endpoint = Endpoint {
            node_desc: meta.map(|m| m.node_desc.clone()).unwrap_or_else(|| guid.clone()),
            port_number,
            device_id: meta.map(|m| m.device_id).unwrap_or(0),
            lid: port_lid.get(&(guid.clone(), port_number)).copied().unwrap_or(0),
            vendor: meta.map(|m| m.vendor.clone()).unwrap_or_else(|| "Unknown".to_string()),
            link_down_total: total,
            link_down_ext: ext,
            link_down_base: base,
        };

        let entry = pairs.entry(key).or_insert_with(|| PairEntry { node_a: None, node_b: None, total_link_flaps: 0.0 });
        entry.total_link_flaps += endpoint.link_down_total;
        if endpoints[0] == (guid.clone(), port_number) {
            entry.node_a = Some(endpoint);
        } else {
            entry.node_b = Some(endpoint);
        }
    }

    let mut records = Vec::new();
    for entry in pairs.into_values() {
        let (Some(a), Some(b)) = (entry.node_a, entry.node_b) else { continue };
        let severity = classify(entry.total_link_flaps);

        let mut obj = Map::new();
        obj.insert("NodeDesc1".into(), Value::String(a.node_desc.clone()));
        obj.insert("PortNum1".into(), Value::from(a.port_number));
        obj.insert("DeviceID1".into(), Value::from(a.device_id));
        obj.insert("LID1".into(), Value::from(a.lid));
        obj.insert("Vendor1".into(), Value::String(a.vendor.clone()));
        obj.insert("LinkDownedCounter1".into(), Value::from(a.link_down_total));
        obj.insert("LinkDownedCounterExt1".into(), Value::from(a.link_down_ext));
        obj.insert("LinkDownedCounterBase1".into(), Value::from(a.link_down_base));
        obj.insert("NodeDesc2".into(), Value::String(b.node_desc.clone()));
        obj.insert("PortNum2".into(), Value::from(b.port_number));
        obj.insert("DeviceID2".into(), Value::from(b.device_id));
        obj.insert("LID2".into(), Value::from(b.lid));
        obj.insert("Vendor2".into(), Value::String(b.vendor.clone()));
        obj.insert("LinkDownedCounter2".into(), Value::from(b.link_down_total));
        obj.insert("LinkDownedCounterExt2".into(), Value::from(b.link_down_ext));
        obj.insert("LinkDownedCounterBase2".into(), Value::from(b.link_down_base));
        obj.insert("TotalLinkFlaps".into(), Value::from(entry.total_link_flaps));
        obj.insert("Severity".into(), Value::String(severity.to_string()));

        records.push((entry.total_link_flaps, severity, a.node_desc, b.node_desc, obj));
    }

    if records.is_empty() {
        return AnalyzerOutput::empty();
    }

    records.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    let total_paths = records.len();
    let critical_paths = records.iter().filter(|r| r.1 == "critical").count();
    let warning_paths = records.iter().filter(|r| r.1 == "warning").count();

    let trimmed: Vec<_> = records.into_iter().take(MAX_ROWS).collect();
    let (max_flaps, _, top_node_a, top_node_b, _) = &trimmed[0];

    let mut summary = Map::new();
    summary.insert("total_paths".into(), Value::from(total_paths));
    summary.insert("critical_paths".into(), Value::from(critical_paths));
    summary.insert("warning_paths".into(), Value::from(warning_paths));
    summary.insert("max_link_flaps".into(), Value::from(*max_flaps));
    let mut top_path = Map::new();
    top_path.insert("node_a".into(), Value::String(top_node_a.clone()));
    top_path.insert("node_b".into(), Value::String(top_node_b.clone()));
    top_path.insert("total_flaps".into(), Value::from(*max_flaps));
    summary.insert("top_path".into(), Value::Object(top_path));
    summary.insert("preview_rows".into(), Value::from(trimmed.len()));

    let rows = trimmed.into_iter().map(|(_, _, _, _, obj)| obj).collect();

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_thresholds() {
        assert_eq!(classify(150.0), "critical");
        assert_eq!(classify(25.0), "warning");
        assert_eq!(classify(5.0), "info");
    }

    #[test]
    fn vendor_name_recognizes_known_ids() {
        assert_eq!(vendor_name(713, ""), "NVIDIA");
        assert_eq!(vendor_name(0, "some mellanox switch"), "Mellanox");
        assert_eq!(vendor_name(0, "generic"), "Unknown");
    }
}
