//! Family I — multi-plane port hierarchy, ported from
//! `port_hierarchy_service.py`. `PORT_HIERARCHY_INFO` carries a tier number
//! per port; tiers map to conventional spine/leaf role names.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory};

fn tier_to_role(tier: i64) -> String {
    match tier {
        0 => "Edge".to_string(),
        1 => "Leaf".to_string(),
        2 => "Spine".to_string(),
        3 => "Super-Spine".to_string(),
        4 => "Core".to_string(),
        other => format!("Tier-{other}"),
    }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let hierarchy = inventory.read_table("PORT_HIERARCHY_INFO");
    if hierarchy.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut rows = Vec::with_capacity(hierarchy.len());
    let mut plane_nodes: HashMap<i64, HashSet<String>> = HashMap::new();
    let mut tier_counts: HashMap<i64, usize> = HashMap::new();
    let mut role_counts: HashMap<String, usize> = HashMap::new();
    let mut unique_nodes: HashSet<String> = HashSet::new();

    for row in &hierarchy.rows {
        let guid = normalize_guid(&cell_str(&hierarchy, row, "NodeGuid"));
        let port_num = parse_port_number(&cell_str(&hierarchy, row, "PortNum"));
        let plane_num = cell_i64_or_zero(&hierarchy, row, "PlaneNum");
        let tier = cell_i64_or_zero(&hierarchy, row, "Tier");
        let is_smp = cell_i64_or_zero(&hierarchy, row, "IsSMP") != 0;
        let is_enhanced = cell_i64_or_zero(&hierarchy, row, "IsEnhanced") != 0;

        let role = tier_to_role(tier);
        plane_nodes.entry(plane_num).or_default().insert(guid.clone());
        *tier_counts.entry(tier).or_insert(0) += 1;
        *role_counts.entry(role.clone()).or_insert(0) += 1;
        unique_nodes.insert(guid.clone());

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        if let Some(p) = port_num {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("PlaneNumber".into(), Value::from(plane_num));
        obj.insert("Tier".into(), Value::from(tier));
        obj.insert("Role".into(), Value::String(role));
        obj.insert("IsSMP".into(), Value::from(is_smp));
        obj.insert("IsEnhanced".into(), Value::from(is_enhanced));
        rows.push(obj);
    }
    rows.truncate(2000);

    let mut summary = Map::new();
    summary.insert("total_ports".into(), Value::from(hierarchy.len()));
    summary.insert("unique_nodes".into(), Value::from(unique_nodes.len()));
    summary.insert("plane_count".into(), Value::from(plane_nodes.len()));
    summary.insert(
        "planes".into(),
        Value::Object(plane_nodes.iter().map(|(k, v)| (k.to_string(), Value::from(v.len()))).collect()),
    );
    summary.insert(
        "tier_distribution".into(),
        Value::Object(tier_counts.into_iter().map(|(k, v)| (k.to_string(), Value::from(v))).collect()),
    );
    summary.insert(
        "role_distribution".into(),
        Value::Object(role_counts.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
    );
    summary.insert("is_multi_plane".into(), Value::from(plane_nodes.len() > 1));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_names_match_known_roles() {
        assert_eq!(tier_to_role(2), "Spine");
        assert_eq!(tier_to_role(9), "Tier-9");
    }
}
