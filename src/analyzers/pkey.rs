//! Family I — partition key (PKEY) inventory, ported from `pkey_service.py`.
//! Tracks partition membership and isolation coverage across `PKEY`.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory};

const DEFAULT_PKEY: i64 = 0x7fff;

fn parse_pkey(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if let Some(hex) = trimmed.to_ascii_lowercase().strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    trimmed.parse::<f64>().map(|v| v as i64).unwrap_or(0)
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let pkey = inventory.read_table("PKEY");
    if pkey.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut entries = Vec::with_capacity(pkey.len());
    let mut pkey_usage: HashMap<String, HashSet<String>> = HashMap::new();
    let mut node_pkeys: HashMap<String, HashSet<String>> = HashMap::new();

    for row in &pkey.rows {
        let guid = normalize_guid(&cell_str(&pkey, row, "NodeGUID"));
        let port = parse_port_number(&cell_str(&pkey, row, "LocalPortNum"));
        let pkey_raw = cell_str(&pkey, row, "PKey");
        let pkey_value = parse_pkey(&pkey_raw);
        if pkey_value == 0 {
            continue;
        }
        let pkey_str = format!("0x{pkey_value:04x}");
        let membership = cell_i64_or_zero(&pkey, row, "Membership");

        pkey_usage.entry(pkey_str.clone()).or_default().insert(guid.clone());
        node_pkeys.entry(guid.clone()).or_default().insert(pkey_str.clone());

        let membership_type = match membership {
            1 => "Full".to_string(),
            0 => "Limited".to_string(),
            other => format!("Unknown({other})"),
        };

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("PKey".into(), Value::String(pkey_str));
        obj.insert("PKeyValue".into(), Value::from(pkey_value));
        obj.insert("Membership".into(), Value::from(membership));
        obj.insert("MembershipType".into(), Value::String(membership_type));
        obj.insert("IsDefaultPartition".into(), Value::from(pkey_value == DEFAULT_PKEY));

        entries.push((pkey_value, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, obj)| obj).collect();

    if rows.is_empty() {
        return AnalyzerOutput::empty();
    }

    let multi_partition_nodes = node_pkeys.values().filter(|p| p.len() > 1).count();
    let mut partition_sizes: Vec<(String, usize)> = pkey_usage.iter().map(|(k, v)| (k.clone(), v.len())).collect();
    partition_sizes.sort_by(|a, b| b.1.cmp(&a.1));
    let largest_partitions: Map<String, Value> = partition_sizes.iter().take(5).map(|(k, v)| (k.clone(), Value::from(*v))).collect();
    let default_pkey_str = format!("0x{DEFAULT_PKEY:04x}");
    let default_partition_nodes = pkey_usage.get(&default_pkey_str).map(|s| s.len()).unwrap_or(0);

    let mut summary = Map::new();
    summary.insert("total_pkey_entries".into(), Value::from(rows.len()));
    summary.insert("unique_partitions".into(), Value::from(pkey_usage.len()));
    summary.insert("unique_nodes".into(), Value::from(node_pkeys.len()));
    summary.insert("nodes_with_multiple_partitions".into(), Value::from(multi_partition_nodes));
    summary.insert("default_partition_nodes".into(), Value::from(default_partition_nodes));
    summary.insert("largest_partitions".into(), Value::Object(largest_partitions));
    summary.insert("isolation_enabled".into(), Value::from(pkey_usage.len() > 1));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal_pkeys() {
        assert_eq!(parse_pkey("0x7fff"), 0x7fff);
        assert_eq!(parse_pkey("32767"), 32767);
    }
}
