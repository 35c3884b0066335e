//! Brief Merger (spec.md §4.5), ported from `brief_service.py`.
//!
//! Builds the "Analysis Brief" table: start from xmit rows, left-join cable
//! and ber on `(NodeGUID, PortNumber)` (xmit wins on column collision), then
//! left-join hca on `NodeGUID` alone, and project onto a fixed display
//! column list.

use serde_json::{Map, Value};

/// Fixed display columns (spec.md §4.5); columns absent from every input are
/// dropped rather than padded with null.
const DISPLAY_COLUMNS: &[&str] = &[
    "Index",
    "NodeGUID",
    "Node Name",
    "Node Type",
    "PortNumber",
    "Attached To",
    "Attached To Type",
    "Attached To Port",
    "Xmit Wait",
    "Xmit Data",
    "PortState",
    "PortPhyState",
    "NeighborPortState",
    "NeighborPortPhyState",
    "LinkDownedCounter",
    "LinkErrorRecoveryCounter",
    "Temperature (c)",
    "Vendor",
    "PN",
    "FW",
    "FWInfo_PSID",
    "ActiveLinkWidth",
    "SupportedLinkWidth",
    "ActiveLinkSpeed",
    "SupportedLinkSpeed",
    "LinkComplianceStatus",
];

fn port_port_key(row: &Map<String, Value>) -> Option<(String, i64)> {
    let guid = row.get("NodeGUID")?.as_str()?.to_string();
    let port = row.get("PortNumber").and_then(value_as_i64)?;
    Some((guid, port))
}

fn value_as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn index_by_port(rows: &[Map<String, Value>]) -> std::collections::HashMap<(String, i64), &Map<String, Value>> {
    let mut index = std::collections::HashMap::new();
    for row in rows {
        if let Some(key) = port_port_key(row) {
            index.entry(key).or_insert(row);
        }
    }
    index
}

fn index_by_guid(rows: &[Map<String, Value>]) -> std::collections::HashMap<String, &Map<String, Value>> {
    let mut index = std::collections::HashMap::new();
    for row in rows {
        if let Some(guid) = row.get("NodeGUID").and_then(|v| v.as_str()) {
            index.entry(guid.to_string()).or_insert(row);
        }
    }
    index
}

/// Merge xmit (primary), cable, ber, and hca rows into the brief table.
pub fn run(
    xmit_rows: &[Map<String, Value>],
    cable_rows: &[Map<String, Value>],
    ber_rows: &[Map<String, Value>],
    hca_rows: &[Map<String, Value>],
) -> Vec<Map<String, Value>> {
    let cable_index = index_by_port(cable_rows);
    let ber_index = index_by_port(ber_rows);
    let hca_index = index_by_guid(hca_rows);

    let mut merged = Vec::with_capacity(xmit_rows.len());
    for (i, base) in xmit_rows.iter().enumerate() {
        let mut row = base.clone();
        if let Some(key) = port_port_key(base) {
            if let Some(extra) = cable_index.get(&key) {
                for (k, v) in extra.iter() {
                    row.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            if let Some(extra) = ber_index.get(&key) {
                for (k, v) in extra.iter() {
                    row.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
        if let Some(guid) = base.get("NodeGUID").and_then(|v| v.as_str()) {
            if let Some(extra) = hca_index.get(guid) {
                for (k, v) in extra.iter() {
                    row.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
        row.insert("Index".to_string(), Value::from(i as i64 + 1));

        let mut projected = Map::new();
        for col in DISPLAY_COLUMNS {
            if let Some(v) = row.get(*col) {
                projected.insert((*col).to_string(), v.clone());
            }
        }
        merged.push(projected);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn empty_xmit_yields_empty_brief() {
        assert!(run(&[], &[], &[], &[]).is_empty());
    }

    #[test]
    fn joins_cable_ber_by_port_and_hca_by_guid() {
        let xmit = vec![obj(json!({"NodeGUID": "0x1", "PortNumber": 1, "Xmit Wait": 0.2, "PortState": "Active"}))];
        let cable = vec![obj(json!({"NodeGUID": "0x1", "PortNumber": 1, "Vendor": "Acme", "PN": "PN1"}))];
        let ber = vec![obj(json!({"NodeGUID": "0x1", "PortNumber": 1, "LinkComplianceStatus": "OK"}))];
        let hca = vec![obj(json!({"NodeGUID": "0x1", "FW": "1.2.3"}))];

        let merged = run(&xmit, &cable, &ber, &hca);
        assert_eq!(merged.len(), 1);
        let row = &merged[0];
        assert_eq!(row.get("Index"), Some(&Value::from(1)));
        assert_eq!(row.get("Vendor"), Some(&Value::String("Acme".to_string())));
        assert_eq!(row.get("FW"), Some(&Value::String("1.2.3".to_string())));
        assert_eq!(row.get("LinkComplianceStatus"), Some(&Value::String("OK".to_string())));
        assert_eq!(row.get("PN"), Some(&Value::String("PN1".to_string())));
    }

    #[test]
    fn xmit_value_wins_on_collision() {
        let xmit = vec![obj(json!({"NodeGUID": "0x1", "PortNumber": 1, "PortState": "Active"}))];
        let cable = vec![obj(json!({"NodeGUID": "0x1", "PortNumber": 1, "PortState": "Down"}))];
        let merged = run(&xmit, &cable, &[], &[]);
        assert_eq!(merged[0].get("PortState"), Some(&Value::String("Active".to_string())));
    }
}
