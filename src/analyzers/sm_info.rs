//! Family I — Subnet Manager state/priority, ported from `sm_info_service.py`.
//! `SM_INFO` uses raw `NodeGuid`/`PortNum` columns, not the GUID/Number
//! convention `row_guid`/`row_port` assume.

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory};

fn state_name(state: i64) -> String {
    match state {
        0 => "Not Active".to_string(),
        1 => "Discovering".to_string(),
        2 => "Standby".to_string(),
        3 => "Master".to_string(),
        4 => "Unknown".to_string(),
        other => format!("Unknown ({other})"),
    }
}

fn status_for(state: i64) -> &'static str {
    if state == 3 {
        "master"
    } else if state == 2 {
        "standby"
    } else {
        "inactive"
    }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let sm = inventory.read_table("SM_INFO");
    if sm.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut rows = Vec::with_capacity(sm.len());
    let mut master_count = 0usize;
    let mut standby_count = 0usize;
    let mut master_info: Option<(String, String, i64)> = None;

    for row in &sm.rows {
        let guid = normalize_guid(&cell_str(&sm, row, "NodeGuid"));
        let port = parse_port_number(&cell_str(&sm, row, "PortNum"));
        let sm_state = cell_i64_or_zero(&sm, row, "SMState");
        let priority = cell_i64_or_zero(&sm, row, "Priority");
        let act_count = cell_i64_or_zero(&sm, row, "ActCount");

        let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();
        let is_master = sm_state == 3;
        if is_master {
            master_count += 1;
            if master_info.is_none() {
                master_info = Some((node_name.clone(), guid.clone(), priority));
            }
        }
        if sm_state == 2 {
            standby_count += 1;
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(node_name));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("SMState".into(), Value::from(sm_state));
        obj.insert("SMStateName".into(), Value::String(state_name(sm_state)));
        obj.insert("Priority".into(), Value::from(priority));
        obj.insert("ActCount".into(), Value::from(act_count));
        obj.insert("IsMaster".into(), Value::from(is_master));
        obj.insert("Status".into(), Value::String(status_for(sm_state).to_string()));
        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_sms".into(), Value::from(rows.len()));
    summary.insert("master_count".into(), Value::from(master_count));
    summary.insert("standby_count".into(), Value::from(standby_count));
    summary.insert("inactive_count".into(), Value::from(rows.len() - master_count - standby_count));
    if let Some((name, guid, priority)) = master_info {
        let mut m = Map::new();
        m.insert("node_name".into(), Value::String(name));
        m.insert("node_guid".into(), Value::String(guid));
        m.insert("priority".into(), Value::from(priority));
        summary.insert("master_sm".into(), Value::Object(m));
    } else {
        summary.insert("master_sm".into(), Value::Null);
    }
    summary.insert("has_redundancy".into(), Value::from(standby_count > 0));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_match_known_codes() {
        assert_eq!(state_name(3), "Master");
        assert_eq!(state_name(9), "Unknown (9)");
    }

    #[test]
    fn status_follows_state() {
        assert_eq!(status_for(3), "master");
        assert_eq!(status_for(2), "standby");
        assert_eq!(status_for(0), "inactive");
    }
}
