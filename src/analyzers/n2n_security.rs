//! Family I — node-to-node management path security, ported from
//! `n2n_security_service.py`. `N2N_CLASS_PORT_INFO` (primary) joins
//! `N2N_KEY_INFO` and `SMP_NODE_INFO` by GUID; falls back to walking
//! `N2N_KEY_INFO` directly when the class-port table is absent.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_guid, cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{DatasetInventory, Frame};

#[derive(Default, Clone)]
struct KeyInfo {
    key_present: bool,
    key_status: String,
    key_violation: bool,
    partition_key: String,
    q_key: String,
    m_key: String,
    trap_count: i64,
}

#[derive(Default, Clone)]
struct SmpInfo {
    node_type: String,
    num_ports: i64,
    partition_cap: i64,
}

const CAP_BITS: &[(i64, &str)] = &[
    (0x0001, "IsTrapSupported"),
    (0x0002, "IsAutomaticMigrationSupported"),
    (0x0004, "IsSLMappingSupported"),
    (0x0008, "IsMKeyNVRAM"),
    (0x0010, "IsPKeyNVRAM"),
    (0x0020, "IsLEDInfoSupported"),
    (0x0040, "IsSMDisabled"),
    (0x0080, "IsSystemImageGUIDSupported"),
    (0x0100, "IsPKeySwitchExternalPortTrapSupported"),
    (0x0400, "IsExtendedSpeedsSupported"),
    (0x0800, "IsCapabilityMask2Supported"),
    (0x1000, "IsCommunicationManagementSupported"),
    (0x2000, "IsSNMPTunnelingSupported"),
    (0x4000, "IsReinitSupported"),
    (0x8000, "IsDeviceManagementSupported"),
];

const CAP2_BITS: &[(i64, &str)] = &[
    (0x0001, "IsSetNodeDescriptionSupported"),
    (0x0002, "IsPortInfoExtendedSpeedSupported"),
    (0x0004, "IsCableInfoSupported"),
    (0x0008, "IsPortInfoCapabilityMaskMatchSupported"),
];

fn decode_capabilities(cap_mask: i64, cap_mask2: i64) -> Vec<&'static str> {
    let mut caps: Vec<&'static str> = CAP_BITS.iter().filter(|(bit, _)| cap_mask & bit != 0).map(|(_, n)| *n).collect();
    caps.extend(CAP2_BITS.iter().filter(|(bit, _)| cap_mask2 & bit != 0).map(|(_, n)| *n));
    caps
}

fn cell_str_fallback(frame: &Frame, row: &crate::dump::Row, primary: &str, secondary: &str) -> String {
    let v = crate::analyzers::support::cell_str(frame, row, primary);
    if !v.is_empty() {
        v
    } else {
        crate::analyzers::support::cell_str(frame, row, secondary)
    }
}

fn cell_i64_fallback(frame: &Frame, row: &crate::dump::Row, primary: &str, secondary: &str) -> i64 {
    if frame.has_column(primary) {
        cell_i64_or_zero(frame, row, primary)
    } else {
        cell_i64_or_zero(frame, row, secondary)
    }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let n2n_class = inventory.read_table("N2N_CLASS_PORT_INFO");
    let n2n_key = inventory.read_table("N2N_KEY_INFO");
    let smp_node = inventory.read_table("SMP_NODE_INFO");
    if n2n_class.is_empty() && n2n_key.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut key_lookup: HashMap<String, KeyInfo> = HashMap::new();
    let mut key_status_distribution: HashMap<String, usize> = HashMap::new();
    let mut nodes_with_keys = 0usize;
    for row in &n2n_key.rows {
        let guid = cell_guid(&n2n_key, row, &["NodeGuid", "GUID"]);
        let key_present = {
            let p = cell_i64_or_zero(&n2n_key, row, "KeyPresent");
            if n2n_key.has_column("KeyPresent") { p != 0 } else { cell_i64_or_zero(&n2n_key, row, "HasKey") != 0 }
        };
        let mut key_status = cell_str(&n2n_key, row, "KeyStatus");
        if key_status.is_empty() {
            key_status = cell_str(&n2n_key, row, "Status");
        }
        if key_status.is_empty() {
            key_status = "Unknown".to_string();
        }
        let key_violation = {
            let v = cell_i64_or_zero(&n2n_key, row, "KeyViolation");
            if n2n_key.has_column("KeyViolation") { v != 0 } else { cell_i64_or_zero(&n2n_key, row, "Violation") != 0 }
        };
        let info = KeyInfo {
            key_present,
            key_status: key_status.clone(),
            key_violation,
            partition_key: cell_str_fallback(&n2n_key, row, "PartitionKey", "PKey"),
            q_key: cell_str(&n2n_key, row, "QKey"),
            m_key: cell_str(&n2n_key, row, "MKey"),
            trap_count: cell_i64_or_zero(&n2n_key, row, "TrapCount"),
        };
        if info.key_present {
            nodes_with_keys += 1;
        }
        *key_status_distribution.entry(key_status).or_insert(0) += 1;
        key_lookup.insert(guid, info);
    }

    let mut smp_lookup: HashMap<String, SmpInfo> = HashMap::new();
    for row in &smp_node.rows {
        let guid = cell_guid(&smp_node, row, &["NodeGuid", "GUID"]);
        smp_lookup.insert(
            guid,
            SmpInfo {
                node_type: cell_str_fallback(&smp_node, row, "NodeType", "Type"),
                num_ports: cell_i64_fallback(&smp_node, row, "NumPorts", "Ports"),
                partition_cap: cell_i64_or_zero(&smp_node, row, "PartitionCap"),
            },
        );
    }

    let mut entries = Vec::new();
    let mut total_nodes = 0usize;
    let mut nodes_with_n2n_enabled = 0usize;
    let mut security_violations = 0usize;
    let mut class_mismatches = 0usize;
    let mut capability_distribution: HashMap<String, usize> = HashMap::new();

    if !n2n_class.is_empty() {
        for row in &n2n_class.rows {
            let guid = cell_guid(&n2n_class, row, &["NodeGuid", "GUID"]);
            let port_num = cell_i64_fallback(&n2n_class, row, "PortNum", "PortNumber");
            total_nodes += 1;
            let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();

            let base_version = cell_i64_or_zero(&n2n_class, row, "BaseVersion");
            let class_version = cell_i64_or_zero(&n2n_class, row, "ClassVersion");
            let capability_mask = cell_i64_fallback(&n2n_class, row, "CapabilityMask", "CapMask");
            let capability_mask2 = cell_i64_fallback(&n2n_class, row, "CapabilityMask2", "CapMask2");
            let capabilities = decode_capabilities(capability_mask, capability_mask2);
            for cap in &capabilities {
                *capability_distribution.entry(cap.to_string()).or_insert(0) += 1;
            }

            let resp_time = cell_i64_fallback(&n2n_class, row, "RespTimeValue", "ResponseTime");
            let redirect_gid = cell_str(&n2n_class, row, "RedirectGID");
            let redirect_qp = cell_i64_or_zero(&n2n_class, row, "RedirectQP");
            let redirect_pkey = cell_str(&n2n_class, row, "RedirectPKey");
            let trap_gid = cell_str(&n2n_class, row, "TrapGID");
            let trap_qp = cell_i64_or_zero(&n2n_class, row, "TrapQP");
            let trap_pkey = cell_str(&n2n_class, row, "TrapPKey");

            let n2n_enabled = capability_mask != 0 || !redirect_gid.is_empty() || !trap_gid.is_empty();
            if n2n_enabled {
                nodes_with_n2n_enabled += 1;
            }

            let key_info = key_lookup.get(&guid).cloned().unwrap_or_default();
            let smp_info = smp_lookup.get(&guid).cloned().unwrap_or_default();

            let mut issues = Vec::new();
            let mut severity = "normal";
            if key_info.key_violation {
                issues.push("Key violation detected".to_string());
                severity = "critical";
                security_violations += 1;
            }
            if n2n_enabled && !key_info.key_present {
                issues.push("N2N enabled but no key present".to_string());
                if severity != "critical" {
                    severity = "warning";
                }
            }
            if key_info.trap_count > 100 {
                issues.push(format!("High trap count: {}", key_info.trap_count));
                if severity == "normal" {
                    severity = "info";
                }
            }
            if class_version > 0 && class_version != 2 {
                issues.push(format!("Non-standard class version: {class_version}"));
                class_mismatches += 1;
            }

            let mut obj = Map::new();
            obj.insert("NodeGUID".into(), Value::String(guid.clone()));
            obj.insert("NodeName".into(), Value::String(node_name));
            obj.insert("PortNumber".into(), Value::from(port_num));
            obj.insert("BaseVersion".into(), Value::from(base_version));
            obj.insert("ClassVersion".into(), Value::from(class_version));
            obj.insert("CapabilityMask".into(), Value::from(capability_mask));
            obj.insert("CapabilityMask2".into(), Value::from(capability_mask2));
            obj.insert(
                "Capabilities".into(),
                Value::String(if capabilities.is_empty() { "None".to_string() } else { capabilities.join(", ") }),
            );
            obj.insert("ResponseTime".into(), Value::from(resp_time));
            obj.insert("N2NEnabled".into(), Value::from(n2n_enabled));
            obj.insert("RedirectGID".into(), Value::String(redirect_gid));
            obj.insert("RedirectQP".into(), Value::from(redirect_qp));
            obj.insert("RedirectPKey".into(), Value::String(redirect_pkey));
            obj.insert("TrapGID".into(), Value::String(trap_gid));
            obj.insert("TrapQP".into(), Value::from(trap_qp));
            obj.insert("TrapPKey".into(), Value::String(trap_pkey));
            obj.insert("KeyPresent".into(), Value::from(key_info.key_present));
            obj.insert("KeyStatus".into(), Value::String(key_info.key_status));
            obj.insert("KeyViolation".into(), Value::from(key_info.key_violation));
            obj.insert("PartitionKey".into(), Value::String(key_info.partition_key));
            obj.insert("TrapCount".into(), Value::from(key_info.trap_count));
            obj.insert("NodeType".into(), Value::String(smp_info.node_type));
            obj.insert("NumPorts".into(), Value::from(smp_info.num_ports));
            obj.insert("PartitionCap".into(), Value::from(smp_info.partition_cap));
            obj.insert("Severity".into(), Value::String(severity.to_string()));
            obj.insert("Issues".into(), Value::String(issues.join("; ")));

            let rank = match severity {
                "critical" => 0,
                "warning" => 1,
                _ => 2,
            };
            entries.push((rank, key_info.trap_count, obj));
        }
    } else {
        for row in &n2n_key.rows {
            let guid = cell_guid(&n2n_key, row, &["NodeGuid", "GUID"]);
            total_nodes += 1;
            let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();
            let key_info = key_lookup.get(&guid).cloned().unwrap_or_default();
            let smp_info = smp_lookup.get(&guid).cloned().unwrap_or_default();

            let mut issues = Vec::new();
            let mut severity = "normal";
            if key_info.key_violation {
                issues.push("Key violation".to_string());
                severity = "critical";
                security_violations += 1;
            }

            let mut obj = Map::new();
            obj.insert("NodeGUID".into(), Value::String(guid.clone()));
            obj.insert("NodeName".into(), Value::String(node_name));
            obj.insert("PortNumber".into(), Value::from(0));
            obj.insert("KeyPresent".into(), Value::from(key_info.key_present));
            obj.insert("KeyStatus".into(), Value::String(key_info.key_status));
            obj.insert("KeyViolation".into(), Value::from(key_info.key_violation));
            obj.insert("PartitionKey".into(), Value::String(key_info.partition_key));
            obj.insert("QKey".into(), Value::String(key_info.q_key));
            obj.insert("MKey".into(), Value::String(key_info.m_key));
            obj.insert("TrapCount".into(), Value::from(key_info.trap_count));
            obj.insert("NodeType".into(), Value::String(smp_info.node_type));
            obj.insert("Severity".into(), Value::String(severity.to_string()));
            obj.insert("Issues".into(), Value::String(issues.join("; ")));

            let rank = if severity == "critical" { 0 } else { 2 };
            entries.push((rank, key_info.trap_count, obj));
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, obj)| obj).collect();

    let total = total_nodes.max(1) as f64;
    let mut sorted_caps: Vec<(String, usize)> = capability_distribution.into_iter().collect();
    sorted_caps.sort_by(|a, b| b.1.cmp(&a.1));
    let mut sorted_key_status: Vec<(String, usize)> = key_status_distribution.into_iter().collect();
    sorted_key_status.sort_by(|a, b| b.1.cmp(&a.1));

    let mut summary = Map::new();
    summary.insert("total_nodes".into(), Value::from(total_nodes));
    summary.insert("nodes_with_n2n_enabled".into(), Value::from(nodes_with_n2n_enabled));
    summary.insert("nodes_with_keys".into(), Value::from(nodes_with_keys));
    summary.insert("security_violations".into(), Value::from(security_violations));
    summary.insert("class_mismatches".into(), Value::from(class_mismatches));
    summary.insert("n2n_coverage_pct".into(), Value::from((nodes_with_n2n_enabled as f64 / total * 1000.0).round() / 10.0));
    summary.insert("key_coverage_pct".into(), Value::from((nodes_with_keys as f64 / total * 1000.0).round() / 10.0));
    summary.insert("capability_distribution".into(), Value::Object(sorted_caps.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("key_status_distribution".into(), Value::Object(sorted_key_status.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("n2n_class_rows".into(), Value::from(n2n_class.len()));
    summary.insert("n2n_key_rows".into(), Value::from(n2n_key.len()));
    summary.insert("smp_node_rows".into(), Value::from(smp_node.len()));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
