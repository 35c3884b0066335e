//! Family I — extended node attributes merged with SMP capability info,
//! ported from `extended_node_info_service.py`. `EXTENDED_NODE_INFO`
//! (per-node attributes) is the primary table; `GENERAL_INFO_SMP`
//! contributes a capability-mask lookup keyed by the same GUID.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_guid, cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::DatasetInventory;

const CAP_DEFINITIONS: &[(u32, &str)] = &[
    (0, "IsSM"),
    (1, "IsNoticeSupported"),
    (2, "IsTrapSupported"),
    (3, "IsOptionalIPDSupported"),
    (4, "IsAutomaticMigrationSupported"),
    (5, "IsSLMappingSupported"),
    (6, "IsMKeyNVRAM"),
    (7, "IsPKeyNVRAM"),
    (8, "IsLEDInfoSupported"),
    (9, "IsSMDisabled"),
    (10, "IsSystemImageGUIDSupported"),
    (11, "IsPKeySwitchExternalPortTrapSupported"),
    (16, "IsCommunicationManagementSupported"),
    (17, "IsSNMPTunnelingSupported"),
    (18, "IsReinitSupported"),
    (19, "IsDeviceManagementSupported"),
    (20, "IsVendorClassSupported"),
    (21, "IsDRNoticeSupported"),
    (22, "IsCapabilityMaskNoticeSupported"),
    (23, "IsBootManagementSupported"),
    (24, "IsLinkRoundTripLatencySupported"),
    (25, "IsClientReregistrationSupported"),
    (26, "IsOtherLocalChangesNoticeSupported"),
    (27, "IsLinkSpeedWidthPairsTableSupported"),
];

fn decode_capabilities(cap_mask: i64) -> Vec<&'static str> {
    CAP_DEFINITIONS.iter().filter(|(bit, _)| cap_mask & (1 << bit) != 0).map(|(_, name)| *name).collect()
}

#[derive(Default, Clone)]
struct SmpInfo {
    class_version: i64,
    base_version: i64,
    capability_mask: i64,
    resp_time_value: i64,
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let ext_node = inventory.read_table("EXTENDED_NODE_INFO");
    let smp_info_df = inventory.read_table("GENERAL_INFO_SMP");
    if ext_node.is_empty() && smp_info_df.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut smp_lookup: HashMap<String, SmpInfo> = HashMap::new();
    for row in &smp_info_df.rows {
        let guid = cell_guid(&smp_info_df, row, &["NodeGuid", "GUID"]);
        smp_lookup.insert(
            guid,
            SmpInfo {
                class_version: cell_i64_or_zero(&smp_info_df, row, "ClassVersion"),
                base_version: cell_i64_or_zero(&smp_info_df, row, "BaseVersion"),
                capability_mask: cell_i64_or_zero(&smp_info_df, row, "CapabilityMask"),
                resp_time_value: cell_i64_or_zero(&smp_info_df, row, "RespTimeValue"),
            },
        );
    }

    let df_to_process = if !ext_node.is_empty() { &ext_node } else { &smp_info_df };

    let mut entries = Vec::with_capacity(df_to_process.len());
    let mut node_type_distribution: HashMap<String, usize> = HashMap::new();
    let mut vendor_distribution: HashMap<String, usize> = HashMap::new();
    let mut capability_counts: HashMap<String, usize> = HashMap::new();
    let mut total_ports = 0i64;

    for row in &df_to_process.rows {
        let guid = cell_guid(df_to_process, row, &["NodeGuid", "GUID"]);
        let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();

        let mut node_type = cell_str(df_to_process, row, "NodeType");
        if node_type.is_empty() {
            node_type = cell_str(df_to_process, row, "Type");
        }
        if node_type.is_empty() {
            node_type = "Unknown".to_string();
        }
        *node_type_distribution.entry(node_type.clone()).or_insert(0) += 1;

        let mut vendor_id = cell_str(df_to_process, row, "VendorID");
        if vendor_id.is_empty() {
            vendor_id = cell_str(df_to_process, row, "VendorId");
        }
        if !vendor_id.is_empty() {
            *vendor_distribution.entry(vendor_id.clone()).or_insert(0) += 1;
        }

        let mut num_ports = cell_i64_or_zero(df_to_process, row, "NumPorts");
        if num_ports == 0 {
            num_ports = cell_i64_or_zero(df_to_process, row, "PortCount");
        }
        total_ports += num_ports;

        let revision = {
            let r = cell_i64_or_zero(df_to_process, row, "Revision");
            if r != 0 { r } else { cell_i64_or_zero(df_to_process, row, "Rev") }
        };
        let lid = {
            let l = cell_i64_or_zero(df_to_process, row, "LID");
            if l != 0 { l } else { cell_i64_or_zero(df_to_process, row, "BaseLID") }
        };
        let lmc = cell_i64_or_zero(df_to_process, row, "LMC");
        let partition_cap = cell_i64_or_zero(df_to_process, row, "PartitionCap");

        let smp = smp_lookup.get(&guid).cloned().unwrap_or_default();
        let capabilities = decode_capabilities(smp.capability_mask);
        for cap in &capabilities {
            *capability_counts.entry(cap.to_string()).or_insert(0) += 1;
        }

        let mut issues = Vec::new();
        let mut severity = "normal";
        if num_ports == 0 {
            issues.push("No ports reported".to_string());
            severity = "warning";
        }
        if lid == 0 {
            issues.push("No LID assigned".to_string());
            severity = "warning";
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(node_name.clone()));
        obj.insert("NodeType".into(), Value::String(node_type));
        obj.insert("VendorID".into(), Value::String(vendor_id));
        obj.insert("Revision".into(), Value::from(revision));
        obj.insert("NumPorts".into(), Value::from(num_ports));
        obj.insert("LID".into(), Value::from(lid));
        obj.insert("LMC".into(), Value::from(lmc));
        obj.insert("PartitionCap".into(), Value::from(partition_cap));
        obj.insert("ClassVersion".into(), Value::from(smp.class_version));
        obj.insert("BaseVersion".into(), Value::from(smp.base_version));
        obj.insert("CapabilityMask".into(), Value::String(format!("0x{:x}", smp.capability_mask)));
        obj.insert("Capabilities".into(), Value::String(capabilities.join(", ")));
        obj.insert("RespTimeValue".into(), Value::from(smp.resp_time_value));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        let rank = if severity == "warning" { 1 } else { 2 };
        entries.push((rank, node_name, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, obj)| obj).collect();

    let mut sorted_types: Vec<(String, usize)> = node_type_distribution.into_iter().collect();
    sorted_types.sort_by(|a, b| b.1.cmp(&a.1));
    let mut sorted_vendors: Vec<(String, usize)> = vendor_distribution.into_iter().collect();
    sorted_vendors.sort_by(|a, b| b.1.cmp(&a.1));
    let mut sorted_caps: Vec<(String, usize)> = capability_counts.into_iter().collect();
    sorted_caps.sort_by(|a, b| b.1.cmp(&a.1));

    let mut summary = Map::new();
    summary.insert("total_nodes".into(), Value::from(df_to_process.len()));
    summary.insert("total_ports".into(), Value::from(total_ports));
    summary.insert("node_type_distribution".into(), Value::Object(sorted_types.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("vendor_distribution".into(), Value::Object(sorted_vendors.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("capability_distribution".into(), Value::Object(sorted_caps.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("smp_entries".into(), Value::from(smp_info_df.len()));
    summary.insert("avg_ports_per_node".into(), Value::from((total_ports as f64 / df_to_process.len().max(1) as f64 * 10.0).round() / 10.0));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_capability_bits() {
        let caps = decode_capabilities(0b11);
        assert_eq!(caps, vec!["IsSM", "IsNoticeSupported"]);
    }
}
