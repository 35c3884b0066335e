//! Family I — switch forwarding-table capacity/utilization, ported from
//! `extended_switch_info_service.py`. `EXTENDED_SWITCH_INFO` is switch-scoped
//! (608 rows typical); several fields carry a short/long name variant
//! depending on firmware, hence the two-name fallback helpers below.

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_guid, cell_i64_or_zero, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{DatasetInventory, Frame, Row};

fn cell_i64_fallback(frame: &Frame, row: &Row, primary: &str, secondary: &str) -> i64 {
    if frame.has_column(primary) {
        cell_i64_or_zero(frame, row, primary)
    } else {
        cell_i64_or_zero(frame, row, secondary)
    }
}

fn cell_bool_fallback(frame: &Frame, row: &Row, primary: &str, secondary: &str) -> bool {
    cell_i64_fallback(frame, row, primary, secondary) != 0
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let switches = inventory.read_table("EXTENDED_SWITCH_INFO");
    if switches.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut entries = Vec::with_capacity(switches.len());
    let mut enhanced_port0_count = 0usize;
    let mut multicast_enabled_count = 0usize;
    let mut filter_raw_enabled_count = 0usize;
    let mut ar_capable_count = 0usize;
    let mut total_multicast_cap = 0i64;
    let mut total_multicast_pkeys = 0i64;

    for row in &switches.rows {
        let guid = cell_guid(&switches, row, &["NodeGuid", "GUID"]);
        let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();

        let enhanced_port0 = cell_bool_fallback(&switches, row, "EnhancedPort0", "EnhPort0");
        if enhanced_port0 {
            enhanced_port0_count += 1;
        }

        let multicast_fdb_cap = cell_i64_or_zero(&switches, row, "MulticastFDBCap");
        let multicast_fdb_top = cell_i64_or_zero(&switches, row, "MulticastFDBTop");
        let multicast_pkey_table_cap = cell_i64_or_zero(&switches, row, "MulticastPKeyTableCap");
        total_multicast_cap += multicast_fdb_cap;
        total_multicast_pkeys += multicast_pkey_table_cap;
        if multicast_fdb_cap > 0 {
            multicast_enabled_count += 1;
        }

        let lft_cap = cell_i64_fallback(&switches, row, "LinearFDBCap", "LFTCap");
        let lft_top = cell_i64_fallback(&switches, row, "LinearFDBTop", "LFTTop");
        let random_fdb_cap = cell_i64_or_zero(&switches, row, "RandomFDBCap");

        let filter_raw_inbound = cell_i64_or_zero(&switches, row, "FilterRawInbound") != 0;
        let filter_raw_outbound = cell_i64_or_zero(&switches, row, "FilterRawOutbound") != 0;
        if filter_raw_inbound || filter_raw_outbound {
            filter_raw_enabled_count += 1;
        }

        let opt_sl2vl = cell_i64_or_zero(&switches, row, "OptimizedSLtoVLMappingProgramming") != 0;
        let ar_cap = cell_i64_fallback(&switches, row, "AdaptiveRoutingCapability", "ARCap");
        if ar_cap > 0 {
            ar_capable_count += 1;
        }
        let multipath_support = cell_i64_or_zero(&switches, row, "MultipathSupport") != 0;
        let port_state_change = cell_i64_or_zero(&switches, row, "PortStateChange");

        let mut issues = Vec::new();
        let mut severity = "normal";
        let lft_utilization = if lft_cap > 0 { lft_top as f64 / lft_cap as f64 * 100.0 } else { 0.0 };
        if lft_utilization >= 90.0 {
            issues.push(format!("LFT near capacity: {lft_utilization:.1}%"));
            severity = "warning";
        }
        if lft_utilization >= 98.0 {
            severity = "critical";
        }
        let mcast_utilization = if multicast_fdb_cap > 0 { multicast_fdb_top as f64 / multicast_fdb_cap as f64 * 100.0 } else { 0.0 };
        if mcast_utilization >= 90.0 {
            issues.push(format!("Multicast FDB near capacity: {mcast_utilization:.1}%"));
            if severity == "normal" {
                severity = "warning";
            }
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(node_name.clone()));
        obj.insert("EnhancedPort0".into(), Value::from(enhanced_port0));
        obj.insert("LinearFDBCap".into(), Value::from(lft_cap));
        obj.insert("LinearFDBTop".into(), Value::from(lft_top));
        obj.insert("LFTUtilization".into(), Value::from((lft_utilization * 10.0).round() / 10.0));
        obj.insert("RandomFDBCap".into(), Value::from(random_fdb_cap));
        obj.insert("MulticastFDBCap".into(), Value::from(multicast_fdb_cap));
        obj.insert("MulticastFDBTop".into(), Value::from(multicast_fdb_top));
        obj.insert("MulticastPKeyCap".into(), Value::from(multicast_pkey_table_cap));
        obj.insert("FilterRawInbound".into(), Value::from(filter_raw_inbound));
        obj.insert("FilterRawOutbound".into(), Value::from(filter_raw_outbound));
        obj.insert("OptimizedSL2VL".into(), Value::from(opt_sl2vl));
        obj.insert("ARCapability".into(), Value::from(ar_cap));
        obj.insert("MultipathSupport".into(), Value::from(multipath_support));
        obj.insert("PortStateChange".into(), Value::from(port_state_change));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        let rank = match severity {
            "critical" => 0,
            "warning" => 1,
            _ => 2,
        };
        entries.push((rank, node_name, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, obj)| obj).collect();

    let mut summary = Map::new();
    summary.insert("total_switches".into(), Value::from(switches.len()));
    summary.insert("enhanced_port0_count".into(), Value::from(enhanced_port0_count));
    summary.insert("multicast_enabled_count".into(), Value::from(multicast_enabled_count));
    summary.insert("filter_raw_enabled_count".into(), Value::from(filter_raw_enabled_count));
    summary.insert("ar_capable_count".into(), Value::from(ar_capable_count));
    summary.insert("total_multicast_capacity".into(), Value::from(total_multicast_cap));
    summary.insert("total_multicast_pkey_capacity".into(), Value::from(total_multicast_pkeys));
    summary.insert(
        "avg_multicast_cap_per_switch".into(),
        Value::from((total_multicast_cap as f64 / switches.len().max(1) as f64 * 10.0).round() / 10.0),
    );

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
