//! Family I — switch-level summary, ported from `switch_service.py`.
//! `SWITCHES` is the primary source, enriched with `SYSTEM_GENERAL_INFORMATION`
//! (serial/part/revision) and `AR_INFO` (adaptive-routing/HBF/PFRN capability
//! flags) joined by NodeGUID.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{normalize_guid, DatasetInventory, Frame, Row};

fn cell_bool(frame: &Frame, row: &Row, name: &str) -> bool {
    cell_i64_or_zero(frame, row, name) != 0
}

#[derive(Default, Clone)]
struct SysInfo {
    serial_number: String,
    part_number: String,
    revision: String,
    product_name: String,
}

#[derive(Default, Clone)]
struct ArInfo {
    ar_enabled: bool,
    fr_enabled: bool,
    hbf_supported: bool,
    hbf_enabled: bool,
    group_cap: i64,
    group_top: i64,
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let switches = inventory.read_table("SWITCHES");
    let sys_info_df = inventory.read_table("SYSTEM_GENERAL_INFORMATION");
    let ar_info_df = inventory.read_table("AR_INFO");
    if switches.is_empty() && sys_info_df.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut sys_info_lookup: HashMap<String, SysInfo> = HashMap::new();
    for row in &sys_info_df.rows {
        let guid = normalize_guid(&cell_str(&sys_info_df, row, "NodeGuid"));
        sys_info_lookup.insert(
            guid,
            SysInfo {
                serial_number: cell_str(&sys_info_df, row, "SerialNumber"),
                part_number: cell_str(&sys_info_df, row, "PartNumber"),
                revision: cell_str(&sys_info_df, row, "Revision"),
                product_name: cell_str(&sys_info_df, row, "ProductName").trim_matches('"').to_string(),
            },
        );
    }

    let mut ar_info_lookup: HashMap<String, ArInfo> = HashMap::new();
    for row in &ar_info_df.rows {
        let guid = normalize_guid(&cell_str(&ar_info_df, row, "NodeGUID"));
        ar_info_lookup.insert(
            guid,
            ArInfo {
                ar_enabled: cell_bool(&ar_info_df, row, "e"),
                fr_enabled: cell_bool(&ar_info_df, row, "fr_enabled"),
                hbf_supported: cell_bool(&ar_info_df, row, "is_hbf_supported"),
                hbf_enabled: cell_bool(&ar_info_df, row, "by_sl_hbf_en"),
                group_cap: cell_i64_or_zero(&ar_info_df, row, "group_cap"),
                group_top: cell_i64_or_zero(&ar_info_df, row, "group_top"),
            },
        );
    }

    let mut rows: Vec<Map<String, Value>> = Vec::with_capacity(switches.len());
    let mut ar_enabled_count = 0usize;
    let mut fr_enabled_count = 0usize;
    let mut hbf_enabled_count = 0usize;
    let mut products: HashMap<String, usize> = HashMap::new();

    for row in &switches.rows {
        let guid = normalize_guid(&cell_str(&switches, row, "NodeGUID"));
        let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();

        let sys_info = sys_info_lookup.get(&guid).cloned().unwrap_or_default();
        let ar_info = ar_info_lookup.get(&guid).cloned().unwrap_or_default();

        if ar_info.ar_enabled {
            ar_enabled_count += 1;
        }
        if ar_info.fr_enabled {
            fr_enabled_count += 1;
        }
        if ar_info.hbf_enabled {
            hbf_enabled_count += 1;
        }
        let product_name = if sys_info.product_name.is_empty() { "Unknown".to_string() } else { sys_info.product_name.clone() };
        *products.entry(product_name).or_insert(0) += 1;

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(node_name));
        obj.insert("ProductName".into(), Value::String(sys_info.product_name));
        obj.insert("PartNumber".into(), Value::String(sys_info.part_number));
        obj.insert("SerialNumber".into(), Value::String(sys_info.serial_number));
        obj.insert("Revision".into(), Value::String(sys_info.revision));
        obj.insert("LinearFDBCap".into(), Value::from(cell_i64_or_zero(&switches, row, "LinearFDBCap")));
        obj.insert("LinearFDBTop".into(), Value::from(cell_i64_or_zero(&switches, row, "LinearFDBTop")));
        obj.insert("MCastFDBCap".into(), Value::from(cell_i64_or_zero(&switches, row, "MCastFDBCap")));
        obj.insert("LifeTimeValue".into(), Value::from(cell_i64_or_zero(&switches, row, "LifeTimeValue")));
        obj.insert("AREnabled".into(), Value::from(ar_info.ar_enabled));
        obj.insert("FREnabled".into(), Value::from(ar_info.fr_enabled));
        obj.insert("HBFSupported".into(), Value::from(ar_info.hbf_supported));
        obj.insert("HBFEnabled".into(), Value::from(ar_info.hbf_enabled));
        obj.insert("ARGroupCap".into(), Value::from(ar_info.group_cap));
        obj.insert("ARGroupTop".into(), Value::from(ar_info.group_top));
        rows.push(obj);
    }

    let mut summary = Map::new();
    if !rows.is_empty() {
        summary.insert("total_switches".into(), Value::from(rows.len()));
        summary.insert("ar_enabled_count".into(), Value::from(ar_enabled_count));
        summary.insert("fr_enabled_count".into(), Value::from(fr_enabled_count));
        summary.insert("hbf_enabled_count".into(), Value::from(hbf_enabled_count));
        summary.insert("product_types".into(), Value::Object(products.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    }

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
