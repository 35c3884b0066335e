//! Family I — raw physical layer diagnostic fields, ported from
//! `phy_diagnostics_service.py`. `PHY_DB1` is large (30k+ rows on big
//! fabrics) and carries a long, dynamically-named run of `field*` columns;
//! only the first 20 are surfaced per row.

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{normalize_guid, parse_port_number, DatasetInventory};

fn field_columns(frame: &crate::dump::Frame) -> Vec<String> {
    frame.columns.iter().filter(|c| c.starts_with("field")).cloned().collect()
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let phy = inventory.read_table("PHY_DB1");
    if phy.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let field_cols = field_columns(&phy);
    let tracked: Vec<&String> = field_cols.iter().take(20).collect();

    let mut rows = Vec::with_capacity(phy.len());
    let mut non_zero_total = 0i64;
    let mut max_non_zero = 0i64;
    let mut ports_with_data = 0usize;

    for row in &phy.rows {
        let guid = normalize_guid(&cell_str(&phy, row, "NodeGuid"));
        let port_guid_raw = cell_str(&phy, row, "PortGuid");
        let port_guid = if port_guid_raw.len() > 16 { port_guid_raw[port_guid_raw.len() - 16..].to_string() } else { port_guid_raw };
        let port_num = parse_port_number(&cell_str(&phy, row, "PortNum"));
        let version = cell_i64_or_zero(&phy, row, "Version");

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        if let Some(p) = port_num {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("PortGUID".into(), Value::String(port_guid));
        obj.insert("Version".into(), Value::from(version));

        let mut non_zero = 0i64;
        for (i, col) in tracked.iter().enumerate() {
            let v = cell_i64_or_zero(&phy, row, col);
            if v != 0 {
                non_zero += 1;
            }
            obj.insert(format!("Field{i}"), Value::from(v));
        }
        obj.insert("NonZeroFields".into(), Value::from(non_zero));

        non_zero_total += non_zero;
        max_non_zero = max_non_zero.max(non_zero);
        if non_zero > 0 {
            ports_with_data += 1;
        }
        rows.push(obj);
    }
    rows.truncate(2000);

    let mut summary = Map::new();
    summary.insert("total_ports".into(), Value::from(phy.len()));
    summary.insert("total_diagnostic_fields".into(), Value::from(field_cols.len()));
    summary.insert("avg_non_zero_fields".into(), Value::from((non_zero_total as f64 / phy.len().max(1) as f64 * 10.0).round() / 10.0));
    summary.insert("max_non_zero_fields".into(), Value::from(max_non_zero));
    summary.insert("ports_with_data".into(), Value::from(ports_with_data));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
