//! Family I — HBF/PFRN routing configuration, ported from
//! `routing_config_service.py`. `HBF_CONFIG` (hash-based forwarding) is the
//! primary source; `PFRN_CONFIG` (precise forwarding recovery notification)
//! is joined in by GUID and, when `HBF_CONFIG` is empty, walked directly.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_guid, cell_i64_or_zero, cell_str, AnalyzerOutput};
use crate::anomaly::AnomalyFrame;
use crate::dump::{DatasetInventory, Frame, Row};

fn cell_bool(frame: &Frame, row: &Row, name: &str) -> bool {
    let cell = frame.get(row, name);
    match cell.as_i64() {
        Some(v) => v != 0,
        None => matches!(cell.as_str().trim().to_lowercase().as_str(), "1" | "true" | "yes" | "enabled"),
    }
}

fn cell_str_fallback(frame: &Frame, row: &Row, primary: &str, secondary: &str) -> String {
    let v = cell_str(frame, row, primary);
    if !v.is_empty() { v } else { cell_str(frame, row, secondary) }
}

fn cell_i64_fallback(frame: &Frame, row: &Row, primary: &str, secondary: &str) -> i64 {
    let v = cell_i64_or_zero(frame, row, primary);
    if v != 0 { v } else { cell_i64_or_zero(frame, row, secondary) }
}

fn cell_bool_fallback(frame: &Frame, row: &Row, primary: &str, secondary: &str) -> bool {
    if frame.has_column(primary) { cell_bool(frame, row, primary) } else { cell_bool(frame, row, secondary) }
}

#[derive(Default, Clone)]
struct PfrnInfo {
    enabled: bool,
    timeout: i64,
    max_retries: i64,
    mode: String,
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let hbf = inventory.read_table("HBF_CONFIG");
    let pfrn = inventory.read_table("PFRN_CONFIG");
    if hbf.is_empty() && pfrn.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut hbf_enabled_count = 0usize;
    let mut pfrn_enabled_count = 0usize;
    let mut hash_function_distribution: HashMap<String, usize> = HashMap::new();
    let mut seed_distribution: HashMap<i64, usize> = HashMap::new();

    let mut pfrn_lookup: HashMap<String, PfrnInfo> = HashMap::new();
    for row in &pfrn.rows {
        let guid = cell_guid(&pfrn, row, &["NodeGuid", "GUID"]);
        let enabled = cell_bool_fallback(&pfrn, row, "Enabled", "PFRNEnabled");
        if enabled {
            pfrn_enabled_count += 1;
        }
        pfrn_lookup.insert(
            guid,
            PfrnInfo {
                enabled,
                timeout: cell_i64_fallback(&pfrn, row, "Timeout", "PFRNTimeout"),
                max_retries: cell_i64_or_zero(&pfrn, row, "MaxRetries"),
                mode: cell_str_fallback(&pfrn, row, "Mode", "PFRNMode"),
            },
        );
    }

    let mut entries = Vec::new();

    if !hbf.is_empty() {
        for row in &hbf.rows {
            let guid = cell_guid(&hbf, row, &["NodeGuid", "GUID"]);
            let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();

            let hbf_enabled = cell_bool_fallback(&hbf, row, "Enabled", "HBFEnabled");
            if hbf_enabled {
                hbf_enabled_count += 1;
            }

            let hash_function = {
                let v = cell_str_fallback(&hbf, row, "HashFunction", "HashType");
                if v.is_empty() { "Unknown".to_string() } else { v }
            };
            *hash_function_distribution.entry(hash_function.clone()).or_insert(0) += 1;

            let seed = cell_i64_fallback(&hbf, row, "Seed", "HashSeed");
            *seed_distribution.entry(seed).or_insert(0) += 1;

            let hash_fields = cell_str_fallback(&hbf, row, "HashFields", "Fields");
            let lb_mode = cell_str_fallback(&hbf, row, "LoadBalancingMode", "LBMode");
            let weight_cap = cell_i64_or_zero(&hbf, row, "WeightCap");
            let weight_top = cell_i64_or_zero(&hbf, row, "WeightTop");

            let pfrn_info = pfrn_lookup.get(&guid).cloned().unwrap_or_default();

            let mut issues = Vec::new();
            let severity = if hbf_enabled && !pfrn_info.enabled {
                issues.push("HBF enabled but PFRN disabled - may affect fast recovery".to_string());
                "info"
            } else {
                "normal"
            };

            let mut obj = Map::new();
            obj.insert("NodeGUID".into(), Value::String(guid.clone()));
            obj.insert("NodeName".into(), Value::String(node_name.clone()));
            obj.insert("HBFEnabled".into(), Value::from(hbf_enabled));
            obj.insert("HashFunction".into(), Value::String(hash_function));
            obj.insert("HashSeed".into(), Value::from(seed));
            obj.insert("HashFields".into(), Value::String(hash_fields));
            obj.insert("LoadBalancingMode".into(), Value::String(lb_mode));
            obj.insert("WeightCap".into(), Value::from(weight_cap));
            obj.insert("WeightTop".into(), Value::from(weight_top));
            obj.insert("PFRNEnabled".into(), Value::from(pfrn_info.enabled));
            obj.insert("PFRNTimeout".into(), Value::from(pfrn_info.timeout));
            obj.insert("PFRNMaxRetries".into(), Value::from(pfrn_info.max_retries));
            obj.insert("PFRNMode".into(), Value::String(pfrn_info.mode));
            obj.insert("Severity".into(), Value::String(severity.to_string()));
            obj.insert("Issues".into(), Value::String(issues.join("; ")));

            let rank = if severity == "critical" { 0 } else if severity == "warning" { 1 } else { 2 };
            entries.push((rank, node_name, obj));
        }
    } else {
        for row in &pfrn.rows {
            let guid = cell_guid(&pfrn, row, &["NodeGuid", "GUID"]);
            let node_name = topo.node_label(&guid).unwrap_or(&guid).to_string();
            let pfrn_info = pfrn_lookup.get(&guid).cloned().unwrap_or_default();

            let mut obj = Map::new();
            obj.insert("NodeGUID".into(), Value::String(guid));
            obj.insert("NodeName".into(), Value::String(node_name.clone()));
            obj.insert("HBFEnabled".into(), Value::from(false));
            obj.insert("HashFunction".into(), Value::String(String::new()));
            obj.insert("HashSeed".into(), Value::from(0));
            obj.insert("HashFields".into(), Value::String(String::new()));
            obj.insert("LoadBalancingMode".into(), Value::String(String::new()));
            obj.insert("WeightCap".into(), Value::from(0));
            obj.insert("WeightTop".into(), Value::from(0));
            obj.insert("PFRNEnabled".into(), Value::from(pfrn_info.enabled));
            obj.insert("PFRNTimeout".into(), Value::from(pfrn_info.timeout));
            obj.insert("PFRNMaxRetries".into(), Value::from(pfrn_info.max_retries));
            obj.insert("PFRNMode".into(), Value::String(pfrn_info.mode));
            obj.insert("Severity".into(), Value::String("normal".to_string()));
            obj.insert("Issues".into(), Value::String(String::new()));

            entries.push((2, node_name, obj));
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(2000).map(|(_, _, obj)| obj).collect();

    let total_switches = hbf.len().max(pfrn.len());
    let mut hash_dist_sorted: Vec<(String, usize)> = hash_function_distribution.into_iter().collect();
    hash_dist_sorted.sort_by(|a, b| b.1.cmp(&a.1));
    let most_common_seed = seed_distribution.iter().max_by_key(|(_, v)| **v).map(|(k, _)| *k).unwrap_or(0);

    let mut summary = Map::new();
    summary.insert("total_switches".into(), Value::from(total_switches));
    summary.insert("hbf_enabled_count".into(), Value::from(hbf_enabled_count));
    summary.insert("pfrn_enabled_count".into(), Value::from(pfrn_enabled_count));
    summary.insert("hbf_coverage_pct".into(), Value::from((hbf_enabled_count as f64 / total_switches.max(1) as f64 * 1000.0).round() / 10.0));
    summary.insert("pfrn_coverage_pct".into(), Value::from((pfrn_enabled_count as f64 / total_switches.max(1) as f64 * 1000.0).round() / 10.0));
    summary.insert("hash_function_distribution".into(), Value::Object(hash_dist_sorted.into_iter().map(|(k, v)| (k, Value::from(v))).collect()));
    summary.insert("unique_seeds".into(), Value::from(seed_distribution.len()));
    summary.insert("most_common_seed".into(), Value::from(most_common_seed));

    AnalyzerOutput { rows, anomalies: AnomalyFrame::new(), summary }
}
