//! Family C — bit error rate, ported from `ber_service.py`.
//!
//! Parses the companion `*net_dump_ext` text file for raw/effective/symbol
//! BER per port, merges `SymbolErrorCounter(Ext)` from `PERFQUERY_EXT_ERRORS`
//! (falling back to `PM`), classifies severity against environment-overridable
//! thresholds, and folds in the `WARNINGS_SYMBOL_BER_CHECK` sub-table as
//! additional rows (spec.md §4.4 Family C, §6 net_dump_ext field layout).

use std::io::BufRead;

use serde_json::{Map, Value};

use crate::analyzers::support::{annotate, cell_f64_or_zero, row_guid, row_port, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::{normalize_guid, DatasetInventory};

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name).ok().and_then(|v| v.parse::<f64>().ok()).unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name).ok().and_then(|v| v.parse::<i64>().ok()).unwrap_or(default)
}

fn parse_ber_string(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("na") {
        return None;
    }
    text.parse::<f64>().ok()
}

fn safe_log10(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0).map(f64::log10)
}

fn severity_rank(severity: &str) -> u8 {
    match severity {
        "critical" => 3,
        "warning" => 2,
        "normal" => 1,
        _ => 0,
    }
}

fn max_severity(current: &str, candidate: &str) -> &'static str {
    let current = if current.is_empty() { "normal" } else { current };
    if severity_rank(candidate) >= severity_rank(current) {
        match candidate {
            "critical" => "critical",
            "warning" => "warning",
            "normal" => "normal",
            _ => "unknown",
        }
    } else {
        match current {
            "critical" => "critical",
            "warning" => "warning",
            "normal" => "normal",
            _ => "unknown",
        }
    }
}

fn classify_symbol_log(log_value: Option<f64>, critical_log: f64, warning_log: f64) -> &'static str {
    match log_value {
        None => "unknown",
        Some(v) if v > critical_log => "critical",
        Some(v) if v > warning_log => "warning",
        Some(_) => "normal",
    }
}

fn warning_event_severity(event_name: &str) -> &'static str {
    match event_name {
        "BER_THRESHOLD_EXCEEDED" => "critical",
        "BER_NEAR_THRESHOLD" => "warning",
        "BER_RS_FEC_EXCESSIVE_ERRORS" => "critical",
        "BER_RS_FEC_HIGH_ERRORS" => "warning",
        "BER_NO_THRESHOLD_IS_SUPPORTED" => "info",
        _ => "info",
    }
}

/// A single `CA:`/`SW:` port line out of a `net_dump_ext` companion file.
struct NetDumpRow {
    node_guid: String,
    port: Option<u32>,
    node_name: String,
    attached_to: String,
    raw_ber: String,
    eff_ber: String,
    sym_ber: String,
    symbol_err: i64,
    effective_err: i64,
}

fn parse_net_dump_file(inventory: &DatasetInventory) -> Vec<NetDumpRow> {
    let Some(path) = inventory.find_companion_file("net_dump_ext") else {
        return Vec::new();
    };
    let Ok(file) = std::fs::File::open(&path) else {
        return Vec::new();
    };
    let mut rows = Vec::new();
    for raw_line in std::io::BufReader::new(file).lines() {
        let Ok(line) = raw_line else { continue };
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        if !(stripped.starts_with("CA") || stripped.starts_with("SW")) {
            continue;
        }
        let parts: Vec<&str> = stripped.split(':').map(str::trim).collect();
        if parts.len() < 15 {
            continue;
        }
        let Some(port) = parts[2].parse::<i64>().ok().map(|p| p as u32) else {
            continue;
        };
        let node_guid = normalize_guid(parts[3]);
        let node_name = parts.get(17).map(|s| s.trim_matches('"').to_string()).unwrap_or_else(|| parts[3].to_string());
        rows.push(NetDumpRow {
            node_guid,
            port: Some(port),
            node_name,
            attached_to: parts[9].to_string(),
            raw_ber: parts[12].to_string(),
            eff_ber: parts[13].to_string(),
            sym_ber: parts[14].to_string(),
            symbol_err: parts.get(15).and_then(|s| s.parse::<i64>().ok()).unwrap_or(0),
            effective_err: parts.get(16).and_then(|s| s.parse::<i64>().ok()).unwrap_or(0),
        });
    }
    rows
}

/// `SymbolErrorCounter`/`SymbolErrorCounterExt` keyed by (guid, port), from
/// `PERFQUERY_EXT_ERRORS` or, failing that, `PM`.
fn load_pm_symbol_counters(inventory: &DatasetInventory) -> std::collections::HashMap<(String, Option<u32>), (f64, f64)> {
    let mut counters = std::collections::HashMap::new();
    for table in ["PERFQUERY_EXT_ERRORS", "PM"] {
        let frame = inventory.read_table(table);
        if frame.is_empty() {
            continue;
        }
        for row in &frame.rows {
            let guid = row_guid(&frame, row);
            let port = row_port(&frame, row);
            let sym = cell_f64_or_zero(&frame, row, "SymbolErrorCounter");
            let sym_ext = cell_f64_or_zero(&frame, row, "SymbolErrorCounterExt");
            counters.insert((guid, port), (sym, sym_ext));
        }
        if !counters.is_empty() {
            break;
        }
    }
    counters
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let net_dump_rows = parse_net_dump_file(inventory);
    let warnings = inventory.read_table("WARNINGS_SYMBOL_BER_CHECK");

    if net_dump_rows.is_empty() && warnings.is_empty() {
        return AnalyzerOutput::empty();
    }

    let pm_counters = load_pm_symbol_counters(inventory);

    let critical_threshold = env_f64("IBA_BER_TH", 1e-12);
    let warning_threshold = env_f64("IBA_BER_WARN_TH", 1e-15);
    let critical_log = critical_threshold.log10();
    let warning_log = critical_threshold.min(warning_threshold).log10();
    let fallback_min = env_i64("IBA_BER_FALLBACK_MIN", 1024);
    let min_symbol_log = env_f64("IBA_BER_SYMBOL_VALID_MIN_LOG10", -60.0);

    let mut rows = Vec::with_capacity(net_dump_rows.len() + warnings.len());
    let mut anomalies = AnomalyFrame::new();
    let mut critical_ports = 0usize;
    let mut warning_ports = 0usize;

    for entry in &net_dump_rows {
        let raw_value = parse_ber_string(&entry.raw_ber);
        let eff_value = parse_ber_string(&entry.eff_ber);
        let sym_value = parse_ber_string(&entry.sym_ber);
        if raw_value.is_none() && eff_value.is_none() && sym_value.is_none() {
            continue;
        }
        let raw_log = safe_log10(raw_value);
        let eff_log = safe_log10(eff_value);
        let sym_log = safe_log10(sym_value);

        let (pm_sym, pm_sym_ext) = pm_counters.get(&(entry.node_guid.clone(), entry.port)).copied().unwrap_or((0.0, 0.0));
        let total_symbol_errors = entry.symbol_err as f64 + pm_sym + pm_sym_ext;

        let mut severity = classify_symbol_log(sym_log, critical_log, warning_log).to_string();
        let err_gate = if total_symbol_errors > 0.0 { total_symbol_errors } else { entry.effective_err as f64 };
        if err_gate >= fallback_min as f64 {
            let symbol_log_valid = sym_log.is_some_and(|v| v > min_symbol_log);
            if symbol_log_valid {
                if sym_log.is_some_and(|v| v >= critical_log) {
                    severity = "critical".to_string();
                } else if sym_log.is_some_and(|v| v >= warning_log) {
                    severity = max_severity(&severity, "warning").to_string();
                }
            } else if eff_log.is_some_and(|v| v >= critical_log) {
                severity = "critical".to_string();
            } else if eff_log.is_some_and(|v| v >= warning_log) {
                severity = max_severity(&severity, "warning").to_string();
            } else if raw_log.is_some_and(|v| v >= critical_log) {
                severity = "critical".to_string();
            } else if raw_log.is_some_and(|v| v >= warning_log) {
                severity = max_severity(&severity, "warning").to_string();
            }
        }

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(entry.node_guid.clone()));
        if let Some(p) = entry.port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        annotate(&mut obj, topo, &entry.node_guid, entry.port);
        obj.insert("Node Name".into(), Value::String(entry.node_name.clone()));
        obj.insert("Attached To".into(), Value::String(entry.attached_to.clone()));
        obj.insert("Raw BER".into(), Value::String(entry.raw_ber.clone()));
        obj.insert("Effective BER".into(), Value::String(entry.eff_ber.clone()));
        obj.insert("Symbol BER".into(), Value::String(entry.sym_ber.clone()));
        obj.insert(
            "IBH Anomaly".into(),
            Value::String(if matches!(severity.as_str(), "critical" | "warning") {
                AnomalyKind::HighSymbolBer.to_string()
            } else {
                String::new()
            }),
        );
        obj.insert("SymbolBERSeverity".into(), Value::String(severity.clone()));
        obj.insert("SymbolBERLog10Value".into(), sym_log.map(Value::from).unwrap_or(Value::Null));
        obj.insert("Log10 Symbol BER".into(), sym_log.map(Value::from).unwrap_or(Value::Null));
        obj.insert("Log10 Effective BER".into(), eff_log.map(Value::from).unwrap_or(Value::Null));
        obj.insert("Log10 Raw BER".into(), raw_log.map(Value::from).unwrap_or(Value::Null));

        match severity.as_str() {
            "critical" => {
                anomalies.push(&entry.node_guid, entry.port, AnomalyKind::HighSymbolBer, 1.0);
                critical_ports += 1;
            },
            "warning" => {
                anomalies.push(&entry.node_guid, entry.port, AnomalyKind::HighSymbolBer, 0.5);
                warning_ports += 1;
            },
            _ => {},
        }

        rows.push(obj);
    }

    for row in &warnings.rows {
        let guid = row_guid(&warnings, row);
        let port = row_port(&warnings, row);
        let event_name = warnings.get(row, "EventName").to_string();
        let summary = warnings.get(row, "Summary").to_string();
        let summary = summary.trim_matches('"').to_string();
        let severity = warning_event_severity(&event_name);

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        annotate(&mut obj, topo, &guid, port);
        obj.insert("EventName".into(), Value::String(event_name));
        obj.insert("Summary".into(), Value::String(summary));
        obj.insert(
            "IBH Anomaly".into(),
            Value::String(if matches!(severity, "critical" | "warning") {
                AnomalyKind::HighSymbolBer.to_string()
            } else {
                String::new()
            }),
        );
        obj.insert("SymbolBERSeverity".into(), Value::String(severity.to_string()));

        match severity {
            "critical" => {
                anomalies.push(&guid, port, AnomalyKind::HighSymbolBer, 1.0);
                critical_ports += 1;
            },
            "warning" => {
                anomalies.push(&guid, port, AnomalyKind::HighSymbolBer, 0.5);
                warning_ports += 1;
            },
            _ => {},
        }

        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_rows".into(), Value::from(rows.len()));
    summary.insert("critical_ports".into(), Value::from(critical_ports));
    summary.insert("warning_ports".into(), Value::from(warning_ports));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ber_string_parsing_treats_na_as_absent() {
        assert_eq!(parse_ber_string("1.5e-10"), Some(1.5e-10));
        assert_eq!(parse_ber_string("NA"), None);
        assert_eq!(parse_ber_string(""), None);
    }

    #[test]
    fn log10_rejects_non_positive() {
        assert_eq!(safe_log10(Some(0.0)), None);
        assert_eq!(safe_log10(Some(-1.0)), None);
        assert!(safe_log10(Some(1e-10)).unwrap() < 0.0);
    }

    #[test]
    fn classification_respects_thresholds() {
        let critical_log = 1e-12_f64.log10();
        let warning_log = 1e-15_f64.log10();
        assert_eq!(classify_symbol_log(Some(-10.0), critical_log, warning_log), "critical");
        assert_eq!(classify_symbol_log(Some(-14.0), critical_log, warning_log), "warning");
        assert_eq!(classify_symbol_log(Some(-20.0), critical_log, warning_log), "normal");
        assert_eq!(classify_symbol_log(None, critical_log, warning_log), "unknown");
    }

    #[test]
    fn severity_escalates_monotonically() {
        assert_eq!(max_severity("normal", "warning"), "warning");
        assert_eq!(max_severity("critical", "warning"), "critical");
        assert_eq!(max_severity("warning", "critical"), "critical");
    }

    #[test]
    fn warning_events_map_to_severity() {
        assert_eq!(warning_event_severity("BER_THRESHOLD_EXCEEDED"), "critical");
        assert_eq!(warning_event_severity("BER_NEAR_THRESHOLD"), "warning");
        assert_eq!(warning_event_severity("BER_NO_THRESHOLD_IS_SUPPORTED"), "info");
    }
}
