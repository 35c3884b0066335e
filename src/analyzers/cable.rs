//! Family B — cable / optics, ported from `cable_service.py`.
//!
//! Reads `CABLE_INFO`, joins `PORTS` for active/supported link speed, and
//! derives optical-alarm and cable/media-compliance anomalies (spec.md
//! §4.4 Family B).
//!
//! `cable_service.py`'s `run()` additionally drops every row whose computed
//! `Severity` is `"normal"` before returning `data`. That filtering is not
//! carried over here: spec.md's analyzer contract treats `rows` as the full
//! display set for a sub-table, with issue-row filtering handled once,
//! generically, at the orchestrator boundary (spec.md §4.7 step 8) rather
//! than per analyzer. Folding it in here would make this analyzer's `rows`
//! inconsistent with every other family's.

use serde_json::{Map, Value};

use crate::analyzers::support::{annotate, cell_f64_or_zero, cell_i64_or_zero, first_int_token, row_guid, row_port, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::{Cell, DatasetInventory, Frame, Row};

const SPEED_PRIORITY: &[(i64, &str, i64)] = &[
    (0x800, "HDR/NDR", 7),
    (0x400, "EDR/HDR100", 6),
    (0x200, "FDR10", 5),
    (0x100, "FDR", 4),
    (0x80, "QDR", 3),
    (0x40, "DDR", 2),
    (0x20, "SDR+", 1),
    (0x10, "SDR", 1),
];

fn decode_speed(code: i64) -> Option<(&'static str, i64)> {
    SPEED_PRIORITY.iter().find(|(bit, _, _)| code & bit != 0).map(|(_, label, pr)| (*label, *pr))
}

fn speed_desc_priority(desc: &str) -> i64 {
    let tokens = desc.to_ascii_lowercase();
    if tokens.contains("ndr") || tokens.contains("400g") {
        8
    } else if tokens.contains("hdr") || tokens.contains("200g") {
        7
    } else if tokens.contains("edr") || tokens.contains("100g") {
        6
    } else if tokens.contains("fdr10") {
        5
    } else if tokens.contains("fdr") {
        4
    } else if tokens.contains("qdr") || tokens.contains("40g") {
        3
    } else if tokens.contains("ddr") || tokens.contains("20g") {
        2
    } else if tokens.contains("sdr") || tokens.contains("10g") {
        1
    } else {
        0
    }
}

/// Temperature string parsing: strips surrounding quotes/whitespace and a
/// trailing `C`/`c`, treats `NA`/`N/A` as absent, otherwise `int(float(x))`.
fn parse_temperature(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Null => None,
        Cell::Int64(v) => Some(*v),
        Cell::Float64(v) if v.is_finite() => Some(*v as i64),
        Cell::Float64(_) => None,
        Cell::Text(s) => {
            let trimmed = s.trim().trim_matches('"').trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed.eq_ignore_ascii_case("n/a") {
                return None;
            }
            let stripped = trimmed.strip_suffix(['C', 'c']).unwrap_or(trimmed).trim();
            stripped.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64)
        },
    }
}

/// Alarm-column weight: a nonzero leading int/hex token -> `1.0`, else `0.0`.
fn alarm_weight(cell: &Cell) -> f64 {
    match first_int_token(cell) {
        Some(v) if v != 0 => 1.0,
        _ => 0.0,
    }
}

/// Status-column weight: blank or `"OK"` (case-insensitive) -> `0.0`, any
/// other text -> `1.0`.
fn status_weight(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("ok") {
        0.0
    } else {
        1.0
    }
}

/// Cable length vs. supported-speed-class compliance (spec.md §4.4 Family B):
/// fiber + HDR/FDR supported class over the matching length limit, or
/// copper/passive + HDR/FDR supported class over the matching limit.
fn evaluate_cable_limit(type_desc: &str, supported_speed: &str, length_sm: Option<f64>, length_cu: Option<f64>) -> String {
    let type_lower = type_desc.to_ascii_lowercase();
    let speed_lower = supported_speed.to_ascii_lowercase();
    if type_lower.contains("fiber") {
        for (keyword, limit) in [("hdr", 1000.0), ("fdr", 2000.0)] {
            if speed_lower.contains(keyword) {
                if let Some(len) = length_sm {
                    if len > limit {
                        return format!("SMF length exceeds {}m", limit as i64);
                    }
                }
            }
        }
    } else if type_lower.contains("copper") || type_lower.contains("passive") {
        for (keyword, limit) in [("hdr", 5.0), ("fdr", 3.0)] {
            if speed_lower.contains(keyword) {
                if let Some(len) = length_cu {
                    if len > limit {
                        return format!("Copper length exceeds {}m", limit as i64);
                    }
                }
            }
        }
    }
    "OK".to_string()
}

/// Cable-vs-port active speed compliance: a cable rated below the port's
/// active speed, or a missing SMF length on an HDR+-class optic.
fn evaluate_media_compatibility(
    supported_speed: &str,
    type_desc: &str,
    length_sm: Option<f64>,
    active_speed: Option<(&str, i64)>,
) -> String {
    let cable_priority = speed_desc_priority(supported_speed);
    if let Some((active_label, active_priority)) = active_speed {
        if active_priority > cable_priority && cable_priority > 0 {
            return format!("Cable rated for {supported_speed} but port at {active_label}");
        }
    }
    let type_lower = type_desc.to_ascii_lowercase();
    if type_lower.contains("sm") && length_sm.map(|l| l <= 0.0).unwrap_or(true) && cable_priority >= 7 {
        return "SMF length missing for HDR+ optic".to_string();
    }
    "OK".to_string()
}

fn find_port<'a>(ports: &'a Frame, guid: &str, port: Option<u32>) -> Option<&'a Row> {
    ports.rows.iter().find(|pr| row_guid(ports, pr) == guid && row_port(ports, pr) == port)
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let cable = inventory.read_table("CABLE_INFO");
    if cable.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };
    let ports = inventory.read_table("PORTS");

    let mut rows = Vec::with_capacity(cable.len());
    let mut anomalies = AnomalyFrame::new();
    let mut hot_cables = 0usize;
    let mut alarm_cables = 0usize;
    let mut mismatch_cables = 0usize;
    let mut max_temp: Option<i64> = None;

    for row in &cable.rows {
        let guid = row_guid(&cable, row);
        let port = row_port(&cable, row);

        let type_desc = cable.get(row, "TypeDesc").to_string();
        let supported_speed_desc = cable.get(row, "SupportedSpeedDesc").to_string();
        let length_sm = cell_f64_or_zero(&cable, row, "LengthSMFiber");
        let length_sm = if cable.get(row, "LengthSMFiber").is_null() { None } else { Some(length_sm) };
        let length_cu = cell_f64_or_zero(&cable, row, "LengthCopperOrActive");
        let length_cu = if cable.get(row, "LengthCopperOrActive").is_null() { None } else { Some(length_cu) };

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        annotate(&mut obj, topo, &guid, port);

        obj.insert("Vendor".into(), cable.get(row, "Vendor").to_json());
        obj.insert("PN".into(), cable.get(row, "PN").to_json());
        obj.insert("SN".into(), cable.get(row, "SN").to_json());
        obj.insert("TypeDesc".into(), Value::String(type_desc.clone()));
        obj.insert("SupportedSpeedDesc".into(), Value::String(supported_speed_desc.clone()));

        let temperature = parse_temperature(cable.get(row, "Temperature (c)"));
        obj.insert(
            "Temperature (c)".into(),
            temperature.map(Value::from).unwrap_or(Value::Null),
        );

        let tx_bias = cable.get(row, "TX Bias Alarm and Warning");
        let tx_power = cable.get(row, "TX Power Alarm and Warning");
        let rx_power = cable.get(row, "RX Power Alarm and Warning");
        let voltage = cable.get(row, "Latched Voltage Alarm and Warning");
        obj.insert("TX Bias Alarm and Warning".into(), tx_bias.to_json());
        obj.insert("TX Power Alarm and Warning".into(), tx_power.to_json());
        obj.insert("RX Power Alarm and Warning".into(), rx_power.to_json());
        obj.insert("Latched Voltage Alarm and Warning".into(), voltage.to_json());

        let cable_compliance = evaluate_cable_limit(&type_desc, &supported_speed_desc, length_sm, length_cu);
        obj.insert("CableComplianceStatus".into(), Value::String(cable_compliance.clone()));

        let mut active_speed = None;
        if let Some(pp) = find_port(&ports, &guid, port) {
            active_speed = decode_speed(cell_i64_or_zero(&ports, pp, "LinkSpeedActv"));
        }
        if let Some((label, _)) = active_speed {
            obj.insert("LocalActiveLinkSpeed".into(), Value::String(label.to_string()));
        }

        let cable_speed_status = evaluate_media_compatibility(&supported_speed_desc, &type_desc, length_sm, active_speed);
        obj.insert("CableSpeedStatus".into(), Value::String(cable_speed_status.clone()));

        if let Some(temp) = temperature {
            if temp >= 70 {
                anomalies.push(&guid, port, AnomalyKind::OpticalTempHigh, f64::max(0.1, (temp - 70) as f64));
                hot_cables += 1;
            }
            max_temp = Some(max_temp.map_or(temp, |m| m.max(temp)));
        }

        let mut had_alarm = false;
        for (cell, kind) in [
            (tx_bias, AnomalyKind::OpticalTxBias),
            (tx_power, AnomalyKind::OpticalTxPower),
            (rx_power, AnomalyKind::OpticalRxPower),
            (voltage, AnomalyKind::OpticalVoltage),
        ] {
            let weight = alarm_weight(cell);
            if weight > 0.0 {
                anomalies.push(&guid, port, kind, weight);
                had_alarm = true;
            }
        }
        if had_alarm {
            alarm_cables += 1;
        }

        let mut had_mismatch = false;
        for status in [&cable_compliance, &cable_speed_status] {
            let weight = status_weight(status);
            if weight > 0.0 {
                anomalies.push(&guid, port, AnomalyKind::CableMismatch, weight);
                had_mismatch = true;
            }
        }
        if had_mismatch {
            mismatch_cables += 1;
        }

        rows.push(obj);
    }

    let mut summary = Map::new();
    summary.insert("total_cables".into(), Value::from(rows.len()));
    summary.insert("hot_cables".into(), Value::from(hot_cables));
    summary.insert("alarm_cables".into(), Value::from(alarm_cables));
    summary.insert("mismatch_cables".into(), Value::from(mismatch_cables));
    summary.insert("max_temperature_c".into(), max_temp.map(Value::from).unwrap_or(Value::Null));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_parsing_handles_quotes_and_suffix() {
        assert_eq!(parse_temperature(&Cell::Text("\"45C\"".into())), Some(45));
        assert_eq!(parse_temperature(&Cell::Text("N/A".into())), None);
        assert_eq!(parse_temperature(&Cell::Int64(52)), Some(52));
    }

    #[test]
    fn alarm_and_status_weights() {
        assert_eq!(alarm_weight(&Cell::Text("0x00".into())), 0.0);
        assert_eq!(alarm_weight(&Cell::Text("0x01 extra".into())), 1.0);
        assert_eq!(status_weight("OK"), 0.0);
        assert_eq!(status_weight("SMF length exceeds 1000m"), 1.0);
    }

    #[test]
    fn cable_limit_and_media_compatibility() {
        assert_eq!(
            evaluate_cable_limit("Fiber", "HDR", Some(1500.0), None),
            "SMF length exceeds 1000m"
        );
        assert_eq!(evaluate_cable_limit("Copper", "FDR", None, Some(10.0)), "Copper length exceeds 3m");
        assert_eq!(evaluate_cable_limit("Fiber", "EDR", Some(1500.0), None), "OK");

        assert_eq!(
            evaluate_media_compatibility("FDR", "Fiber", Some(5.0), Some(("HDR/NDR", 7))),
            "Cable rated for FDR but port at HDR/NDR"
        );
        assert_eq!(evaluate_media_compatibility("HDR", "SM optic", None, None), "SMF length missing for HDR+ optic");
    }
}
