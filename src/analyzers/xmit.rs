//! Family A — port performance / congestion, ported from `xmit_service.py`.
//!
//! Reads `PM_DELTA`, merges `PORTS` metadata (state, phy-state, link
//! speed/width capability) and `CREDIT_WATCHDOG_TIMEOUT_COUNTERS`, and
//! derives congestion-level, downshift, and credit-watchdog anomalies
//! (spec.md §4.4 Family A).

use serde_json::{Map, Value};

use crate::analyzers::support::{annotate, cell_f64_or_zero, cell_i64_or_zero, row_guid, row_port, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::DatasetInventory;

const TICK_TO_SECONDS: f64 = 4e-9;

const WIDTH_PRIORITY: &[(i64, i64)] = &[(0x08, 12), (0x04, 8), (0x02, 4), (0x10, 2), (0x01, 1)];

const SPEED_PRIORITY: &[(i64, &str, i64)] = &[
    (0x800, "HDR/NDR", 7),
    (0x400, "EDR/HDR100", 6),
    (0x200, "FDR10", 5),
    (0x100, "FDR", 4),
    (0x80, "QDR", 3),
    (0x40, "DDR", 2),
    (0x20, "SDR+", 1),
    (0x10, "SDR", 1),
    (0x8, "Legacy", 0),
    (0x4, "Legacy", 0),
    (0x2, "Legacy", 0),
    (0x1, "Legacy", 0),
];

fn port_state_name(code: i64) -> &'static str {
    match code {
        0 => "NoChange",
        1 => "Down",
        2 => "Initialize",
        3 => "Armed",
        4 => "Active",
        _ => "Unknown",
    }
}

fn port_phy_state_name(code: i64) -> &'static str {
    match code {
        0 => "Unknown",
        1 => "Sleeping",
        2 => "Polling",
        3 => "Disabled",
        4 => "LinkUp",
        5 => "LinkUp",
        _ => "Unknown",
    }
}

fn decode_width_value(code: i64) -> Option<i64> {
    WIDTH_PRIORITY.iter().find(|(bit, _)| code & bit != 0).map(|(_, w)| *w)
}

fn decode_speed(code: i64) -> Option<(&'static str, i64)> {
    SPEED_PRIORITY.iter().find(|(bit, _, _)| code & bit != 0).map(|(_, label, pr)| (*label, *pr))
}

fn classify_wait_ratio(value: f64) -> &'static str {
    if value >= 5.0 {
        "severe"
    } else if value >= 1.0 {
        "warning"
    } else if value >= 0.0 {
        "normal"
    } else {
        "unknown"
    }
}

fn counter_weight(value: f64) -> f64 {
    if value <= 0.0 {
        0.0
    } else {
        f64::max(0.1, (value + 1.0).log10())
    }
}

fn ratio_weight(value: f64) -> f64 {
    if value >= 5.0 {
        value / 5.0
    } else if value >= 1.0 {
        value / 10.0
    } else {
        0.0
    }
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let pm_delta = inventory.read_table("PM_DELTA");
    if pm_delta.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let duration = inventory.scan_header_flag("--pm_pause_time", 30).filter(|d| *d > 0.0).unwrap_or(1.0);

    let ports = inventory.read_table("PORTS");
    let credit = inventory.read_table("CREDIT_WATCHDOG_TIMEOUT_COUNTERS");

    let mut rows = Vec::with_capacity(pm_delta.len());
    let mut anomalies = AnomalyFrame::new();
    let mut ratios = Vec::new();
    let mut congestions = Vec::new();
    let mut severe = 0usize;
    let mut warning_count = 0usize;
    let mut fecn_ports = 0usize;
    let mut becn_ports = 0usize;
    let mut credit_ports = 0usize;
    let mut link_down_ports = 0usize;
    let mut link_down_events = 0.0f64;

    for row in &pm_delta.rows {
        let guid = row_guid(&pm_delta, row);
        let port = row_port(&pm_delta, row);

        let wait_ticks = cell_f64_or_zero(&pm_delta, row, "PortXmitWaitExt");
        let wait_seconds = wait_ticks * TICK_TO_SECONDS;
        let wait_ratio_pct = (wait_seconds / duration) * 100.0;

        let fecn = cell_f64_or_zero(&pm_delta, row, "PortRcvFECN") + cell_f64_or_zero(&pm_delta, row, "PortRcvFECNExt");
        let becn = cell_f64_or_zero(&pm_delta, row, "PortRcvBECN") + cell_f64_or_zero(&pm_delta, row, "PortRcvBECNExt");
        let cong_ticks =
            cell_f64_or_zero(&pm_delta, row, "PortXmitTimeCong") + cell_f64_or_zero(&pm_delta, row, "PortXmitTimeCongExt");
        let xmit_congestion_pct = (cong_ticks * TICK_TO_SECONDS / duration) * 100.0;

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        annotate(&mut obj, topo, &guid, port);

        let congestion_level = classify_wait_ratio(wait_ratio_pct);
        obj.insert("CongestionLevel".into(), Value::String(congestion_level.to_string()));
        obj.insert("WaitSeconds".into(), Value::from(wait_seconds));
        obj.insert("WaitRatioPct".into(), Value::from(wait_ratio_pct));
        obj.insert("XmitCongestionPct".into(), Value::from(xmit_congestion_pct));
        obj.insert("FECNCount".into(), Value::from(fecn));
        obj.insert("BECNCount".into(), Value::from(becn));

        let link_down =
            cell_f64_or_zero(&pm_delta, row, "LinkDownedCounter") + cell_f64_or_zero(&pm_delta, row, "LinkDownedCounterExt");
        obj.insert("LinkDownedCounter".into(), Value::from(cell_f64_or_zero(&pm_delta, row, "LinkDownedCounter")));
        obj.insert(
            "LinkDownedCounterExt".into(),
            Value::from(cell_f64_or_zero(&pm_delta, row, "LinkDownedCounterExt")),
        );

        let mut credit_timeout = 0.0f64;
        let mut port_state_code: Option<i64> = None;
        let mut port_phy_code: Option<i64> = None;
        let mut active_width = None;
        let mut supported_width = None;
        let mut active_speed: Option<(&str, i64)> = None;
        let mut supported_speed: Option<(&str, i64)> = None;

        if let Some(pp) = ports.rows.iter().find(|pr| {
            row_guid(&ports, pr) == guid
                && row_port(&ports, pr) == port
        }) {
            port_state_code = Some(cell_i64_or_zero(&ports, pp, "PortState"));
            port_phy_code = Some(cell_i64_or_zero(&ports, pp, "PortPhyState"));
            active_width = decode_width_value(cell_i64_or_zero(&ports, pp, "LinkWidthActv"));
            supported_width = decode_width_value(cell_i64_or_zero(&ports, pp, "LinkWidthSup"));
            active_speed = decode_speed(cell_i64_or_zero(&ports, pp, "LinkSpeedActv"));
            supported_speed = decode_speed(cell_i64_or_zero(&ports, pp, "LinkSpeedSup"));
        }
        if let Some(cp) = credit.rows.iter().find(|cr| row_guid(&credit, cr) == guid && row_port(&credit, cr) == port) {
            credit_timeout = cell_f64_or_zero(&credit, cp, "total_port_credit_watchdog_timeout");
        }

        obj.insert(
            "PortState".into(),
            Value::String(port_state_code.map(port_state_name).unwrap_or("Unknown").to_string()),
        );
        obj.insert(
            "PortPhyState".into(),
            Value::String(port_phy_code.map(port_phy_state_name).unwrap_or("Unknown").to_string()),
        );
        if let Some(w) = active_width {
            obj.insert("ActiveLinkWidth".into(), Value::String(format!("{w}X")));
        }
        if let Some(w) = supported_width {
            obj.insert("SupportedLinkWidth".into(), Value::String(format!("{w}X")));
        }
        if let Some((label, _)) = active_speed {
            obj.insert("ActiveLinkSpeed".into(), Value::String(label.to_string()));
        }
        if let Some((label, _)) = supported_speed {
            obj.insert("SupportedLinkSpeed".into(), Value::String(label.to_string()));
        }
        obj.insert("CreditWatchdogTimeout".into(), Value::from(credit_timeout));

        let width_downshift = matches!((active_width, supported_width), (Some(a), Some(s)) if s > 0 && a < s);
        let speed_downshift = matches!(
            (active_speed, supported_speed),
            (Some((_, a)), Some((_, s))) if s > 0 && a < s
        );
        obj.insert(
            "LinkComplianceStatus".into(),
            Value::String(if width_downshift || speed_downshift { "Downshift" } else { "OK" }.to_string()),
        );

        let mut neighbor_is_active = false;
        if let (Some(attached_guid), Some(attached_port)) = (
            obj.get("Attached To GUID").and_then(|v| v.as_str()).map(str::to_string),
            obj.get("Attached To Port").and_then(|v| v.as_u64()),
        ) {
            if let Some(np) = ports
                .rows
                .iter()
                .find(|pr| row_guid(&ports, pr) == attached_guid && row_port(&ports, pr) == Some(attached_port as u32))
            {
                let neighbor_state = port_state_name(cell_i64_or_zero(&ports, np, "PortState"));
                let neighbor_phy = port_phy_state_name(cell_i64_or_zero(&ports, np, "PortPhyState"));
                obj.insert("NeighborPortState".into(), Value::String(neighbor_state.to_string()));
                obj.insert("NeighborPortPhyState".into(), Value::String(neighbor_phy.to_string()));
                neighbor_is_active = neighbor_state.contains("Active");
            }
        }
        obj.insert("NeighborIsActive".into(), Value::from(neighbor_is_active));

        if fecn > 0.0 {
            anomalies.push(&guid, port, AnomalyKind::FecnAlert, counter_weight(fecn));
            fecn_ports += 1;
        }
        if becn > 0.0 {
            anomalies.push(&guid, port, AnomalyKind::BecnAlert, counter_weight(becn));
            becn_ports += 1;
        }
        if xmit_congestion_pct > 0.0 {
            anomalies.push(&guid, port, AnomalyKind::XmitTimeCongestion, ratio_weight(xmit_congestion_pct));
        }
        if wait_ratio_pct > 0.0 {
            anomalies.push(&guid, port, AnomalyKind::HighXmitWait, ratio_weight(wait_ratio_pct));
        }
        if width_downshift || speed_downshift {
            let weight = match obj.get("Attached To Type").and_then(|v| v.as_str()) {
                Some(t) if t.to_ascii_lowercase().contains("switch") => 2.0,
                _ => 1.0,
            };
            anomalies.push(&guid, port, AnomalyKind::LinkDownshift, weight);
        }
        if credit_timeout > 0.0 {
            anomalies.push(&guid, port, AnomalyKind::CreditWatchdog, f64::max(0.1, credit_timeout));
            credit_ports += 1;
        }

        if wait_ratio_pct >= 5.0 || xmit_congestion_pct >= 5.0 {
            severe += 1;
        } else if wait_ratio_pct >= 1.0 || xmit_congestion_pct >= 1.0 || wait_seconds > 0.0 {
            warning_count += 1;
        }
        if link_down > 0.0 {
            link_down_ports += 1;
            link_down_events += link_down;
        }

        ratios.push(wait_ratio_pct);
        congestions.push(xmit_congestion_pct);
        rows.push(obj);
    }

    let total = rows.len().max(1) as f64;
    let mut summary = Map::new();
    summary.insert("total_ports".into(), Value::from(rows.len()));
    summary.insert("severe_ports".into(), Value::from(severe));
    summary.insert("warning_ports".into(), Value::from(warning_count));
    summary.insert("fecn_ports".into(), Value::from(fecn_ports));
    summary.insert("becn_ports".into(), Value::from(becn_ports));
    summary.insert("avg_wait_ratio_pct".into(), Value::from(ratios.iter().sum::<f64>() / total));
    summary.insert(
        "max_wait_ratio_pct".into(),
        Value::from(ratios.iter().cloned().fold(0.0_f64, f64::max)),
    );
    summary.insert("avg_congestion_pct".into(), Value::from(congestions.iter().sum::<f64>() / total));
    summary.insert("credit_watchdog_ports".into(), Value::from(credit_ports));
    summary.insert("link_down_ports".into(), Value::from(link_down_ports));
    summary.insert("link_down_events".into(), Value::from(link_down_events));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_thresholds() {
        assert_eq!(classify_wait_ratio(6.0), "severe");
        assert_eq!(classify_wait_ratio(2.0), "warning");
        assert_eq!(classify_wait_ratio(0.5), "normal");
    }

    #[test]
    fn weight_helpers() {
        assert_eq!(counter_weight(0.0), 0.0);
        assert!(counter_weight(9.0) >= 0.1);
        assert_eq!(ratio_weight(0.5), 0.0);
        assert_eq!(ratio_weight(2.0), 0.2);
        assert_eq!(ratio_weight(10.0), 2.0);
    }

    #[test]
    fn width_and_speed_decoding() {
        assert_eq!(decode_width_value(0x08), Some(12));
        assert_eq!(decode_speed(0x400), Some(("EDR/HDR100", 6)));
    }
}
