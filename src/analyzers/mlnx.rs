//! Family F — Mellanox-specific queue-pair/transport counters, ported from
//! `mlnx_counters_service.py`.
//!
//! Reads `MLNX_CNTRS_INFO`, keeps only ports with nonzero RNR/timeout/QP
//! activity (an all-zero port carries no signal here, unlike the
//! severity-based row filtering this crate otherwise declines to carry
//! over), ranks by severity then total errors, and caps the result at 2000
//! rows (spec.md §4.4 Family F).

use serde_json::{Map, Value};

use crate::analyzers::support::{cell_i64_or_zero, row_guid, row_port, AnalyzerOutput};
use crate::anomaly::{AnomalyFrame, AnomalyKind};
use crate::dump::DatasetInventory;

const RNR_WARNING_THRESHOLD: i64 = 1_000;
const RNR_CRITICAL_THRESHOLD: i64 = 100_000;
const TIMEOUT_WARNING_THRESHOLD: i64 = 100;
const TIMEOUT_CRITICAL_THRESHOLD: i64 = 10_000;
const QP_ERROR_THRESHOLD: i64 = 10;
const MAX_ROWS: usize = 2000;

struct PortCounters {
    rnr_count: i64,
    timeout_count: i64,
    rq_wrfe: i64,
    sq_wrfe: i64,
    transport_retry: i64,
    remote_access_err: i64,
    remote_op_err: i64,
    local_prot_err: i64,
    dc_cacks: i64,
    total_errors: i64,
}

fn classify(counters: &PortCounters) -> (&'static str, Vec<String>) {
    let mut severity = "normal";
    let mut issues = Vec::new();

    if counters.rnr_count >= RNR_CRITICAL_THRESHOLD {
        severity = "critical";
        issues.push(format!("High RNR retries: {}", counters.rnr_count));
    } else if counters.rnr_count >= RNR_WARNING_THRESHOLD {
        severity = "warning";
        issues.push(format!("RNR retries: {}", counters.rnr_count));
    }

    if counters.timeout_count >= TIMEOUT_CRITICAL_THRESHOLD {
        severity = "critical";
        issues.push(format!("High timeouts: {}", counters.timeout_count));
    } else if counters.timeout_count >= TIMEOUT_WARNING_THRESHOLD {
        if severity == "normal" {
            severity = "warning";
        }
        issues.push(format!("Timeouts: {}", counters.timeout_count));
    }

    if counters.total_errors >= QP_ERROR_THRESHOLD {
        if severity == "normal" {
            severity = "warning";
        }
        issues.push(format!("QP errors: {}", counters.total_errors));
    }

    (severity, issues)
}

pub fn run(inventory: &DatasetInventory) -> AnalyzerOutput {
    let mlnx = inventory.read_table("MLNX_CNTRS_INFO");
    if mlnx.is_empty() {
        return AnalyzerOutput::empty();
    }
    let topo = match inventory.topology() {
        Ok(t) => t,
        Err(_) => return AnalyzerOutput::empty(),
    };

    let mut entries = Vec::new();
    let mut anomalies = AnomalyFrame::new();
    let mut critical_count = 0usize;
    let mut warning_count = 0usize;
    let mut total_rnr = 0i64;
    let mut total_timeouts = 0i64;
    let mut total_errors_sum = 0i64;
    let mut ports_with_rnr = 0usize;
    let mut ports_with_timeouts = 0usize;

    for row in &mlnx.rows {
        let guid = row_guid(&mlnx, row);
        let port = row_port(&mlnx, row);

        let counters = PortCounters {
            rnr_count: cell_i64_or_zero(&mlnx, row, "sq_num_rnr"),
            timeout_count: cell_i64_or_zero(&mlnx, row, "sq_num_to"),
            rq_wrfe: cell_i64_or_zero(&mlnx, row, "rq_num_wrfe"),
            sq_wrfe: cell_i64_or_zero(&mlnx, row, "sq_num_wrfe"),
            transport_retry: cell_i64_or_zero(&mlnx, row, "sq_num_tree"),
            remote_access_err: cell_i64_or_zero(&mlnx, row, "sq_num_rae"),
            remote_op_err: cell_i64_or_zero(&mlnx, row, "rq_num_roe"),
            local_prot_err: cell_i64_or_zero(&mlnx, row, "sq_num_lpe"),
            dc_cacks: cell_i64_or_zero(&mlnx, row, "rq_num_dc_cacks"),
            total_errors: 0,
        };
        let total_errors = counters.rq_wrfe
            + counters.sq_wrfe
            + counters.transport_retry
            + counters.remote_access_err
            + counters.remote_op_err
            + counters.local_prot_err;
        let counters = PortCounters { total_errors, ..counters };

        if counters.rnr_count == 0 && counters.timeout_count == 0 && counters.total_errors == 0 && counters.dc_cacks == 0 {
            continue;
        }

        let (severity, issues) = classify(&counters);

        let mut obj = Map::new();
        obj.insert("NodeGUID".into(), Value::String(guid.clone()));
        obj.insert("NodeName".into(), Value::String(topo.node_label(&guid).unwrap_or(&guid).to_string()));
        if let Some(p) = port {
            obj.insert("PortNumber".into(), Value::from(p));
        }
        obj.insert("RNRRetries".into(), Value::from(counters.rnr_count));
        obj.insert("Timeouts".into(), Value::from(counters.timeout_count));
        obj.insert("RQFlushErrors".into(), Value::from(counters.rq_wrfe));
        obj.insert("SQFlushErrors".into(), Value::from(counters.sq_wrfe));
        obj.insert("TransportRetryExceeded".into(), Value::from(counters.transport_retry));
        obj.insert("RemoteAccessErrors".into(), Value::from(counters.remote_access_err));
        obj.insert("RemoteOpErrors".into(), Value::from(counters.remote_op_err));
        obj.insert("LocalProtectionErrors".into(), Value::from(counters.local_prot_err));
        obj.insert("DCConnAcks".into(), Value::from(counters.dc_cacks));
        obj.insert("TotalErrors".into(), Value::from(counters.total_errors));
        obj.insert("Severity".into(), Value::String(severity.to_string()));
        obj.insert("Issues".into(), Value::String(issues.join("; ")));

        match severity {
            "critical" => {
                anomalies.push(&guid, port, AnomalyKind::MlnxCounterCritical, 1.0);
                critical_count += 1;
            },
            "warning" => {
                anomalies.push(&guid, port, AnomalyKind::MlnxCounterWarning, 0.5);
                warning_count += 1;
            },
            _ => {},
        }
        total_rnr += counters.rnr_count;
        total_timeouts += counters.timeout_count;
        total_errors_sum += counters.total_errors;
        if counters.rnr_count > 0 {
            ports_with_rnr += 1;
        }
        if counters.timeout_count > 0 {
            ports_with_timeouts += 1;
        }

        let rank = match severity {
            "critical" => 0,
            "warning" => 1,
            _ => 2,
        };
        entries.push((rank, counters.total_errors, obj));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    let rows: Vec<Map<String, Value>> = entries.into_iter().take(MAX_ROWS).map(|(_, _, obj)| obj).collect();

    let mut summary = Map::new();
    summary.insert("total_ports_analyzed".into(), Value::from(mlnx.len()));
    summary.insert("total_ports_with_activity".into(), Value::from(rows.len()));
    summary.insert("total_rnr_retries".into(), Value::from(total_rnr));
    summary.insert("total_timeouts".into(), Value::from(total_timeouts));
    summary.insert("total_qp_errors".into(), Value::from(total_errors_sum));
    summary.insert("critical_count".into(), Value::from(critical_count));
    summary.insert("warning_count".into(), Value::from(warning_count));
    summary.insert("ports_with_rnr".into(), Value::from(ports_with_rnr));
    summary.insert("ports_with_timeouts".into(), Value::from(ports_with_timeouts));

    AnalyzerOutput { rows, anomalies, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(rnr: i64, timeout: i64, total_errors: i64) -> PortCounters {
        PortCounters {
            rnr_count: rnr,
            timeout_count: timeout,
            rq_wrfe: 0,
            sq_wrfe: 0,
            transport_retry: 0,
            remote_access_err: 0,
            remote_op_err: 0,
            local_prot_err: 0,
            dc_cacks: 0,
            total_errors,
        }
    }

    #[test]
    fn critical_rnr_outranks_warning_timeout() {
        let (severity, _) = classify(&counters(RNR_CRITICAL_THRESHOLD, TIMEOUT_WARNING_THRESHOLD, 0));
        assert_eq!(severity, "critical");
    }

    #[test]
    fn qp_errors_alone_are_warning() {
        let (severity, _) = classify(&counters(0, 0, QP_ERROR_THRESHOLD));
        assert_eq!(severity, "warning");
    }

    #[test]
    fn no_activity_is_normal() {
        let (severity, issues) = classify(&counters(0, 0, 0));
        assert_eq!(severity, "normal");
        assert!(issues.is_empty());
    }
}
