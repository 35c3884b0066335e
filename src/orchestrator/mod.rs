//! Orchestrator: the lifecycle of a single analysis request (spec.md §4.7).
//!
//! Fans every analyzer out onto a bounded worker pool, assembles the Brief
//! and Health Scorer from their outputs, and emits a `<name>_data` /
//! `<name>_issue_rows` pair per dataset.

mod index;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::analyzers::support::AnalyzerOutput;
use crate::analyzers::*;
use crate::anomaly::AnomalyFrame;
use crate::brief;
use crate::dump::{self, normalize_guid, DatasetInventory};
use crate::scorer::{self, HealthReport, ScorerRow};
use crate::utils::{sanitize_value, ApiError};
use index::{frame_index, issue_rows_for, PortKeySet};

type AnalyzerFn = fn(&DatasetInventory) -> AnalyzerOutput;

/// Every registered analyzer (spec.md §4.4), keyed by the name its two
/// payload views are published under (`<name>_data` / `<name>_issue_rows`).
const ANALYZERS: &[(&str, AnalyzerFn)] = &[
    ("xmit", xmit::run),
    ("cable", cable::run),
    ("ber", ber::run),
    ("hca", hca::run),
    ("fan", fan::run),
    ("psu", psu::run),
    ("temperature", temperature::run),
    ("routing", routing::run),
    ("mlnx", mlnx::run),
    ("port_health", port_health::run),
    ("links", links::run),
    ("pm_delta", pm_delta::run),
    ("histogram", histogram::run),
    ("link_oscillation", link_oscillation::run),
    ("credit_watchdog", credit_watchdog::run),
    ("ar_info", ar_info::run),
    ("neighbors", neighbors::run),
    ("pkey", pkey::run),
    ("power_sensors", power_sensors::run),
    ("sharp", sharp::run),
    ("sm_info", sm_info::run),
    ("qos", qos::run),
    ("fec_mode", fec_mode::run),
    ("phy_diagnostics", phy_diagnostics::run),
    ("port_hierarchy", port_hierarchy::run),
    ("extended_switch_info", extended_switch_info::run),
    ("extended_node_info", extended_node_info::run),
    ("n2n_security", n2n_security::run),
    ("pci_performance", pci_performance::run),
    ("per_lane_performance", per_lane_performance::run),
    ("routing_config", routing_config::run),
    ("switch", switch::run),
    ("system_info", system_info::run),
    ("vports", vports::run),
    ("buffer_histogram", buffer_histogram::run),
];

/// Sources the Health Scorer weighs directly (spec.md §4.6 "six primary
/// sources"). Every other analyzer still contributes via its flattened
/// anomaly frame, passed to the scorer as an extra.
const SCORER_PRIMARY_SOURCES: &[&str] = &["brief", "cable", "xmit", "ber", "hca", "fan", "histogram"];

/// Datasets whose issue-row membership is decided by the merged
/// cable|xmit|ber|hca "analysis" super-index rather than their own
/// per-analyzer anomaly frame (spec.md §4.7 step 7).
const ANALYSIS_SUPER_INDEX_MEMBERS: &[&str] = &["cable", "xmit", "ber", "hca"];

#[derive(Debug, Clone, Serialize)]
pub struct DatasetView {
    pub data: Vec<Map<String, Value>>,
    pub issue_rows: Vec<Map<String, Value>>,
    pub total_rows: usize,
    pub summary: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub brief: Vec<Map<String, Value>>,
    pub brief_issue_rows: Vec<Map<String, Value>>,
    pub health: HealthReport,
    pub datasets: HashMap<String, DatasetView>,
}

fn scorer_row_from_json(row: &Map<String, Value>) -> ScorerRow {
    let node_guid = row.get("NodeGUID").and_then(|v| v.as_str()).map(normalize_guid).unwrap_or_default();
    let port_number = row.get("PortNumber").and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))).map(|p| p as u32);
    let temperature_c = row.get("Temperature (c)").and_then(|v| v.as_f64());

    let counter = |name: &str| row.get(name).and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))).unwrap_or(0);
    let link_downed_total = Some(counter("LinkDownedCounter") + counter("LinkDownedCounterExt"));
    let link_error_recovery_total = Some(counter("LinkErrorRecoveryCounter") + counter("LinkErrorRecoveryCounterExt"));

    let neighbor_active = matches!(row.get("NeighborIsActive"), Some(Value::Bool(true)));
    let neighbor_port_inactive = if neighbor_active {
        let port_state = row.get("PortState").and_then(|v| v.as_str()).unwrap_or("");
        let port_phy_state = row.get("PortPhyState").and_then(|v| v.as_str()).unwrap_or("");
        let state_inactive = !port_state.contains("Active") && port_state != "4";
        let phy_inactive = !port_phy_state.contains("LinkUp");
        state_inactive || phy_inactive
    } else {
        false
    };

    ScorerRow { node_guid, port_number, anomaly: None, temperature_c, link_downed_total, link_error_recovery_total, neighbor_port_inactive }
}

fn anomaly_scorer_rows(frame: &AnomalyFrame) -> Vec<ScorerRow> {
    frame
        .rows()
        .iter()
        .map(|r| ScorerRow {
            node_guid: r.node_guid.clone(),
            port_number: r.port_number,
            anomaly: Some((r.kind, r.weight)),
            ..Default::default()
        })
        .collect()
}

/// Fan every analyzer out onto a worker pool bounded to `max_concurrency`
/// concurrent tasks (spec.md §4.7 step 2). Each analyzer runs as a blocking
/// task; a panic is logged and degrades to an empty result rather than
/// failing the whole request.
async fn run_analyzers(inventory: Arc<DatasetInventory>, max_concurrency: usize) -> HashMap<&'static str, AnalyzerOutput> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut set = JoinSet::new();
    for (name, f) in ANALYZERS {
        let inv = inventory.clone();
        let sem = semaphore.clone();
        let name = *name;
        let f = *f;
        set.spawn(async move {
            let _permit = sem.acquire_owned().await.expect("semaphore never closed");
            let output = match tokio::task::spawn_blocking(move || f(&inv)).await {
                Ok(output) => output,
                Err(err) => {
                    tracing::error!(analyzer = name, error = %err, "analyzer task panicked");
                    AnalyzerOutput::empty()
                },
            };
            (name, output)
        });
    }

    let mut outputs = HashMap::with_capacity(ANALYZERS.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, output)) => {
                outputs.insert(name, output);
            },
            Err(err) => tracing::error!(error = %err, "analyzer task failed to join"),
        }
    }
    outputs
}

/// Run the full analysis lifecycle for one extracted dump directory
/// (spec.md §4.7). Releases the dataset's shared inventory on the way out.
pub async fn analyze(dataset_root: &Path, max_concurrency: usize) -> Result<AnalysisResult, ApiError> {
    let inventory = dump::acquire(dataset_root)?;
    let outputs = run_analyzers(inventory.clone(), max_concurrency).await;
    dump::release(dataset_root);

    let empty_rows: Vec<Map<String, Value>> = Vec::new();
    let rows_of = |name: &str| outputs.get(name).map(|o| o.rows.as_slice()).unwrap_or(empty_rows.as_slice());

    let brief_rows = sanitize_rows(brief::run(rows_of("xmit"), rows_of("cable"), rows_of("ber"), rows_of("hca")));

    let analysis_super_index: PortKeySet = ANALYSIS_SUPER_INDEX_MEMBERS
        .iter()
        .filter_map(|name| outputs.get(*name))
        .flat_map(|o| frame_index(&o.anomalies))
        .collect();

    let mut scorer_sources: Vec<(&str, Vec<ScorerRow>)> = Vec::with_capacity(SCORER_PRIMARY_SOURCES.len() + outputs.len());
    for name in SCORER_PRIMARY_SOURCES {
        let name = *name;
        let rows = if name == "brief" { brief_rows.as_slice() } else { rows_of(name) };
        scorer_sources.push((name, rows.iter().map(scorer_row_from_json).collect()));
    }
    for (name, output) in &outputs {
        if !output.anomalies.is_empty() {
            scorer_sources.push((*name, anomaly_scorer_rows(&output.anomalies)));
        }
    }

    let health = scorer::run(&scorer_sources);
    let brief_issue_rows = sanitize_rows(issue_rows_for(&brief_rows, &analysis_super_index));

    let mut datasets = HashMap::with_capacity(outputs.len());
    for (name, output) in &outputs {
        let index: PortKeySet = if ANALYSIS_SUPER_INDEX_MEMBERS.contains(name) {
            analysis_super_index.clone()
        } else {
            frame_index(&output.anomalies)
        };
        let issue_rows = issue_rows_for(&output.rows, &index);
        datasets.insert(
            name.to_string(),
            DatasetView {
                total_rows: output.rows.len(),
                data: sanitize_rows(output.rows.clone()),
                issue_rows: sanitize_rows(issue_rows),
                summary: sanitize_object(output.summary.clone()),
            },
        );
    }

    Ok(AnalysisResult { brief: brief_rows, brief_issue_rows, health, datasets })
}

/// NaN/Inf can only reach a row via a derived float an analyzer computed
/// in-process (e.g. a ratio or average); anything sourced from a dump cell
/// was already guarded at `Cell::to_json` time. Sanitize once here rather
/// than at every analyzer (spec.md §4.7 step 5 "sanitize NaN/Inf").
fn sanitize_object(row: Map<String, Value>) -> Map<String, Value> {
    match sanitize_value(Value::Object(row)) {
        Value::Object(m) => m,
        _ => unreachable!("sanitize_value preserves the Object variant"),
    }
}

fn sanitize_rows(rows: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
    rows.into_iter().map(sanitize_object).collect()
}
