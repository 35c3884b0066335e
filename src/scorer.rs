//! Health Scorer (spec.md §4.6), ported from `health_score.py`.
//!
//! The source aggregates anomalies into a comma-joined string column per row
//! and re-parses it at scoring time (`_match_anomaly`). Our analyzers already
//! produce typed `AnomalyFrame` rows, so the orchestrator flattens each
//! frame into a [`ScorerRow`] per `(guid, port, kind, weight)` before it ever
//! reaches this module (spec.md §9 "Aggregated anomaly column", §4.7 step 5).
//! A row's `"IBH Anomaly"`/`"IBH Anomaly Weight"` columns, where they appear
//! (raw CSV ingestion, §5), are converted into the same `ScorerRow` shape via
//! [`AnomalyKind::parse`] before calling [`run`] — the scorer itself never
//! touches a string column.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::anomaly::kb::{self, HeuristicKey};
use crate::anomaly::{AnomalyKind, Category, Explanation, Severity};

/// Fixed weight map (spec.md §4.6 step 1). Sums to 100.
pub const CATEGORY_WEIGHTS: &[(Category, f64)] = &[
    (Category::Ber, 25.0),
    (Category::Errors, 25.0),
    (Category::Congestion, 20.0),
    (Category::Latency, 10.0),
    (Category::Balance, 5.0),
    (Category::Config, 13.0),
    (Category::Anomaly, 2.0),
];

fn category_weight(category: Category) -> f64 {
    CATEGORY_WEIGHTS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, w)| *w)
        .unwrap_or(0.0)
}

/// One normalized input row. An analyzer's per-row anomaly contributes
/// `anomaly`; the four heuristic fields are read independently of whether
/// the row also carries an anomaly (spec.md §4.6 step 2 "apply heuristic
/// per-row rules").
#[derive(Debug, Clone, Default)]
pub struct ScorerRow {
    pub node_guid: String,
    pub port_number: Option<u32>,
    pub anomaly: Option<(AnomalyKind, f64)>,
    pub temperature_c: Option<f64>,
    pub link_downed_total: Option<i64>,
    pub link_error_recovery_total: Option<i64>,
    pub neighbor_port_inactive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueDetails {
    pub kb: Option<Explanation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub severity: &'static str,
    pub category: &'static str,
    pub description: String,
    pub node_guid: String,
    pub port_number: Option<u32>,
    pub weight: f64,
    pub details: IssueDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub score: i64,
    pub grade: &'static str,
    pub status: &'static str,
    pub total_nodes: usize,
    pub total_ports: usize,
    pub summary: Summary,
    pub category_scores: HashMap<&'static str, i64>,
    pub issues: Vec<Issue>,
}

fn grade_and_status(score: i64) -> (&'static str, &'static str) {
    match score {
        90..=100 => ("A", "Healthy"),
        80..=89 => ("B", "Healthy"),
        70..=79 => ("C", "Warning"),
        60..=69 => ("D", "Warning"),
        _ => ("F", "Critical"),
    }
}

fn push_issue(
    issues: &mut Vec<Issue>,
    deductions: &mut HashMap<Category, f64>,
    severity: Severity,
    category: Category,
    description: impl Into<String>,
    node_guid: &str,
    port_number: Option<u32>,
    weight: f64,
    kb: Option<Explanation>,
) {
    *deductions.entry(category).or_insert(0.0) += weight * severity.multiplier();
    issues.push(Issue {
        severity: severity.as_str(),
        category: category.as_str(),
        description: description.into(),
        node_guid: node_guid.to_string(),
        port_number,
        weight,
        details: IssueDetails { kb },
    });
}

/// Run the scorer over a fixed list of named sources (spec.md §4.6: "six
/// primary sources... plus an optional list of extras"). Iteration order
/// over `sources` and within each source's rows is preserved, keeping the
/// deduction summation order fixed (spec.md determinism clause).
pub fn run(sources: &[(&str, Vec<ScorerRow>)]) -> HealthReport {
    let mut deductions: HashMap<Category, f64> = HashMap::new();
    for (cat, _) in CATEGORY_WEIGHTS {
        deductions.insert(*cat, 0.0);
    }

    let mut issues = Vec::new();
    let mut node_guids: HashSet<String> = HashSet::new();
    let mut total_ports = 0usize;

    for (_source_name, rows) in sources {
        for row in rows {
            total_ports += 1;
            if !row.node_guid.is_empty() {
                node_guids.insert(row.node_guid.clone());
            }

            if let Some((kind, weight)) = row.anomaly {
                if weight > 0.0 {
                    push_issue(
                        &mut issues,
                        &mut deductions,
                        kind.default_severity(),
                        kind.category(),
                        kind.display(),
                        &row.node_guid,
                        row.port_number,
                        weight,
                        kb::lookup(kind).cloned(),
                    );
                }
            }

            if let Some(temp) = row.temperature_c {
                if temp >= 80.0 {
                    push_issue(
                        &mut issues,
                        &mut deductions,
                        Severity::Critical,
                        Category::Errors,
                        format!("High temperature ({temp:.1}C)"),
                        &row.node_guid,
                        row.port_number,
                        temp - 60.0,
                        kb::lookup_heuristic(HeuristicKey::HighTemperature).cloned(),
                    );
                } else if temp >= 70.0 {
                    push_issue(
                        &mut issues,
                        &mut deductions,
                        Severity::Warning,
                        Category::Errors,
                        format!("Elevated temperature ({temp:.1}C)"),
                        &row.node_guid,
                        row.port_number,
                        temp - 60.0,
                        kb::lookup_heuristic(HeuristicKey::ModerateTemperature).cloned(),
                    );
                }
            }

            if let Some(downed) = row.link_downed_total {
                if downed > 0 {
                    push_issue(
                        &mut issues,
                        &mut deductions,
                        Severity::Critical,
                        Category::Errors,
                        "Link downed counter incremented",
                        &row.node_guid,
                        row.port_number,
                        downed as f64,
                        kb::lookup_heuristic(HeuristicKey::LinkDown).cloned(),
                    );
                }
            }

            if let Some(recovery) = row.link_error_recovery_total {
                if recovery >= 3 {
                    let severity = if recovery >= 10 { Severity::Critical } else { Severity::Warning };
                    push_issue(
                        &mut issues,
                        &mut deductions,
                        severity,
                        Category::Errors,
                        "Link error recovery counter rising",
                        &row.node_guid,
                        row.port_number,
                        recovery as f64,
                        kb::lookup_heuristic(HeuristicKey::LinkRecovery).cloned(),
                    );
                }
            }

            if row.neighbor_port_inactive {
                push_issue(
                    &mut issues,
                    &mut deductions,
                    Severity::Warning,
                    Category::Errors,
                    "Port inactive while neighbor is active",
                    &row.node_guid,
                    row.port_number,
                    1.0,
                    kb::lookup_heuristic(HeuristicKey::PortInactive).cloned(),
                );
            }
        }
    }

    let mut category_scores: HashMap<&'static str, i64> = HashMap::new();
    let mut total = 0.0f64;
    for (category, weight) in CATEGORY_WEIGHTS {
        let deduction = deductions.get(category).copied().unwrap_or(0.0);
        let cap = 2.0 * weight;
        let clamped = deduction.min(cap);
        let cat_score = if cap > 0.0 { (100.0 - clamped / cap * 100.0).max(0.0) } else { 100.0 };
        category_scores.insert(category.as_str(), cat_score.round() as i64);
        total += cat_score * weight;
    }
    let score = ((total / 100.0).round() as i64).clamp(0, 100);
    let (grade, status) = grade_and_status(score);

    let mut summary = Summary { critical: 0, warning: 0, info: 0 };
    for issue in &issues {
        match issue.severity {
            "critical" => summary.critical += 1,
            "warning" => summary.warning += 1,
            _ => summary.info += 1,
        }
    }

    HealthReport {
        score,
        grade,
        status,
        total_nodes: node_guids.len(),
        total_ports,
        summary,
        category_scores,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs_yield_perfect_score() {
        let report = run(&[("brief", vec![]), ("cable", vec![]), ("xmit", vec![]), ("ber", vec![]), ("hca", vec![]), ("fan", vec![]), ("histogram", vec![])]);
        assert_eq!(report.score, 100);
        assert_eq!(report.grade, "A");
        assert_eq!(report.status, "Healthy");
        assert_eq!(report.total_nodes, 0);
        assert_eq!(report.total_ports, 0);
        assert_eq!(report.summary.critical, 0);
        assert_eq!(report.summary.warning, 0);
        assert_eq!(report.summary.info, 0);
    }

    #[test]
    fn critical_ber_only_scenario() {
        let rows = vec![ScorerRow {
            node_guid: "0x1".to_string(),
            port_number: Some(1),
            anomaly: Some((AnomalyKind::HighSymbolBer, 10.0)),
            ..Default::default()
        }];
        let report = run(&[("ber", rows)]);
        assert_eq!(report.issues.len(), 1);
        let issue = &report.issues[0];
        assert_eq!(issue.severity, "critical");
        assert_eq!(issue.category, "ber");
        assert_eq!(issue.description, "High Symbol BER");
        assert_eq!(issue.weight, 10.0);
        assert_eq!(report.score, 85);
        assert_eq!(report.grade, "B");
        assert_eq!(report.status, "Healthy");
    }

    #[test]
    fn temperature_heuristic_scenario() {
        let rows = vec![ScorerRow {
            node_guid: "0xe8".to_string(),
            port_number: Some(1),
            temperature_c: Some(85.0),
            ..Default::default()
        }];
        let report = run(&[("cable", rows)]);
        assert_eq!(report.issues.len(), 1);
        let issue = &report.issues[0];
        assert_eq!(issue.severity, "critical");
        assert_eq!(issue.category, "errors");
        assert!(issue.description.contains("High temperature"));
        assert_eq!(issue.weight, 25.0);
        assert_eq!(report.score, 75);
        assert_eq!(report.grade, "C");
        assert_eq!(report.status, "Warning");
    }

    #[test]
    fn link_downed_scenario() {
        let rows = vec![ScorerRow {
            node_guid: "0x2".to_string(),
            port_number: Some(3),
            link_downed_total: Some(5),
            ..Default::default()
        }];
        let report = run(&[("xmit", rows)]);
        assert_eq!(report.issues.len(), 1);
        let issue = &report.issues[0];
        assert_eq!(issue.severity, "critical");
        assert_eq!(issue.category, "errors");
        assert_eq!(issue.weight, 5.0);
        assert_eq!(report.score, 93);
        assert_eq!(report.grade, "A");
        assert_eq!(report.status, "Healthy");
        let kb = issue.details.kb.as_ref().expect("link down kb entry");
        assert_eq!(kb.reference, "ibdiagnet_health_check_guide:136-150");
    }

    #[test]
    fn dump_without_optional_tables_scores_perfect() {
        let report = run(&[]);
        assert_eq!(report.score, 100);
        assert!(report.issues.is_empty());
    }
}
