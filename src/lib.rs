//! IB Health library
//!
//! Everything needed to turn an `ibdiagnet` dump directory (or a generic
//! CSV file) into a fabric health report: dump ingestion, the per-family
//! analyzers, the anomaly taxonomy and knowledge base, the Brief Merger,
//! the Health Scorer, and the orchestrator that ties them together for a
//! single analysis run.

pub mod analyzers;
pub mod anomaly;
pub mod brief;
pub mod config;
pub mod csv_generic;
pub mod dump;
pub mod orchestrator;
pub mod payload;
pub mod scorer;
pub mod utils;

pub use config::Config;
pub use orchestrator::{analyze, AnalysisResult, DatasetView};
pub use scorer::HealthReport;
pub use utils::{ApiError, ApiResult};

/// Process-wide state shared across analysis runs: just the resolved
/// configuration. There is no database pool or session state here — each
/// `analyze()` call is self-contained and keyed by the dataset path it was
/// given (see `dump::acquire`/`dump::release`).
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}
