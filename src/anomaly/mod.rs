//! Anomaly taxonomy, per-analyzer frames, and the static knowledge base
//! (spec.md §3, §4.6, §9).

pub mod frame;
pub mod kb;
pub mod kind;

pub use frame::{AnomalyFrame, AnomalyRow};
pub use kb::{Explanation, HeuristicKey};
pub use kind::{AnomalyKind, Category, Severity};
