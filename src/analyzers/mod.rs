//! Per-family analyzers (spec.md §4.4). Each submodule exposes a single
//! `run(inventory: &DatasetInventory) -> AnalyzerOutput` entry point; the
//! orchestrator fans out across all of them concurrently.

pub mod support;

pub mod xmit;
pub mod cable;
pub mod ber;
pub mod hca;
pub mod fan;
pub mod psu;
pub mod temperature;
pub mod routing;
pub mod mlnx;
pub mod port_health;
pub mod links;
pub mod pm_delta;
pub mod histogram;
pub mod link_oscillation;
pub mod credit_watchdog;
pub mod ar_info;
pub mod neighbors;
pub mod pkey;
pub mod power_sensors;
pub mod sharp;
pub mod sm_info;
pub mod qos;
pub mod fec_mode;
pub mod phy_diagnostics;
pub mod port_hierarchy;
pub mod extended_switch_info;
pub mod extended_node_info;
pub mod n2n_security;
pub mod pci_performance;
pub mod per_lane_performance;
pub mod routing_config;
pub mod switch;
pub mod system_info;
pub mod vports;
pub mod buffer_histogram;

pub use support::AnalyzerOutput;
