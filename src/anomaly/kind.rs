//! The closed anomaly taxonomy (spec.md §3, §4.6 `ANOMALY_CATEGORIES`).
//!
//! Every variant carries its canonical display string, scoring category, and
//! default severity. The scorer never constructs a category/severity pair by
//! hand — it always goes through `AnomalyKind::category()`/`default_severity()`
//! so the weight budget in `scorer.rs` stays the single source of truth for
//! category names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Scorer deduction multiplier (spec.md §4.6 step 2).
    pub fn multiplier(&self) -> f64 {
        match self {
            Severity::Critical => 3.0,
            Severity::Warning => 1.5,
            Severity::Info => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// Fixed category set from spec.md §3; also the key space of
/// `scorer::CATEGORY_WEIGHTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Ber,
    Errors,
    Congestion,
    Latency,
    Balance,
    Config,
    Anomaly,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ber => "ber",
            Category::Errors => "errors",
            Category::Congestion => "congestion",
            Category::Latency => "latency",
            Category::Balance => "balance",
            Category::Config => "config",
            Category::Anomaly => "anomaly",
        }
    }
}

macro_rules! anomaly_kind {
    ($($variant:ident => ($display:expr, $category:ident, $severity:ident)),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum AnomalyKind {
            $($variant),+
        }

        impl AnomalyKind {
            pub const ALL: &'static [AnomalyKind] = &[$(AnomalyKind::$variant),+];

            pub fn display(&self) -> &'static str {
                match self {
                    $(AnomalyKind::$variant => $display),+
                }
            }

            pub fn category(&self) -> Category {
                match self {
                    $(AnomalyKind::$variant => Category::$category),+
                }
            }

            pub fn default_severity(&self) -> Severity {
                match self {
                    $(AnomalyKind::$variant => Severity::$severity),+
                }
            }

            /// Best-effort reverse lookup by the free-text canonical string
            /// stored in a row's aggregated anomaly column (spec.md §4.6
            /// `_match_anomaly`: exact or substring match either way).
            pub fn parse(name: &str) -> Option<AnomalyKind> {
                let name = name.trim();
                AnomalyKind::ALL
                    .iter()
                    .copied()
                    .find(|k| k.display() == name)
                    .or_else(|| {
                        AnomalyKind::ALL
                            .iter()
                            .copied()
                            .find(|k| k.display().contains(name) || name.contains(k.display()))
                    })
            }
        }
    };
}

anomaly_kind! {
    HighXmitWait => ("High xmit-wait", Congestion, Warning),
    HcaBackpressure => ("HCA Backpressure", Congestion, Warning),
    PlainUnbalanced => ("Unbalanced Plains", Balance, Info),
    ArUnbalanced => ("Unbalanced AR", Balance, Info),
    DribOutlierSwitch => ("DrIB Outlier Switch", Anomaly, Warning),
    UnusualRttNum => ("Unusual RTT Num", Congestion, Info),
    HighMinRtt => ("High Min RTT", Latency, Warning),
    FecnAlert => ("FECN Congestion", Congestion, Warning),
    BecnAlert => ("BECN Congestion", Congestion, Warning),
    XmitTimeCongestion => ("Transmit Time Congestion", Congestion, Critical),
    LinkDownshift => ("Link Speed/Width Downshift", Errors, Warning),
    CreditWatchdog => ("Credit Watchdog Timeout", Congestion, Critical),

    HighSymbolBer => ("High Symbol BER", Ber, Critical),
    UnusualBer => ("Unusual BER", Ber, Warning),
    FecUncorrectable => ("FEC Uncorrectable Errors", Ber, Critical),
    OpticalTempHigh => ("Optical Temperature High", Errors, Warning),
    OpticalTxBias => ("Optical TX Bias Alarm", Errors, Warning),
    OpticalTxPower => ("Optical TX Power Alarm", Errors, Warning),
    OpticalRxPower => ("Optical RX Power Alarm", Errors, Warning),
    OpticalVoltage => ("Optical Voltage Alarm", Errors, Warning),

    Outlier => ("Outlier", Config, Info),
    RedFlag => ("Red Flag", Errors, Critical),
    AsymTopo => ("Asymmetric Topo", Config, Warning),
    DuplicateGuid => ("Duplicate GUID", Config, Warning),
    DuplicateDesc => ("Duplicate Node Description", Config, Info),
    LinkAsymmetric => ("Asymmetric Link Speed", Errors, Warning),

    PsidUnsupported => ("PSID Not Supported", Config, Critical),
    FwOutdated => ("Firmware Below Recommended", Config, Warning),
    CableMismatch => ("Cable Media/Speed Mismatch", Config, Warning),
    FanFailure => ("Fan Speed Out of Range", Errors, Warning),

    RoutingRnError => ("Routing RN Error", Congestion, Warning),
    RoutingFrError => ("Routing Fast-Recovery Error", Errors, Critical),
    RoutingHbfFallback => ("HBF Routing Fallback", Congestion, Warning),
    PortIcrcError => ("Port ICRC Error", Errors, Warning),
    PortParityError => ("Port Parity Error", Errors, Critical),
    PortUnhealthy => ("Port Unhealthy", Errors, Critical),

    TempCritical => ("Critical Temperature", Errors, Critical),
    TempWarning => ("Temperature Warning", Errors, Warning),
    PsuCritical => ("PSU Critical", Errors, Critical),
    PsuWarning => ("PSU Warning", Errors, Warning),

    MlnxCounterCritical => ("MLNX Counter Critical", Errors, Critical),
    MlnxCounterWarning => ("MLNX Counter Warning", Errors, Warning),
    RelayError => ("Relay Error", Errors, Warning),

    PciDegradation => ("PCI Link Degradation", Errors, Warning),
    PciAerError => ("PCI AER Error", Errors, Critical),
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IBH Anomaly {}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_round_trips_through_display() {
        for kind in AnomalyKind::ALL {
            assert_eq!(AnomalyKind::parse(kind.display()), Some(*kind));
        }
    }

    #[test]
    fn severity_multipliers_match_spec() {
        assert_eq!(Severity::Critical.multiplier(), 3.0);
        assert_eq!(Severity::Warning.multiplier(), 1.5);
        assert_eq!(Severity::Info.multiplier(), 0.5);
    }

    #[test]
    fn parse_is_substring_tolerant() {
        assert_eq!(AnomalyKind::parse("High xmit-wait"), Some(AnomalyKind::HighXmitWait));
        assert!(AnomalyKind::parse("totally unknown anomaly string").is_none());
    }
}
