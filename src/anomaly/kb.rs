//! Static knowledge base of anomaly explanations, ported from the source
//! tool's `explanations.py` (spec.md §3 "Knowledge Base", §9 "build at
//! program start; share read-only"). Built once behind `once_cell::sync::Lazy`
//! and indexed by `AnomalyKind` plus a handful of heuristic-only keys that
//! have no dedicated anomaly kind (temperature/link-down/port-inactive
//! heuristics raised directly by the scorer).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::anomaly::kind::AnomalyKind;

#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub title: &'static str,
    pub why_it_matters: &'static str,
    pub likely_causes: &'static [&'static str],
    pub recommended_actions: &'static [&'static str],
    pub reference: &'static str,
}

/// Heuristic-only lookup keys (spec.md §4.6 step 2: "or to the custom key
/// for heuristic-only issues").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeuristicKey {
    HighTemperature,
    ModerateTemperature,
    LinkDown,
    LinkRecovery,
    PortInactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KbKey {
    Anomaly(AnomalyKind),
    Heuristic(HeuristicKey),
}

static KB: Lazy<HashMap<KbKey, Explanation>> = Lazy::new(|| {
    use AnomalyKind::*;
    use HeuristicKey::*;
    let mut m = HashMap::new();

    m.insert(KbKey::Anomaly(HighSymbolBer), Explanation {
        title: "Symbol BER above 1e-12 (critical threshold)",
        why_it_matters: "Symbol BER above 1e-12 is treated as critical because it triggers retransmissions and reduces throughput.",
        likely_causes: &[
            "Aging or faulty optical modules/firmware",
            "Dirty, bent, or attenuated fiber links",
            "EMI or damaged shielding around the cable run",
        ],
        recommended_actions: &[
            "Clean or replace the affected fiber/optic and verify it is firmly seated",
            "Check Tx/Rx optical power and temperature against vendor specs",
            "Inspect the far-end port for matching symbol errors and replace optics in pairs when needed",
        ],
        reference: "ibdiagnet_health_check_guide:155-177",
    });

    m.insert(KbKey::Anomaly(UnusualBer), Explanation {
        title: "Unusual BER pattern between raw/effective/symbol metrics",
        why_it_matters: "Large gaps between raw, effective, and symbol BER values point to heavy FEC correction and degraded signal integrity.",
        likely_causes: &[
            "Mismatched link speed or width between peers",
            "Noise or jitter that FEC cannot fully correct",
        ],
        recommended_actions: &[
            "Compare effective vs symbol BER and adjust sampling or lower the link speed if the gap keeps growing",
            "Verify the fiber path (length, routing, bends) and re-route if needed",
        ],
        reference: "ibdiagnet_health_check_guide:143-177",
    });

    m.insert(KbKey::Heuristic(HighTemperature), Explanation {
        title: "Optical module temperature >= 80C",
        why_it_matters: "Optics at 80C or above are critical because lifetime and stability drop sharply, often leading to link flaps.",
        likely_causes: &[
            "Poor airflow or blocked chassis filters",
            "Modules running at sustained peak power without adequate cooling",
        ],
        recommended_actions: &[
            "Inspect and restore cold-air flow (clean filters/fans) and confirm rack inlet temperatures",
            "Consider lowering workload or swapping to optics with better thermal handling",
        ],
        reference: "ibdiagnet_health_check_guide:170-177",
    });

    m.insert(KbKey::Heuristic(ModerateTemperature), Explanation {
        title: "Optical module temperature between 70C and 79C",
        why_it_matters: "Temperatures in this band are warnings; BER usually rises and the module is close to the critical threshold.",
        likely_causes: &[
            "Restricted airflow or localized hot spots inside the rack",
            "Uneven load distribution across nearby HCAs or switches",
        ],
        recommended_actions: &[
            "Schedule a cooling/airflow inspection and tidy cable routing to improve convection",
            "Trend the temperature; escalate to replacement if it continues to rise",
        ],
        reference: "ibdiagnet_health_check_guide:228-233",
    });

    m.insert(KbKey::Heuristic(LinkDown), Explanation {
        title: "LinkDownedCounter greater than zero",
        why_it_matters: "Repeated link downs reduce fabric connectivity and trigger route recalculations, impacting stability.",
        likely_causes: &[
            "Loose, damaged, or unseated optics/cables",
            "Power dips or port configuration errors",
        ],
        recommended_actions: &[
            "Physically inspect the fiber/cable bend radius and seating",
            "Review switch/HCA logs to rule out disabled ports or unstable power feeds",
        ],
        reference: "ibdiagnet_health_check_guide:136-150",
    });

    m.insert(KbKey::Heuristic(LinkRecovery), Explanation {
        title: "Link error recovery counter increasing",
        why_it_matters: "Frequent recoveries indicate link flaps or jitter that trigger retraining and traffic loss even if the port never shows LinkDowned events.",
        likely_causes: &[
            "Marginal optics or dirty connectors causing intermittent signal drops",
            "Power or airflow instability leading to rapid port retrains",
        ],
        recommended_actions: &[
            "Inspect and clean the optic/cable pair, then reseat to stabilize the signal",
            "Check rack power/thermal conditions and replace suspect modules if recoveries persist",
        ],
        reference: "ibdiagnet_health_check_guide:136-150",
    });

    m.insert(KbKey::Anomaly(HighXmitWait), Explanation {
        title: "PortXmitWait ratio exceeds healthy guidance",
        why_it_matters: "1-5% wait ratio is treated as warning and >5% as severe congestion, indicating sustained backpressure.",
        likely_causes: &[
            "Hot-spot traffic concentrated on a subset of uplinks",
            "Unbalanced routing/plain allocation or missing QoS tuning",
        ],
        recommended_actions: &[
            "Use PM data to find overloaded paths and redistribute traffic or add bandwidth",
            "Verify adaptive routing/QoS policies to ensure lanes share traffic evenly",
        ],
        reference: "ibdiagnet_health_check_guide:200-207,338-345",
    });

    m.insert(KbKey::Anomaly(HcaBackpressure), Explanation {
        title: "HCA backpressure detected",
        why_it_matters: "When HCAs generate xmit-wait, applications stall and congestion can propagate into the fabric.",
        likely_causes: &[
            "Outdated or inconsistent HCA firmware/driver",
            "Burst-heavy workloads saturating send queues",
        ],
        recommended_actions: &[
            "Align firmware and driver versions across hosts",
            "Coordinate with application owners to shape bursts or stagger large jobs",
        ],
        reference: "ibdiagnet_health_check_guide:200-207",
    });

    m.insert(KbKey::Anomaly(RedFlag), Explanation {
        title: "Error counters (red flag) above zero",
        why_it_matters: "Symbol/LinkIntegrity/Constraint counters should remain at zero; any increment signals unhealthy physical layers.",
        likely_causes: &[
            "Low-quality or damaged cables/optics",
            "MTU/VL/PKey mismatches causing constraint violations",
        ],
        recommended_actions: &[
            "Clear counters, resample, and determine if the error is transient or persistent",
            "Replace optics/cables and audit port configuration if errors persist",
        ],
        reference: "ibdiagnet_health_check_guide:320-357",
    });

    m.insert(KbKey::Heuristic(PortInactive), Explanation {
        title: "Port is not Active/LinkUp",
        why_it_matters: "Ports in Down/Init remove available bandwidth and can trigger reroutes or stranded paths.",
        likely_causes: &[
            "Peer disabled or optic not fully seated",
            "Topology file/configuration mismatch that left the port administratively down",
        ],
        recommended_actions: &[
            "Verify the port physical state and GUID mapping to confirm it should be enabled",
            "If unintended, reset the port and validate LinkUp before returning to service",
        ],
        reference: "ibdiagnet_health_check_guide:118-152",
    });

    m.insert(KbKey::Anomaly(OpticalTxBias), Explanation {
        title: "Optical TX bias current out of spec",
        why_it_matters: "Bias current drifting outside the vendor window indicates diode aging or thermal runaway; BER usually rises soon after.",
        likely_causes: &[
            "Aging optics or laser driver faults",
            "Excessive temperature or dirty fiber end causing the laser to compensate",
        ],
        recommended_actions: &[
            "Inspect the optic pair, clean connectors, and reseat",
            "Replace the optic if bias alarms persist after cooling and cleaning",
        ],
        reference: "ibdiagnet_health_check_guide:170-233",
    });

    m.insert(KbKey::Anomaly(OpticalTxPower), Explanation {
        title: "TX optical power alarm",
        why_it_matters: "Low TX power reduces margin on long-haul fibers; high TX power may indicate calibration faults and can saturate receivers.",
        likely_causes: &[
            "Poor fiber terminations or damaged MPO/MTP connectors",
            "Laser mis-calibration or overheating optics",
        ],
        recommended_actions: &[
            "Measure and compare TX power to the module's nominal spec",
            "Swap or recalibrate the optic if power stays outside the vendor threshold",
        ],
        reference: "ibdiagnet_health_check_guide:170-233",
    });

    m.insert(KbKey::Anomaly(OpticalRxPower), Explanation {
        title: "RX optical power alarm",
        why_it_matters: "Receivers operating below the minimum optical budget experience packet loss and unstable links.",
        likely_causes: &[
            "Excessive attenuation (dirty fiber, long patch panels, tight bends)",
            "Far-end transmitter faults lowering delivered power",
        ],
        recommended_actions: &[
            "Check fiber health (cleanliness, bend radius) and measure insertion loss",
            "Verify the peer TX power; replace optics on both ends if necessary",
        ],
        reference: "ibdiagnet_health_check_guide:170-233",
    });

    m.insert(KbKey::Anomaly(OpticalVoltage), Explanation {
        title: "Optical module supply voltage alarm",
        why_it_matters: "Optics require stable supply rails; under-voltage causes brownouts and link drops, over-voltage damages the laser.",
        likely_causes: &[
            "Noisy or overloaded PSU/backplane in the switch or chassis",
            "Faulty VRM on the line card / HCA slot",
        ],
        recommended_actions: &[
            "Check chassis power feeds and replace suspect modules, then re-run diagnostics",
            "Ensure firmware matches the optic's PSU requirements",
        ],
        reference: "ibdiagnet_health_check_guide:170-233",
    });

    m.insert(KbKey::Anomaly(FecnAlert), Explanation {
        title: "FECN notifications on this port",
        why_it_matters: "Forward Explicit Congestion Notifications indicate the port is seeing pressure from downstream nodes, even if PortXmitWait is low.",
        likely_causes: &[
            "Hot-spot traffic on the far-end switches/HCAs",
            "Insufficient adaptive routing or QoS leading to uneven flow distribution",
        ],
        recommended_actions: &[
            "Trace the path for this port and inspect adjacent hops for congestion counters",
            "Balance traffic by adding bandwidth, enabling adaptive routing, or tuning QoS",
        ],
        reference: "ibdiagnet_health_check_guide:338-345",
    });

    m.insert(KbKey::Anomaly(BecnAlert), Explanation {
        title: "BECN notifications generated",
        why_it_matters: "Backward ECN is emitted when this port needs upstream throttling; persistent BECN means the host/switch is a congestion source.",
        likely_causes: &[
            "Host/NIC sending bursts beyond what downstream switches can handle",
            "Mismatched link speeds or disabled flow control",
        ],
        recommended_actions: &[
            "Rate-limit offending workloads or redistribute queues across links",
            "Check upstream ports for PortXmitWait and ensure PFC/ECN policies are configured",
        ],
        reference: "ibdiagnet_health_check_guide:338-345",
    });

    m.insert(KbKey::Anomaly(XmitTimeCongestion), Explanation {
        title: "PortXmitTimeCong ratio above healthy guidance",
        why_it_matters: "Time spent transmitting under congestion control indicates prolonged backpressure; >=1% is warning and >=5% is severe.",
        likely_causes: &[
            "Over-subscribed uplinks or insufficient fabric bandwidth",
            "Unbalanced routing causing certain paths to saturate",
        ],
        recommended_actions: &[
            "Analyze traffic matrices and add or rebalance links",
            "Tune congestion control/ECN settings to react sooner",
        ],
        reference: "ibdiagnet_health_check_guide:200-207",
    });

    m.insert(KbKey::Anomaly(PsidUnsupported), Explanation {
        title: "PSID does not match the qualified list",
        why_it_matters: "Mixing unsupported PSIDs within the same device class complicates firmware lifecycle management and often indicates the wrong SKU or cooling profile.",
        likely_causes: &[
            "Node was provisioned with an OEM PSID that differs from the standard fleet profile",
            "Recent RMA introduced a mismatched optic/cooling requirement that was not requalified",
        ],
        recommended_actions: &[
            "Validate the adapter label/PSID against the fleet baseline and reflash if necessary",
            "Align procurement with the approved PSID list before deploying replacements",
        ],
        reference: "health_check_capabilities:43-52",
    });

    m.insert(KbKey::Anomaly(FwOutdated), Explanation {
        title: "Firmware below recommended revision",
        why_it_matters: "Older firmware lacks congestion-control, optics, and telemetry fixes, leading to inconsistent behavior across the fabric.",
        likely_causes: &[
            "Hosts skipped the last coordinated firmware rollout",
            "Adapters were RMA'd but not upgraded to the fleet baseline afterward",
        ],
        recommended_actions: &[
            "Upgrade the adapter to at least the recommended firmware before returning it to service",
            "Automate firmware compliance checks so drifts are caught immediately",
        ],
        reference: "ibdiagnet_manual_summary:80-82",
    });

    // Families added beyond the source's explanations table (spec.md's
    // routing/fan/PSU/MLNX families), synthesized in the same voice.
    m.insert(KbKey::Anomaly(FanFailure), Explanation {
        title: "Fan speed outside the vendor-qualified range",
        why_it_matters: "A fan running below MinSpeed starves the chassis of airflow; one running above MaxSpeed usually signals a bearing fault about to fail outright.",
        likely_causes: &[
            "Dust buildup increasing mechanical load on the bearing",
            "A failing fan controller or PWM sensor reporting bad readings",
        ],
        recommended_actions: &[
            "Cross-check the reading against a second sensor before swapping hardware",
            "Replace the fan module at the next maintenance window if the deviation persists",
        ],
        reference: "ibdiagnet_health_check_guide:210-220",
    });

    m.insert(KbKey::Anomaly(CableMismatch), Explanation {
        title: "Cable media or rated speed does not match the port's capability",
        why_it_matters: "A cable rated below the negotiated link speed, or a fiber run exceeding its class's supported length, degrades signal integrity under load even when the link looks up.",
        likely_causes: &[
            "Wrong cable pulled from stock during a speed upgrade",
            "Fiber run exceeds the qualified distance for the module class",
        ],
        recommended_actions: &[
            "Swap in a cable rated for the negotiated speed and length",
            "Re-verify the link after the swap to confirm the mismatch anomaly clears",
        ],
        reference: "ibdiagnet_health_check_guide:180-199",
    });

    m.insert(KbKey::Anomaly(CreditWatchdog), Explanation {
        title: "Credit watchdog timeout fired on this port",
        why_it_matters: "A credit watchdog timeout means the link stalled waiting for flow-control credits long enough to be forcibly reset, which briefly drops in-flight traffic.",
        likely_causes: &[
            "A wedged neighbor port that stopped returning credits",
            "Severe upstream congestion holding the link at zero credits",
        ],
        recommended_actions: &[
            "Check the neighbor port's health and reset it if it is unresponsive",
            "Look for sustained congestion upstream of this port before assuming a cable fault",
        ],
        reference: "ibdiagnet_health_check_guide:207-214",
    });

    m.insert(KbKey::Anomaly(RoutingRnError), Explanation {
        title: "Adaptive routing RN error counter incrementing",
        why_it_matters: "RN errors mean the adaptive routing notification mechanism is rejecting or mis-handling path changes, which can leave traffic on a suboptimal route.",
        likely_causes: &[
            "Routing table inconsistency after a topology change",
            "Firmware bug in the adaptive routing engine for this switch generation",
        ],
        recommended_actions: &[
            "Re-run the subnet manager routing pass and compare before/after counters",
            "Escalate to firmware support if the counter keeps climbing after a clean reroute",
        ],
        reference: "ibdiagnet_health_check_guide:240-250",
    });

    m.insert(KbKey::Anomaly(RoutingFrError), Explanation {
        title: "Fast-recovery routing error",
        why_it_matters: "Fast-recovery errors indicate the switch failed to reroute around a detected fault within its deadline, so traffic may have been dropped instead of rerouted.",
        likely_causes: &[
            "A second failure occurred while fast-recovery was already in progress",
            "Routing tables were not fully converged when the fault was detected",
        ],
        recommended_actions: &[
            "Investigate the underlying link fault that triggered the recovery attempt",
            "Confirm routing convergence time is within the fabric's fault budget",
        ],
        reference: "ibdiagnet_health_check_guide:240-250",
    });

    m.insert(KbKey::Anomaly(RoutingHbfFallback), Explanation {
        title: "Hash-based forwarding fallback engaged",
        why_it_matters: "Falling back to HBF means the switch couldn't use its preferred adaptive routing table for some destinations, usually flattening traffic distribution and creating hot spots.",
        likely_causes: &[
            "Routing table capacity exceeded for the current topology size",
            "A transient SM recalculation left stale adaptive routing entries",
        ],
        recommended_actions: &[
            "Check whether the fabric has grown past the switch's adaptive routing table capacity",
            "Trigger a full SM routing recalculation and confirm the fallback clears",
        ],
        reference: "ibdiagnet_health_check_guide:250-258",
    });

    m.insert(KbKey::Anomaly(PortIcrcError), Explanation {
        title: "Port ICRC error counter incrementing",
        why_it_matters: "Invariant CRC errors indicate packets are being corrupted in flight; unlike VCRC this points at the header fields, often a routing or switch ASIC problem rather than the cable.",
        likely_causes: &[
            "Switch ASIC fault on the ingress or egress pipeline",
            "Corrupted routing table entries mangling packet headers",
        ],
        recommended_actions: &[
            "Isolate whether the error follows the port or the cable by swapping hardware",
            "Open a vendor case if the switch ASIC is suspected",
        ],
        reference: "ibdiagnet_health_check_guide:320-357",
    });

    m.insert(KbKey::Anomaly(PortParityError), Explanation {
        title: "Port parity error counter incrementing",
        why_it_matters: "Parity errors on the datapath indicate silent data corruption risk inside the switch; this is treated as critical because it can corrupt traffic without tripping a link-down event.",
        likely_causes: &[
            "Failing memory or datapath silicon inside the switch ASIC",
            "A marginal power rail affecting switch-internal logic",
        ],
        recommended_actions: &[
            "Take the port out of service and open an RMA case for the switch line card",
            "Audit neighboring ports on the same ASIC for correlated parity errors",
        ],
        reference: "ibdiagnet_health_check_guide:320-357",
    });

    m.insert(KbKey::Anomaly(PortUnhealthy), Explanation {
        title: "Port marked unhealthy by the fabric's port health subsystem",
        why_it_matters: "This is the switch's own aggregate health verdict; a port flagged unhealthy is usually already isolated from routing by the SM.",
        likely_causes: &[
            "Accumulated error counters crossed the switch's internal unhealthy threshold",
            "Repeated link flaps within the health-tracking window",
        ],
        recommended_actions: &[
            "Review the full error counter set for this port before re-enabling it",
            "Replace the suspect optic/cable pair and clear counters before returning it to service",
        ],
        reference: "ibdiagnet_health_check_guide:118-152",
    });

    m.insert(KbKey::Anomaly(LinkAsymmetric), Explanation {
        title: "Link speed or width differs between the two endpoints",
        why_it_matters: "An asymmetric link negotiates down to the slower side's capability, silently capping throughput well below what the faster endpoint advertises.",
        likely_causes: &[
            "Mismatched HCA and switch port generations",
            "One endpoint's port was manually capped to a lower speed",
        ],
        recommended_actions: &[
            "Confirm both endpoints support the intended speed/width and reseat the link",
            "Check for a manual speed cap left over from a previous troubleshooting session",
        ],
        reference: "ibdiagnet_health_check_guide:143-155",
    });

    m.insert(KbKey::Anomaly(TempCritical), Explanation {
        title: "Sensor temperature at or above the critical threshold",
        why_it_matters: "Sustained operation above the critical threshold risks thermal shutdown and accelerates component aging across the whole chassis, not just the sensor's immediate neighborhood.",
        likely_causes: &[
            "Blocked or failed cooling in the chassis zone",
            "Ambient datacenter temperature above the rack's design envelope",
        ],
        recommended_actions: &[
            "Inspect chassis airflow and fan health immediately",
            "Reduce load on the affected chassis until cooling is confirmed",
        ],
        reference: "ibdiagnet_health_check_guide:210-233",
    });

    m.insert(KbKey::Anomaly(TempWarning), Explanation {
        title: "Sensor temperature in the warning band",
        why_it_matters: "Warning-band temperatures are still within spec but leave little margin before the critical threshold; worth trending.",
        likely_causes: &[
            "Seasonal rise in datacenter ambient temperature",
            "Partial airflow restriction that hasn't yet become a fan fault",
        ],
        recommended_actions: &[
            "Trend the sensor and correlate with nearby fan speed readings",
            "Schedule an airflow inspection if the trend keeps climbing",
        ],
        reference: "ibdiagnet_health_check_guide:210-233",
    });

    m.insert(KbKey::Anomaly(PsuCritical), Explanation {
        title: "Power supply reporting a critical fault",
        why_it_matters: "A PSU in critical state is at risk of tripping offline; on chassis without full redundancy this can cascade into a full chassis outage.",
        likely_causes: &[
            "Failing PSU internals (capacitor or rectifier aging)",
            "Upstream power feed instability (brownout, phase loss)",
        ],
        recommended_actions: &[
            "Confirm the redundant PSU is healthy before scheduling a replacement",
            "Check upstream PDU/feed health if multiple chassis report the same symptom",
        ],
        reference: "ibdiagnet_health_check_guide:210-220",
    });

    m.insert(KbKey::Anomaly(PsuWarning), Explanation {
        title: "Power supply reporting a warning-level condition",
        why_it_matters: "A PSU warning usually precedes a critical failure by hours to days; catching it here avoids an unplanned outage.",
        likely_causes: &[
            "Aging PSU nearing end of service life",
            "Marginal input voltage from the upstream feed",
        ],
        recommended_actions: &[
            "Plan a replacement during the next maintenance window",
            "Verify the redundant PSU can carry full load if this one is pulled",
        ],
        reference: "ibdiagnet_health_check_guide:210-220",
    });

    m.insert(KbKey::Anomaly(MlnxCounterCritical), Explanation {
        title: "Vendor-specific QP counter above the critical threshold",
        why_it_matters: "RNR/timeout/flush counters at this level indicate the queue pair is failing to make forward progress, which surfaces as application-visible stalls or errors.",
        likely_causes: &[
            "A stuck or overloaded remote QP not draining receive buffers",
            "Fabric-level congestion preventing timely completions",
        ],
        recommended_actions: &[
            "Identify the remote QP/host and check its own health counters",
            "Correlate with congestion counters on the path before assuming an application bug",
        ],
        reference: "ibdiagnet_health_check_guide:338-357",
    });

    m.insert(KbKey::Anomaly(MlnxCounterWarning), Explanation {
        title: "Vendor-specific QP counter in the warning band",
        why_it_matters: "A rising but still moderate RNR/timeout/flush count is an early signal of queue-pair contention before it becomes application-visible.",
        likely_causes: &[
            "Transient congestion on the path to the remote QP",
            "Receive buffer sizing slightly undersized for the workload's burstiness",
        ],
        recommended_actions: &[
            "Trend the counter; escalate if it crosses into the critical band",
            "Review receive buffer/queue depth sizing for the affected QPs",
        ],
        reference: "ibdiagnet_health_check_guide:338-357",
    });

    m.insert(KbKey::Anomaly(RelayError), Explanation {
        title: "PM relay/aggregation error reported for this port",
        why_it_matters: "A relay error means the performance-manager counter delta for this port could not be trusted for this sampling window; downstream health numbers for the port may be stale.",
        likely_causes: &[
            "A PM query timeout or malformed response for this port",
            "The port was reset mid-sample, invalidating the delta window",
        ],
        recommended_actions: &[
            "Re-sample the port on the next PM cycle before acting on its other counters",
            "If the relay error recurs, check SM/PM connectivity to that switch",
        ],
        reference: "ibdiagnet_health_check_guide:338-357",
    });

    m.insert(KbKey::Anomaly(PciDegradation), Explanation {
        title: "PCIe link trained below its capable speed or width",
        why_it_matters: "A degraded PCIe link caps host-to-adapter bandwidth well under what the slot and adapter both support, which shows up as an HCA-side bottleneck long before the fabric looks unhealthy.",
        likely_causes: &[
            "Riser/backplane signal integrity issues forcing a lower speed",
            "BIOS/platform ASPM or slot power settings capping the link",
        ],
        recommended_actions: &[
            "Reseat the adapter and confirm the slot is wired for its full PCIe generation and width",
            "Check BIOS power/link-state settings and update firmware if the degraded state persists",
        ],
        reference: "ibdiagnet_health_check_guide:338-357",
    });

    m.insert(KbKey::Anomaly(PciAerError), Explanation {
        title: "PCIe AER error reported on the host-to-adapter link",
        why_it_matters: "Advanced Error Reporting correctable/uncorrectable/fatal events mean the PCIe link itself is dropping or corrupting packets between the host and adapter, independent of anything happening in the fabric.",
        likely_causes: &[
            "Marginal PCIe slot seating or riser cable",
            "Aging adapter hardware or a platform-side PCIe root port fault",
        ],
        recommended_actions: &[
            "Reseat the adapter and check platform logs for correlated root-port AER events",
            "Escalate to an RMA if fatal/uncorrectable AER errors continue after reseating",
        ],
        reference: "ibdiagnet_health_check_guide:338-357",
    });

    m
});

pub fn lookup(kind: AnomalyKind) -> Option<&'static Explanation> {
    KB.get(&KbKey::Anomaly(kind))
}

pub fn lookup_heuristic(key: HeuristicKey) -> Option<&'static Explanation> {
    KB.get(&KbKey::Heuristic(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_ber_entry_present() {
        let entry = lookup(AnomalyKind::HighSymbolBer).unwrap();
        assert!(entry.title.contains("Symbol BER"));
        assert!(!entry.likely_causes.is_empty());
    }

    #[test]
    fn link_down_heuristic_reference_matches_scenario() {
        let entry = lookup_heuristic(HeuristicKey::LinkDown).unwrap();
        assert_eq!(entry.reference, "ibdiagnet_health_check_guide:136-150");
    }

    #[test]
    fn synthesized_families_present() {
        for kind in [
            AnomalyKind::FanFailure,
            AnomalyKind::CableMismatch,
            AnomalyKind::CreditWatchdog,
            AnomalyKind::PsuCritical,
            AnomalyKind::MlnxCounterWarning,
            AnomalyKind::RoutingRnError,
        ] {
            assert!(lookup(kind).is_some(), "missing kb entry for {kind:?}");
        }
    }
}
