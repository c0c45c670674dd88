//! Rollout classification for a single workload
//!
//! The rules are evaluated top to bottom and the first one that applies
//! decides the progressing message. A workload no rule applies to is settled.

use super::workload::{ClusteredName, RolloutCounters, WorkloadKind};

/// Inputs to the rollout rules
#[derive(Clone, Debug)]
pub struct RolloutInput<'a> {
    pub kind: WorkloadKind,
    pub name: &'a ClusteredName,
    pub counters: RolloutCounters,
    pub non_critical: bool,
    /// Whether the operator has ever completed a full rollout
    pub install_complete: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RolloutVerdict {
    Settled,
    Progressing {
        reason: String,
        /// Whether this workload keeps the operator from being Available
        blocks_availability: bool,
        /// Whether pods should be scanned for crash loops
        scan_crash_loops: bool,
    },
}

struct RolloutRule {
    applies: fn(&RolloutInput<'_>) -> bool,
    describe: fn(&RolloutInput<'_>) -> String,
    blocks_availability: bool,
    scan_crash_loops: bool,
}

const RULES: &[RolloutRule] = &[
    // non-critical workloads may wait on other operators during install
    RolloutRule {
        applies: |i| i.non_critical && i.counters.ready == 0 && !i.install_complete,
        describe: |i| {
            format!(
                "{} {:?} is waiting for other operators to become ready",
                i.kind,
                i.name.to_string()
            )
        },
        blocks_availability: false,
        scan_crash_loops: false,
    },
    RolloutRule {
        applies: |i| i.counters.updated < i.counters.desired,
        describe: |i| {
            format!(
                "{} {:?} update is rolling out ({} out of {} updated)",
                i.kind,
                i.name.to_string(),
                i.counters.updated,
                i.counters.desired
            )
        },
        blocks_availability: true,
        scan_crash_loops: false,
    },
    RolloutRule {
        applies: |i| i.counters.unavailable > 0,
        describe: |i| {
            format!(
                "{} {:?} is not available (awaiting {} nodes)",
                i.kind,
                i.name.to_string(),
                i.counters.unavailable
            )
        },
        blocks_availability: true,
        scan_crash_loops: true,
    },
    RolloutRule {
        applies: |i| i.counters.available == 0,
        describe: |i| {
            format!(
                "{} {:?} is not yet scheduled on any nodes",
                i.kind,
                i.name.to_string()
            )
        },
        blocks_availability: true,
        scan_crash_loops: false,
    },
    RolloutRule {
        applies: |i| i.counters.observed_generation < i.counters.generation,
        describe: |i| {
            format!(
                "{} {:?} update is being processed (generation {}, observed generation {})",
                i.kind,
                i.name.to_string(),
                i.counters.generation,
                i.counters.observed_generation
            )
        },
        blocks_availability: true,
        scan_crash_loops: false,
    },
];

/// Classify a workload's rollout state
pub fn classify(input: &RolloutInput<'_>) -> RolloutVerdict {
    RULES
        .iter()
        .find(|rule| (rule.applies)(input))
        .map(|rule| RolloutVerdict::Progressing {
            reason: (rule.describe)(input),
            blocks_availability: rule.blocks_availability && !input.non_critical,
            scan_crash_loops: rule.scan_crash_loops && !input.non_critical,
        })
        .unwrap_or(RolloutVerdict::Settled)
}
