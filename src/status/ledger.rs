//! Priority-ordered table of failure domains
//!
//! Every subsystem that can make the operator unhealthy owns one
//! [`FailureDomain`]. A domain registers at most one Degraded and one
//! Progressing entry at a time. When resolving, the lowest-index domain with an
//! entry wins; the others are kept so they resurface once it clears.

use std::fmt;

use serde::Serialize;

use super::conditions::{CONDITION_TYPE_DEGRADED, CONDITION_TYPE_PROGRESSING};
use crate::crd::{Condition, ConditionStatus};

/// Failure domains in priority order (first = highest priority)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FailureDomain {
    ClusterConfig,
    OperatorConfig,
    OperatorRender,
    ProxyConfig,
    InjectorConfig,
    PodDeployment,
    MachineConfig,
    PKIConfig,
    EgressRouterConfig,
    RolloutHung,
    CertificateSigner,
    /// Panics caught at the dispatcher boundary
    InternalError,
}

impl FailureDomain {
    pub const ALL: [FailureDomain; 12] = [
        FailureDomain::ClusterConfig,
        FailureDomain::OperatorConfig,
        FailureDomain::OperatorRender,
        FailureDomain::ProxyConfig,
        FailureDomain::InjectorConfig,
        FailureDomain::PodDeployment,
        FailureDomain::MachineConfig,
        FailureDomain::PKIConfig,
        FailureDomain::EgressRouterConfig,
        FailureDomain::RolloutHung,
        FailureDomain::CertificateSigner,
        FailureDomain::InternalError,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for FailureDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const DOMAIN_COUNT: usize = FailureDomain::ALL.len();

/// A registered reason/message pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub reason: String,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
struct Column {
    entries: [Option<LedgerEntry>; DOMAIN_COUNT],
}

impl Column {
    /// Returns true when the stored entry changed
    fn set(&mut self, domain: FailureDomain, reason: &str, message: &str) -> bool {
        let entry = LedgerEntry {
            reason: reason.to_string(),
            message: message.to_string(),
        };
        let slot = &mut self.entries[domain.index()];
        if slot.as_ref() == Some(&entry) {
            return false;
        }
        *slot = Some(entry);
        true
    }

    fn clear(&mut self, domain: FailureDomain) -> bool {
        self.entries[domain.index()].take().is_some()
    }

    fn get(&self, domain: FailureDomain) -> Option<&LedgerEntry> {
        self.entries[domain.index()].as_ref()
    }

    fn resolve(&self, type_: &str) -> Condition {
        FailureDomain::ALL
            .iter()
            .find_map(|d| self.get(*d))
            .map(|entry| {
                Condition::new(type_, ConditionStatus::True, &entry.reason, &entry.message)
            })
            .unwrap_or_else(|| Condition::new(type_, ConditionStatus::False, "", ""))
    }

    fn active(&self) -> Vec<(FailureDomain, LedgerEntry)> {
        FailureDomain::ALL
            .iter()
            .filter_map(|d| self.get(*d).map(|e| (*d, e.clone())))
            .collect()
    }
}

/// In-memory priority table for Degraded and Progressing
#[derive(Clone, Debug, Default)]
pub struct ConditionLedger {
    degraded: Column,
    progressing: Column,
}

impl ConditionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_degraded(&mut self, domain: FailureDomain, reason: &str, message: &str) -> bool {
        self.degraded.set(domain, reason, message)
    }

    pub fn clear_degraded(&mut self, domain: FailureDomain) -> bool {
        self.degraded.clear(domain)
    }

    pub fn set_progressing(&mut self, domain: FailureDomain, reason: &str, message: &str) -> bool {
        self.progressing.set(domain, reason, message)
    }

    pub fn clear_progressing(&mut self, domain: FailureDomain) -> bool {
        self.progressing.clear(domain)
    }

    pub fn degraded(&self, domain: FailureDomain) -> Option<&LedgerEntry> {
        self.degraded.get(domain)
    }

    pub fn progressing(&self, domain: FailureDomain) -> Option<&LedgerEntry> {
        self.progressing.get(domain)
    }

    /// The single Degraded condition to publish
    pub fn resolve_degraded(&self) -> Condition {
        self.degraded.resolve(CONDITION_TYPE_DEGRADED)
    }

    /// The single Progressing condition to publish
    pub fn resolve_progressing(&self) -> Condition {
        self.progressing.resolve(CONDITION_TYPE_PROGRESSING)
    }

    pub fn active_degraded(&self) -> Vec<(FailureDomain, LedgerEntry)> {
        self.degraded.active()
    }

    pub fn active_progressing(&self) -> Vec<(FailureDomain, LedgerEntry)> {
        self.progressing.active()
    }
}
