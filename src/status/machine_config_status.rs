//! Machine config render tracking
//!
//! The operator renders machine configs per machine role. A config is only
//! considered applied once every matching (unpaused) pool lists it as a
//! source of its rendered configuration, and only considered removed once it
//! is gone from all of them.

use std::collections::{BTreeMap, BTreeSet};

use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ledger::FailureDomain;
use super::manager::{StatusManager, StatusState};
use super::persist::{load_state, RENDERED_MACHINE_CONFIG_STATE_ANNOTATION};
use super::selector::selector_matches;
use crate::crd::{
    MachineConfig, MachineConfigPool, POOL_CONDITION_DEGRADED, POOL_CONDITION_UPDATING,
};

/// Role label carried by machine configs
pub const MACHINE_CONFIG_ROLE_LABEL: &str = "machineconfiguration.openshift.io/role";

const MACHINE_CONFIG_REASON: &str = "MachineConfig";

/// Rendered and pending-removal machine config names, keyed by role
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigState {
    #[serde(default)]
    pub rendered: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub pending_removal: BTreeMap<String, BTreeSet<String>>,
}

impl MachineConfigState {
    /// Replace the rendered set with a fresh render
    ///
    /// Names that disappeared move to pending removal; names that came back
    /// leave it. Returns whether anything changed.
    pub fn apply_render(&mut self, render: BTreeMap<String, BTreeSet<String>>) -> bool {
        let before = self.clone();

        let roles: BTreeSet<String> = self.rendered.keys().chain(render.keys()).cloned().collect();
        for role in roles {
            let previous = self.rendered.remove(&role).unwrap_or_default();
            let current = render.get(&role).cloned().unwrap_or_default();

            let pending = self.pending_removal.entry(role.clone()).or_default();
            pending.extend(previous.difference(&current).cloned());
            pending.retain(|name| !current.contains(name));

            if !current.is_empty() {
                self.rendered.insert(role, current);
            }
        }
        self.pending_removal.retain(|_, names| !names.is_empty());

        *self != before
    }

    /// Stop tracking names confirmed removed from every pool of `role`
    pub fn drop_removed(&mut self, role: &str, names: &BTreeSet<String>) -> bool {
        let mut changed = false;
        if let Some(pending) = self.pending_removal.get_mut(role) {
            let before = pending.len();
            pending.retain(|name| !names.contains(name));
            changed |= pending.len() != before;
            if pending.is_empty() {
                self.pending_removal.remove(role);
            }
        }
        if let Some(rendered) = self.rendered.get_mut(role) {
            let before = rendered.len();
            rendered.retain(|name| !names.contains(name));
            changed |= rendered.len() != before;
            if rendered.is_empty() {
                self.rendered.remove(role);
            }
        }
        changed
    }

    pub fn is_idle(&self) -> bool {
        self.rendered.is_empty() && self.pending_removal.is_empty()
    }

    fn roles(&self) -> BTreeSet<&str> {
        self.rendered
            .keys()
            .chain(self.pending_removal.keys())
            .map(String::as_str)
            .collect()
    }
}

/// Group machine configs by their role label
pub fn group_by_role(configs: &[MachineConfig]) -> BTreeMap<String, BTreeSet<String>> {
    let mut render: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for mc in configs {
        match mc.labels().get(MACHINE_CONFIG_ROLE_LABEL) {
            Some(role) => {
                render.entry(role.clone()).or_default().insert(mc.name_any());
            }
            None => warn!(
                "Machine config {} has no {} label; not tracking it",
                mc.name_any(),
                MACHINE_CONFIG_ROLE_LABEL
            ),
        }
    }
    render
}

/// Unpaused pools whose machine config selector picks up configs of `role`
///
/// Pools with a malformed selector are logged and skipped.
pub fn pools_for_role<'a>(role: &str, pools: &'a [MachineConfigPool]) -> Vec<&'a MachineConfigPool> {
    let role_labels = BTreeMap::from([(MACHINE_CONFIG_ROLE_LABEL.to_string(), role.to_string())]);
    pools
        .iter()
        .filter(|pool| !pool.spec.paused)
        .filter(|pool| {
            let Some(selector) = &pool.spec.machine_config_selector else {
                return false;
            };
            match selector_matches(selector, &role_labels) {
                Ok(matched) => matched,
                Err(e) => {
                    warn!("Skipping machine config pool {}: {}", pool.name_any(), e);
                    false
                }
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolOutcome {
    Settled,
    Degraded(String),
    Progressing(String),
}

/// Result of checking pools against the tracked machine configs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolReport {
    pub outcome: PoolOutcome,
    /// Pending names confirmed gone from every matching pool, per role
    pub removed: BTreeMap<String, BTreeSet<String>>,
}

/// Check machine config pools against the tracked state
///
/// Degraded pools are reported before updating pools, which are reported
/// before pools that have not yet picked up (or dropped) a tracked config.
pub fn evaluate_pools(state: &MachineConfigState, pools: &[MachineConfigPool]) -> PoolReport {
    let by_role: Vec<(&str, Vec<&MachineConfigPool>)> = state
        .roles()
        .into_iter()
        .map(|role| (role, pools_for_role(role, pools)))
        .collect();

    let mut report = PoolReport {
        outcome: PoolOutcome::Settled,
        removed: BTreeMap::new(),
    };

    for (_, role_pools) in &by_role {
        if let Some(pool) = role_pools
            .iter()
            .find(|p| p.is_condition_true(POOL_CONDITION_DEGRADED))
        {
            report.outcome = PoolOutcome::Degraded(format!(
                "{} machine config pool in degraded state",
                pool.name_any()
            ));
            return report;
        }
    }

    for (_, role_pools) in &by_role {
        if let Some(pool) = role_pools
            .iter()
            .find(|p| p.is_condition_true(POOL_CONDITION_UPDATING))
        {
            report.outcome = PoolOutcome::Progressing(format!(
                "{} machine config pool in progressing state",
                pool.name_any()
            ));
            return report;
        }
    }

    for (role, role_pools) in &by_role {
        let rendered = state.rendered.get(*role);
        let pending = state.pending_removal.get(*role);

        for pool in role_pools {
            let sources: BTreeSet<&str> = pool.rendered_sources().collect();

            let missing: Vec<&str> = rendered
                .into_iter()
                .flatten()
                .map(String::as_str)
                .filter(|name| !sources.contains(name))
                .collect();
            if !missing.is_empty() && report.outcome == PoolOutcome::Settled {
                report.outcome = PoolOutcome::Progressing(format!(
                    "{} machine config pool is still processing with {} machine config",
                    pool.name_any(),
                    missing.join(", ")
                ));
            }

            let lingering: Vec<&str> = pending
                .into_iter()
                .flatten()
                .map(String::as_str)
                .filter(|name| sources.contains(name))
                .collect();
            if !lingering.is_empty() && report.outcome == PoolOutcome::Settled {
                report.outcome = PoolOutcome::Progressing(format!(
                    "{} machine config pool is still processing removal of {} machine config",
                    pool.name_any(),
                    lingering.join(", ")
                ));
            }
        }

        let gone: BTreeSet<String> = pending
            .into_iter()
            .flatten()
            .filter(|name| {
                role_pools
                    .iter()
                    .all(|pool| !pool.rendered_sources().any(|s| s == name.as_str()))
            })
            .cloned()
            .collect();
        if !gone.is_empty() {
            report.removed.insert(role.to_string(), gone);
        }
    }

    report
}

impl StatusManager {
    async fn ensure_machine_config_state(&self, state: &mut StatusState) {
        if !state.machine_configs_loaded {
            state.machine_configs =
                load_state(&*self.store, RENDERED_MACHINE_CONFIG_STATE_ANNOTATION).await;
            state.machine_configs_loaded = true;
        }
    }

    /// Record the machine configs produced by the latest render
    pub async fn set_machine_configs(&self, configs: &[MachineConfig]) {
        let mut state = self.lock().await;
        self.ensure_machine_config_state(&mut state).await;

        let render = group_by_role(configs);
        if state.machine_configs.apply_render(render) {
            debug!("Rendered machine configs changed: {:?}", state.machine_configs);
            self.persist(RENDERED_MACHINE_CONFIG_STATE_ANNOTATION, &state.machine_configs)
                .await;
        }

        if state.machine_configs.is_idle() {
            state.ledger.clear_degraded(FailureDomain::MachineConfig);
            state.ledger.clear_progressing(FailureDomain::MachineConfig);
            self.publish(&state, &[], false).await;
        }
    }

    /// Re-evaluate the machine config domain against the current pools
    pub async fn set_from_machine_config_pools(&self, pools: &[MachineConfigPool]) {
        let mut state = self.lock().await;
        self.ensure_machine_config_state(&mut state).await;

        let report = evaluate_pools(&state.machine_configs, pools);

        let mut changed = false;
        for (role, names) in &report.removed {
            info!("Machine configs {:?} removed from all {} pools", names, role);
            changed |= state.machine_configs.drop_removed(role, names);
        }
        if changed {
            self.persist(RENDERED_MACHINE_CONFIG_STATE_ANNOTATION, &state.machine_configs)
                .await;
        }

        let domain = FailureDomain::MachineConfig;
        match report.outcome {
            PoolOutcome::Degraded(message) => {
                state.ledger.set_degraded(domain, MACHINE_CONFIG_REASON, &message);
                state.ledger.clear_progressing(domain);
            }
            PoolOutcome::Progressing(message) => {
                state.ledger.clear_degraded(domain);
                state.ledger.set_progressing(domain, MACHINE_CONFIG_REASON, &message);
            }
            PoolOutcome::Settled => {
                state.ledger.clear_degraded(domain);
                state.ledger.clear_progressing(domain);
            }
        }
        self.publish(&state, &[], false).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        Condition, ConditionStatus, ConfigSourceReference, MachineConfigPoolSpec,
        MachineConfigPoolStatus, MachineConfigPoolStatusConfiguration, MachineConfigSpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn render(role: &str, items: &[&str]) -> BTreeMap<String, BTreeSet<String>> {
        BTreeMap::from([(role.to_string(), names(items))])
    }

    fn pool(name: &str, role: &str, sources: &[&str]) -> MachineConfigPool {
        let mut pool = MachineConfigPool::new(
            name,
            MachineConfigPoolSpec {
                machine_config_selector: Some(LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        MACHINE_CONFIG_ROLE_LABEL.to_string(),
                        role.to_string(),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        pool.status = Some(MachineConfigPoolStatus {
            configuration: Some(MachineConfigPoolStatusConfiguration {
                name: format!("rendered-{}", role),
                source: sources
                    .iter()
                    .map(|s| ConfigSourceReference {
                        name: s.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            }),
            ..Default::default()
        });
        pool
    }

    fn with_condition(mut pool: MachineConfigPool, type_: &str) -> MachineConfigPool {
        if let Some(status) = pool.status.as_mut() {
            status
                .conditions
                .push(Condition::new(type_, ConditionStatus::True, "", ""));
        }
        pool
    }

    #[test]
    fn test_apply_render_moves_dropped_names_to_pending() {
        let mut state = MachineConfigState::default();
        assert!(state.apply_render(render("worker", &["00-ipsec", "00-ovs"])));
        assert!(state.apply_render(render("worker", &["00-ovs"])));

        assert_eq!(state.rendered["worker"], names(&["00-ovs"]));
        assert_eq!(state.pending_removal["worker"], names(&["00-ipsec"]));
        assert!(!state.apply_render(render("worker", &["00-ovs"])));
    }

    #[test]
    fn test_re_rendered_name_leaves_pending() {
        let mut state = MachineConfigState::default();
        state.apply_render(render("worker", &["00-ipsec"]));
        state.apply_render(BTreeMap::new());
        assert!(state.rendered.is_empty());
        assert_eq!(state.pending_removal["worker"], names(&["00-ipsec"]));

        state.apply_render(render("worker", &["00-ipsec"]));
        assert!(state.pending_removal.is_empty());
        assert_eq!(state.rendered["worker"], names(&["00-ipsec"]));
    }

    #[test]
    fn test_group_by_role_skips_unlabelled() {
        let mut labelled = MachineConfig::new("00-worker-ipsec", MachineConfigSpec::default());
        labelled
            .labels_mut()
            .insert(MACHINE_CONFIG_ROLE_LABEL.to_string(), "worker".to_string());
        let unlabelled = MachineConfig::new("99-custom", MachineConfigSpec::default());

        let grouped = group_by_role(&[labelled, unlabelled]);
        assert_eq!(grouped, render("worker", &["00-worker-ipsec"]));
    }

    #[test]
    fn test_missing_source_is_progressing() {
        let mut state = MachineConfigState::default();
        state.apply_render(render("worker", &["00-ipsec"]));

        let report = evaluate_pools(&state, &[pool("worker", "worker", &["00-base"])]);
        assert_eq!(
            report.outcome,
            PoolOutcome::Progressing(
                "worker machine config pool is still processing with 00-ipsec machine config"
                    .to_string()
            )
        );

        let report = evaluate_pools(&state, &[pool("worker", "worker", &["00-base", "00-ipsec"])]);
        assert_eq!(report.outcome, PoolOutcome::Settled);
    }

    #[test]
    fn test_degraded_reported_before_updating() {
        let mut state = MachineConfigState::default();
        state.apply_render(BTreeMap::from([
            ("master".to_string(), names(&["00-a"])),
            ("worker".to_string(), names(&["00-b"])),
        ]));

        let pools = [
            with_condition(pool("master", "master", &["00-a"]), POOL_CONDITION_UPDATING),
            with_condition(pool("worker", "worker", &["00-b"]), POOL_CONDITION_DEGRADED),
        ];
        assert_eq!(
            evaluate_pools(&state, &pools).outcome,
            PoolOutcome::Degraded("worker machine config pool in degraded state".to_string())
        );
    }

    #[test]
    fn test_paused_pool_is_ignored() {
        let mut state = MachineConfigState::default();
        state.apply_render(render("worker", &["00-ipsec"]));

        let mut paused = with_condition(pool("worker", "worker", &[]), POOL_CONDITION_DEGRADED);
        paused.spec.paused = true;

        assert_eq!(evaluate_pools(&state, &[paused]).outcome, PoolOutcome::Settled);
    }

    #[test]
    fn test_removal_confirmed_only_when_gone_everywhere() {
        let mut state = MachineConfigState::default();
        state.apply_render(render("worker", &["00-ipsec"]));
        state.apply_render(BTreeMap::new());

        let pools = [
            pool("worker", "worker", &[]),
            pool("infra", "worker", &["00-ipsec"]),
        ];
        let report = evaluate_pools(&state, &pools);
        assert!(matches!(report.outcome, PoolOutcome::Progressing(_)));
        assert!(report.removed.is_empty());

        let report = evaluate_pools(&state, &[pool("worker", "worker", &[])]);
        assert_eq!(report.outcome, PoolOutcome::Settled);
        assert_eq!(report.removed, render("worker", &["00-ipsec"]));

        assert!(state.drop_removed("worker", &report.removed["worker"]));
        assert!(state.is_idle());
    }

    #[test]
    fn test_malformed_pool_selector_is_skipped() {
        let mut state = MachineConfigState::default();
        state.apply_render(render("worker", &["00-ipsec"]));

        let mut bad = with_condition(pool("bad", "worker", &[]), POOL_CONDITION_DEGRADED);
        bad.spec.machine_config_selector = Some(LabelSelector {
            match_expressions: Some(vec![
                k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement {
                    key: MACHINE_CONFIG_ROLE_LABEL.to_string(),
                    operator: "Like".to_string(),
                    values: None,
                },
            ]),
            ..Default::default()
        });

        assert_eq!(evaluate_pools(&state, &[bad]).outcome, PoolOutcome::Settled);
    }
}
