//! MachineConfig and MachineConfigPool resources
//!
//! Only the fields the render tracker reads are modelled; unknown fields are
//! ignored on deserialization.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Condition type reported by a pool that failed to apply its configuration
pub const POOL_CONDITION_DEGRADED: &str = "Degraded";
/// Condition type reported by a pool that is rolling out a new configuration
pub const POOL_CONDITION_UPDATING: &str = "Updating";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfig",
    shortname = "mc"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigSpec {
    /// Ignition config, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kernel_arguments: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_image_url: Option<String>,
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    status = "MachineConfigPoolStatus",
    shortname = "mcp",
    printcolumn = r#"{"name":"Config","type":"string","jsonPath":".status.configuration.name"}"#,
    printcolumn = r#"{"name":"Updating","type":"string","jsonPath":".status.conditions[?(@.type=='Updating')].status"}"#,
    printcolumn = r#"{"name":"Degraded","type":"string","jsonPath":".status.conditions[?(@.type=='Degraded')].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    /// Selects the machine configs that make up this pool's rendered config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub machine_config_selector: Option<LabelSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub node_selector: Option<LabelSelector>,

    #[serde(default)]
    pub paused: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<MachineConfigPoolStatusConfiguration>,

    #[serde(default)]
    pub machine_count: i32,

    #[serde(default)]
    pub updated_machine_count: i32,

    #[serde(default)]
    pub degraded_machine_count: i32,
}

/// The rendered configuration currently targeted by a pool
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatusConfiguration {
    #[serde(default)]
    pub name: String,

    /// Machine configs merged into the rendered configuration
    #[serde(default)]
    pub source: Vec<ConfigSourceReference>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSourceReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub name: String,
}

impl MachineConfigPool {
    /// Names of the machine configs merged into the pool's current rendered config
    pub fn rendered_sources(&self) -> impl Iterator<Item = &str> {
        self.status
            .as_ref()
            .and_then(|s| s.configuration.as_ref())
            .into_iter()
            .flat_map(|c| c.source.iter().map(|s| s.name.as_str()))
    }

    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.status
            .as_ref()
            .map(|s| s.conditions.iter().any(|c| c.type_ == type_ && c.is_true()))
            .unwrap_or(false)
    }
}
