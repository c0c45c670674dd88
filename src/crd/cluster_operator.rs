//! ClusterOperator resource
//!
//! The cluster-wide health record. Conditions are mirrored here from the
//! operator config, along with the related-object list and operand versions.
//! Tracking state for hung rollouts and rendered machine configs is kept in
//! annotations on this object.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ObjectReference, OperandVersion};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "ClusterOperator",
    status = "ClusterOperatorStatus",
    shortname = "co",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.versions[?(@.name=='operator')].version"}"#,
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type=='Available')].status"}"#,
    printcolumn = r#"{"name":"Progressing","type":"string","jsonPath":".status.conditions[?(@.type=='Progressing')].status"}"#,
    printcolumn = r#"{"name":"Degraded","type":"string","jsonPath":".status.conditions[?(@.type=='Degraded')].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperatorSpec {}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperatorStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<OperandVersion>,

    #[serde(default)]
    pub related_objects: Vec<ObjectReference>,
}
