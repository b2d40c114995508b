use k8s_openapi::{
    api::core::v1::Toleration, apimachinery::pkg::apis::meta::v1::Condition,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{conditions, phase::WrapperPhase};

/// `AppWrapper` is a cluster-level resource bundling a set of heterogeneous workload resources
/// ([`AppWrapperComponent`]) into a single unit of admission, deployment and lifecycle
/// management.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "appwrapper.example.com",
    version = "v1beta1",
    kind = "AppWrapper",
    plural = "appwrappers",
    shortname = "aw",
    namespaced,
    status = "AppWrapperStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AppWrapperSpec {
    /// The ordered list of resources this `AppWrapper` bundles together. Immutable after
    /// creation except for each component's `podSetInfos`.
    pub components: Vec<AppWrapperComponent>,

    /// Desired suspension state, toggled by the queue manager. `true` means the wrapper's
    /// children should not be running.
    #[serde(default = "default_suspend")]
    pub suspend: bool,
}

fn default_suspend() -> bool {
    true
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppWrapperComponent {
    /// The opaque JSON tree of exactly one child resource. Preserved byte-compatible except for
    /// the label/annotation/node-selector/toleration injections performed during materialization.
    #[schemars(schema_with = "raw_object_schema")]
    pub template: serde_json::Value,

    /// User-declared pod-sets within `template`. When empty, the pod-set inference table is
    /// used instead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declared_pod_sets: Vec<PodSet>,

    /// Queue-manager-provided scheduling info, one entry per effective pod-set, in the same
    /// order as the effective pod-set list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_set_infos: Vec<PodSetInfo>,
}

fn raw_object_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
    serde_json::from_value(serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
    }))
    .expect("failed to parse JSON of raw object schema")
}

/// A path into a component's `template`, together with the number of replicas the named
/// sub-object is expected to scale to.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSet {
    /// Dotted path into `template`; the first segment must be the literal `template`. Segments
    /// may index into arrays with `key[index]` syntax.
    pub path: String,

    /// Number of replicas this pod-set is expected to produce.
    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

fn default_replicas() -> i32 {
    1
}

/// Queue-manager-provided scheduling metadata to merge into a pod-set's pod template.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSetInfo {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppWrapperStatus {
    pub phase: Option<WrapperPhase>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "conditions::schema")]
    pub conditions: Vec<Condition>,
}

impl AppWrapperStatus {
    pub fn condition(&self, condition_type: conditions::ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|condition| condition.type_ == condition_type.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_defaults_suspend_to_true_when_absent() {
        let spec: AppWrapperSpec = serde_json::from_value(serde_json::json!({
            "components": []
        }))
        .unwrap();

        assert!(spec.suspend);
    }

    #[test]
    fn pod_set_defaults_replicas_to_one() {
        let pod_set: PodSet = serde_json::from_value(serde_json::json!({
            "path": "template"
        }))
        .unwrap();

        assert_eq!(pod_set.replicas, 1);
    }
}
