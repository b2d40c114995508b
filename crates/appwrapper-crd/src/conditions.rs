//! Helpers for working with the three named status conditions ([`ConditionType`]) carried by
//! every `AppWrapper`, mirroring the way upstream Kubernetes controllers build
//! `io.k8s.apimachinery.pkg.apis.meta.v1.Condition` values.

use std::fmt;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::Resource;
use schemars::Schema;
use serde_json::json;
use strum::{Display, EnumString};

/// The only three condition types an `AppWrapper` ever reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ConditionType {
    QuotaReserved,
    ResourcesDeployed,
    PodsReady,
}

/// According to the Kubernetes schema the only allowed values for the `status` field of a
/// `Condition` are `True`, `False` and `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// `k8s-openapi`'s [`Condition`] does not derive `JsonSchema`, so the `status.conditions` field
/// of the CRD needs a hand-written schema that matches the upstream Kubernetes definition.
pub fn schema(_generator: &mut schemars::SchemaGenerator) -> Schema {
    serde_json::from_value(json!({
        "type": "array",
        "x-kubernetes-list-type": "map",
        "x-kubernetes-list-map-keys": ["type"],
        "x-kubernetes-patch-strategy": "merge",
        "x-kubernetes-patch-merge-key": "type",
        "items": {
            "type": "object",
            "properties": {
                "lastTransitionTime": {
                    "format": "date-time",
                    "type": "string"
                },
                "message": { "type": "string" },
                "observedGeneration": { "format": "int64", "type": "integer" },
                "reason": { "type": "string" },
                "status": {
                    "default": "Unknown",
                    "enum": ["Unknown", "True", "False"],
                    "type": "string"
                },
                "type": {
                    "pattern": "^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$",
                    "type": "string"
                }
            },
            "required": ["type", "status", "lastTransitionTime", "reason", "message"]
        },
    }))
    .expect("failed to parse JSON of custom Condition schema")
}

/// Builds a [`Condition`], preserving `lastTransitionTime` from `current_conditions` when the
/// status hasn't actually changed from the previously recorded value.
pub fn build_condition<T>(
    resource: &T,
    current_conditions: &[Condition],
    condition_type: ConditionType,
    status: ConditionStatus,
    reason: impl Into<String>,
    message: impl Into<String>,
) -> Condition
where
    T: Resource,
{
    let condition_type = condition_type.to_string();

    let previous = current_conditions
        .iter()
        .find(|condition| condition.type_ == condition_type);

    let last_transition_time = match previous {
        Some(condition) if condition.status == status.to_string() => {
            condition.last_transition_time.clone()
        }
        _ => Time(Utc::now()),
    };

    Condition {
        type_: condition_type,
        status: status.to_string(),
        observed_generation: resource.meta().generation,
        last_transition_time,
        reason: reason.into(),
        message: message.into(),
    }
}

/// Looks up a named condition's [`ConditionStatus`], defaulting to `Unknown` when absent.
pub fn condition_is_true(conditions: &[Condition], condition_type: ConditionType) -> bool {
    conditions
        .iter()
        .find(|condition| condition.type_ == condition_type.to_string())
        .is_some_and(|condition| condition.status == ConditionStatus::True.to_string())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Pod;

    use super::*;

    #[test]
    fn new_condition_gets_fresh_transition_time_on_status_change() {
        let pod = Pod::default();
        let initial = build_condition(
            &pod,
            &[],
            ConditionType::PodsReady,
            ConditionStatus::False,
            "InsufficientPodsReady",
            "not yet",
        );

        let updated = build_condition(
            &pod,
            &[initial.clone()],
            ConditionType::PodsReady,
            ConditionStatus::True,
            "AllPodsReady",
            "ready",
        );

        assert_ne!(initial.last_transition_time, updated.last_transition_time);
    }

    #[test]
    fn unchanged_status_keeps_transition_time() {
        let pod = Pod::default();
        let initial = build_condition(
            &pod,
            &[],
            ConditionType::PodsReady,
            ConditionStatus::False,
            "InsufficientPodsReady",
            "not yet",
        );

        let updated = build_condition(
            &pod,
            &[initial.clone()],
            ConditionType::PodsReady,
            ConditionStatus::False,
            "InsufficientPodsReady",
            "still not yet",
        );

        assert_eq!(initial.last_transition_time, updated.last_transition_time);
    }

    #[test]
    fn condition_is_true_defaults_to_false_when_absent() {
        assert!(!condition_is_true(&[], ConditionType::QuotaReserved));
    }
}
