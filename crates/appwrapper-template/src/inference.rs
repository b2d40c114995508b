//! Inference of the effective pod-set list for well-known resource kinds when a component
//! declares no pod-sets of its own.

use appwrapper_crd::PodSet;
use serde_json::Value;
use snafu::Snafu;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum InferenceError {
    #[snafu(display("component template has no `kind` field"))]
    MissingKind,

    #[snafu(display("cannot infer a pod-set for unknown or unsupported kind {kind:?}; declare pod-sets explicitly"))]
    UnsupportedKind { kind: String },
}

/// Infers the pod-set list for a component template based on its `kind`, used when the
/// component's `declaredPodSets` is empty.
pub fn infer_pod_sets(template: &Value) -> Result<Vec<PodSet>, InferenceError> {
    let kind = template
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(InferenceError::MissingKind)?;

    let pod_set = match kind {
        "Pod" => PodSet {
            path: "template".to_owned(),
            replicas: 1,
        },
        "Job" | "Deployment" | "StatefulSet" | "ReplicaSet" | "DaemonSet" => PodSet {
            path: "template.spec.template".to_owned(),
            replicas: replicas_field(template).unwrap_or(1),
        },
        _ => {
            return UnsupportedKindSnafu {
                kind: kind.to_owned(),
            }
            .fail();
        }
    };

    Ok(vec![pod_set])
}

fn replicas_field(template: &Value) -> Option<i32> {
    template
        .pointer("/spec/replicas")
        .and_then(Value::as_i64)
        .map(|replicas| replicas as i32)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn infers_single_pod_set_for_bare_pod() {
        let template = json!({ "kind": "Pod" });
        let pod_sets = infer_pod_sets(&template).unwrap();
        assert_eq!(pod_sets, vec![PodSet { path: "template".to_owned(), replicas: 1 }]);
    }

    #[test]
    fn infers_pod_set_with_replicas_for_deployment() {
        let template = json!({ "kind": "Deployment", "spec": { "replicas": 3 } });
        let pod_sets = infer_pod_sets(&template).unwrap();
        assert_eq!(
            pod_sets,
            vec![PodSet { path: "template.spec.template".to_owned(), replicas: 3 }]
        );
    }

    #[test]
    fn rejects_unsupported_kind() {
        let template = json!({ "kind": "ConfigMap" });
        assert_eq!(
            infer_pod_sets(&template).unwrap_err(),
            InferenceError::UnsupportedKind { kind: "ConfigMap".to_owned() }
        );
    }

    #[test]
    fn rejects_missing_kind() {
        let template = json!({});
        assert_eq!(infer_pod_sets(&template).unwrap_err(), InferenceError::MissingKind);
    }
}
