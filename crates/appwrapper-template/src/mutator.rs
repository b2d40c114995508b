//! Injection of queue-manager-provided scheduling metadata (labels, annotations, node
//! selectors, tolerations) into a pod-set's pod template, and its best-effort reversal.

use appwrapper_crd::PodSetInfo;
use serde_json::{Map, Value};
use snafu::{OptionExt, Snafu};

use crate::path::{self, PathError};

#[derive(Debug, Snafu)]
pub enum MutateError {
    #[snafu(display("failed to resolve pod-set path"), context(false))]
    Path { source: PathError },

    #[snafu(display("resolved subtree is not an object"))]
    NotAnObject,

    #[snafu(display(
        "key {key:?} is set to conflicting values by the existing template and the injected pod-set info"
    ))]
    Conflict { key: String },
}

/// Merges `info` and the `owner` label into the pod template addressed by `path` inside
/// `tree`. A key present with different values in both the existing template and `info` is a
/// fatal [`MutateError::Conflict`]; equal values merge silently.
pub fn apply_pod_set_info(
    tree: &mut Value,
    path: &str,
    info: &PodSetInfo,
    owner: (&str, &str),
) -> Result<(), MutateError> {
    let subtree = path::resolve_mut(tree, path)?;
    let object = subtree.as_object_mut().context(NotAnObjectSnafu)?;

    let metadata = ensure_object(object, "metadata");
    let mut labels: Vec<(&str, &str)> =
        info.labels.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    labels.push(owner);
    merge_conflict_checked(ensure_object(metadata, "labels"), &labels)?;

    let annotations: Vec<(&str, &str)> = info
        .annotations
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    merge_conflict_checked(ensure_object(metadata, "annotations"), &annotations)?;

    let spec = ensure_object(object, "spec");
    let node_selector: Vec<(&str, &str)> = info
        .node_selector
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    merge_conflict_checked(ensure_object(spec, "nodeSelector"), &node_selector)?;

    if !info.tolerations.is_empty() {
        let tolerations = ensure_array(spec, "tolerations");
        for toleration in &info.tolerations {
            tolerations.push(
                serde_json::to_value(toleration).expect("Toleration always serializes to JSON"),
            );
        }
    }

    Ok(())
}

/// Inverse of [`apply_pod_set_info`]: drops the owner label and replaces the four
/// injected-into dictionaries/list with exactly `info`'s contents. Best-effort — a malformed
/// subtree aborts restoration of this component without propagating further.
pub fn restore_pod_set_info(
    tree: &mut Value,
    path: &str,
    info: &PodSetInfo,
    owner_label_key: &str,
) -> Result<(), MutateError> {
    let subtree = path::resolve_mut(tree, path)?;
    let object = subtree.as_object_mut().context(NotAnObjectSnafu)?;

    let metadata = ensure_object(object, "metadata");

    let mut labels = Map::new();
    for (key, value) in &info.labels {
        labels.insert(key.clone(), Value::String(value.clone()));
    }
    metadata.insert("labels".to_owned(), Value::Object(labels));
    metadata
        .get_mut("labels")
        .and_then(Value::as_object_mut)
        .map(|labels| labels.remove(owner_label_key));

    let mut annotations = Map::new();
    for (key, value) in &info.annotations {
        annotations.insert(key.clone(), Value::String(value.clone()));
    }
    metadata.insert("annotations".to_owned(), Value::Object(annotations));

    let spec = ensure_object(object, "spec");

    let mut node_selector = Map::new();
    for (key, value) in &info.node_selector {
        node_selector.insert(key.clone(), Value::String(value.clone()));
    }
    spec.insert("nodeSelector".to_owned(), Value::Object(node_selector));

    let tolerations: Vec<Value> = info
        .tolerations
        .iter()
        .map(|toleration| {
            serde_json::to_value(toleration).expect("Toleration always serializes to JSON")
        })
        .collect();
    spec.insert("tolerations".to_owned(), Value::Array(tolerations));

    Ok(())
}

fn ensure_object<'a>(object: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    object
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    object
        .get_mut(key)
        .expect("just inserted")
        .as_object_mut()
        .expect("just ensured object")
}

fn ensure_array<'a>(object: &'a mut Map<String, Value>, key: &str) -> &'a mut Vec<Value> {
    object.entry(key).or_insert_with(|| Value::Array(Vec::new()));
    object
        .get_mut(key)
        .expect("just inserted")
        .as_array_mut()
        .expect("just ensured array")
}

fn merge_conflict_checked(
    target: &mut Map<String, Value>,
    injected: &[(&str, &str)],
) -> Result<(), MutateError> {
    for (key, value) in injected {
        match target.get(*key) {
            Some(Value::String(existing)) if existing != value => {
                return ConflictSnafu { key: (*key).to_owned() }.fail();
            }
            _ => {
                target.insert((*key).to_owned(), Value::String((*value).to_owned()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn info(labels: &[(&str, &str)]) -> PodSetInfo {
        PodSetInfo {
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>(),
            ..PodSetInfo::default()
        }
    }

    #[test]
    fn merges_labels_and_owner() {
        let mut tree = json!({ "template": { "metadata": {}, "spec": {} } });
        apply_pod_set_info(&mut tree, "template", &info(&[("queue", "x")]), ("owner", "wrapper-a"))
            .unwrap();

        let labels = &tree["template"]["metadata"]["labels"];
        assert_eq!(labels["queue"], "x");
        assert_eq!(labels["owner"], "wrapper-a");
    }

    #[test]
    fn conflicting_label_value_is_fatal() {
        let mut tree = json!({
            "template": { "metadata": { "labels": { "queue": "old" } }, "spec": {} }
        });
        let err = apply_pod_set_info(&mut tree, "template", &info(&[("queue", "new")]), ("owner", "w"))
            .unwrap_err();
        assert!(matches!(err, MutateError::Conflict { .. }));
    }

    #[test]
    fn equal_values_merge_silently() {
        let mut tree = json!({
            "template": { "metadata": { "labels": { "queue": "same" } }, "spec": {} }
        });
        apply_pod_set_info(&mut tree, "template", &info(&[("queue", "same")]), ("owner", "w")).unwrap();
        assert_eq!(tree["template"]["metadata"]["labels"]["queue"], "same");
    }

    #[test]
    fn restore_drops_owner_label_and_resets_dicts() {
        let mut tree = json!({
            "template": {
                "metadata": { "labels": { "queue": "x", "owner": "w" } },
                "spec": {}
            }
        });
        restore_pod_set_info(&mut tree, "template", &info(&[("queue", "x")]), "owner").unwrap();

        let labels = tree["template"]["metadata"]["labels"].as_object().unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["queue"], "x");
    }
}
