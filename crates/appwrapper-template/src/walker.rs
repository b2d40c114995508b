//! Extraction of a validated pod template from a subtree addressed by a [`crate::path`].

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodSpec;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::path::{self, PathError};

#[derive(Debug, Snafu)]
pub enum SpecError {
    #[snafu(display("failed to resolve pod-set path"), context(false))]
    Path { source: PathError },

    #[snafu(display("resolved subtree is not an object"))]
    NotAnObject,

    #[snafu(display("resolved subtree is missing a `metadata` key"))]
    MissingMetadata,

    #[snafu(display("resolved subtree is missing a `spec` key"))]
    MissingSpec,

    #[snafu(display("`metadata.labels` contains a non-string value for key {key:?}"))]
    NonStringLabel { key: String },

    #[snafu(display("`metadata.annotations` contains a non-string value for key {key:?}"))]
    NonStringAnnotation { key: String },

    #[snafu(display("`spec` does not parse as a pod specification"))]
    InvalidPodSpec { source: serde_json::Error },
}

/// A pod template extracted and validated from a component's opaque tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PodTemplate {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: PodSpec,
}

/// Resolves `path` in `tree` and validates that the addressed subtree has the shape of a pod
/// template: an object with both `metadata` and `spec` keys, where `spec` parses as a
/// [`PodSpec`].
pub fn extract_pod_template(tree: &Value, path: &str) -> Result<PodTemplate, SpecError> {
    let subtree = path::resolve(tree, path)?;
    let object = subtree.as_object().context(NotAnObjectSnafu)?;

    let metadata = object.get("metadata").context(MissingMetadataSnafu)?;
    let spec_value = object.get("spec").context(MissingSpecSnafu)?;

    let labels = string_map(metadata.get("labels"))
        .map_err(|key| NonStringLabelSnafu { key }.build())?;
    let annotations = string_map(metadata.get("annotations"))
        .map_err(|key| NonStringAnnotationSnafu { key }.build())?;

    let spec: PodSpec =
        serde_json::from_value(spec_value.clone()).context(InvalidPodSpecSnafu)?;

    Ok(PodTemplate {
        labels,
        annotations,
        spec,
    })
}

/// Converts a JSON object of string-to-string entries into a [`BTreeMap`]. Returns the
/// offending key as `Err` if any value is not a string. A missing map is treated as empty.
fn string_map(value: Option<&Value>) -> Result<BTreeMap<String, String>, String> {
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };

    let mut map = BTreeMap::new();
    for (key, value) in value.as_object().into_iter().flatten() {
        let value = value.as_str().ok_or_else(|| key.clone())?;
        map.insert(key.clone(), value.to_owned());
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extracts_pod_template_with_labels_and_annotations() {
        let tree = json!({
            "template": {
                "metadata": {
                    "labels": { "app": "demo" },
                    "annotations": { "note": "hello" }
                },
                "spec": {
                    "containers": [{ "name": "main", "image": "busybox" }]
                }
            }
        });

        let pod_template = extract_pod_template(&tree, "template").unwrap();
        assert_eq!(pod_template.labels.get("app"), Some(&"demo".to_owned()));
        assert_eq!(pod_template.annotations.get("note"), Some(&"hello".to_owned()));
        assert_eq!(pod_template.spec.containers.len(), 1);
    }

    #[test]
    fn rejects_missing_spec() {
        let tree = json!({ "template": { "metadata": {} } });
        assert!(matches!(
            extract_pod_template(&tree, "template").unwrap_err(),
            SpecError::MissingSpec
        ));
    }

    #[test]
    fn rejects_non_string_label_value() {
        let tree = json!({
            "template": {
                "metadata": { "labels": { "app": 5 } },
                "spec": {}
            }
        });
        assert!(matches!(
            extract_pod_template(&tree, "template").unwrap_err(),
            SpecError::NonStringLabel { .. }
        ));
    }

    #[test]
    fn rejects_subtree_that_is_not_a_pod_template() {
        let tree = json!({
            "template": {
                "metadata": { "name": "foo" }
            }
        });
        assert!(matches!(
            extract_pod_template(&tree, "template").unwrap_err(),
            SpecError::MissingSpec
        ));
    }
}
