//! Resolution, validation and mutation of the opaque pod templates embedded in an
//! `AppWrapper` component.

pub mod inference;
pub mod mutator;
pub mod path;
pub mod walker;

pub use inference::{InferenceError, infer_pod_sets};
pub use mutator::{MutateError, apply_pod_set_info, restore_pod_set_info};
pub use path::{PathError, PathSegment, parse_path, resolve, resolve_mut};
pub use walker::{PodTemplate, SpecError, extract_pod_template};

use appwrapper_crd::{AppWrapperComponent, PodSet};

/// The effective pod-set list for a component: its declared pod-sets if non-empty, otherwise
/// the inferred list for its template's kind.
pub fn effective_pod_sets(component: &AppWrapperComponent) -> Result<Vec<PodSet>, InferenceError> {
    if component.declared_pod_sets.is_empty() {
        infer_pod_sets(&component.template)
    } else {
        Ok(component.declared_pod_sets.clone())
    }
}

#[cfg(test)]
mod tests {
    use appwrapper_crd::AppWrapperComponent;
    use serde_json::json;

    use super::*;

    #[test]
    fn effective_pod_sets_prefers_declared_over_inferred() {
        let component = AppWrapperComponent {
            template: json!({ "kind": "Pod" }),
            declared_pod_sets: vec![PodSet { path: "template".to_owned(), replicas: 2 }],
            pod_set_infos: vec![],
        };

        let pod_sets = effective_pod_sets(&component).unwrap();
        assert_eq!(pod_sets, vec![PodSet { path: "template".to_owned(), replicas: 2 }]);
    }
}
