//! Admission propagation (§4.6): telling a queue-manager-owned `Workload` object which
//! pod-sets it was admitted under, once the wrapper has actually gone into effect.
//!
//! This is a best-effort side effect: every failure is logged and swallowed rather than
//! bubbled up, so a missing or unreachable queue manager never blocks the reconciler.

use appwrapper_crd::{AppWrapper, AppWrapperComponent};
use appwrapper_template::effective_pod_sets;
use kube::{ResourceExt, api::DynamicObject, core::ApiResource};
use serde_json::{Value, json};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::client::Client;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to infer pod-sets for component {index}"))]
    PodSets {
        source: appwrapper_template::InferenceError,
        index: usize,
    },

    #[snafu(display("workload object {name:?} not found"))]
    WorkloadNotFound { name: String, source: crate::client::Error },

    #[snafu(display("workload object {name:?} has no pod-set list to copy names from"))]
    MissingPodSetNames { name: String },

    #[snafu(display("failed to apply admission status to workload object {name:?}"))]
    ApplyStatus { name: String, source: crate::client::Error },
}

/// Derives the name of the `Workload` object the queue manager created for `component`, using
/// the child's name and kind. Mirrors the naming scheme a framework-provided helper would use:
/// `<child-name>-<lowercased-kind>`.
fn workload_name(component: &AppWrapperComponent) -> Option<String> {
    let name = component.template.get("metadata")?.get("name")?.as_str()?;
    let kind = component.template.get("kind")?.as_str()?;
    Some(format!("{name}-{}", kind.to_ascii_lowercase()))
}

/// For each component with at least one pod-set, locates its `Workload` object in
/// `queue_manager_namespace`. If found and not yet admitted, constructs an admission record
/// naming `wrapper`'s internal pseudo-queue plus one pod-set assignment per declared pod-set
/// (names copied from the workload's own pod-set list) and applies it to the workload's status.
pub async fn propagate_admission(
    client: &Client,
    wrapper: &AppWrapper,
    queue_manager_namespace: &str,
) -> Vec<Error> {
    let mut errors = Vec::new();

    for (index, component) in wrapper.spec.components.iter().enumerate() {
        match effective_pod_sets(component).context(PodSetsSnafu { index }) {
            Ok(pod_sets) if pod_sets.is_empty() => continue,
            Ok(_) => {}
            Err(err) => {
                errors.push(err);
                continue;
            }
        }

        let Some(name) = workload_name(component) else {
            continue;
        };

        if let Err(err) = propagate_one(client, wrapper, queue_manager_namespace, &name).await {
            errors.push(err);
        }
    }

    errors
}

async fn propagate_one(
    client: &Client,
    wrapper: &AppWrapper,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let api_resource = workload_api_resource();
    let kube_client = client.as_kube_client();
    let api = kube::Api::<DynamicObject>::namespaced_with(kube_client, namespace, &api_resource);

    let workload = api
        .get(name)
        .await
        .map_err(|source| crate::client::Error::Get {
            source,
            kind: "Workload",
            name: name.to_owned(),
        })
        .context(WorkloadNotFoundSnafu { name: name.to_owned() })?;

    if already_admitted(&workload) {
        return Ok(());
    }

    let pod_set_names = workload
        .data
        .get("spec")
        .and_then(|spec| spec.get("podSets"))
        .and_then(Value::as_array)
        .context(MissingPodSetNamesSnafu { name: name.to_owned() })?
        .iter()
        .filter_map(|pod_set| pod_set.get("name").and_then(Value::as_str))
        .collect::<Vec<_>>();

    let admission = json!({
        "clusterQueue": internal_queue_name(wrapper),
        "podSetAssignments": pod_set_names
            .iter()
            .map(|name| json!({ "name": name }))
            .collect::<Vec<_>>(),
    });

    let mut patched = workload.clone();
    if let Some(object) = patched.data.as_object_mut() {
        let status = object
            .entry("status")
            .or_insert_with(|| json!({}));
        if let Some(status) = status.as_object_mut() {
            status.insert("admission".to_owned(), admission);
        }
    }

    let body = serde_json::to_vec(&patched).expect("a cloned DynamicObject always serializes");
    api.replace_status(name, &kube::api::PostParams::default(), body)
        .await
        .map_err(|source| crate::client::Error::PatchStatus {
            source,
            kind: "Workload",
            name: name.to_owned(),
        })
        .context(ApplyStatusSnafu { name: name.to_owned() })?;

    Ok(())
}

fn already_admitted(workload: &DynamicObject) -> bool {
    workload
        .data
        .get("status")
        .and_then(|status| status.get("admission"))
        .is_some()
}

fn internal_queue_name(wrapper: &AppWrapper) -> String {
    format!("{}-{}", wrapper.namespace().unwrap_or_default(), wrapper.name_any())
}

fn workload_api_resource() -> ApiResource {
    let gvk = kube::api::GroupVersionKind::gvk("kueue.x-k8s.io", "v1beta1", "Workload");
    ApiResource::from_gvk(&gvk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn workload_name_combines_child_name_and_lowercased_kind() {
        let component = AppWrapperComponent {
            template: json!({"kind": "Job", "metadata": {"name": "worker"}}),
            declared_pod_sets: vec![],
            pod_set_infos: vec![],
        };

        assert_eq!(workload_name(&component).as_deref(), Some("worker-job"));
    }

    #[test]
    fn workload_name_is_none_without_metadata_name() {
        let component = AppWrapperComponent {
            template: json!({"kind": "Job"}),
            declared_pod_sets: vec![],
            pod_set_infos: vec![],
        };

        assert_eq!(workload_name(&component), None);
    }

    #[test]
    fn already_admitted_checks_status_admission_presence() {
        let object: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "kueue.x-k8s.io/v1beta1",
            "kind": "Workload",
            "metadata": {"name": "worker-job"},
            "status": {"admission": {"clusterQueue": "x"}}
        }))
        .unwrap();

        assert!(already_admitted(&object));
    }
}
