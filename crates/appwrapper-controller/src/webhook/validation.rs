//! Structural, semantic and authorization validation performed on create and update, plus the
//! immutability rules enforced on update.

use std::sync::Arc;

use appwrapper_crd::{
    AppWrapper, AppWrapperComponent,
    constants::{LABEL_OWNER, LABEL_USER_ID, LABEL_USER_NAME, MAX_TOTAL_PODSETS, MIN_TOTAL_PODSETS},
};
use appwrapper_template::{effective_pod_sets, extract_pod_template, restore_pod_set_info};
use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::api::authorization::v1::{ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec};
use kube::{
    Api, Resource, ResourceExt,
    api::{PostParams, TypeMeta},
    core::admission::{AdmissionRequest, AdmissionResponse},
};
use serde_json::Value;

use super::Context;

pub async fn validate(ctx: Arc<Context>, request: AdmissionRequest<AppWrapper>) -> AdmissionResponse {
    let response = AdmissionResponse::from(&request);

    let Some(wrapper) = request.object.as_ref() else {
        return response;
    };

    if let Err(message) = validate_structure(wrapper) {
        return AdmissionResponse::invalid(message);
    }

    if let Some(old) = request.old_object.as_ref() {
        if let Err(message) = validate_update(old, wrapper) {
            return AdmissionResponse::invalid(message);
        }
    }

    match authorize(&ctx.client, wrapper, &request.user_info).await {
        Ok(true) => response,
        Ok(false) => {
            AdmissionResponse::invalid("submitter is not authorized to create one or more component kinds")
        }
        Err(error) => AdmissionResponse::invalid(format!("failed to check component authorization: {error}")),
    }
}

/// Rules 1-5 of admission validation: non-empty, total pod-set count in bounds, every
/// component decodes, isn't itself an `AppWrapper`, matches the wrapper's namespace, and every
/// declared pod-set resolves to a valid pod template.
fn validate_structure(wrapper: &AppWrapper) -> Result<(), String> {
    if wrapper.spec.components.is_empty() {
        return Err("spec.components must not be empty".to_owned());
    }

    let mut total_pod_sets = 0usize;
    for (index, component) in wrapper.spec.components.iter().enumerate() {
        let type_meta: TypeMeta = serde_json::from_value(component.template.clone())
            .map_err(|error| format!("component {index}: template does not decode as a Kubernetes object: {error}"))?;

        if type_meta.kind == AppWrapper::kind(&()).as_ref() {
            return Err(format!("component {index}: an AppWrapper cannot contain another AppWrapper"));
        }

        let namespace = component
            .template
            .get("metadata")
            .and_then(|metadata| metadata.get("namespace"))
            .and_then(Value::as_str);
        if let Some(namespace) = namespace {
            if Some(namespace) != wrapper.namespace().as_deref() {
                return Err(format!(
                    "component {index}: namespace {namespace:?} does not match the AppWrapper's namespace"
                ));
            }
        }

        let pod_sets = effective_pod_sets(component)
            .map_err(|error| format!("component {index}: failed to determine pod-sets: {error}"))?;
        for pod_set in &pod_sets {
            extract_pod_template(&component.template, &pod_set.path).map_err(|error| {
                format!("component {index}: pod-set {:?} is not a valid pod template: {error}", pod_set.path)
            })?;
        }
        total_pod_sets += pod_sets.len();
    }

    if !(MIN_TOTAL_PODSETS..=MAX_TOTAL_PODSETS).contains(&total_pod_sets) {
        return Err(format!(
            "total pod-set count {total_pod_sets} is outside the allowed range [{MIN_TOTAL_PODSETS}, {MAX_TOTAL_PODSETS}]"
        ));
    }

    Ok(())
}

/// Update immutability: components cannot be added, removed or reordered; a component's
/// declared pod-sets and its template (apart from the queue-manager-injected scheduling
/// metadata described by its own `podSetInfos`) are frozen; the identity labels are frozen.
fn validate_update(old: &AppWrapper, new: &AppWrapper) -> Result<(), String> {
    if old.spec.components.len() != new.spec.components.len() {
        return Err("components cannot be added or removed".to_owned());
    }

    for (index, (old_component, new_component)) in
        old.spec.components.iter().zip(&new.spec.components).enumerate()
    {
        validate_component_immutability(old_component, new_component)
            .map_err(|message| format!("component {index}: {message}"))?;
    }

    for label in [LABEL_USER_NAME, LABEL_USER_ID] {
        if old.labels().get(label) != new.labels().get(label) {
            return Err(format!("label {label:?} is immutable"));
        }
    }

    Ok(())
}

fn validate_component_immutability(old: &AppWrapperComponent, new: &AppWrapperComponent) -> Result<(), String> {
    if old.declared_pod_sets != new.declared_pod_sets {
        return Err("declared pod-sets are immutable".to_owned());
    }

    let pod_sets = effective_pod_sets(new).map_err(|error| error.to_string())?;
    let empty = appwrapper_crd::PodSetInfo::default();
    let mut restored = new.template.clone();
    for (i, pod_set) in pod_sets.iter().enumerate() {
        let info = new.pod_set_infos.get(i).unwrap_or(&empty);
        restore_pod_set_info(&mut restored, &pod_set.path, info, LABEL_OWNER)
            .map_err(|error| error.to_string())?;
    }

    if restored != old.template {
        return Err("template is immutable apart from queue-manager-injected scheduling metadata".to_owned());
    }

    Ok(())
}

/// Issues one `SubjectAccessReview` per component against the external authorization service,
/// checking whether the submitter may `create` that component's kind in the wrapper's
/// namespace. Denies as soon as one component fails the check.
async fn authorize(
    client: &crate::client::Client,
    wrapper: &AppWrapper,
    user_info: &UserInfo,
) -> kube::Result<bool> {
    let api = Api::<SubjectAccessReview>::all(client.as_kube_client());

    for component in &wrapper.spec.components {
        let Ok(type_meta) = serde_json::from_value::<TypeMeta>(component.template.clone()) else {
            continue;
        };

        let (group, _version) = type_meta
            .api_version
            .split_once('/')
            .unwrap_or(("", type_meta.api_version.as_str()));

        let review = SubjectAccessReview {
            spec: SubjectAccessReviewSpec {
                user: user_info.username.clone(),
                uid: user_info.uid.clone(),
                groups: user_info.groups.clone(),
                resource_attributes: Some(ResourceAttributes {
                    verb: Some("create".to_owned()),
                    group: Some(group.to_owned()),
                    resource: Some(format!("{}s", type_meta.kind.to_ascii_lowercase())),
                    namespace: wrapper.namespace(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let response = api.create(&PostParams::default(), &review).await?;
        if !response.status.is_some_and(|status| status.allowed) {
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrapper(components: Vec<serde_json::Value>) -> AppWrapper {
        serde_json::from_value(json!({
            "apiVersion": "appwrapper.example.com/v1beta1",
            "kind": "AppWrapper",
            "metadata": {"name": "demo", "namespace": "ns"},
            "spec": {"components": components}
        }))
        .unwrap()
    }

    fn job_component(name: &str) -> serde_json::Value {
        json!({
            "template": {
                "apiVersion": "batch/v1",
                "kind": "Job",
                "metadata": {"name": name},
                "spec": {
                    "template": {
                        "metadata": {},
                        "spec": {"containers": [{"name": "c", "image": "busybox"}]}
                    }
                }
            }
        })
    }

    #[test]
    fn rejects_empty_component_list() {
        let wrapper = wrapper(vec![]);
        assert!(validate_structure(&wrapper).is_err());
    }

    #[test]
    fn rejects_nested_appwrapper() {
        let nested = json!({
            "template": {
                "apiVersion": "appwrapper.example.com/v1beta1",
                "kind": "AppWrapper",
                "metadata": {"name": "inner"}
            }
        });
        let wrapper = wrapper(vec![nested]);
        assert!(validate_structure(&wrapper).is_err());
    }

    #[test]
    fn rejects_foreign_namespace() {
        let foreign = json!({
            "template": {
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "p", "namespace": "other"}
            }
        });
        let wrapper = wrapper(vec![foreign]);
        assert!(validate_structure(&wrapper).is_err());
    }

    #[test]
    fn update_rejects_component_count_change() {
        let old = wrapper(vec![job_component("a")]);
        let new = wrapper(vec![job_component("a"), job_component("b")]);
        assert!(validate_update(&old, &new).is_err());
    }

    #[test]
    fn update_rejects_identity_label_change() {
        let mut old = wrapper(vec![job_component("a")]);
        old.meta_mut().labels = Some(
            [(LABEL_USER_NAME.to_owned(), "alice".to_owned())]
                .into_iter()
                .collect(),
        );
        let mut new = old.clone();
        new.meta_mut().labels = Some(
            [(LABEL_USER_NAME.to_owned(), "mallory".to_owned())]
                .into_iter()
                .collect(),
        );

        assert!(validate_update(&old, &new).is_err());
    }
}
