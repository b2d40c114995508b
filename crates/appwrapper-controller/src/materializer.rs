//! Decoding a component's template into a concrete object, injecting pod-set mutations and
//! ownership metadata, and requesting its creation or deletion.

use appwrapper_crd::{AppWrapper, AppWrapperComponent, PodSetInfo, constants::LABEL_OWNER};
use appwrapper_template::{apply_pod_set_info, effective_pod_sets};
use kube::{
    Resource, ResourceExt,
    api::{DynamicObject, GroupVersionKind, PostParams, TypeMeta},
    core::ApiResource,
};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};

use crate::{
    client::Client,
    error::{
        DecodeComponentSnafu, Error, ForeignNamespaceSnafu, InferPodSetsSnafu,
        MissingObjectKindSnafu, MutateSnafu, PodSetInfoCountMismatchSnafu,
    },
};

/// Mutates `component`'s template in place (pod-set injection, owner labeling, namespace
/// stamping) and requests its creation. An already-exists response is treated as success.
pub async fn create_component(
    client: &Client,
    wrapper: &AppWrapper,
    component: &AppWrapperComponent,
) -> Result<(), Error> {
    let mut tree = stamp_and_mutate(wrapper, component)?;
    set_owner_reference(&mut tree, wrapper);

    let (api, object) = dynamic_object_api(client, &tree)?;

    match api.create(&PostParams::default(), &object).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 409 => Ok(()),
        Err(source) => {
            // A 404 here means the kind itself isn't known to the API server (noKind); anything
            // else (conflicts aside, handled above) is worth retrying.
            let transient = !matches!(&source, kube::Error::Api(response) if response.code == 404);
            Err(Error::CreateComponent {
                source,
                name: object.name_any(),
                transient,
            })
        }
    }
}

/// Requests deletion of `component`'s root object. Not-found is treated as success; other
/// errors are returned so the caller can log and continue with the remaining components.
pub async fn delete_component(
    client: &Client,
    wrapper: &AppWrapper,
    component: &AppWrapperComponent,
) -> Result<(), Error> {
    let mut tree = component.template.clone();
    stamp_namespace(&mut tree, wrapper)?;

    let (api, object) = dynamic_object_api(client, &tree)?;
    let name = object.name_any();

    match api.delete(&name, &kube::api::DeleteParams::background()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(source) => Err(Error::DeleteComponent { source, name }),
    }
}

/// Checks whether `component`'s root object is still observable, used after issuing a
/// background delete to decide whether cleanup needs another pass.
pub async fn component_exists(
    client: &Client,
    wrapper: &AppWrapper,
    component: &AppWrapperComponent,
) -> Result<bool, Error> {
    let mut tree = component.template.clone();
    stamp_namespace(&mut tree, wrapper)?;

    let (api, object) = dynamic_object_api(client, &tree)?;
    match api.get(&object.name_any()).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(false),
        Err(source) => Err(Error::DeleteComponent {
            source,
            name: object.name_any(),
        }),
    }
}

fn stamp_and_mutate(wrapper: &AppWrapper, component: &AppWrapperComponent) -> Result<Value, Error> {
    let mut tree = component.template.clone();
    stamp_namespace(&mut tree, wrapper)?;

    let pod_sets = effective_pod_sets(component).context(InferPodSetsSnafu)?;
    if !component.pod_set_infos.is_empty() && component.pod_set_infos.len() != pod_sets.len() {
        return PodSetInfoCountMismatchSnafu {
            expected: pod_sets.len(),
            got: component.pod_set_infos.len(),
        }
        .fail();
    }

    let empty = PodSetInfo::default();
    let owner_label_value = wrapper.name_any();
    for (pod_set, info) in pod_sets.iter().zip(pad_infos(&component.pod_set_infos, pod_sets.len(), &empty)) {
        apply_pod_set_info(&mut tree, &pod_set.path, info, (LABEL_OWNER, &owner_label_value))
            .context(MutateSnafu)?;
    }

    if let Some(metadata) = tree.get_mut("metadata").and_then(Value::as_object_mut) {
        let labels = metadata
            .entry("labels")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Some(labels) = labels.as_object_mut() {
            labels.insert(LABEL_OWNER.to_owned(), Value::String(owner_label_value));
        }
    }

    Ok(tree)
}

fn pad_infos<'a>(infos: &'a [PodSetInfo], len: usize, fallback: &'a PodSetInfo) -> Vec<&'a PodSetInfo> {
    (0..len)
        .map(|i| infos.get(i).unwrap_or(fallback))
        .collect()
}

fn stamp_namespace(tree: &mut Value, wrapper: &AppWrapper) -> Result<(), Error> {
    let wrapper_namespace = wrapper.namespace().unwrap_or_default();

    let metadata = tree
        .as_object_mut()
        .and_then(|object| object.entry("metadata").or_insert_with(|| Value::Object(serde_json::Map::new())).as_object_mut())
        .context(MissingObjectKindSnafu)?;

    match metadata.get("namespace").and_then(Value::as_str) {
        Some(existing) if existing != wrapper_namespace => return ForeignNamespaceSnafu.fail(),
        _ => {
            metadata.insert("namespace".to_owned(), Value::String(wrapper_namespace));
        }
    }

    Ok(())
}

fn dynamic_object_api(client: &Client, tree: &Value) -> Result<(kube::Api<DynamicObject>, DynamicObject), Error> {
    let type_meta: TypeMeta =
        serde_json::from_value(tree.clone()).context(DecodeComponentSnafu)?;
    if type_meta.kind.is_empty() || type_meta.api_version.is_empty() {
        return MissingObjectKindSnafu.fail();
    }

    let (group, version) = match type_meta.api_version.split_once('/') {
        Some((group, version)) => (group.to_owned(), version.to_owned()),
        None => (String::new(), type_meta.api_version.clone()),
    };
    let gvk = GroupVersionKind::gvk(&group, &version, &type_meta.kind);
    let api_resource = ApiResource::from_gvk(&gvk);

    let object: DynamicObject = serde_json::from_value(tree.clone()).context(DecodeComponentSnafu)?;
    let namespace = object.metadata.namespace.clone();

    let api = match namespace {
        Some(namespace) => kube::Api::namespaced_with(client.as_kube_client(), &namespace, &api_resource),
        None => kube::Api::all_with(client.as_kube_client(), &api_resource),
    };

    Ok((api, object))
}

fn set_owner_reference(tree: &mut Value, wrapper: &AppWrapper) {
    let owner_ref = wrapper.controller_owner_ref(&()).expect("AppWrapper always has a uid and apiVersion");
    if let Some(metadata) = tree.get_mut("metadata").and_then(Value::as_object_mut) {
        let owner_refs = metadata
            .entry("ownerReferences")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(array) = owner_refs.as_array_mut() {
            array.push(serde_json::to_value(owner_ref).expect("OwnerReference always serializes"));
        }
    }
}

