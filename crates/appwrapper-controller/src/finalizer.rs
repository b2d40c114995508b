//! Finalizer bookkeeping: the only invariant is that the finalizer is present iff the wrapper
//! may still own uncollected children.

use appwrapper_crd::{AppWrapper, constants::FINALIZER};
use kube::{Resource, ResourceExt, api::Patch};
use serde_json::json;
use snafu::{ResultExt, Snafu};

use crate::client::Client;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to add finalizer to AppWrapper {name:?}"))]
    Add { source: kube::Error, name: String },

    #[snafu(display("failed to remove finalizer from AppWrapper {name:?}"))]
    Remove { source: kube::Error, name: String },
}

pub fn has_finalizer(wrapper: &AppWrapper) -> bool {
    wrapper
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == FINALIZER))
}

pub fn has_deletion_timestamp(wrapper: &AppWrapper) -> bool {
    wrapper.meta().deletion_timestamp.is_some()
}

/// Adds [`FINALIZER`] if not already present. No-op (and no API call) otherwise.
pub async fn add(client: &Client, wrapper: &AppWrapper) -> Result<()> {
    if has_finalizer(wrapper) {
        return Ok(());
    }

    let mut finalizers = wrapper.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(FINALIZER.to_owned());
    let patch = json!({ "metadata": { "finalizers": finalizers } });

    let api = kube::Api::<AppWrapper>::namespaced(
        client.as_kube_client(),
        &wrapper.namespace().unwrap_or_default(),
    );
    api.patch(
        &wrapper.name_any(),
        &kube::api::PatchParams::default(),
        &Patch::Merge(patch),
    )
    .await
    .context(AddSnafu { name: wrapper.name_any() })?;

    Ok(())
}

/// Removes [`FINALIZER`] if present. No-op (and no API call) otherwise.
pub async fn remove(client: &Client, wrapper: &AppWrapper) -> Result<()> {
    if !has_finalizer(wrapper) {
        return Ok(());
    }

    let finalizers: Vec<_> = wrapper
        .meta()
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != FINALIZER)
        .collect();
    let patch = json!({ "metadata": { "finalizers": finalizers } });

    let api = kube::Api::<AppWrapper>::namespaced(
        client.as_kube_client(),
        &wrapper.namespace().unwrap_or_default(),
    );
    api.patch(
        &wrapper.name_any(),
        &kube::api::PatchParams::default(),
        &Patch::Merge(patch),
    )
    .await
    .context(RemoveSnafu { name: wrapper.name_any() })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper_with_finalizers(finalizers: Vec<&str>) -> AppWrapper {
        serde_json::from_value(json!({
            "apiVersion": "appwrapper.example.com/v1beta1",
            "kind": "AppWrapper",
            "metadata": {
                "name": "demo",
                "namespace": "ns",
                "finalizers": finalizers,
            },
            "spec": {"components": []}
        }))
        .unwrap()
    }

    #[test]
    fn has_finalizer_detects_presence() {
        assert!(has_finalizer(&wrapper_with_finalizers(vec![FINALIZER])));
        assert!(!has_finalizer(&wrapper_with_finalizers(vec![])));
    }
}
