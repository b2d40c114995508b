//! Defaulting performed by the mutating webhook on create: force `spec.suspend`, default the
//! `queue-name` label, and stamp the submitter's identity.

use std::sync::Arc;

use appwrapper_crd::{
    AppWrapper,
    constants::{DEFAULT_QUEUE_NAME, LABEL_QUEUE_NAME, LABEL_USER_ID, LABEL_USER_NAME},
};
use json_patch::{AddOperation, Patch, PatchOperation};
use k8s_openapi::api::authentication::v1::UserInfo;
use kube::{ResourceExt, core::admission::{AdmissionRequest, AdmissionResponse}};

use super::Context;

pub async fn mutate(_ctx: Arc<Context>, request: AdmissionRequest<AppWrapper>) -> AdmissionResponse {
    let response = AdmissionResponse::from(&request);

    let Some(wrapper) = request.object.as_ref() else {
        return response;
    };

    let patch = defaulting_patch(wrapper, &request.user_info);
    match response.with_patch(patch) {
        Ok(response) => response,
        Err(error) => AdmissionResponse::invalid(format!("failed to build defaulting patch: {error}")),
    }
}

/// Builds the JSON patch forcing `spec.suspend=true` and stamping `queue-name` (if absent),
/// `user-name` and `user-id` onto `wrapper`'s labels.
fn defaulting_patch(wrapper: &AppWrapper, user_info: &UserInfo) -> Patch {
    let mut labels = wrapper.labels().clone();
    labels
        .entry(LABEL_QUEUE_NAME.to_owned())
        .or_insert_with(|| DEFAULT_QUEUE_NAME.to_owned());
    labels.insert(
        LABEL_USER_NAME.to_owned(),
        user_info.username.clone().unwrap_or_default(),
    );
    if let Some(uid) = &user_info.uid {
        labels.insert(LABEL_USER_ID.to_owned(), uid.clone());
    }

    Patch(vec![
        PatchOperation::Add(AddOperation {
            path: "/spec/suspend".parse().expect("static JSON pointer"),
            value: serde_json::Value::Bool(true),
        }),
        PatchOperation::Add(AddOperation {
            path: "/metadata/labels".parse().expect("static JSON pointer"),
            value: serde_json::to_value(&labels).expect("a string map always serializes"),
        }),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrapper(labels: &[(&str, &str)]) -> AppWrapper {
        let labels: std::collections::BTreeMap<_, _> =
            labels.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();

        serde_json::from_value(json!({
            "apiVersion": "appwrapper.example.com/v1beta1",
            "kind": "AppWrapper",
            "metadata": {"name": "demo", "namespace": "ns", "labels": labels},
            "spec": {"components": []}
        }))
        .unwrap()
    }

    #[test]
    fn defaults_queue_name_when_absent() {
        let wrapper = wrapper(&[]);
        let user_info = UserInfo {
            username: Some("alice".to_owned()),
            uid: Some("1234".to_owned()),
            ..Default::default()
        };

        let Patch(operations) = defaulting_patch(&wrapper, &user_info);
        let labels_patch = operations
            .iter()
            .find_map(|op| match op {
                PatchOperation::Add(add) if add.path.to_string() == "/metadata/labels" => {
                    Some(&add.value)
                }
                _ => None,
            })
            .expect("a labels patch is always produced");

        assert_eq!(labels_patch[LABEL_QUEUE_NAME], DEFAULT_QUEUE_NAME);
        assert_eq!(labels_patch[LABEL_USER_NAME], "alice");
        assert_eq!(labels_patch[LABEL_USER_ID], "1234");
    }

    #[test]
    fn preserves_user_provided_queue_name() {
        let wrapper = wrapper(&[(LABEL_QUEUE_NAME, "team-a")]);
        let user_info = UserInfo::default();

        let Patch(operations) = defaulting_patch(&wrapper, &user_info);
        let labels_patch = operations
            .iter()
            .find_map(|op| match op {
                PatchOperation::Add(add) if add.path.to_string() == "/metadata/labels" => {
                    Some(&add.value)
                }
                _ => None,
            })
            .expect("a labels patch is always produced");

        assert_eq!(labels_patch[LABEL_QUEUE_NAME], "team-a");
    }
}
