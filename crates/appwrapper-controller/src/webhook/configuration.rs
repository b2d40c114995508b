//! Construction of the `MutatingWebhookConfiguration`/`ValidatingWebhookConfiguration` objects
//! registered with the API server, applied and kept in sync by `appwrapper-webhook`.

use appwrapper_crd::AppWrapper;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ValidatingWebhook,
    ValidatingWebhookConfiguration,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResourceExt;

fn appwrapper_rule() -> RuleWithOperations {
    let crd = AppWrapper::crd();
    RuleWithOperations {
        api_groups: Some(vec![crd.spec.group.clone()]),
        api_versions: Some(vec!["v1beta1".to_owned()]),
        operations: Some(vec!["CREATE".to_owned(), "UPDATE".to_owned()]),
        resources: Some(vec![crd.spec.names.plural.clone()]),
        ..Default::default()
    }
}

/// Builds the `MutatingWebhookConfiguration` for the defaulting webhook registered at
/// `/mutate/<name>`. `appwrapper-webhook` fills in `clientConfig` on every certificate rotation.
pub fn mutating_webhook_configuration(name: &str) -> MutatingWebhookConfiguration {
    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            ..Default::default()
        },
        webhooks: Some(vec![MutatingWebhook {
            name: name.to_owned(),
            admission_review_versions: vec!["v1".to_owned()],
            side_effects: "None".to_owned(),
            rules: Some(vec![appwrapper_rule()]),
            failure_policy: Some("Fail".to_owned()),
            ..Default::default()
        }]),
    }
}

/// Builds the `ValidatingWebhookConfiguration` for the validation webhook registered at
/// `/validate/<name>`.
pub fn validating_webhook_configuration(name: &str) -> ValidatingWebhookConfiguration {
    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            ..Default::default()
        },
        webhooks: Some(vec![ValidatingWebhook {
            name: name.to_owned(),
            admission_review_versions: vec!["v1".to_owned()],
            side_effects: "None".to_owned(),
            rules: Some(vec![appwrapper_rule()]),
            failure_policy: Some("Fail".to_owned()),
            ..Default::default()
        }]),
    }
}
