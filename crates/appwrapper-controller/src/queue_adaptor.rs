//! The surface the queue manager's generic reconciler drives a wrapper through: suspend,
//! enumerate pod-sets, admit, and ask whether it's finished.

use appwrapper_crd::{
    AppWrapper, AppWrapperStatus, PodSetInfo,
    conditions::{ConditionStatus, ConditionType, condition_is_true},
};
use appwrapper_template::{effective_pod_sets, restore_pod_set_info};
use kube::ResourceExt;
use snafu::{ResultExt, Snafu};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to enumerate pod-sets for component {index}"))]
    PodSets {
        source: appwrapper_template::InferenceError,
        index: usize,
    },

    #[snafu(display(
        "number of pod-set infos ({got}) does not match the number of effective pod-sets ({expected})"
    ))]
    CountMismatch { expected: usize, got: usize },

    #[snafu(display("failed to apply pod-set info to component {index}"))]
    Mutate {
        source: appwrapper_template::MutateError,
        index: usize,
    },
}

/// One entry in [`pod_sets`]'s output: a name synthesized for the queue manager, the pod
/// template extracted at this pod-set's path, and its replica count.
pub struct PodSetEntry {
    pub name: String,
    pub template: serde_json::Value,
    pub replicas: i32,
}

pub fn is_suspended(wrapper: &AppWrapper) -> bool {
    wrapper.spec.suspend
}

pub fn is_active(wrapper: &AppWrapper) -> bool {
    wrapper
        .status
        .as_ref()
        .is_some_and(|status| condition_is_true(&status.conditions, ConditionType::QuotaReserved))
}

pub fn suspend(wrapper: &mut AppWrapper) {
    wrapper.spec.suspend = true;
}

/// Enumerates `(name = "<wrapper>-<i>", template, count)` across every component's effective
/// pod-set list, in order.
pub fn pod_sets(wrapper: &AppWrapper) -> Result<Vec<PodSetEntry>> {
    let mut entries = Vec::new();
    let mut i = 0usize;

    for (index, component) in wrapper.spec.components.iter().enumerate() {
        let pod_sets = effective_pod_sets(component).context(PodSetsSnafu { index })?;
        for pod_set in pod_sets {
            let template = appwrapper_template::resolve(&component.template, &pod_set.path)
                .ok()
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            entries.push(PodSetEntry {
                name: format!("{}-{i}", wrapper.name_any()),
                template,
                replicas: pod_set.replicas,
            });
            i += 1;
        }
    }

    Ok(entries)
}

/// Clears the suspend flag and permanently mutates every component's embedded template with
/// `infos`, applied in effective pod-set order across all components. `infos`'s length must
/// equal the total number of effective pod-sets.
pub fn run_with_pod_set_infos(wrapper: &mut AppWrapper, infos: &[PodSetInfo]) -> Result<()> {
    let mut total = 0usize;
    for (index, component) in wrapper.spec.components.iter().enumerate() {
        total += effective_pod_sets(component).context(PodSetsSnafu { index })?.len();
    }

    if total != infos.len() {
        return CountMismatchSnafu {
            expected: total,
            got: infos.len(),
        }
        .fail();
    }

    let owner = wrapper.name_any();
    let mut cursor = 0usize;
    for (index, component) in wrapper.spec.components.iter_mut().enumerate() {
        let pod_sets = effective_pod_sets(component).context(PodSetsSnafu { index })?;
        for pod_set in pod_sets {
            let info = &infos[cursor];
            appwrapper_template::apply_pod_set_info(
                &mut component.template,
                &pod_set.path,
                info,
                (appwrapper_crd::constants::LABEL_OWNER, &owner),
            )
            .context(MutateSnafu { index })?;
            component.pod_set_infos.push(info.clone());
            cursor += 1;
        }
    }

    wrapper.spec.suspend = false;
    Ok(())
}

/// Inverse of [`run_with_pod_set_infos`]. Best effort: a failure on one component does not
/// abort restoration of the rest.
pub fn restore_pod_set_infos(wrapper: &mut AppWrapper) {
    for component in &mut wrapper.spec.components {
        let Ok(pod_sets) = effective_pod_sets(component) else {
            continue;
        };
        let empty = PodSetInfo::default();
        for (i, pod_set) in pod_sets.iter().enumerate() {
            let info = component.pod_set_infos.get(i).unwrap_or(&empty).clone();
            let _ = restore_pod_set_info(
                &mut component.template,
                &pod_set.path,
                &info,
                appwrapper_crd::constants::LABEL_OWNER,
            );
        }
        component.pod_set_infos.clear();
    }
}

/// `(condition, done)`: when `phase=succeeded`, `done=true`. When `phase=failed`, `done=true`
/// iff `ResourcesDeployed=false`.
pub fn finished(status: &AppWrapperStatus) -> (ConditionStatus, bool) {
    use appwrapper_crd::WrapperPhase;

    match status.phase {
        Some(WrapperPhase::Succeeded) => (ConditionStatus::True, true),
        Some(WrapperPhase::Failed) => {
            let deployed = condition_is_true(&status.conditions, ConditionType::ResourcesDeployed);
            (ConditionStatus::True, !deployed)
        }
        _ => (ConditionStatus::False, false),
    }
}

pub fn pods_ready(status: &AppWrapperStatus) -> bool {
    condition_is_true(&status.conditions, ConditionType::PodsReady)
}

#[cfg(test)]
mod tests {
    use super::*;
    use appwrapper_crd::conditions::build_condition;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;

    fn wrapper() -> AppWrapper {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "appwrapper.example.com/v1beta1",
            "kind": "AppWrapper",
            "metadata": {"name": "demo", "namespace": "ns"},
            "spec": {"components": [], "suspend": true}
        }))
        .unwrap()
    }

    #[test]
    fn is_suspended_reflects_spec_flag() {
        let wrapper = wrapper();
        assert!(is_suspended(&wrapper));
    }

    #[test]
    fn finished_is_true_for_succeeded_phase() {
        let mut status = AppWrapperStatus::default();
        status.phase = Some(appwrapper_crd::WrapperPhase::Succeeded);
        let (_, done) = finished(&status);
        assert!(done);
    }

    #[test]
    fn finished_is_done_only_when_resources_not_deployed_for_failed_phase() {
        let mut status = AppWrapperStatus::default();
        status.phase = Some(appwrapper_crd::WrapperPhase::Failed);
        let (_, done) = finished(&status);
        assert!(done);

        let wrapper = wrapper();
        let condition: Condition = build_condition(
            &wrapper,
            &[],
            ConditionType::ResourcesDeployed,
            ConditionStatus::True,
            "deployed",
            "deployed",
        );
        status.conditions.push(condition);
        let (_, done) = finished(&status);
        assert!(!done);
    }
}
