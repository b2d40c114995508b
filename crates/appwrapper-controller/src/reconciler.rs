//! The wrapper state machine (empty → suspended → resuming → running →
//! suspending/failed/succeeded), plus the deletion cleanup path.
//!
//! Each branch below corresponds 1:1 to a numbered transition: it inspects the wrapper's
//! persisted phase and whatever facts it needs (pod status, condition state), decides the next
//! phase and condition set, performs at most the one side effect the transition calls for, and
//! persists status exactly once before returning the next requeue interval.

use std::{sync::Arc, time::Duration};

use appwrapper_crd::{
    AppWrapper, AppWrapperStatus, WrapperPhase,
    conditions::{ConditionStatus, ConditionType, build_condition, condition_is_true},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::{ResourceExt, runtime::controller::Action};
use snafu::ResultExt;
use tracing::{info, instrument};

use crate::{
    client::Client,
    error::{ClientSnafu, Error, FinalizerSnafu, InferPodSetsSnafu},
    finalizer,
    logging::controller::ReconcilerError,
    materializer, propagation,
};

const REQUEUE_IMMEDIATE: Duration = Duration::from_secs(1);
const REQUEUE_FAST: Duration = Duration::from_secs(5);
const REQUEUE_SLOW: Duration = Duration::from_secs(60);

/// Shared state handed to every reconcile invocation by the registering
/// [`kube::runtime::Controller`].
pub struct Context {
    pub client: Client,
    pub queue_manager_namespace: String,
}

#[instrument(skip(wrapper, ctx), fields(name = %wrapper.name_any(), namespace = ?wrapper.namespace()))]
pub async fn reconcile(wrapper: Arc<AppWrapper>, ctx: Arc<Context>) -> std::result::Result<Action, Error> {
    let client = &ctx.client;

    if finalizer::has_deletion_timestamp(&wrapper) && finalizer::has_finalizer(&wrapper) {
        return reconcile_deletion(client, &wrapper).await;
    }

    match wrapper.status.as_ref().and_then(|status| status.phase) {
        None => reconcile_empty(client, &wrapper).await,
        Some(WrapperPhase::Suspended) => reconcile_suspended(client, &wrapper).await,
        Some(WrapperPhase::Resuming) => reconcile_resuming(client, &wrapper).await,
        Some(WrapperPhase::Running) => {
            reconcile_running(client, &wrapper, &ctx.queue_manager_namespace).await
        }
        Some(WrapperPhase::Suspending) => {
            reconcile_cleanup(client, &wrapper, WrapperPhase::Suspended, "suspended").await
        }
        Some(WrapperPhase::Failed) => {
            reconcile_cleanup(client, &wrapper, WrapperPhase::Failed, "failed").await
        }
        Some(WrapperPhase::Succeeded) | Some(WrapperPhase::Terminating) => Ok(Action::await_change()),
    }
}

async fn reconcile_empty(client: &Client, wrapper: &AppWrapper) -> std::result::Result<Action, Error> {
    finalizer::add(client, wrapper).await.context(FinalizerSnafu)?;
    persist_status(client, wrapper, Some(WrapperPhase::Suspended), wrapper_conditions(wrapper))
        .await
        .context(ClientSnafu)?;
    Ok(Action::requeue(REQUEUE_IMMEDIATE))
}

async fn reconcile_suspended(client: &Client, wrapper: &AppWrapper) -> std::result::Result<Action, Error> {
    if wrapper.spec.suspend {
        return Ok(Action::requeue(REQUEUE_SLOW));
    }

    let mut conditions = wrapper_conditions(wrapper);
    for condition_type in [ConditionType::QuotaReserved, ConditionType::ResourcesDeployed] {
        set_condition(wrapper, &mut conditions, condition_type, ConditionStatus::True, "resuming", "resuming");
    }
    persist_status(client, wrapper, Some(WrapperPhase::Resuming), conditions)
        .await
        .context(ClientSnafu)?;
    Ok(Action::requeue(REQUEUE_IMMEDIATE))
}

async fn reconcile_resuming(client: &Client, wrapper: &AppWrapper) -> std::result::Result<Action, Error> {
    if wrapper.spec.suspend {
        let conditions = wrapper_conditions(wrapper);
        persist_status(client, wrapper, Some(WrapperPhase::Suspending), conditions)
            .await
            .context(ClientSnafu)?;
        return Ok(Action::requeue(REQUEUE_IMMEDIATE));
    }

    let mut result = Ok(());
    let mut created_any = false;
    for component in &wrapper.spec.components {
        match materializer::create_component(client, wrapper, component).await {
            Ok(()) => created_any = true,
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }

    match result {
        Ok(()) => {
            let conditions = wrapper_conditions(wrapper);
            persist_status(client, wrapper, Some(WrapperPhase::Running), conditions)
                .await
                .context(ClientSnafu)?;
            Ok(Action::requeue(REQUEUE_IMMEDIATE))
        }
        Err(err) if err.is_transient() => Err(err),
        Err(err) => {
            let mut conditions = wrapper_conditions(wrapper);
            // Some components may already have been created before this one failed; leave
            // `ResourcesDeployed` alone (or mark it true) so `reconcile_cleanup` still deletes
            // them instead of leaking them on the way into `Failed`.
            if created_any {
                set_condition(
                    wrapper,
                    &mut conditions,
                    ConditionType::ResourcesDeployed,
                    ConditionStatus::True,
                    "PartiallyDeployed",
                    "some components were created before materialization failed",
                );
            }
            set_condition(
                wrapper,
                &mut conditions,
                ConditionType::PodsReady,
                ConditionStatus::False,
                "MaterializationFailed",
                err.to_string(),
            );
            persist_status(client, wrapper, Some(WrapperPhase::Failed), conditions)
                .await
                .context(ClientSnafu)?;
            Ok(Action::requeue(REQUEUE_FAST))
        }
    }
}

async fn reconcile_running(
    client: &Client,
    wrapper: &AppWrapper,
    queue_manager_namespace: &str,
) -> std::result::Result<Action, Error> {
    if wrapper.spec.suspend {
        let conditions = wrapper_conditions(wrapper);
        persist_status(client, wrapper, Some(WrapperPhase::Suspending), conditions)
            .await
            .context(ClientSnafu)?;
        return Ok(Action::requeue(REQUEUE_IMMEDIATE));
    }

    let expected = expected_pod_count(wrapper)?;
    let summary = materializer_pod_summary(client, wrapper, expected).await?;
    let mut conditions = wrapper_conditions(wrapper);

    if summary.all_succeeded() {
        set_condition(
            wrapper,
            &mut conditions,
            ConditionType::QuotaReserved,
            ConditionStatus::False,
            "succeeded",
            "wrapper has run to completion",
        );
        persist_status(client, wrapper, Some(WrapperPhase::Succeeded), conditions)
            .await
            .context(ClientSnafu)?;
        return Ok(Action::requeue(REQUEUE_SLOW));
    }

    if summary.any_failed() {
        set_condition(
            wrapper,
            &mut conditions,
            ConditionType::PodsReady,
            ConditionStatus::False,
            "PodsFailed",
            "one or more pods failed",
        );
        persist_status(client, wrapper, Some(WrapperPhase::Failed), conditions)
            .await
            .context(ClientSnafu)?;
        return Ok(Action::requeue(REQUEUE_FAST));
    }

    if summary.enough_ready() {
        set_condition(
            wrapper,
            &mut conditions,
            ConditionType::PodsReady,
            ConditionStatus::True,
            "AllPodsReady",
            "all expected pods are running or succeeded",
        );
        persist_status(client, wrapper, Some(WrapperPhase::Running), conditions)
            .await
            .context(ClientSnafu)?;
        return Ok(Action::requeue(REQUEUE_SLOW));
    }

    let errors = propagation::propagate_admission(client, wrapper, queue_manager_namespace).await;
    for err in errors {
        info!(error = &err as &dyn std::error::Error, "admission propagation failed, continuing");
    }

    set_condition(
        wrapper,
        &mut conditions,
        ConditionType::PodsReady,
        ConditionStatus::False,
        "InsufficientPodsReady",
        "waiting for queue manager to admit remaining pod-sets",
    );
    persist_status(client, wrapper, Some(WrapperPhase::Running), conditions)
        .await
        .context(ClientSnafu)?;
    Ok(Action::requeue(REQUEUE_FAST))
}

async fn reconcile_cleanup(
    client: &Client,
    wrapper: &AppWrapper,
    target_phase: WrapperPhase,
    reason: &str,
) -> std::result::Result<Action, Error> {
    let status = wrapper.status.clone().unwrap_or_default();

    if condition_is_true(&status.conditions, ConditionType::ResourcesDeployed) {
        let remaining = cleanup_children(client, wrapper).await?;
        if remaining {
            let current_phase = wrapper.status.as_ref().and_then(|s| s.phase);
            persist_status(client, wrapper, current_phase, status.conditions)
                .await
                .context(ClientSnafu)?;
            return Ok(Action::requeue(REQUEUE_FAST));
        }
    }

    let mut conditions = status.conditions;
    for (condition_type, message) in [
        (ConditionType::ResourcesDeployed, "resources deleted"),
        (ConditionType::QuotaReserved, "no quota reserved"),
    ] {
        set_condition(wrapper, &mut conditions, condition_type, ConditionStatus::False, reason, message);
    }
    persist_status(client, wrapper, Some(target_phase), conditions)
        .await
        .context(ClientSnafu)?;
    Ok(Action::requeue(REQUEUE_IMMEDIATE))
}

async fn reconcile_deletion(client: &Client, wrapper: &AppWrapper) -> std::result::Result<Action, Error> {
    let status = wrapper.status.clone().unwrap_or_default();

    if condition_is_true(&status.conditions, ConditionType::ResourcesDeployed) {
        let remaining = cleanup_children(client, wrapper).await?;
        if remaining {
            persist_status(client, wrapper, Some(WrapperPhase::Terminating), status.conditions)
                .await
                .context(ClientSnafu)?;
            return Ok(Action::requeue(REQUEUE_FAST));
        }
    }

    let mut conditions = status.conditions;
    for (condition_type, message) in [
        (ConditionType::ResourcesDeployed, "resources deleted"),
        (ConditionType::QuotaReserved, "no quota reserved"),
    ] {
        set_condition(wrapper, &mut conditions, condition_type, ConditionStatus::False, "terminating", message);
    }
    persist_status(client, wrapper, Some(WrapperPhase::Terminating), conditions)
        .await
        .context(ClientSnafu)?;
    finalizer::remove(client, wrapper).await.context(FinalizerSnafu)?;
    Ok(Action::await_change())
}

async fn cleanup_children(client: &Client, wrapper: &AppWrapper) -> std::result::Result<bool, Error> {
    let mut any_remaining = false;
    for component in &wrapper.spec.components {
        materializer::delete_component(client, wrapper, component).await?;
        if materializer::component_exists(client, wrapper, component).await? {
            any_remaining = true;
        }
    }
    Ok(any_remaining)
}

async fn materializer_pod_summary(
    client: &Client,
    wrapper: &AppWrapper,
    expected: usize,
) -> std::result::Result<crate::aggregator::PodStatusSummary, Error> {
    crate::aggregator::summarize(client, wrapper, expected)
        .await
        .context(ClientSnafu)
}

fn expected_pod_count(wrapper: &AppWrapper) -> std::result::Result<usize, Error> {
    let mut total = 0usize;
    for component in &wrapper.spec.components {
        let pod_sets = appwrapper_template::effective_pod_sets(component).context(InferPodSetsSnafu)?;
        total += pod_sets.iter().map(|pod_set| pod_set.replicas.max(0) as usize).sum::<usize>();
    }
    Ok(total)
}

fn wrapper_conditions(wrapper: &AppWrapper) -> Vec<Condition> {
    wrapper.status.as_ref().map(|status| status.conditions.clone()).unwrap_or_default()
}

fn upsert_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

/// Builds a condition from `conditions`'s current contents and upserts it, avoiding the
/// aliased-borrow trap of passing `&conditions` and `&mut conditions` to the same call.
fn set_condition(
    wrapper: &AppWrapper,
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    status: ConditionStatus,
    reason: impl Into<String>,
    message: impl Into<String>,
) {
    let condition = build_condition(wrapper, conditions.as_slice(), condition_type, status, reason, message);
    upsert_condition(conditions, condition);
}

async fn persist_status(
    client: &Client,
    wrapper: &AppWrapper,
    phase: Option<WrapperPhase>,
    conditions: Vec<Condition>,
) -> crate::client::Result<AppWrapper> {
    let status = AppWrapperStatus { phase, conditions };
    client
        .apply_status(&wrapper.name_any(), wrapper.namespace().as_deref(), &status)
        .await
}

pub fn error_policy(_wrapper: Arc<AppWrapper>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_transient() {
        Action::requeue(REQUEUE_FAST)
    } else {
        Action::requeue(REQUEUE_SLOW)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn wrapper(components: Vec<serde_json::Value>) -> AppWrapper {
        serde_json::from_value(json!({
            "apiVersion": "appwrapper.example.com/v1beta1",
            "kind": "AppWrapper",
            "metadata": {"name": "demo", "namespace": "ns"},
            "spec": {"components": components}
        }))
        .unwrap()
    }

    fn component(declared_pod_sets: Vec<(&str, i32)>) -> serde_json::Value {
        json!({
            "template": {"kind": "Pod"},
            "declaredPodSets": declared_pod_sets
                .into_iter()
                .map(|(path, replicas)| json!({"path": path, "replicas": replicas}))
                .collect::<Vec<_>>(),
        })
    }

    #[test]
    fn wrapper_conditions_is_empty_before_any_status_write() {
        let wrapper = wrapper(vec![]);
        assert!(wrapper_conditions(&wrapper).is_empty());
    }

    #[test]
    fn wrapper_conditions_reflects_persisted_status() {
        let mut wrapper = wrapper(vec![]);
        let condition = build_condition(
            &wrapper,
            &[],
            ConditionType::QuotaReserved,
            ConditionStatus::True,
            "resuming",
            "resuming",
        );
        wrapper.status = Some(AppWrapperStatus { phase: Some(WrapperPhase::Resuming), conditions: vec![condition] });

        let conditions = wrapper_conditions(&wrapper);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, ConditionType::QuotaReserved.to_string());
    }

    #[test]
    fn upsert_condition_appends_new_type() {
        let wrapper = wrapper(vec![]);
        let mut conditions = Vec::new();
        let condition =
            build_condition(&wrapper, &conditions, ConditionType::PodsReady, ConditionStatus::False, "r", "m");
        upsert_condition(&mut conditions, condition);

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, ConditionType::PodsReady.to_string());
    }

    #[test]
    fn upsert_condition_replaces_same_type_instead_of_appending() {
        let wrapper = wrapper(vec![]);
        let mut conditions = Vec::new();
        set_condition(&wrapper, &mut conditions, ConditionType::PodsReady, ConditionStatus::False, "r1", "m1");
        set_condition(&wrapper, &mut conditions, ConditionType::PodsReady, ConditionStatus::True, "r2", "m2");

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::True.to_string());
        assert_eq!(conditions[0].reason, "r2");
    }

    #[test]
    fn set_condition_preserves_other_condition_types() {
        let wrapper = wrapper(vec![]);
        let mut conditions = Vec::new();
        set_condition(&wrapper, &mut conditions, ConditionType::QuotaReserved, ConditionStatus::True, "r", "m");
        set_condition(&wrapper, &mut conditions, ConditionType::PodsReady, ConditionStatus::False, "r", "m");

        assert_eq!(conditions.len(), 2);
        assert!(condition_is_true(&conditions, ConditionType::QuotaReserved));
        assert!(!condition_is_true(&conditions, ConditionType::PodsReady));
    }

    #[test]
    fn expected_pod_count_sums_declared_replicas_across_components() {
        let wrapper = wrapper(vec![component(vec![("template", 3)]), component(vec![("template", 2)])]);
        assert_eq!(expected_pod_count(&wrapper).unwrap(), 5);
    }

    #[test]
    fn expected_pod_count_ignores_negative_replicas() {
        let wrapper = wrapper(vec![component(vec![("template", -1)])]);
        assert_eq!(expected_pod_count(&wrapper).unwrap(), 0);
    }

    #[test]
    fn expected_pod_count_is_zero_with_no_components() {
        let wrapper = wrapper(vec![]);
        assert_eq!(expected_pod_count(&wrapper).unwrap(), 0);
    }
}
