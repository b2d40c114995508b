//! Bucketing of a wrapper's child pods by phase, compared against the expected pod count.

use appwrapper_crd::{AppWrapper, constants::LABEL_OWNER};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::client::Client;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodStatusSummary {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub expected: usize,
}

impl PodStatusSummary {
    /// All expected pods have reached `Succeeded` and nothing else remains.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded >= self.expected && self.pending == 0 && self.running == 0 && self.failed == 0
    }

    pub fn any_failed(&self) -> bool {
        self.failed > 0
    }

    pub fn enough_ready(&self) -> bool {
        self.running + self.succeeded >= self.expected
    }
}

/// Lists the pods owned by `wrapper` (by the `owner` label) and buckets them by phase.
pub async fn summarize(
    client: &Client,
    wrapper: &AppWrapper,
    expected: usize,
) -> crate::client::Result<PodStatusSummary> {
    let selector = format!("{LABEL_OWNER}={}", wrapper.name_any());
    let pods: Vec<Pod> = client
        .list(wrapper.namespace().as_deref(), &selector)
        .await?;

    let mut summary = PodStatusSummary {
        expected,
        ..Default::default()
    };

    for pod in &pods {
        match pod.status.as_ref().and_then(|status| status.phase.as_deref()) {
            Some("Pending") => summary.pending += 1,
            Some("Running") => summary.running += 1,
            Some("Succeeded") => summary.succeeded += 1,
            Some("Failed") => summary.failed += 1,
            _ => {}
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_succeeded_requires_exactly_expected_and_nothing_else() {
        let summary = PodStatusSummary { succeeded: 2, expected: 2, ..Default::default() };
        assert!(summary.all_succeeded());

        let still_running = PodStatusSummary { succeeded: 2, running: 1, expected: 2, ..Default::default() };
        assert!(!still_running.all_succeeded());
    }

    #[test]
    fn any_failed_is_fatal_regardless_of_others() {
        let summary = PodStatusSummary { failed: 1, succeeded: 1, expected: 2, ..Default::default() };
        assert!(summary.any_failed());
    }

    #[test]
    fn enough_ready_counts_succeeded_towards_ready() {
        let summary = PodStatusSummary { running: 1, succeeded: 1, expected: 2, ..Default::default() };
        assert!(summary.enough_ready());
    }
}
