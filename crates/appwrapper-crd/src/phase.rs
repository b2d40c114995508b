use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The coarse lifecycle phase of an `AppWrapper`, reported as `status.phase`.
///
/// Transitions are driven exclusively by the reconciler; see the reconciler state machine for
/// the full transition table.
#[derive(
    Display, EnumString, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
#[strum(serialize_all = "PascalCase")]
pub enum WrapperPhase {
    Empty,
    Suspended,
    Resuming,
    Running,
    Suspending,
    Succeeded,
    Failed,
    Terminating,
}

impl WrapperPhase {
    /// A phase from which the reconciler never transitions back into `Running`.
    pub fn is_terminal(self) -> bool {
        matches!(self, WrapperPhase::Succeeded | WrapperPhase::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_and_failed_are_terminal() {
        assert!(WrapperPhase::Succeeded.is_terminal());
        assert!(WrapperPhase::Failed.is_terminal());
        assert!(!WrapperPhase::Running.is_terminal());
        assert!(!WrapperPhase::Empty.is_terminal());
    }
}
