//! Well-known label keys, annotation keys and the finalizer token used throughout the
//! `AppWrapper` lifecycle.

/// The finalizer added to every `AppWrapper` that may still own uncollected child resources.
pub const FINALIZER: &str = "appwrapper.example.com/finalizer";

/// Label placed on an `AppWrapper` and propagated to every child it creates, naming the
/// wrapper that owns the child.
pub const LABEL_OWNER: &str = "appwrapper.example.com/owner";

/// Label consumed by the queue manager to determine which queue an `AppWrapper` should be
/// admitted against.
pub const LABEL_QUEUE_NAME: &str = "appwrapper.example.com/queue-name";

/// Label stamped by the mutating webhook with the identity of the user who submitted the
/// `AppWrapper`. Immutable after creation.
pub const LABEL_USER_NAME: &str = "appwrapper.example.com/user-name";

/// Label stamped by the mutating webhook with the UID of the user who submitted the
/// `AppWrapper`. Immutable after creation.
pub const LABEL_USER_ID: &str = "appwrapper.example.com/user-id";

/// Default queue name applied when the submitter did not request one explicitly.
pub const DEFAULT_QUEUE_NAME: &str = "default";

/// Maximum total number of effective pod-sets (summed across all components) an `AppWrapper`
/// may declare.
pub const MAX_TOTAL_PODSETS: usize = 8;

/// Minimum total number of effective pod-sets an `AppWrapper` must declare.
pub const MIN_TOTAL_PODSETS: usize = 1;
