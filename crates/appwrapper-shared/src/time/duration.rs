use std::ops::Deref;
use std::time::Duration as StdDuration;

/// A thin wrapper around [`std::time::Duration`] which adds `const fn` constructors for the
/// common units needed when describing certificate and reconcile-related timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(StdDuration);

impl Duration {
    pub const fn from_secs_unchecked(secs: u64) -> Self {
        Self(StdDuration::from_secs(secs))
    }

    pub const fn from_minutes_unchecked(minutes: u64) -> Self {
        Self(StdDuration::from_secs(minutes * 60))
    }

    pub const fn from_hours_unchecked(hours: u64) -> Self {
        Self(StdDuration::from_secs(hours * 60 * 60))
    }

    pub const fn from_days_unchecked(days: u64) -> Self {
        Self(StdDuration::from_secs(days * 24 * 60 * 60))
    }
}

impl Deref for Duration {
    type Target = StdDuration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<StdDuration> for Duration {
    fn from(value: StdDuration) -> Self {
        Self(value)
    }
}

impl From<Duration> for StdDuration {
    fn from(value: Duration) -> Self {
        value.0
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_convert_to_seconds() {
        assert_eq!(*Duration::from_minutes_unchecked(2), StdDuration::from_secs(120));
    }

    #[test]
    fn days_convert_to_seconds() {
        assert_eq!(*Duration::from_days_unchecked(1), StdDuration::from_secs(86400));
    }
}
