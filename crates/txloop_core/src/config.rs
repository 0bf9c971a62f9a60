//! Transaction loop configuration.

use std::time::Duration;

/// Number of attempts made when no retry count is configured.
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Commits slower than this are reported with a warning.
pub const DEFAULT_LONG_COMMIT_DURATION: Duration = Duration::from_secs(6);

/// Configuration for a [`TransactionLoop`](crate::TransactionLoop).
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Retries after the first attempt. `None` means [`DEFAULT_ATTEMPTS`] total.
    pub retries: Option<u32>,

    /// Delay before each retry.
    pub sleep: Option<Duration>,

    /// Threshold above which a commit is logged as slow.
    pub long_commit_duration: Duration,

    /// Whether the handler never produces side effects worth committing.
    ///
    /// Read by the default `should_abort_due_to_no_side_effects` hook.
    pub side_effect_free: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            retries: None,
            sleep: None,
            long_commit_duration: DEFAULT_LONG_COMMIT_DURATION,
            side_effect_free: false,
        }
    }
}

impl LoopConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of retries after the first attempt.
    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Sets the delay before each retry.
    #[must_use]
    pub const fn sleep(mut self, delay: Duration) -> Self {
        self.sleep = Some(delay);
        self
    }

    /// Sets the slow-commit warning threshold.
    #[must_use]
    pub const fn long_commit_duration(mut self, threshold: Duration) -> Self {
        self.long_commit_duration = threshold;
        self
    }

    /// Marks the handler as free of side effects.
    #[must_use]
    pub const fn side_effect_free(mut self, value: bool) -> Self {
        self.side_effect_free = value;
        self
    }

    /// Total number of attempts one invocation may make.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self.retries {
            Some(retries) => retries.saturating_add(1),
            None => DEFAULT_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_config() {
        let config = LoopConfig::default();
        assert_eq!(config.attempts(), 10);
        assert_eq!(config.long_commit_duration, Duration::from_secs(6));
        assert!(config.sleep.is_none());
        assert!(!config.side_effect_free);
    }

    #[test]
    fn retries_add_one_attempt() {
        assert_eq!(LoopConfig::new().retries(0).attempts(), 1);
        assert_eq!(LoopConfig::new().retries(3).attempts(), 4);
        assert_eq!(LoopConfig::new().retries(u32::MAX).attempts(), u32::MAX);
    }

    #[test]
    fn builder_pattern() {
        let config = LoopConfig::new()
            .sleep(Duration::from_millis(5))
            .long_commit_duration(Duration::from_secs(1))
            .side_effect_free(true);

        assert_eq!(config.sleep, Some(Duration::from_millis(5)));
        assert_eq!(config.long_commit_duration, Duration::from_secs(1));
        assert!(config.side_effect_free);
    }

    proptest! {
        #[test]
        fn attempts_never_zero(retries in any::<u32>()) {
            let attempts = LoopConfig::new().retries(retries).attempts();
            prop_assert!(attempts >= 1);
            prop_assert!(attempts >= retries);
        }
    }
}
