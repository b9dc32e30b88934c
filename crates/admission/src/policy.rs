//! Throughput policies.

use std::time::Duration;

use config::PolicyConfig;

use crate::error::PolicyError;

/// A weighted request budget per fixed window, or no budget at all.
///
/// A limited policy always has a window of at least one whole second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputPolicy {
    limit: u64,
    window: Duration,
    unlimited: bool,
}

impl ThroughputPolicy {
    /// A policy allowing `limit` units of request weight per `window`.
    ///
    /// The window is truncated to whole seconds and must be at least one second long.
    pub fn limited(limit: u64, window: Duration) -> Result<Self, PolicyError> {
        let window = Duration::from_secs(window.as_secs());

        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }

        Ok(Self {
            limit,
            window,
            unlimited: false,
        })
    }

    /// A policy that is never counted.
    pub fn unlimited() -> Self {
        Self {
            limit: 0,
            window: Duration::ZERO,
            unlimited: true,
        }
    }

    /// The weighted request budget per window. Meaningless for unlimited policies.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// The window length. Zero for unlimited policies.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether counting is skipped entirely.
    pub fn is_unlimited(&self) -> bool {
        self.unlimited
    }
}

impl TryFrom<&PolicyConfig> for ThroughputPolicy {
    type Error = PolicyError;

    fn try_from(config: &PolicyConfig) -> Result<Self, Self::Error> {
        if config.unlimited {
            Ok(Self::unlimited())
        } else {
            Self::limited(config.limit, config.window)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_truncated_to_seconds() {
        let policy = ThroughputPolicy::limited(10, Duration::from_millis(2500)).unwrap();

        assert_eq!(policy.window(), Duration::from_secs(2));
    }

    #[test]
    fn sub_second_window_is_rejected() {
        let result = ThroughputPolicy::limited(10, Duration::from_millis(999));

        assert!(matches!(result, Err(PolicyError::ZeroWindow)));
    }

    #[test]
    fn zero_limit_is_allowed() {
        let policy = ThroughputPolicy::limited(0, Duration::from_secs(60)).unwrap();

        assert_eq!(policy.limit(), 0);
        assert!(!policy.is_unlimited());
    }

    #[test]
    fn unlimited_config_ignores_window() {
        let config = PolicyConfig {
            limit: 0,
            window: Duration::ZERO,
            unlimited: true,
        };

        let policy = ThroughputPolicy::try_from(&config).unwrap();

        assert!(policy.is_unlimited());
    }
}
