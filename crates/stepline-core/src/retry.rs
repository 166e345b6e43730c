//! Retry policy for re-running whole pipelines.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Callback invoked after a failed attempt that will be retried.
pub type RetryCallback = Box<dyn FnMut(u32, &PipelineError) + Send>;

/// Delay inserted between retry attempts.
///
/// The default is [`Backoff::None`]: attempts follow each other
/// immediately.
///
/// # Examples
///
/// ```
/// use stepline_core::Backoff;
/// use std::time::Duration;
///
/// let backoff = Backoff::exponential(Duration::from_millis(100));
///
/// // Delays: 100ms, 200ms, 400ms, ...
/// assert_eq!(backoff.delay_for_attempt(0), Some(Duration::from_millis(100)));
/// assert_eq!(backoff.delay_for_attempt(1), Some(Duration::from_millis(200)));
/// assert_eq!(backoff.delay_for_attempt(2), Some(Duration::from_millis(400)));
/// assert_eq!(Backoff::None.delay_for_attempt(0), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Constant delay between attempts.
    Fixed {
        /// Delay before each retry.
        #[serde(rename = "delay_ms", with = "duration_ms")]
        delay: Duration,
    },
    /// Delay grows by `multiplier` after each attempt, capped at `max_delay`.
    Exponential {
        /// Delay before the first retry.
        #[serde(rename = "initial_delay_ms", with = "duration_ms")]
        initial_delay: Duration,
        /// Upper bound for any single delay.
        #[serde(rename = "max_delay_ms", with = "duration_ms")]
        max_delay: Duration,
        /// Growth factor per attempt.
        multiplier: u32,
    },
}

/// Error returned when a retry configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicyError(pub &'static str);

impl fmt::Display for RetryPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RetryPolicyError {}

impl Backoff {
    /// Creates a constant backoff.
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed { delay }
    }

    /// Creates a doubling backoff capped at 60 seconds.
    pub fn exponential(initial_delay: Duration) -> Self {
        Backoff::Exponential {
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    /// Creates an exponential backoff with custom settings.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError`] if `multiplier` is 0 or greater than
    /// 10, or if `max_delay` is less than `initial_delay`.
    pub fn exponential_with(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self, RetryPolicyError> {
        let backoff = Backoff::Exponential {
            initial_delay,
            max_delay,
            multiplier,
        };
        backoff.validate()?;
        Ok(backoff)
    }

    fn validate(&self) -> Result<(), RetryPolicyError> {
        if let Backoff::Exponential {
            initial_delay,
            max_delay,
            multiplier,
        } = self
        {
            if *multiplier == 0 {
                return Err(RetryPolicyError("multiplier must be greater than 0"));
            }
            if *multiplier > 10 {
                return Err(RetryPolicyError(
                    "multiplier must be 10 or less to avoid overflow",
                ));
            }
            if max_delay < initial_delay {
                return Err(RetryPolicyError("max_delay must be >= initial_delay"));
            }
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (0-indexed: the first retry is
    /// attempt 0). `None` means no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Backoff::None => None,
            Backoff::Fixed { delay } => Some(*delay),
            Backoff::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                let factor = multiplier.checked_pow(attempt).unwrap_or(u32::MAX);
                let delay = initial_delay
                    .checked_mul(factor)
                    .unwrap_or(*max_delay)
                    .min(*max_delay);
                Some(delay)
            }
        }
    }
}

/// Serializable retry settings, suitable for loading from a config file.
///
/// Missing fields fall back to three attempts without backoff.
///
/// ```
/// use stepline_core::{Backoff, RetryConfig};
/// use std::time::Duration;
///
/// let config: RetryConfig = serde_json::from_str(
///     r#"{ "max_attempts": 5, "backoff": { "type": "fixed", "delay_ms": 250 } }"#,
/// )?;
/// assert_eq!(config.max_attempts, 5);
/// assert_eq!(config.backoff, Backoff::fixed(Duration::from_millis(250)));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay strategy between attempts.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::None,
        }
    }
}

/// How many times a pipeline is attempted and what happens in between.
///
/// # Examples
///
/// ```
/// use stepline_core::{Backoff, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3)?
///     .with_backoff(Backoff::fixed(Duration::from_millis(50)))
///     .on_retry(|attempt, error| eprintln!("attempt {} failed: {}", attempt, error));
///
/// assert_eq!(policy.max_attempts(), 3);
/// assert!(RetryPolicy::new(0).is_err());
/// # Ok::<(), stepline_core::RetryPolicyError>(())
/// ```
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    on_retry: Option<RetryCallback>,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` attempts with no delay.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError`] if `max_attempts` is 0.
    pub fn new(max_attempts: u32) -> Result<Self, RetryPolicyError> {
        if max_attempts == 0 {
            return Err(RetryPolicyError("max_attempts must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            backoff: Backoff::None,
            on_retry: None,
        })
    }

    /// Creates a policy from deserialized settings.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError`] if the attempt count or the backoff is
    /// invalid.
    pub fn from_config(config: RetryConfig) -> Result<Self, RetryPolicyError> {
        config.backoff.validate()?;
        Ok(Self::new(config.max_attempts)?.with_backoff(config.backoff))
    }

    /// Sets the delay strategy between attempts.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Registers a callback invoked with `(attempt_number, error)` after
    /// each failed attempt that is followed by another one.
    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u32, &PipelineError) + Send + 'static,
    {
        self.on_retry = Some(Box::new(callback));
        self
    }

    /// Total number of attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay strategy between attempts.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Takes the retry callback out of the policy.
    pub fn take_on_retry(&mut self) -> Option<RetryCallback> {
        self.on_retry.take()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_none() {
        assert_eq!(Backoff::default(), Backoff::None);
        assert_eq!(Backoff::None.delay_for_attempt(3), None);
    }

    #[test]
    fn test_backoff_fixed() {
        let backoff = Backoff::fixed(Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(0), Some(Duration::from_secs(1)));
        assert_eq!(backoff.delay_for_attempt(2), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_backoff_exponential_is_capped() {
        let backoff = Backoff::Exponential {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2,
        };
        // attempt 2: 100ms * 2^2 = 400ms
        assert_eq!(
            backoff.delay_for_attempt(2),
            Some(Duration::from_millis(400))
        );
        assert_eq!(backoff.delay_for_attempt(10), Some(Duration::from_secs(10)));
        assert_eq!(backoff.delay_for_attempt(64), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_backoff_validation() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_secs(10);

        assert!(Backoff::exponential_with(initial, max, 2).is_ok());

        let zero = Backoff::exponential_with(initial, max, 0);
        assert_eq!(zero.unwrap_err().0, "multiplier must be greater than 0");

        let huge = Backoff::exponential_with(initial, max, 11);
        assert_eq!(
            huge.unwrap_err().0,
            "multiplier must be 10 or less to avoid overflow"
        );

        let inverted = Backoff::exponential_with(max, initial, 2);
        assert_eq!(
            inverted.unwrap_err().0,
            "max_delay must be >= initial_delay"
        );
    }

    #[test]
    fn test_policy_requires_one_attempt() {
        assert_eq!(
            RetryPolicy::new(0).unwrap_err().0,
            "max_attempts must be at least 1"
        );
        let policy = RetryPolicy::new(1).unwrap();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.backoff(), &Backoff::None);
    }

    #[test]
    fn test_policy_on_retry_is_taken_once() {
        let mut policy = RetryPolicy::new(2).unwrap().on_retry(|_, _| {});
        assert!(policy.take_on_retry().is_some());
        assert!(policy.take_on_retry().is_none());
    }

    #[test]
    fn test_config_defaults() {
        let config: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RetryConfig::default());
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_config_exponential() {
        let config: RetryConfig = serde_json::from_str(
            r#"{
                "max_attempts": 4,
                "backoff": {
                    "type": "exponential",
                    "initial_delay_ms": 10,
                    "max_delay_ms": 1000,
                    "multiplier": 3
                }
            }"#,
        )
        .unwrap();

        let policy = RetryPolicy::from_config(config).unwrap();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(
            policy.backoff().delay_for_attempt(1),
            Some(Duration::from_millis(30))
        );
    }

    #[test]
    fn test_config_rejects_invalid_backoff() {
        let config = RetryConfig {
            max_attempts: 2,
            backoff: Backoff::Exponential {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                multiplier: 0,
            },
        };
        assert!(RetryPolicy::from_config(config).is_err());
    }
}
