//! Rate-limit-aware retry controller for provider API calls.
//!
//! Providers like Groq disclose their own reset window in the rejection
//! message ("Please try again in 1m59.5s"). Honoring that window is
//! strictly better than exponential backoff, so the controller parses the
//! message, sleeps for the stated duration plus a small buffer, and tries
//! again. Any non-rate-limit error propagates immediately.

use crate::config::RetrySettings;
use crate::error::{HarkError, Result};
use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy derived from configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts per call.
    pub max_retries: u32,
    /// Safety buffer added to the provider's disclosed wait.
    pub buffer_secs: u64,
    /// Wait when the message carries no parseable duration.
    pub default_wait_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            buffer_secs: 5,
            default_wait_secs: 120,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            buffer_secs: settings.buffer_secs,
            default_wait_secs: settings.default_wait_secs,
        }
    }
}

impl RetryPolicy {
    /// Compute how long to wait before retrying, in whole seconds.
    ///
    /// Parses `<minutes>m<seconds>s` or `<seconds>s` after "try again in";
    /// falls back to the default wait when the message is unparseable.
    pub fn wait_secs(&self, message: &str) -> u64 {
        match parse_disclosed_wait(message) {
            Some(secs) => secs + self.buffer_secs,
            None => self.default_wait_secs,
        }
    }

    /// Execute `call`, retrying on provider rate-limit rejections.
    ///
    /// `call` is invoked at most `max_retries` times. Non-rate-limit errors
    /// propagate on the first occurrence. Exhausting retries yields a
    /// terminal `Api` error embedding the last provider message.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_message = String::new();

        for attempt in 1..=self.max_retries {
            match call().await {
                Ok(value) => return Ok(value),
                Err(HarkError::RateLimited(message)) => {
                    last_message = message;
                    if attempt == self.max_retries {
                        break;
                    }
                    let wait = self.wait_secs(&last_message);
                    warn!(
                        attempt,
                        wait_secs = wait,
                        "Rate limited, waiting for provider reset window"
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Err(other) => return Err(other),
            }
        }

        debug!("Retries exhausted after {} attempts", self.max_retries);
        Err(HarkError::Api(format!(
            "Rate limit retries exhausted after {} attempts: {}",
            self.max_retries, last_message
        )))
    }
}

/// Extract the provider's disclosed wait from a rejection message.
///
/// Returns whole seconds (fractions truncated), or None if the message
/// does not contain a recognizable "try again in ..." duration.
pub fn parse_disclosed_wait(message: &str) -> Option<u64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"try again in (?:(\d+)m)?(\d+(?:\.\d+)?)s").expect("valid regex")
    });

    let caps = re.captures(message)?;
    let minutes: u64 = caps
        .get(1)
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0);
    let seconds: f64 = caps.get(2)?.as_str().parse().ok()?;

    Some(minutes * 60 + seconds as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        // Zero waits so tests don't sleep.
        RetryPolicy {
            max_retries: 3,
            buffer_secs: 0,
            default_wait_secs: 0,
        }
    }

    #[test]
    fn parses_minutes_and_seconds() {
        assert_eq!(
            parse_disclosed_wait("Rate limit reached. Please try again in 1m59.5s."),
            Some(119)
        );
    }

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(
            parse_disclosed_wait("Please try again in 30s. Need more?"),
            Some(30)
        );
    }

    #[test]
    fn unparseable_message_yields_none() {
        assert_eq!(parse_disclosed_wait("Too many requests"), None);
        assert_eq!(parse_disclosed_wait(""), None);
    }

    #[test]
    fn wait_adds_buffer_to_disclosed_window() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait_secs("try again in 1m59.5s"), 124);
        assert_eq!(policy.wait_secs("try again in 30s"), 35);
    }

    #[test]
    fn wait_defaults_when_unparseable() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait_secs("something opaque"), 120);
    }

    #[tokio::test]
    async fn returns_first_success() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_rate_limits_then_succeeds() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(HarkError::RateLimited("try again in 0s".to_string()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_embeds_last_message_and_stops_calling() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(HarkError::RateLimited("try again in 0s (limit 7)".to_string())) }
            })
            .await;

        // Exactly max_retries attempts, no extra call.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(matches!(err, HarkError::Api(_)));
        assert!(err.to_string().contains("limit 7"));
    }

    #[tokio::test]
    async fn non_rate_limit_errors_propagate_immediately() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(HarkError::Api("bad request".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), HarkError::Api(_)));
    }
}
