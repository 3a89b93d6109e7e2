//! Retry logic with exponential backoff for transient fetch failures.
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - connection resets, timeouts, 5xx responses
//! - [`FailureType::RateLimited`] - HTTP 429, honouring `Retry-After`
//! - [`FailureType::Permanent`] - 4xx, invalid URL, integrity or local I/O errors
//!
//! The [`RetryPolicy`] then decides whether to retry based on failure type
//! and attempt count, calculating exponential backoff delays with jitter.
//!
//! # Example
//!
//! ```
//! use paperfetch_core::download::{
//!     DownloadError, RetryPolicy, RetryDecision, classify_error
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/file.pdf", 503);
//! let failure_type = classify_error(&error);
//!
//! match policy.should_retry(failure_type, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::DownloadError;
use crate::config::RetrySettings;

/// Default maximum attempts, including the first (three retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default maximum jitter added to delays (500ms).
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Default per-attempt timeout (30 seconds).
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest `Retry-After` wait that is honoured.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Classification of fetch failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Failure that won't succeed regardless of retries.
    Permanent,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry configuration with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + U(0, max_jitter)
/// ```
///
/// With defaults, delays are approximately 1s, 2s and 4s before the second,
/// third and fourth (final) attempts. Setting `max_jitter` to zero makes delays deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    max_jitter: Duration,
    attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom backoff settings.
    ///
    /// Jitter and attempt timeout keep their defaults; see
    /// [`with_max_jitter`](Self::with_max_jitter) and
    /// [`with_attempt_timeout`](Self::with_attempt_timeout).
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier: backoff_multiplier.max(1.0),
            ..Self::default()
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Builds a policy from the `[retry]` config table.
    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.backoff_multiplier,
        )
        .with_max_jitter(Duration::from_millis(settings.max_jitter_ms))
        .with_attempt_timeout(Duration::from_secs(settings.attempt_timeout_secs))
    }

    /// Sets the upper bound of random jitter added to each delay.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Sets the time budget for one attempt (request + full body stream).
    #[must_use]
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout.max(Duration::from_millis(1));
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        self.should_retry_after(failure_type, attempt, None)
    }

    /// Like [`should_retry`](Self::should_retry), but a server-provided
    /// `Retry-After` hint replaces the computed backoff for rate-limited
    /// failures.
    pub fn should_retry_after(
        &self,
        failure_type: FailureType,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = match (failure_type, retry_after) {
            (FailureType::RateLimited, Some(hint)) => hint.min(MAX_RETRY_AFTER),
            _ => self.calculate_delay(attempt),
        };

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Formula: `min(base_delay * multiplier^(attempt-1), max_delay) + jitter`
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * self.backoff_multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    fn calculate_jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=max_ms);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a fetch error into a failure type for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type |
/// |--------|------|
/// | 429 | RateLimited |
/// | other 4xx (incl. 408) | Permanent |
/// | 5xx | Transient |
///
/// # Non-HTTP Errors
///
/// | Error | Type |
/// |-------|------|
/// | Timeout | Transient |
/// | Network (most) | Transient |
/// | Network (TLS) | Permanent |
/// | Io, InvalidUrl, Integrity, Cancelled | Permanent |
#[instrument]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. } => FailureType::Transient,
        DownloadError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::Integrity { .. }
        | DownloadError::Cancelled { .. } => FailureType::Permanent,
    }
}

fn classify_http_status(status: u16) -> FailureType {
    match status {
        429 => FailureType::RateLimited,
        500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut current: Option<&dyn std::error::Error> = Some(error);
    while let Some(err) = current {
        let text = err.to_string().to_lowercase();
        if text.contains("certificate")
            || text.contains("tls")
            || text.contains("ssl")
            || text.contains("handshake")
        {
            return true;
        }
        current = err.source();
    }
    false
}

/// Parses a `Retry-After` header value: integer seconds or an HTTP-date.
///
/// Values beyond [`MAX_RETRY_AFTER`] are capped; a date in the past yields
/// zero; negative or unparseable values yield `None`.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(cap_retry_after(Duration::from_secs(seconds)));
    }

    match httpdate::parse_http_date(header_value) {
        Ok(datetime) => match datetime.duration_since(std::time::SystemTime::now()) {
            Ok(duration) => Some(cap_retry_after(duration)),
            Err(_) => {
                debug!(header_value, "Retry-After date is in the past, returning zero");
                Some(Duration::ZERO)
            }
        },
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}

fn cap_retry_after(duration: Duration) -> Duration {
    if duration > MAX_RETRY_AFTER {
        warn!(
            delay_secs = duration.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After exceeds maximum, capping"
        );
        MAX_RETRY_AFTER
    } else {
        duration
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
        assert!((policy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(policy.max_jitter, Duration::from_millis(500));
        assert_eq!(policy.attempt_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let settings = RetrySettings {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 100,
            backoff_multiplier: 3.0,
            max_jitter_ms: 0,
            attempt_timeout_secs: 7,
        };
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(100));
        assert_eq!(policy.max_jitter, Duration::ZERO);
        assert_eq!(policy.attempt_timeout(), Duration::from_secs(7));
    }

    // ==================== Delay Calculation Tests ====================

    #[test]
    fn test_delay_calculation_first_attempt_within_jitter_bound() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(32), 2.0);
        let delay = policy.calculate_delay(1);
        assert!(delay >= Duration::from_secs(1));
        assert!(delay <= Duration::from_millis(1500));
    }

    #[test]
    fn test_delay_calculation_is_deterministic_without_jitter() {
        let policy = RetryPolicy::new(6, Duration::from_millis(100), Duration::from_secs(1), 2.0)
            .with_max_jitter(Duration::ZERO);
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(5), Duration::from_secs(1), "capped");
    }

    // ==================== should_retry Tests ====================

    #[test]
    fn test_should_retry_transient_within_budget() {
        let policy = RetryPolicy::default().with_max_jitter(Duration::ZERO);
        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(1),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_should_retry_stops_at_ceiling() {
        let policy = RetryPolicy::with_max_attempts(4);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 3),
            RetryDecision::Retry { attempt: 4, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 4),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_should_not_retry_permanent() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::Permanent, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { reason } if reason.contains("permanent")));
    }

    #[test]
    fn test_rate_limited_uses_retry_after_hint() {
        let policy = RetryPolicy::default();
        let decision =
            policy.should_retry_after(FailureType::RateLimited, 1, Some(Duration::from_secs(3)));
        assert_eq!(
            decision,
            RetryDecision::Retry {
                delay: Duration::from_secs(3),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_transient_ignores_retry_after_hint() {
        let policy = RetryPolicy::default().with_max_jitter(Duration::ZERO);
        let decision =
            policy.should_retry_after(FailureType::Transient, 1, Some(Duration::from_secs(90)));
        assert!(matches!(
            decision,
            RetryDecision::Retry { delay, .. } if delay == Duration::from_secs(1)
        ));
    }

    // ==================== classify_error Tests ====================

    #[test]
    fn test_classify_http_statuses() {
        let classify = |status| classify_error(&DownloadError::http_status("u", status));
        assert_eq!(classify(404), FailureType::Permanent);
        assert_eq!(classify(403), FailureType::Permanent);
        assert_eq!(classify(408), FailureType::Permanent);
        assert_eq!(classify(429), FailureType::RateLimited);
        assert_eq!(classify(500), FailureType::Transient);
        assert_eq!(classify(503), FailureType::Transient);
        assert_eq!(classify(599), FailureType::Transient);
    }

    #[test]
    fn test_classify_non_http_errors() {
        assert_eq!(
            classify_error(&DownloadError::timeout("u")),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&DownloadError::invalid_url("nope")),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::integrity("/tmp/a", 10, 5)),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::io(
                "/tmp/a",
                std::io::Error::other("disk full")
            )),
            FailureType::Permanent
        );
    }

    // ==================== parse_retry_after Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_caps_large_values() {
        assert_eq!(parse_retry_after("86400"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_rejects_negative_and_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_future_http_date() {
        let future = std::time::SystemTime::now() + Duration::from_secs(60);
        let header = httpdate::fmt_http_date(future);
        let parsed = parse_retry_after(&header).unwrap();
        assert!(parsed <= Duration::from_secs(60));
        assert!(parsed >= Duration::from_secs(55));
    }
}
