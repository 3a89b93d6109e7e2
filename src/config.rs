//! Pipeline configuration loaded from TOML.
//!
//! Every field has a default, so a missing file (or an empty one) yields a
//! working configuration. Unknown keys are rejected to catch typos.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::download::{MAX_CONCURRENCY, MIN_CONCURRENCY, RetryPolicy};
use crate::source::HttpSettings;
use crate::user_agent::default_user_agent;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PAPERFETCH_CONFIG";

const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=3600;
const ATTEMPTS_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file '{path}'")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("failed to parse config file '{path}': {message}")]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Parser message with line/column.
        message: String,
    },

    /// A value is outside its allowed range.
    #[error("invalid config value for `{field}`: {value}\n  Suggestion: expected {expected}")]
    Invalid {
        /// Dotted field name (e.g. `retry.max_attempts`).
        field: String,
        /// The offending value.
        value: String,
        /// Allowed range or form.
        expected: String,
    },
}

impl ConfigError {
    fn invalid(field: &str, value: impl ToString, expected: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

/// `[retry]` table: backoff parameters for document fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts per document, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound of the exponential delay (before jitter).
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Upper bound of random jitter; 0 makes delays deterministic.
    pub max_jitter_ms: u64,
    /// Timeout for one attempt (request plus body).
    pub attempt_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: crate::download::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: 1000,
            max_delay_ms: 32_000,
            backoff_multiplier: 2.0,
            max_jitter_ms: 500,
            attempt_timeout_secs: 30,
        }
    }
}

/// `[sources.<id>]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceOverride {
    /// Replaces the adapter's built-in site URL (mirrors, local test servers).
    pub base_url: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// TCP/TLS connect timeout.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for listing pages.
    pub page_timeout_secs: u64,
    /// Default download concurrency.
    pub max_concurrency: usize,
    /// Retry/backoff parameters.
    pub retry: RetrySettings,
    /// Per-source overrides keyed by source id.
    pub sources: BTreeMap<String, SourceOverride>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: 10,
            page_timeout_secs: 30,
            max_concurrency: crate::download::DEFAULT_CONCURRENCY,
            retry: RetrySettings::default(),
            sources: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is unreadable, malformed or out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Loads `path` if given, else the default location if a file exists
    /// there, else defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an explicit path that cannot be loaded, or
    /// a default-location file that is invalid.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match resolve_default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Range-checks every value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("user_agent", "\"\"", "a non-empty string"));
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("page_timeout_secs", self.page_timeout_secs)?;
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.max_concurrency) {
            return Err(ConfigError::invalid(
                "max_concurrency",
                self.max_concurrency,
                format!("{MIN_CONCURRENCY}..={MAX_CONCURRENCY}"),
            ));
        }

        let retry = &self.retry;
        if !ATTEMPTS_RANGE.contains(&retry.max_attempts) {
            return Err(ConfigError::invalid(
                "retry.max_attempts",
                retry.max_attempts,
                "1..=10",
            ));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::invalid(
                "retry.base_delay_ms",
                retry.base_delay_ms,
                format!("at most retry.max_delay_ms ({})", retry.max_delay_ms),
            ));
        }
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "retry.backoff_multiplier",
                retry.backoff_multiplier,
                "a finite number >= 1.0",
            ));
        }
        validate_timeout_secs("retry.attempt_timeout_secs", retry.attempt_timeout_secs)?;

        for (id, source) in &self.sources {
            if let Some(base_url) = &source.base_url
                && url::Url::parse(base_url).is_err()
            {
                return Err(ConfigError::invalid(
                    &format!("sources.{id}.base_url"),
                    base_url,
                    "an absolute http(s) URL",
                ));
            }
        }
        Ok(())
    }

    /// HTTP settings for listing-page clients.
    #[must_use]
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            user_agent: self.user_agent.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
        }
    }

    /// Retry policy for document fetches.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_settings(&self.retry)
    }

    /// Base URL override for `source_id`, if configured.
    #[must_use]
    pub fn source_base_url(&self, source_id: &str) -> Option<&str> {
        self.sources
            .get(source_id)
            .and_then(|s| s.base_url.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

fn validate_timeout_secs(field: &str, value: u64) -> Result<(), ConfigError> {
    if TIMEOUT_RANGE_SECS.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, value, "1..=3600"))
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$PAPERFETCH_CONFIG`
/// 2. `$XDG_CONFIG_HOME/paperfetch/config.toml`
/// 3. `$HOME/.config/paperfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env_var_non_empty_os(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(explicit));
    }
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("paperfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("paperfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            "max_concurrency = 8\n[retry]\nmax_attempts = 5\nmax_jitter_ms = 0\n\n[sources.eceswa]\nbase_url = \"http://127.0.0.1:9000\"\n",
        )
        .unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.source_base_url("eceswa"), Some("http://127.0.0.1:9000"));
        assert_eq!(config.source_base_url("papacambridge"), None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = PipelineConfig::from_toml_str("max_concurency = 8\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err}");
    }

    #[test]
    fn test_out_of_range_concurrency_rejected() {
        let err = PipelineConfig::from_toml_str("max_concurrency = 0\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("max_concurrency"), "{msg}");
        assert!(msg.contains("1..=32"), "{msg}");
    }

    #[test]
    fn test_retry_validation() {
        assert!(PipelineConfig::from_toml_str("[retry]\nmax_attempts = 0\n").is_err());
        assert!(
            PipelineConfig::from_toml_str("[retry]\nbase_delay_ms = 5000\nmax_delay_ms = 10\n")
                .is_err()
        );
        assert!(PipelineConfig::from_toml_str("[retry]\nbackoff_multiplier = 0.5\n").is_err());
    }

    #[test]
    fn test_http_settings_and_retry_policy_follow_config() {
        let config = PipelineConfig::from_toml_str(
            "user_agent = \"probe/1\"\npage_timeout_secs = 5\n[retry]\nmax_attempts = 4\nattempt_timeout_secs = 2\n",
        )
        .unwrap();
        let http = config.http_settings();
        assert_eq!(http.user_agent, "probe/1");
        assert_eq!(http.page_timeout, Duration::from_secs(5));
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.attempt_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "connect_timeout_secs = 3").unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.connect_timeout_secs, 3);

        let err = PipelineConfig::load(Path::new("/nonexistent/paperfetch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_parse_error_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrency = \"many\"").unwrap();
        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
