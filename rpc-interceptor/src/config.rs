//! Pipeline configuration.
//!
//! Settings can be built in code with the builder-style setters, or loaded
//! from JSON. Every field has a default, so a config document only needs
//! to name what it changes:
//!
//! ```
//! use rpc_interceptor::PipelineConfig;
//!
//! let config = PipelineConfig::from_json(r#"{
//!     "rate_limit": { "rate_per_second": 500.0, "burst": 50 },
//!     "refresh": { "trigger_codes": ["unavailable"], "timeout_ms": 2000 }
//! }"#).unwrap();
//!
//! assert!(config.tracing);
//! assert_eq!(config.rate_limit.unwrap().burst, 50);
//! ```

use std::time::Duration;

use rpc_interceptor_core::Code;
use serde::Deserialize;

use crate::ConfigError;

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    use rpc_interceptor_core::Code;

    /// Wire codes that trigger a configuration refresh.
    pub const TRIGGER_CODES: [Code; 2] = [Code::ResourceExhausted, Code::Unavailable];

    /// Longest a caller waits on a bounded refresh.
    pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

    /// Whether tracing interceptors are installed.
    pub const TRACING: bool = true;

    /// Whether error translation is installed.
    pub const TRANSLATE_ERRORS: bool = true;
}

/// Configuration for a whole interceptor pipeline.
///
/// # Default Values
///
/// - `tracing`: enabled
/// - `translate_errors`: enabled
/// - `rate_limit`: none (calls are never limited)
/// - `refresh`: none. Client pipelines given a refresher fall back to
///   [`RefreshConfig::default()`]
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Install the shared tracing interceptors.
    pub tracing: bool,

    /// Install an error translator for the pipeline's side.
    pub translate_errors: bool,

    /// Token bucket for server-side admission. Only server pipelines install
    /// it; [`PipelineBuilder::client`](crate::PipelineBuilder::client)
    /// ignores this field.
    pub rate_limit: Option<RateLimitConfig>,

    /// Refresh-on-failure settings for client pipelines. Setting this
    /// requires a refresher when the client pipeline is built.
    pub refresh: Option<RefreshConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracing: defaults::TRACING,
            translate_errors: defaults::TRANSLATE_ERRORS,
            rate_limit: None,
            refresh: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    pub fn translate_errors(mut self, enabled: bool) -> Self {
        self.translate_errors = enabled;
        self
    }

    pub fn rate_limit(mut self, rate_per_second: f64, burst: u32) -> Self {
        self.rate_limit = Some(RateLimitConfig {
            rate_per_second,
            burst,
        });
        self
    }

    pub fn refresh(mut self, refresh: RefreshConfig) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Check the configuration without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        if let Some(refresh) = &self.refresh {
            refresh.validate()?;
        }
        Ok(())
    }
}

/// Token bucket settings.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Tokens added per second. Must be finite, greater than zero and at
    /// most 1e9.
    pub rate_per_second: f64,

    /// Bucket capacity. Must be at least 1.
    pub burst: u32,
}

impl RateLimitConfig {
    /// Apply the same checks as [`RateLimiter::new`](crate::RateLimiter::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::rate_limit::quota(self.rate_per_second, self.burst).map(|_| ())
    }
}

/// How the refresh interceptor waits for a refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshMode {
    /// Await the refresh inline, giving up after the duration. Outside a
    /// tokio runtime there is no timer, so the refresh is awaited to the end.
    Bounded(Duration),
    /// Spawn the refresh on the current tokio runtime and return at once.
    /// Outside a runtime the refresh is awaited inline, as for `Bounded`.
    Detached,
}

impl RefreshMode {
    /// The longest a caller can be held up by one refresh.
    pub fn timeout(&self) -> Duration {
        match self {
            RefreshMode::Bounded(timeout) => *timeout,
            RefreshMode::Detached => defaults::REFRESH_TIMEOUT,
        }
    }
}

impl Default for RefreshMode {
    fn default() -> Self {
        RefreshMode::Bounded(defaults::REFRESH_TIMEOUT)
    }
}

/// Refresh-on-failure settings.
///
/// In JSON the mode is given as `timeout_ms` (bounded) or
/// `"detached": true`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawRefreshConfig")]
pub struct RefreshConfig {
    /// Wire codes that trigger a refresh.
    pub trigger_codes: Vec<Code>,

    /// How long a failing call waits on its refresh.
    pub mode: RefreshMode,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            trigger_codes: defaults::TRIGGER_CODES.to_vec(),
            mode: RefreshMode::default(),
        }
    }
}

impl RefreshConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the trigger codes.
    pub fn trigger_codes(mut self, codes: impl IntoIterator<Item = Code>) -> Self {
        self.trigger_codes = codes.into_iter().collect();
        self
    }

    pub fn mode(mut self, mode: RefreshMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode.timeout().is_zero() {
            return Err(ConfigError::InvalidRefreshTimeout);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawRefreshConfig {
    trigger_codes: Vec<Code>,
    timeout_ms: Option<u64>,
    detached: bool,
}

impl Default for RawRefreshConfig {
    fn default() -> Self {
        Self {
            trigger_codes: defaults::TRIGGER_CODES.to_vec(),
            timeout_ms: None,
            detached: false,
        }
    }
}

impl From<RawRefreshConfig> for RefreshConfig {
    fn from(raw: RawRefreshConfig) -> Self {
        let mode = if raw.detached {
            RefreshMode::Detached
        } else {
            raw.timeout_ms
                .map(|ms| RefreshMode::Bounded(Duration::from_millis(ms)))
                .unwrap_or_default()
        };
        Self {
            trigger_codes: raw.trigger_codes,
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert!(config.tracing);
        assert!(config.translate_errors);
        assert!(config.rate_limit.is_none());
        assert!(config.refresh.is_none());
    }

    #[test]
    fn test_refresh_config_default() {
        let config = RefreshConfig::default();
        assert_eq!(
            config.trigger_codes,
            vec![Code::ResourceExhausted, Code::Unavailable]
        );
        assert_eq!(config.mode, RefreshMode::Bounded(Duration::from_secs(5)));
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::new()
            .tracing(false)
            .rate_limit(20.0, 4)
            .refresh(RefreshConfig::new().mode(RefreshMode::Detached));

        assert!(!config.tracing);
        assert_eq!(
            config.rate_limit,
            Some(RateLimitConfig {
                rate_per_second: 20.0,
                burst: 4
            })
        );
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh.unwrap().mode, RefreshMode::Detached);
    }

    #[test]
    fn test_from_json_empty_uses_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert!(config.tracing);
        assert!(config.refresh.is_none());
    }

    #[test]
    fn test_from_json_refresh_modes() {
        let config = PipelineConfig::from_json(r#"{ "refresh": { "timeout_ms": 250 } }"#).unwrap();
        let refresh = config.refresh.unwrap();
        assert_eq!(refresh.mode, RefreshMode::Bounded(Duration::from_millis(250)));
        assert_eq!(refresh.trigger_codes, defaults::TRIGGER_CODES.to_vec());

        let config = PipelineConfig::from_json(r#"{ "refresh": { "detached": true } }"#).unwrap();
        assert_eq!(config.refresh.unwrap().mode, RefreshMode::Detached);

        let config = PipelineConfig::from_json(r#"{ "refresh": {} }"#).unwrap();
        assert_eq!(config.refresh, Some(RefreshConfig::default()));
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            PipelineConfig::from_json(r#"{ "rate_limit": { "rate_per_second": 0, "burst": 1 } }"#),
            Err(ConfigError::InvalidRate(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{ "rate_limit": { "rate_per_second": 1, "burst": 0 } }"#),
            Err(ConfigError::InvalidBurst(0))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{ "refresh": { "timeout_ms": 0 } }"#),
            Err(ConfigError::InvalidRefreshTimeout)
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{ "refresh": { "trigger_codes": ["bogus"] } }"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{ "retries": 3 }"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
