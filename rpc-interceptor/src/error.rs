//! Error types for the interceptor pipeline.
//!
//! - [`CallError`]: the failure that flows through an interceptor chain
//! - [`ConfigError`]: invalid interceptor or pipeline configuration

use rpc_interceptor_core::{Code, DomainError, Status};

/// Boxed error returned by external collaborators such as a
/// [`Refresher`](crate::Refresher).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The failure of a call, in whichever representation it currently has.
///
/// A call starts out failing with whatever the transport or handler
/// produced. Error translators move it between the two variants; every
/// other interceptor leaves it as it is.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CallError {
    /// A wire status, as produced by the transport or sent to a peer.
    #[error("{0}")]
    Status(Status),

    /// A domain error, as produced by handlers or consumed by callers.
    #[error("{0}")]
    Domain(DomainError),
}

impl CallError {
    /// Get the wire status, if this failure is in wire form.
    pub fn status(&self) -> Option<&Status> {
        match self {
            CallError::Status(status) => Some(status),
            CallError::Domain(_) => None,
        }
    }

    /// Get the domain error, if this failure is in domain form.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            CallError::Domain(err) => Some(err),
            CallError::Status(_) => None,
        }
    }

    /// Get the wire status code.
    ///
    /// Returns `None` for domain errors: their wire code is only known once
    /// a taxonomy has translated them.
    pub fn wire_code(&self) -> Option<Code> {
        self.status().map(Status::code)
    }

    /// Short label for logs and span fields.
    pub fn label(&self) -> &'static str {
        match self {
            CallError::Status(status) => status.code().as_str(),
            CallError::Domain(err) => err.kind().as_str(),
        }
    }
}

impl From<Status> for CallError {
    fn from(status: Status) -> Self {
        CallError::Status(status)
    }
}

impl From<DomainError> for CallError {
    fn from(err: DomainError) -> Self {
        CallError::Domain(err)
    }
}

/// Invalid interceptor or pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The refill rate is zero, negative or not finite, or its refill period
    /// (`1 / rate`, in whole nanoseconds) is out of range. Rates below about
    /// 1e-19/s or above 1e9/s cannot be expressed.
    #[error("invalid rate: {0} tokens/second (must be finite and greater than 0)")]
    InvalidRate(f64),

    /// The burst size is zero.
    #[error("invalid burst: {0} (must be at least 1)")]
    InvalidBurst(u32),

    /// A refresh timeout of zero was configured.
    #[error("invalid refresh timeout: must be greater than 0")]
    InvalidRefreshTimeout,

    /// Refresh-on-failure is enabled but no refresher was supplied.
    #[error("refresh-on-failure is enabled but no refresher was provided")]
    MissingRefresher,

    /// The configuration document could not be parsed.
    #[error("failed to parse pipeline config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_interceptor_core::ErrorKind;

    #[test]
    fn test_call_error_accessors() {
        let err = CallError::from(Status::unavailable("down"));
        assert_eq!(err.wire_code(), Some(Code::Unavailable));
        assert!(err.domain().is_none());
        assert_eq!(err.label(), "unavailable");
        assert_eq!(err.to_string(), "unavailable: down");

        let err = CallError::from(DomainError::new(ErrorKind::NotFound, "no task"));
        assert_eq!(err.wire_code(), None);
        assert_eq!(err.domain().unwrap().kind(), ErrorKind::NotFound);
        assert_eq!(err.label(), "not_found");
        assert_eq!(err.to_string(), "not_found: no task");
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::InvalidBurst(0).to_string(),
            "invalid burst: 0 (must be at least 1)"
        );
        assert_eq!(
            ConfigError::InvalidRate(0.0).to_string(),
            "invalid rate: 0 tokens/second (must be finite and greater than 0)"
        );
    }
}
