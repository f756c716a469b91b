//! Internal (domain) error representation.

use serde::{Deserialize, Serialize};

/// Kinds of failure the application distinguishes internally.
///
/// Most kinds have a wire [`Code`](crate::Code) equivalent in the
/// [`StandardTaxonomy`](crate::StandardTaxonomy). [`ErrorKind::NeedBackSource`]
/// and [`ErrorKind::StaleConfig`] are purely internal: on the wire they travel
/// as [`Code::Unknown`](crate::Code::Unknown) plus an attached detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unknown,
    Cancelled,
    InvalidArgument,
    Timeout,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    PreconditionFailed,
    Unimplemented,
    Internal,
    Unavailable,
    Unauthenticated,
    /// The requested content has to be fetched from its origin instead.
    NeedBackSource,
    /// The caller acted on configuration that is no longer current.
    StaleConfig,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 15] = [
        ErrorKind::Unknown,
        ErrorKind::Cancelled,
        ErrorKind::InvalidArgument,
        ErrorKind::Timeout,
        ErrorKind::NotFound,
        ErrorKind::AlreadyExists,
        ErrorKind::PermissionDenied,
        ErrorKind::ResourceExhausted,
        ErrorKind::PreconditionFailed,
        ErrorKind::Unimplemented,
        ErrorKind::Internal,
        ErrorKind::Unavailable,
        ErrorKind::Unauthenticated,
        ErrorKind::NeedBackSource,
        ErrorKind::StaleConfig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unknown => "unknown",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::Internal => "internal",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::NeedBackSource => "need_back_source",
            ErrorKind::StaleConfig => "stale_config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rich internal error: kind, message and an optional structured payload.
///
/// # Example
///
/// ```
/// use rpc_interceptor_core::{DomainError, ErrorKind};
///
/// let err = DomainError::new(ErrorKind::NotFound, "task 42 not found")
///     .with_payload(serde_json::json!({ "task_id": 42 }));
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.to_string(), "not_found: task 42 not found");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DomainError {
    kind: ErrorKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
}

impl DomainError {
    /// Create a new domain error without a payload.
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }
}
