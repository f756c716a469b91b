//! Mapping between domain errors and wire statuses.
//!
//! Both directions are total: every input produces some output, and
//! inputs with no table entry fall back to [`FALLBACK_CODE`] or
//! [`FALLBACK_KIND`].

use crate::{Code, DomainError, ErrorKind, Status};

/// Type name of the detail that carries a serialized [`DomainError`].
pub const DOMAIN_ERROR_DETAIL: &str = "rpc.interceptor.v1.DomainError";

/// Wire code used for domain kinds without a table entry.
pub const FALLBACK_CODE: Code = Code::Unknown;

/// Domain kind used for wire codes without a table entry.
pub const FALLBACK_KIND: ErrorKind = ErrorKind::Unknown;

/// A bidirectional mapping between the two error representations.
///
/// Implementations must be total. Neither direction may fail or turn an
/// error into anything other than an error.
pub trait ErrorTaxonomy: Send + Sync {
    /// Convert a domain error into the status sent over the wire.
    fn domain_to_wire(&self, err: &DomainError) -> Status;

    /// Convert a status received from the wire into a domain error.
    fn wire_to_domain(&self, status: &Status) -> DomainError;
}

/// One-to-one pairs. Both directions are read from this table, so every
/// listed kind round-trips through its code.
const MAPPINGS: &[(ErrorKind, Code)] = &[
    (ErrorKind::Unknown, Code::Unknown),
    (ErrorKind::Cancelled, Code::Canceled),
    (ErrorKind::InvalidArgument, Code::InvalidArgument),
    (ErrorKind::Timeout, Code::DeadlineExceeded),
    (ErrorKind::NotFound, Code::NotFound),
    (ErrorKind::AlreadyExists, Code::AlreadyExists),
    (ErrorKind::PermissionDenied, Code::PermissionDenied),
    (ErrorKind::ResourceExhausted, Code::ResourceExhausted),
    (ErrorKind::PreconditionFailed, Code::FailedPrecondition),
    (ErrorKind::Unimplemented, Code::Unimplemented),
    (ErrorKind::Internal, Code::Internal),
    (ErrorKind::Unavailable, Code::Unavailable),
    (ErrorKind::Unauthenticated, Code::Unauthenticated),
];

/// The default taxonomy.
///
/// Outgoing domain errors keep their full content in a
/// [`DOMAIN_ERROR_DETAIL`] detail, so a peer using this taxonomy restores
/// them exactly. Statuses without that detail are mapped by code alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardTaxonomy;

impl StandardTaxonomy {
    /// The wire code a kind maps to, if it has one.
    pub fn code_for(kind: ErrorKind) -> Option<Code> {
        MAPPINGS.iter().find(|(k, _)| *k == kind).map(|(_, c)| *c)
    }

    /// The kind a wire code maps to, if it has one.
    pub fn kind_for(code: Code) -> Option<ErrorKind> {
        MAPPINGS.iter().find(|(_, c)| *c == code).map(|(k, _)| *k)
    }
}

impl ErrorTaxonomy for StandardTaxonomy {
    fn domain_to_wire(&self, err: &DomainError) -> Status {
        let code = Self::code_for(err.kind()).unwrap_or(FALLBACK_CODE);
        match serde_json::to_vec(err) {
            Ok(encoded) => {
                Status::new(code, err.message()).add_detail(DOMAIN_ERROR_DETAIL, encoded)
            }
            Err(_) => Status::internal(err.to_string()),
        }
    }

    fn wire_to_domain(&self, status: &Status) -> DomainError {
        if let Some(detail) = status.detail(DOMAIN_ERROR_DETAIL) {
            if let Ok(err) = serde_json::from_slice::<DomainError>(detail.value()) {
                return err;
            }
        }

        let kind = Self::kind_for(status.code()).unwrap_or(FALLBACK_KIND);
        let message = status.message().unwrap_or(status.code().as_str());
        DomainError::new(kind, message)
    }
}
