//! Error translation between domain errors and wire statuses.
//!
//! Servers translate outgoing failures domain→wire so peers receive a
//! status; clients translate incoming failures wire→domain so callers see
//! domain errors. One [`ErrorTranslator`] value wraps both unary and
//! streaming calls, which gives the four directional variants.
//!
//! For streaming calls only the result of opening the stream is
//! translated. Errors yielded later by the returned message stream reach
//! the stream's consumer in whatever form the transport produced them.

use std::sync::Arc;

use rpc_interceptor_core::{ErrorTaxonomy, StandardTaxonomy};

use crate::call::{BoxFuture, CallFunc, CallRequest, StreamFunc, UnaryFunc};
use crate::interceptor::{AroundCall, Interceptor, wrap_call};
use crate::CallError;

/// Which representation failures are translated into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Domain errors become wire statuses. Used on the server side.
    DomainToWire,
    /// Wire statuses become domain errors. Used on the client side.
    WireToDomain,
}

/// Translates the failure of a call; successes pass through untouched.
///
/// Failures already in the target representation are returned as they are.
#[derive(Clone)]
pub struct ErrorTranslator {
    direction: Direction,
    taxonomy: Arc<dyn ErrorTaxonomy>,
}

impl ErrorTranslator {
    /// Translate with a custom taxonomy.
    pub fn new(direction: Direction, taxonomy: Arc<dyn ErrorTaxonomy>) -> Self {
        Self {
            direction,
            taxonomy,
        }
    }

    /// Server-side translator (domain→wire) using [`StandardTaxonomy`].
    pub fn server() -> Self {
        Self::new(Direction::DomainToWire, Arc::new(StandardTaxonomy))
    }

    /// Client-side translator (wire→domain) using [`StandardTaxonomy`].
    pub fn client() -> Self {
        Self::new(Direction::WireToDomain, Arc::new(StandardTaxonomy))
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Translate one failure. Total: the result is always a failure.
    pub fn translate(&self, err: CallError) -> CallError {
        match (self.direction, err) {
            (Direction::DomainToWire, CallError::Domain(err)) => {
                let status = self.taxonomy.domain_to_wire(&err);
                tracing::debug!(kind = %err.kind(), code = %status.code(), "translated domain error");
                CallError::Status(status)
            }
            (Direction::WireToDomain, CallError::Status(status)) => {
                let err = self.taxonomy.wire_to_domain(&status);
                tracing::debug!(code = %status.code(), kind = %err.kind(), "translated wire status");
                CallError::Domain(err)
            }
            (_, err) => err,
        }
    }
}

impl std::fmt::Debug for ErrorTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorTranslator")
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

impl AroundCall for ErrorTranslator {
    fn around<Req, Resp>(
        self,
        request: Req,
        next: CallFunc<Req, Resp>,
    ) -> BoxFuture<'static, Result<Resp, CallError>>
    where
        Req: CallRequest,
        Resp: Send + 'static,
    {
        Box::pin(async move { next(request).await.map_err(|err| self.translate(err)) })
    }
}

impl Interceptor for ErrorTranslator {
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        wrap_call(self.clone(), next)
    }

    fn wrap_streaming(&self, next: StreamFunc) -> StreamFunc {
        wrap_call(self.clone(), next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{
        StreamDescriptor, StreamRequest, StreamResponse, UnaryRequest, UnaryResponse, stream_fn,
        unary_fn,
    };
    use futures::{StreamExt, stream};
    use rpc_interceptor_core::{Code, DomainError, ErrorKind, Status};

    fn failing_unary(err: CallError) -> UnaryFunc {
        unary_fn(move |_req: UnaryRequest| {
            let err = err.clone();
            async move { Err(err) }
        })
    }

    fn stream_request() -> StreamRequest {
        StreamRequest::new("test/Bidi", StreamDescriptor::bidi(), stream::empty().boxed())
    }

    #[tokio::test]
    async fn test_server_translates_domain_error() {
        let domain = DomainError::new(ErrorKind::NotFound, "task missing");
        let call = ErrorTranslator::server().wrap_unary(failing_unary(domain.clone().into()));

        let err = call(UnaryRequest::new("test/Method", "")).await.unwrap_err();
        let status = err.status().unwrap();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), Some("task missing"));

        // The client side restores the original error exactly
        let restored = ErrorTranslator::client().translate(err);
        assert_eq!(restored, CallError::Domain(domain));
    }

    #[tokio::test]
    async fn test_client_translates_wire_status() {
        let call = ErrorTranslator::client()
            .wrap_unary(failing_unary(Status::unavailable("no upstream").into()));

        let err = call(UnaryRequest::new("test/Method", "")).await.unwrap_err();
        let domain = err.domain().unwrap();
        assert_eq!(domain.kind(), ErrorKind::Unavailable);
        assert_eq!(domain.message(), "no upstream");
    }

    #[tokio::test]
    async fn test_other_representation_passes_through() {
        let status = CallError::from(Status::internal("already wire"));
        let call = ErrorTranslator::server().wrap_unary(failing_unary(status.clone()));
        assert_eq!(call(UnaryRequest::new("test/Method", "")).await.unwrap_err(), status);

        let domain = CallError::from(DomainError::new(ErrorKind::Timeout, "slow"));
        let call = ErrorTranslator::client().wrap_unary(failing_unary(domain.clone()));
        assert_eq!(call(UnaryRequest::new("test/Method", "")).await.unwrap_err(), domain);
    }

    #[tokio::test]
    async fn test_cancellation_stays_a_failure() {
        let call = ErrorTranslator::client()
            .wrap_unary(failing_unary(Status::cancelled("caller went away").into()));

        let err = call(UnaryRequest::new("test/Method", "")).await.unwrap_err();
        assert_eq!(err.domain().unwrap().kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_success_untouched() {
        for translator in [ErrorTranslator::server(), ErrorTranslator::client()] {
            let call = translator.wrap_unary(unary_fn(|req: UnaryRequest| async move {
                Ok(UnaryResponse::new(req.body))
            }));
            let response = call(UnaryRequest::new("test/Method", "payload")).await.unwrap();
            assert_eq!(response, UnaryResponse::new("payload"));
        }
    }

    #[tokio::test]
    async fn test_stream_establishment_translated() {
        let call = ErrorTranslator::client().wrap_streaming(stream_fn(|_req: StreamRequest| async {
            Err(CallError::from(Status::permission_denied("nope")))
        }));

        let err = call(stream_request()).await.unwrap_err();
        assert_eq!(err.domain().unwrap().kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_in_flight_stream_errors_not_translated() {
        let call = ErrorTranslator::client().wrap_streaming(stream_fn(|_req: StreamRequest| async {
            let messages = stream::iter(vec![
                Ok("first".into()),
                Err(CallError::from(Status::unavailable("dropped"))),
            ]);
            Ok(StreamResponse::new(messages.boxed()))
        }));

        let response = call(stream_request()).await.unwrap();
        let messages: Vec<_> = response.messages.collect().await;
        assert_eq!(messages[0], Ok("first".into()));
        assert_eq!(messages[1].as_ref().unwrap_err().wire_code(), Some(Code::Unavailable));
    }
}
