//! Interceptor trait and chain.
//!
//! An interceptor wraps the next stage of a call and returns a new stage
//! of the same shape. It may act before the call, after it, or instead of
//! it, but it invokes the next stage at most once and hands back what that
//! stage returned unless translating the result is its job.
//!
//! # Example
//!
//! ```ignore
//! use rpc_interceptor::{ErrorTranslator, InterceptorChain, RefreshInterceptor};
//!
//! let mut chain = InterceptorChain::new();
//! chain.push(rpc_interceptor::unary_tracing_interceptor());
//! chain.push(Arc::new(ErrorTranslator::client()));
//! chain.push(Arc::new(RefreshInterceptor::new(dynconfig)));
//!
//! let call = chain.wrap_unary(transport);
//! let reply = call(UnaryRequest::new("scheduler.v1.Scheduler/StatTask", body)).await?;
//! ```

use std::sync::Arc;

use crate::call::{
    BoxFuture, CallFunc, CallRequest, StreamFunc, StreamNext, StreamRequest, StreamResponse,
    UnaryFunc, UnaryNext, UnaryRequest, UnaryResponse,
};
use crate::CallError;

/// An interceptor that can wrap unary and streaming calls.
///
/// Both methods default to passing the next stage through unchanged, so an
/// interceptor that only cares about one call shape implements one method.
pub trait Interceptor: Send + Sync {
    /// Wrap a unary call.
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        next
    }

    /// Wrap the establishment of a streaming call.
    fn wrap_streaming(&self, next: StreamFunc) -> StreamFunc {
        next
    }
}

// ============================================================================
// Shared wrapping helper
// ============================================================================

/// Behavior applied around one call, independent of the call's shape.
///
/// The built-in interceptors implement this once and get both
/// [`Interceptor::wrap_unary`] and [`Interceptor::wrap_streaming`] from
/// [`wrap_call`].
pub(crate) trait AroundCall: Clone + Send + Sync + 'static {
    fn around<Req, Resp>(
        self,
        request: Req,
        next: CallFunc<Req, Resp>,
    ) -> BoxFuture<'static, Result<Resp, CallError>>
    where
        Req: CallRequest,
        Resp: Send + 'static;
}

/// Turn `next` into a stage that runs `around` on every call.
pub(crate) fn wrap_call<A, Req, Resp>(around: A, next: CallFunc<Req, Resp>) -> CallFunc<Req, Resp>
where
    A: AroundCall,
    Req: CallRequest,
    Resp: Send + 'static,
{
    Arc::new(move |request: Req| around.clone().around(request, next.clone()))
}

// ============================================================================
// Chain
// ============================================================================

/// A chain of interceptors that are applied in order.
///
/// The first interceptor pushed is the outermost: it sees the request first
/// and the result last.
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("count", &self.interceptors.len())
            .finish()
    }
}

impl InterceptorChain {
    /// Create a new empty interceptor chain.
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// Add an interceptor to the chain.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Get the number of interceptors in the chain.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Wrap a unary function with all interceptors in the chain.
    pub fn wrap_unary(&self, base: UnaryFunc) -> UnaryFunc {
        // Innermost first, so the first interceptor ends up outermost
        self.interceptors
            .iter()
            .rev()
            .fold(base, |next, interceptor| interceptor.wrap_unary(next))
    }

    /// Wrap a streaming function with all interceptors in the chain.
    pub fn wrap_streaming(&self, base: StreamFunc) -> StreamFunc {
        self.interceptors
            .iter()
            .rev()
            .fold(base, |next, interceptor| interceptor.wrap_streaming(next))
    }
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Closure interceptors
// ============================================================================

/// A function-based unary interceptor.
///
/// # Example
///
/// ```ignore
/// use rpc_interceptor::{FnInterceptor, UnaryNext, UnaryRequest};
///
/// let logging = FnInterceptor::unary(|req: UnaryRequest, next: UnaryNext| {
///     Box::pin(async move {
///         tracing::info!(method = %req.method, "calling");
///         let result = next.call(req).await;
///         tracing::info!("call completed");
///         result
///     })
/// });
/// ```
pub struct FnInterceptor<F> {
    func: F,
}

impl<F> FnInterceptor<F>
where
    F: Fn(UnaryRequest, UnaryNext) -> BoxFuture<'static, Result<UnaryResponse, CallError>>
        + Send
        + Sync
        + Clone
        + 'static,
{
    /// Create a new function-based unary interceptor.
    pub fn unary(func: F) -> Self {
        Self { func }
    }
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(UnaryRequest, UnaryNext) -> BoxFuture<'static, Result<UnaryResponse, CallError>>
        + Send
        + Sync
        + Clone
        + 'static,
{
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        let func = self.func.clone();
        Arc::new(move |request: UnaryRequest| func(request, UnaryNext::new(next.clone())))
    }
}

impl<F: Clone> Clone for FnInterceptor<F> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
        }
    }
}

/// A function-based streaming interceptor.
pub struct FnStreamInterceptor<F> {
    func: F,
}

impl<F> FnStreamInterceptor<F>
where
    F: Fn(StreamRequest, StreamNext) -> BoxFuture<'static, Result<StreamResponse, CallError>>
        + Send
        + Sync
        + Clone
        + 'static,
{
    /// Create a new function-based streaming interceptor.
    pub fn streaming(func: F) -> Self {
        Self { func }
    }
}

impl<F> Interceptor for FnStreamInterceptor<F>
where
    F: Fn(StreamRequest, StreamNext) -> BoxFuture<'static, Result<StreamResponse, CallError>>
        + Send
        + Sync
        + Clone
        + 'static,
{
    fn wrap_streaming(&self, next: StreamFunc) -> StreamFunc {
        let func = self.func.clone();
        Arc::new(move |request: StreamRequest| func(request, StreamNext::new(next.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{StreamDescriptor, stream_fn, unary_fn};
    use bytes::Bytes;
    use futures::{StreamExt, stream};
    use std::sync::Mutex;

    type Trace = Arc<Mutex<Vec<String>>>;

    /// Records a marker before and after the next stage, for both call shapes.
    #[derive(Clone)]
    struct Marker {
        name: &'static str,
        trace: Trace,
    }

    impl AroundCall for Marker {
        fn around<Req, Resp>(
            self,
            request: Req,
            next: CallFunc<Req, Resp>,
        ) -> BoxFuture<'static, Result<Resp, CallError>>
        where
            Req: CallRequest,
            Resp: Send + 'static,
        {
            Box::pin(async move {
                self.trace.lock().unwrap().push(format!("{}-before", self.name));
                let result = next(request).await;
                self.trace.lock().unwrap().push(format!("{}-after", self.name));
                result
            })
        }
    }

    impl Interceptor for Marker {
        fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
            wrap_call(self.clone(), next)
        }

        fn wrap_streaming(&self, next: StreamFunc) -> StreamFunc {
            wrap_call(self.clone(), next)
        }
    }

    fn marked_chain(trace: &Trace) -> InterceptorChain {
        let mut chain = InterceptorChain::new();
        for name in ["A", "B", "C"] {
            chain.push(Arc::new(Marker {
                name,
                trace: trace.clone(),
            }));
        }
        chain
    }

    fn expected_order() -> Vec<String> {
        ["A-before", "B-before", "C-before", "call", "C-after", "B-after", "A-after"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_interceptor_chain_empty() {
        let chain = InterceptorChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
    }

    #[tokio::test]
    async fn test_unary_ordering() {
        let trace: Trace = Arc::default();
        let chain = marked_chain(&trace);

        let base_trace = trace.clone();
        let base = unary_fn(move |req: UnaryRequest| {
            let trace = base_trace.clone();
            async move {
                trace.lock().unwrap().push("call".to_string());
                Ok(UnaryResponse::new(req.body))
            }
        });

        let call = chain.wrap_unary(base);
        let response = call(UnaryRequest::new("test/Method", "ping")).await.unwrap();

        assert_eq!(response.body, Bytes::from("ping"));
        assert_eq!(*trace.lock().unwrap(), expected_order());
    }

    #[tokio::test]
    async fn test_streaming_ordering() {
        let trace: Trace = Arc::default();
        let chain = marked_chain(&trace);

        let base_trace = trace.clone();
        let base = stream_fn(move |req: StreamRequest| {
            let trace = base_trace.clone();
            async move {
                trace.lock().unwrap().push("call".to_string());
                Ok(StreamResponse::new(req.messages.map(Ok).boxed()))
            }
        });

        let call = chain.wrap_streaming(base);
        let messages = stream::iter(vec![Bytes::from("a"), Bytes::from("b")]).boxed();
        let response = call(StreamRequest::new("test/Bidi", StreamDescriptor::bidi(), messages))
            .await
            .unwrap();

        let echoed: Vec<_> = response.messages.collect().await;
        assert_eq!(echoed, vec![Ok(Bytes::from("a")), Ok(Bytes::from("b"))]);
        assert_eq!(*trace.lock().unwrap(), expected_order());
    }

    #[tokio::test]
    async fn test_default_methods_pass_through() {
        struct Nothing;
        impl Interceptor for Nothing {}

        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(Nothing));

        let call = chain.wrap_unary(unary_fn(|_req: UnaryRequest| async {
            Err(CallError::from(rpc_interceptor_core::Status::not_found("gone")))
        }));
        let err = call(UnaryRequest::new("test/Method", "")).await.unwrap_err();
        assert_eq!(err.wire_code(), Some(rpc_interceptor_core::Code::NotFound));
    }

    #[tokio::test]
    async fn test_fn_interceptor_short_circuit() {
        let called = Arc::new(Mutex::new(false));
        let called_clone = called.clone();

        let reject = FnInterceptor::unary(|req: UnaryRequest, next: UnaryNext| {
            Box::pin(async move {
                if req.body.is_empty() {
                    return Err(rpc_interceptor_core::Status::invalid_argument("empty").into());
                }
                next.call(req).await
            })
        });

        let base = unary_fn(move |req: UnaryRequest| {
            let called = called_clone.clone();
            async move {
                *called.lock().unwrap() = true;
                Ok(UnaryResponse::new(req.body))
            }
        });

        let call = reject.wrap_unary(base);
        let err = call(UnaryRequest::new("test/Method", "")).await.unwrap_err();

        assert_eq!(err.wire_code(), Some(rpc_interceptor_core::Code::InvalidArgument));
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn test_fn_stream_interceptor_modifies_metadata() {
        let tag = FnStreamInterceptor::streaming(|mut req: StreamRequest, next: StreamNext| {
            Box::pin(async move {
                req.metadata.insert("x-tagged", "yes".parse().unwrap());
                next.call(req).await
            })
        });

        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let base = stream_fn(move |req: StreamRequest| {
            let seen = seen_clone.clone();
            async move {
                *seen.lock().unwrap() = Some(req.metadata.clone());
                Ok(StreamResponse::new(stream::empty().boxed()))
            }
        });

        let call = tag.wrap_streaming(base);
        let request = StreamRequest::new(
            "test/Watch",
            StreamDescriptor::server_streaming(),
            stream::empty().boxed(),
        );
        call(request).await.unwrap();

        let metadata = seen.lock().unwrap().take().unwrap();
        assert_eq!(metadata.get("x-tagged").unwrap(), "yes");
    }
}
