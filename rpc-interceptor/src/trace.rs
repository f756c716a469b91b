//! Tracing interceptors.
//!
//! Every call gets a `tracing` span and a propagated W3C `traceparent`.
//! The interceptors are process-wide singletons: they are built together
//! on first use behind a [`OnceLock`] and every later request returns the
//! same instances, so the call counters are described exactly once no
//! matter how many clients are created.
//!
//! Counters go through the `metrics` facade, so they reach whichever
//! recorder the process installs:
//!
//! - `rpc_calls_started_total{method}`
//! - `rpc_calls_failed_total{method, code}`
//!
//! ```ignore
//! let mut chain = InterceptorChain::new();
//! chain.push(rpc_interceptor::unary_tracing_interceptor());
//! chain.push(rpc_interceptor::stream_tracing_interceptor());
//! ```

mod propagation;

pub use propagation::{TRACEPARENT, TraceContext};

use std::sync::{Arc, OnceLock};

use tracing::Instrument;

use crate::call::{BoxFuture, CallFunc, CallRequest, StreamFunc, UnaryFunc};
use crate::interceptor::{AroundCall, Interceptor, wrap_call};
use crate::CallError;

const CALLS_STARTED: &str = "rpc_calls_started_total";
const CALLS_FAILED: &str = "rpc_calls_failed_total";

static INTERCEPTORS: OnceLock<TracingInterceptors> = OnceLock::new();

#[cfg(test)]
static CONSTRUCTIONS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

struct TracingInterceptors {
    unary: Arc<UnaryTracingInterceptor>,
    stream: Arc<StreamTracingInterceptor>,
}

fn interceptors() -> &'static TracingInterceptors {
    INTERCEPTORS.get_or_init(|| {
        #[cfg(test)]
        CONSTRUCTIONS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        tracing::debug!("registering rpc tracing interceptors");
        metrics::describe_counter!(CALLS_STARTED, "RPC calls entering a tracing interceptor");
        metrics::describe_counter!(CALLS_FAILED, "RPC calls that completed with an error");
        TracingInterceptors {
            unary: Arc::new(UnaryTracingInterceptor { tracer: Tracer }),
            stream: Arc::new(StreamTracingInterceptor { tracer: Tracer }),
        }
    })
}

/// The shared unary tracing interceptor.
///
/// The first call builds it; every call, from any thread, returns the same
/// instance.
pub fn unary_tracing_interceptor() -> Arc<UnaryTracingInterceptor> {
    interceptors().unary.clone()
}

/// The shared streaming tracing interceptor.
///
/// Independent of [`unary_tracing_interceptor`], with the same
/// single-construction guarantee.
pub fn stream_tracing_interceptor() -> Arc<StreamTracingInterceptor> {
    interceptors().stream.clone()
}

/// Traces unary calls. Obtain it with [`unary_tracing_interceptor`].
#[derive(Debug)]
pub struct UnaryTracingInterceptor {
    tracer: Tracer,
}

impl Interceptor for UnaryTracingInterceptor {
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        wrap_call(self.tracer, next)
    }
}

/// Traces stream establishment. Obtain it with [`stream_tracing_interceptor`].
#[derive(Debug)]
pub struct StreamTracingInterceptor {
    tracer: Tracer,
}

impl Interceptor for StreamTracingInterceptor {
    fn wrap_streaming(&self, next: StreamFunc) -> StreamFunc {
        wrap_call(self.tracer, next)
    }
}

#[derive(Clone, Copy, Debug)]
struct Tracer;

impl AroundCall for Tracer {
    fn around<Req, Resp>(
        self,
        mut request: Req,
        next: CallFunc<Req, Resp>,
    ) -> BoxFuture<'static, Result<Resp, CallError>>
    where
        Req: CallRequest,
        Resp: Send + 'static,
    {
        Box::pin(async move {
            let context = match TraceContext::from_metadata(request.metadata()) {
                Some(parent) => parent.child(),
                None => TraceContext::new_root(),
            };
            context.inject(request.metadata_mut());

            let span = tracing::info_span!(
                "rpc",
                rpc.method = %request.method(),
                trace_id = %context.trace_id_hex(),
                span_id = %context.span_id_hex(),
                rpc.code = tracing::field::Empty,
            );

            let method = request.method().to_owned();
            metrics::counter!(CALLS_STARTED, "method" => method.clone()).increment(1);
            let result = next(request).instrument(span.clone()).await;

            match &result {
                Ok(_) => {
                    span.record("rpc.code", "ok");
                }
                Err(err) => {
                    metrics::counter!(CALLS_FAILED, "method" => method, "code" => err.label())
                        .increment(1);
                    span.record("rpc.code", err.label());
                    tracing::debug!(parent: &span, error = %err, "rpc call failed");
                }
            }
            result
        })
    }
}
