//! Composable interceptors for RPC calls.
//!
//! This crate wraps unary and streaming remote calls, on either side of the
//! wire, with a chain of cross-cutting behaviors. A call is a [`CallFunc`];
//! every interceptor turns one `CallFunc` into another of the same shape, so
//! interceptors nest like scoped wrappers: the outermost runs first before
//! the call and last after it.
//!
//! ## Interceptors
//!
//! - Tracing: [`unary_tracing_interceptor`] and [`stream_tracing_interceptor`]
//!   open a `tracing` span per call and propagate a W3C `traceparent`.
//!   Both are process-wide singletons and count calls through the
//!   `metrics` facade.
//! - Rate limiting: [`RateLimitInterceptor`] rejects calls with
//!   `resource_exhausted` once its [`RateLimiter`] bucket is empty.
//! - Error translation: [`ErrorTranslator`] maps failures between
//!   [`DomainError`] and wire [`Status`] through an [`ErrorTaxonomy`].
//! - Refresh on failure: [`RefreshInterceptor`] asks a [`Refresher`] to
//!   reload configuration when a call fails with a trigger code.
//!
//! ## Example
//!
//! ```ignore
//! use rpc_interceptor::{PipelineBuilder, PipelineConfig, UnaryRequest};
//!
//! let config = PipelineConfig::from_json(r#"{
//!     "rate_limit": { "rate_per_second": 1000.0, "burst": 100 }
//! }"#)?;
//!
//! // Server: tracing → rate limit → domain→wire translation → handler
//! let handler = PipelineBuilder::server(&config)?.build().unary(handler);
//!
//! // Client: tracing → wire→domain translation → refresh → transport
//! let call = PipelineBuilder::client(&config, Some(dynconfig))?
//!     .build()
//!     .unary(transport);
//!
//! let reply = call(UnaryRequest::new("scheduler.v1.Scheduler/StatTask", body)).await?;
//! ```
//!
//! ## Streaming Calls
//!
//! For streaming calls the interceptors act on establishing the stream.
//! Messages and errors yielded later by [`StreamResponse::messages`] pass
//! through untouched; in particular they are never translated.
//!
//! ## Custom Interceptors
//!
//! Implement [`Interceptor`] directly, overriding `wrap_unary`,
//! `wrap_streaming` or both, or wrap a closure with [`FnInterceptor`] or
//! [`FnStreamInterceptor`]:
//!
//! ```ignore
//! use rpc_interceptor::{FnInterceptor, UnaryNext, UnaryRequest};
//!
//! let tenant = FnInterceptor::unary(|mut req: UnaryRequest, next: UnaryNext| {
//!     Box::pin(async move {
//!         req.metadata.insert("x-tenant", "blue".parse().unwrap());
//!         next.call(req).await
//!     })
//! });
//!
//! let pipeline = PipelineBuilder::client(&config, None)?
//!     .with_interceptor(tenant)
//!     .build();
//! ```

mod builder;
mod call;
pub mod config;
mod error;
mod interceptor;
mod rate_limit;
mod refresh;
mod trace;
mod translate;

pub use builder::{Pipeline, PipelineBuilder};
pub use call::{
    BoxFuture, CallFunc, CallRequest, MessageStream, StreamDescriptor, StreamFunc, StreamNext,
    StreamRequest, StreamResponse, UnaryFunc, UnaryNext, UnaryRequest, UnaryResponse, stream_fn,
    unary_fn,
};
pub use config::{PipelineConfig, RateLimitConfig, RefreshConfig, RefreshMode};
pub use error::{BoxError, CallError, ConfigError};
pub use interceptor::{FnInterceptor, FnStreamInterceptor, Interceptor, InterceptorChain};
pub use rate_limit::{RateLimitInterceptor, RateLimiter};
pub use refresh::{RefreshInterceptor, Refresher};
pub use trace::{
    StreamTracingInterceptor, TRACEPARENT, TraceContext, UnaryTracingInterceptor,
    stream_tracing_interceptor, unary_tracing_interceptor,
};
pub use translate::{Direction, ErrorTranslator};

// Re-export core types
pub use rpc_interceptor_core::{
    Code, DomainError, ErrorDetail, ErrorKind, ErrorTaxonomy, StandardTaxonomy, Status,
};

// Re-export commonly used external types
pub use bytes::Bytes;
pub use http::HeaderMap;
