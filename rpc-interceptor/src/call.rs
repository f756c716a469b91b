//! The call model interceptors wrap.
//!
//! A call is invoked through a [`CallFunc`]: a shared function from a
//! request to a boxed future of the call's result. The transport (or a
//! server handler) supplies the innermost one; every interceptor turns a
//! `CallFunc` into another `CallFunc` of the same shape.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::HeaderMap;

use crate::CallError;

/// Type alias for a boxed future returning a result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Messages received over an established stream.
pub type MessageStream = BoxStream<'static, Result<Bytes, CallError>>;

/// The signature of a call: request in, eventual result out.
pub type CallFunc<Req, Resp> =
    Arc<dyn Fn(Req) -> BoxFuture<'static, Result<Resp, CallError>> + Send + Sync>;

/// The signature of a unary call.
pub type UnaryFunc = CallFunc<UnaryRequest, UnaryResponse>;

/// The signature of a streaming call. The result only covers establishing
/// the stream; later failures arrive through [`StreamResponse::messages`].
pub type StreamFunc = CallFunc<StreamRequest, StreamResponse>;

/// What every request exposes to interceptors, whatever the call shape.
pub trait CallRequest: Send + 'static {
    /// The method being called (e.g., "scheduler.v1.Scheduler/AnnounceHost").
    fn method(&self) -> &str;

    /// Call metadata.
    fn metadata(&self) -> &HeaderMap;

    /// Mutable call metadata, for interceptors that propagate context.
    fn metadata_mut(&mut self) -> &mut HeaderMap;
}

// ============================================================================
// Unary
// ============================================================================

/// A unary request: one encoded message plus metadata.
#[derive(Debug, Clone)]
pub struct UnaryRequest {
    pub method: String,
    pub metadata: HeaderMap,
    pub body: Bytes,
}

impl UnaryRequest {
    /// Create a new unary request with empty metadata.
    pub fn new(method: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: method.into(),
            metadata: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Replace the request metadata.
    pub fn with_metadata(mut self, metadata: HeaderMap) -> Self {
        self.metadata = metadata;
        self
    }
}

impl CallRequest for UnaryRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut HeaderMap {
        &mut self.metadata
    }
}

/// A unary reply: one encoded message plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryResponse {
    pub metadata: HeaderMap,
    pub body: Bytes,
}

impl UnaryResponse {
    /// Create a new unary response with empty metadata.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            metadata: HeaderMap::new(),
            body: body.into(),
        }
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// Which directions of a stream carry more than one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub client_streaming: bool,
    pub server_streaming: bool,
}

impl StreamDescriptor {
    pub fn client_streaming() -> Self {
        Self {
            client_streaming: true,
            server_streaming: false,
        }
    }

    pub fn server_streaming() -> Self {
        Self {
            client_streaming: false,
            server_streaming: true,
        }
    }

    pub fn bidi() -> Self {
        Self {
            client_streaming: true,
            server_streaming: true,
        }
    }
}

/// A request that opens a stream.
pub struct StreamRequest {
    pub method: String,
    pub metadata: HeaderMap,
    pub descriptor: StreamDescriptor,
    /// Outbound messages, sent as the stream is driven.
    pub messages: BoxStream<'static, Bytes>,
}

impl StreamRequest {
    /// Create a new stream request with empty metadata.
    pub fn new(
        method: impl Into<String>,
        descriptor: StreamDescriptor,
        messages: BoxStream<'static, Bytes>,
    ) -> Self {
        Self {
            method: method.into(),
            metadata: HeaderMap::new(),
            descriptor,
            messages,
        }
    }

    /// Replace the request metadata.
    pub fn with_metadata(mut self, metadata: HeaderMap) -> Self {
        self.metadata = metadata;
        self
    }
}

impl std::fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRequest")
            .field("method", &self.method)
            .field("metadata", &self.metadata)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl CallRequest for StreamRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut HeaderMap {
        &mut self.metadata
    }
}

/// An established stream: response metadata plus inbound messages.
pub struct StreamResponse {
    pub metadata: HeaderMap,
    pub messages: MessageStream,
}

impl StreamResponse {
    /// Create a new stream response with empty metadata.
    pub fn new(messages: MessageStream) -> Self {
        Self {
            metadata: HeaderMap::new(),
            messages,
        }
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Next stages and adapters
// ============================================================================

/// The next unary stage in the chain.
///
/// Call this to proceed to the next interceptor or the actual call.
#[derive(Clone)]
pub struct UnaryNext {
    inner: UnaryFunc,
}

impl UnaryNext {
    pub(crate) fn new(inner: UnaryFunc) -> Self {
        Self { inner }
    }

    /// Call the next interceptor or the actual call.
    pub async fn call(self, request: UnaryRequest) -> Result<UnaryResponse, CallError> {
        (self.inner)(request).await
    }
}

/// The next streaming stage in the chain.
#[derive(Clone)]
pub struct StreamNext {
    inner: StreamFunc,
}

impl StreamNext {
    pub(crate) fn new(inner: StreamFunc) -> Self {
        Self { inner }
    }

    /// Open the stream through the next interceptor or the actual call.
    pub async fn call(self, request: StreamRequest) -> Result<StreamResponse, CallError> {
        (self.inner)(request).await
    }
}

/// Adapt an async closure into a [`UnaryFunc`].
///
/// ```
/// use rpc_interceptor::{CallError, UnaryResponse, unary_fn};
///
/// let echo = unary_fn(|req| async move { Ok::<_, CallError>(UnaryResponse::new(req.body)) });
/// ```
pub fn unary_fn<F, Fut>(f: F) -> UnaryFunc
where
    F: Fn(UnaryRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<UnaryResponse, CallError>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

/// Adapt an async closure into a [`StreamFunc`].
pub fn stream_fn<F, Fut>(f: F) -> StreamFunc
where
    F: Fn(StreamRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StreamResponse, CallError>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}
