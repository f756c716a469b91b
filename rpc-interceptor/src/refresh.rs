//! Refresh-on-failure interceptor.
//!
//! Some failures suggest the client is working from stale configuration,
//! such as an outdated list of endpoints. When a call fails with one of the
//! configured wire codes, the interceptor asks a [`Refresher`] to reload
//! that configuration so later calls can use it. It never retries the call
//! itself and never changes the call's result.

use std::future::Future;
use std::sync::Arc;

use rpc_interceptor_core::Code;

use crate::call::{BoxFuture, CallFunc, CallRequest, StreamFunc, UnaryFunc};
use crate::config::{RefreshConfig, RefreshMode};
use crate::error::BoxError;
use crate::interceptor::{AroundCall, Interceptor, wrap_call};
use crate::CallError;

/// Something that can reload configuration on demand.
///
/// Concurrent failing calls may each trigger a refresh. Implementations that
/// need to coalesce concurrent refreshes must do so themselves.
pub trait Refresher: Send + Sync {
    fn refresh(&self) -> BoxFuture<'_, Result<(), BoxError>>;
}

impl<F, Fut> Refresher for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn refresh(&self) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin((self)())
    }
}

/// Triggers a [`Refresher`] when a call fails with a configured wire code.
///
/// Only failures still in wire form are inspected, so place this inside
/// (after) any client-side [`ErrorTranslator`](crate::ErrorTranslator).
///
/// # Example
///
/// ```ignore
/// use rpc_interceptor::{RefreshInterceptor, RefreshConfig, RefreshMode};
///
/// let refresh = RefreshInterceptor::with_config(
///     dynconfig.clone(),
///     RefreshConfig::new().mode(RefreshMode::Detached),
/// );
/// ```
#[derive(Clone)]
pub struct RefreshInterceptor {
    refresher: Arc<dyn Refresher>,
    config: RefreshConfig,
}

impl RefreshInterceptor {
    /// Refresh on `resource_exhausted` and `unavailable`, waiting at most
    /// the default timeout for each refresh.
    pub fn new(refresher: Arc<dyn Refresher>) -> Self {
        Self::with_config(refresher, RefreshConfig::default())
    }

    pub fn with_config(refresher: Arc<dyn Refresher>, config: RefreshConfig) -> Self {
        Self { refresher, config }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    fn should_refresh(&self, err: &CallError) -> Option<Code> {
        err.wire_code()
            .filter(|code| self.config.trigger_codes.contains(code))
    }

    async fn trigger(&self, method: String, code: Code) {
        tracing::debug!(%method, %code, "call failed, refreshing configuration");
        match self.config.mode {
            RefreshMode::Detached => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let refresher = self.refresher.clone();
                    handle.spawn(async move {
                        let outcome = refresher.refresh().await;
                        discard_refresh_outcome(&method, outcome);
                    });
                }
                Err(_) => self.refresh_bounded(&method).await,
            },
            RefreshMode::Bounded(_) => self.refresh_bounded(&method).await,
        }
    }

    async fn refresh_bounded(&self, method: &str) {
        let refresh = self.refresher.refresh();
        let outcome = if tokio::runtime::Handle::try_current().is_ok() {
            match tokio::time::timeout(self.config.mode.timeout(), refresh).await {
                Ok(outcome) => outcome,
                Err(elapsed) => Err(BoxError::from(elapsed)),
            }
        } else {
            // No tokio timer outside a runtime, so the refresh runs unbounded
            tracing::debug!(%method, "no tokio runtime, refreshing without a timeout");
            refresh.await
        };
        discard_refresh_outcome(method, outcome);
    }
}

/// Drop the outcome of a refresh.
///
/// A refresh is a side effect of a failed call, not part of its result: a
/// refresh failure is logged and goes no further.
fn discard_refresh_outcome(method: &str, outcome: Result<(), BoxError>) {
    match outcome {
        Ok(()) => tracing::debug!(%method, "configuration refreshed"),
        Err(err) => tracing::debug!(%method, error = %err, "configuration refresh failed, ignoring"),
    }
}

impl std::fmt::Debug for RefreshInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshInterceptor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AroundCall for RefreshInterceptor {
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
            let method = request.method().to_string();
            let result = next(request).await;
            if let Err(err) = &result {
                if let Some(code) = self.should_refresh(err) {
                    self.trigger(method, code).await;
                }
            }
            result
        })
    }
}

impl Interceptor for RefreshInterceptor {
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
    use rpc_interceptor_core::{DomainError, ErrorKind, Status};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts refreshes and fails every one of them.
    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
    }

    impl Refresher for CountingRefresher {
        fn refresh(&self) -> BoxFuture<'_, Result<(), BoxError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(BoxError::from("dynconfig unreachable"))
            })
        }
    }

    fn failing_unary(err: CallError) -> UnaryFunc {
        unary_fn(move |_req: UnaryRequest| {
            let err = err.clone();
            async move { Err(err) }
        })
    }

    fn all_codes() -> Vec<Code> {
        (0..=16).filter_map(Code::from_i32).collect()
    }

    #[tokio::test]
    async fn test_trigger_set() {
        for code in all_codes().into_iter().filter(|c| *c != Code::Ok) {
            let refresher = Arc::new(CountingRefresher::default());
            let interceptor = RefreshInterceptor::new(refresher.clone());
            let failure = CallError::from(Status::new(code, "failed"));
            let call = interceptor.wrap_unary(failing_unary(failure.clone()));

            let err = call(UnaryRequest::new("test/Method", "")).await.unwrap_err();

            // Original failure, untouched by the failing refresh
            assert_eq!(err, failure);
            let expected = matches!(code, Code::ResourceExhausted | Code::Unavailable) as usize;
            assert_eq!(refresher.calls.load(Ordering::SeqCst), expected, "code {}", code);
        }
    }

    #[tokio::test]
    async fn test_success_does_not_refresh() {
        let refresher = Arc::new(CountingRefresher::default());
        let call = RefreshInterceptor::new(refresher.clone()).wrap_unary(unary_fn(
            |req: UnaryRequest| async move { Ok(UnaryResponse::new(req.body)) },
        ));

        let response = call(UnaryRequest::new("test/Method", "ok")).await.unwrap();
        assert_eq!(response, UnaryResponse::new("ok"));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_domain_errors_are_not_inspected() {
        let refresher = Arc::new(CountingRefresher::default());
        let failure = CallError::from(DomainError::new(ErrorKind::Unavailable, "down"));
        let call = RefreshInterceptor::new(refresher.clone()).wrap_unary(failing_unary(failure));

        call(UnaryRequest::new("test/Method", "")).await.unwrap_err();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_custom_trigger_codes() {
        let refresher = Arc::new(CountingRefresher::default());
        let config = RefreshConfig::new().trigger_codes([Code::DeadlineExceeded]);
        let interceptor = RefreshInterceptor::with_config(refresher.clone(), config);

        let call = interceptor.wrap_unary(failing_unary(Status::unavailable("down").into()));
        call(UnaryRequest::new("test/Method", "")).await.unwrap_err();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);

        let call = interceptor.wrap_unary(failing_unary(Status::deadline_exceeded("slow").into()));
        call(UnaryRequest::new("test/Method", "")).await.unwrap_err();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_refresh_gives_up() {
        let hanging = Arc::new(|| async {
            futures::future::pending::<()>().await;
            Ok::<(), BoxError>(())
        });
        let config = RefreshConfig::new().mode(RefreshMode::Bounded(Duration::from_secs(1)));
        let call = RefreshInterceptor::with_config(hanging, config)
            .wrap_unary(failing_unary(Status::unavailable("down").into()));

        let err = call(UnaryRequest::new("test/Method", "")).await.unwrap_err();
        assert_eq!(err.wire_code(), Some(Code::Unavailable));
    }

    #[tokio::test]
    async fn test_detached_refresh_runs_in_background() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let tx = std::sync::Mutex::new(Some(tx));
        let refresher = Arc::new(move || {
            let tx = tx.lock().unwrap().take();
            async move {
                if let Some(tx) = tx {
                    let _ = tx.send(());
                }
                Ok::<(), BoxError>(())
            }
        });

        let config = RefreshConfig::new().mode(RefreshMode::Detached);
        let call = RefreshInterceptor::with_config(refresher, config)
            .wrap_unary(failing_unary(Status::resource_exhausted("busy").into()));

        let err = call(UnaryRequest::new("test/Method", "")).await.unwrap_err();
        assert_eq!(err.wire_code(), Some(Code::ResourceExhausted));

        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("refresh was not spawned")
            .unwrap();
    }

    #[test]
    fn test_refresh_without_tokio_runtime() {
        for mode in [RefreshMode::default(), RefreshMode::Detached] {
            let refresher = Arc::new(CountingRefresher::default());
            let config = RefreshConfig::new().mode(mode);
            let failure = CallError::from(Status::unavailable("down"));
            let call = RefreshInterceptor::with_config(refresher.clone(), config)
                .wrap_unary(failing_unary(failure.clone()));

            let err = futures::executor::block_on(call(UnaryRequest::new("test/Method", "")))
                .unwrap_err();

            assert_eq!(err, failure, "mode {:?}", mode);
            assert_eq!(refresher.calls.load(Ordering::SeqCst), 1, "mode {:?}", mode);
        }
    }

    #[tokio::test]
    async fn test_stream_establishment_triggers_refresh() {
        let refresher = Arc::new(CountingRefresher::default());
        let call = RefreshInterceptor::new(refresher.clone()).wrap_streaming(stream_fn(
            |_req: StreamRequest| async {
                Err::<StreamResponse, _>(CallError::from(Status::unavailable("down")))
            },
        ));

        let request =
            StreamRequest::new("test/Watch", StreamDescriptor::server_streaming(), stream::empty().boxed());
        let err = call(request).await.unwrap_err();

        assert_eq!(err.wire_code(), Some(Code::Unavailable));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }
}
