//! Pipeline builder.
//!
//! Provides a fluent API for assembling an [`InterceptorChain`] and two
//! constructors for the conventional client and server orders.

use std::sync::Arc;

use crate::call::{StreamFunc, UnaryFunc};
use crate::config::PipelineConfig;
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::rate_limit::{RateLimitInterceptor, RateLimiter};
use crate::refresh::{RefreshInterceptor, Refresher};
use crate::trace::{stream_tracing_interceptor, unary_tracing_interceptor};
use crate::translate::ErrorTranslator;
use crate::ConfigError;

/// Builder for creating a [`Pipeline`].
///
/// Interceptors are applied in the order they are added: the first one is
/// outermost and sees every request first.
///
/// # Example
///
/// ```ignore
/// use rpc_interceptor::{PipelineBuilder, PipelineConfig};
///
/// let pipeline = PipelineBuilder::client(&PipelineConfig::default(), Some(dynconfig))?
///     .with_interceptor(AuthInterceptor::new(token))
///     .build();
///
/// let call = pipeline.unary(transport);
/// ```
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    chain: InterceptorChain,
}

impl PipelineBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the client order:
    /// tracing → error translation (wire→domain) → refresh → transport.
    ///
    /// Refresh is installed whenever a refresher is given, using
    /// `config.refresh` or the default refresh settings. Admission control
    /// is a server concern, so `config.rate_limit` is not used here.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRefresher`] when `config.refresh` is set
    /// but `refresher` is `None`, or any error from validating `config`.
    pub fn client(
        config: &PipelineConfig,
        refresher: Option<Arc<dyn Refresher>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let refresh = match (refresher, &config.refresh) {
            (Some(refresher), Some(settings)) => {
                Some(RefreshInterceptor::with_config(refresher, settings.clone()))
            }
            (Some(refresher), None) => Some(RefreshInterceptor::new(refresher)),
            (None, Some(_)) => return Err(ConfigError::MissingRefresher),
            (None, None) => None,
        };

        let mut builder = Self::new().with_tracing(config.tracing);
        if config.translate_errors {
            builder = builder.with_interceptor(ErrorTranslator::client());
        }
        if let Some(refresh) = refresh {
            builder = builder.with_interceptor(refresh);
        }

        tracing::debug!(interceptors = builder.chain.len(), "built client pipeline");
        Ok(builder)
    }

    /// Start from the server order:
    /// tracing → rate limit → error translation (domain→wire) → handler.
    ///
    /// # Errors
    ///
    /// Returns the error from validating `config`, such as an invalid rate
    /// or burst.
    pub fn server(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut builder = Self::new().with_tracing(config.tracing);
        if let Some(rate_limit) = &config.rate_limit {
            let limiter = RateLimiter::new(rate_limit.rate_per_second, rate_limit.burst)?;
            builder = builder.with_interceptor(RateLimitInterceptor::new(limiter));
        }
        if config.translate_errors {
            builder = builder.with_interceptor(ErrorTranslator::server());
        }

        tracing::debug!(interceptors = builder.chain.len(), "built server pipeline");
        Ok(builder)
    }

    /// Add an interceptor inside the ones added so far.
    pub fn with_interceptor<I: Interceptor + 'static>(self, interceptor: I) -> Self {
        self.with_shared(Arc::new(interceptor))
    }

    /// Add an interceptor that is also used elsewhere.
    pub fn with_shared(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.chain.push(interceptor);
        self
    }

    fn with_tracing(self, enabled: bool) -> Self {
        if !enabled {
            return self;
        }
        self.with_shared(unary_tracing_interceptor())
            .with_shared(stream_tracing_interceptor())
    }

    /// Finish building.
    pub fn build(self) -> Pipeline {
        Pipeline { chain: self.chain }
    }
}

/// An ordered set of interceptors ready to wrap calls.
///
/// Wrapping is cheap and can be repeated for any number of base calls;
/// the interceptors themselves are shared.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    chain: InterceptorChain,
}

impl Pipeline {
    /// Wrap a unary call with every interceptor.
    pub fn unary(&self, base: UnaryFunc) -> UnaryFunc {
        self.chain.wrap_unary(base)
    }

    /// Wrap a streaming call with every interceptor.
    pub fn streaming(&self, base: StreamFunc) -> StreamFunc {
        self.chain.wrap_streaming(base)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}
