//! Token-bucket rate limiting.
//!
//! [`RateLimiter`] owns the bucket; [`RateLimitInterceptor`] rejects calls
//! with `resource_exhausted` when the bucket is empty. The check never
//! waits for a token.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;
use rpc_interceptor_core::Status;

use crate::call::{BoxFuture, CallFunc, CallRequest, StreamFunc, UnaryFunc};
use crate::interceptor::{AroundCall, Interceptor, wrap_call};
use crate::{CallError, ConfigError};

type Bucket<C> = governor::RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// A token bucket holding up to `burst` tokens, refilled at a fixed rate.
///
/// Taking a token is a single atomic operation, so one limiter can be shared
/// by any number of concurrent callers.
pub struct RateLimiter<C: Clock = DefaultClock> {
    bucket: Bucket<C>,
    rate_per_second: f64,
    burst: u32,
}

impl RateLimiter {
    /// Create a limiter refilling `rate_per_second` tokens per second, holding
    /// at most `burst` tokens. The bucket starts full.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRate`] unless `rate_per_second` is finite
    /// and greater than zero, and [`ConfigError::InvalidBurst`] when `burst`
    /// is zero. Invalid values are rejected, never clamped.
    ///
    /// One token is added every `1 / rate_per_second` seconds, rounded to
    /// whole nanoseconds. Rates above 1e9/s round to a zero period and are
    /// rejected; rates close to that bound are approximated.
    ///
    /// # Example
    ///
    /// ```
    /// use rpc_interceptor::RateLimiter;
    ///
    /// let limiter = RateLimiter::new(100.0, 2).unwrap();
    /// assert!(limiter.try_admit());
    /// assert!(limiter.try_admit());
    /// assert!(!limiter.try_admit());
    ///
    /// assert!(RateLimiter::new(0.0, 1).is_err());
    /// ```
    pub fn new(rate_per_second: f64, burst: u32) -> Result<Self, ConfigError> {
        Self::with_clock(rate_per_second, burst, &DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter that reads time from `clock`.
    pub fn with_clock(rate_per_second: f64, burst: u32, clock: &C) -> Result<Self, ConfigError> {
        let quota = quota(rate_per_second, burst)?;
        Ok(Self {
            bucket: governor::RateLimiter::direct_with_clock(quota, clock),
            rate_per_second,
            burst,
        })
    }

    /// Take one token if one is available.
    ///
    /// Returns `true` if the caller is admitted. Never blocks.
    pub fn try_admit(&self) -> bool {
        self.bucket.check().is_ok()
    }

    pub fn rate_per_second(&self) -> f64 {
        self.rate_per_second
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}

impl<C: Clock> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate_per_second", &self.rate_per_second)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

pub(crate) fn quota(rate_per_second: f64, burst: u32) -> Result<Quota, ConfigError> {
    if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
        return Err(ConfigError::InvalidRate(rate_per_second));
    }
    let burst = NonZeroU32::new(burst).ok_or(ConfigError::InvalidBurst(burst))?;
    let period = Duration::try_from_secs_f64(rate_per_second.recip())
        .map_err(|_| ConfigError::InvalidRate(rate_per_second))?;

    Quota::with_period(period)
        .map(|quota| quota.allow_burst(burst))
        .ok_or(ConfigError::InvalidRate(rate_per_second))
}

/// Rejects calls that find the token bucket empty.
///
/// Rejected calls fail with `resource_exhausted` and never reach the next
/// stage. Admitted calls are passed through untouched. Clones share the
/// same bucket.
pub struct RateLimitInterceptor<C: Clock = DefaultClock> {
    limiter: Arc<RateLimiter<C>>,
}

impl<C: Clock> RateLimitInterceptor<C> {
    pub fn new(limiter: RateLimiter<C>) -> Self {
        Self::from_shared(Arc::new(limiter))
    }

    /// Use a limiter that is also consulted elsewhere.
    pub fn from_shared(limiter: Arc<RateLimiter<C>>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &RateLimiter<C> {
        &self.limiter
    }
}

impl<C: Clock> Clone for RateLimitInterceptor<C> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
        }
    }
}

impl<C> AroundCall for RateLimitInterceptor<C>
where
    C: Clock + Send + Sync + 'static,
{
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
            if !self.limiter.try_admit() {
                tracing::debug!(method = %request.method(), "rate limit exceeded, rejecting call");
                return Err(CallError::from(Status::resource_exhausted(format!(
                    "rate limit exceeded for {}",
                    request.method()
                ))));
            }
            next(request).await
        })
    }
}

impl<C> Interceptor for RateLimitInterceptor<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn wrap_unary(&self, next: UnaryFunc) -> UnaryFunc {
        wrap_call(self.clone(), next)
    }

    fn wrap_streaming(&self, next: StreamFunc) -> StreamFunc {
        wrap_call(self.clone(), next)
    }
}
