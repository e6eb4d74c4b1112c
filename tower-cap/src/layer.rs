use std::sync::Arc;
use std::time::Duration;

use tower::Layer;

use crate::key::ClientAddrPath;
use crate::on_limit::TooManyRequests;
use crate::service::RateLimitService;

/// Applies a keyed, store-backed rate limit to requests.
///
/// Each request is keyed with `K` (default [`ClientAddrPath`]), checked once
/// against the limiter, and on rejection handed to `R` (default
/// [`TooManyRequests`]).
#[derive(Debug)]
pub struct RateLimitLayer<L, K = ClientAddrPath, R = TooManyRequests>
where
    L: ?Sized,
{
    limiter: Arc<L>,
    key: K,
    on_limit: R,
    timeout: Option<Duration>,
}

impl<L, K, R> Clone for RateLimitLayer<L, K, R>
where
    L: ?Sized,
    K: Clone,
    R: Clone,
{
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            key: self.key.clone(),
            on_limit: self.on_limit.clone(),
            timeout: self.timeout,
        }
    }
}

impl<L> RateLimitLayer<L>
where
    L: ?Sized,
{
    /// Create a RateLimitLayer with the default key and reaction.
    pub fn new(limiter: Arc<L>) -> Self {
        RateLimitLayer {
            limiter,
            key: ClientAddrPath,
            on_limit: TooManyRequests,
            timeout: None,
        }
    }
}

impl<L, K, R> RateLimitLayer<L, K, R>
where
    L: ?Sized,
{
    /// Replace the key extractor.
    pub fn with_key<K2>(self, key: K2) -> RateLimitLayer<L, K2, R> {
        RateLimitLayer {
            limiter: self.limiter,
            key,
            on_limit: self.on_limit,
            timeout: self.timeout,
        }
    }

    /// Replace the reaction to rejected requests.
    pub fn with_on_limit<R2>(self, on_limit: R2) -> RateLimitLayer<L, K, R2> {
        RateLimitLayer {
            limiter: self.limiter,
            key: self.key,
            on_limit,
            timeout: self.timeout,
        }
    }

    /// Bound the store round trip.
    ///
    /// If the decision takes longer than this, the service returns
    /// `CapError::Timeout`. The check may still have been applied.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<L, K, R, S> Layer<S> for RateLimitLayer<L, K, R>
where
    L: ?Sized,
    K: Clone,
    R: Clone,
{
    type Service = RateLimitService<L, S, K, R>;

    fn layer(&self, service: S) -> Self::Service {
        let mut svc = RateLimitService::new(service, self.limiter.clone())
            .with_key(self.key.clone())
            .with_on_limit(self.on_limit.clone());
        if let Some(timeout) = self.timeout {
            svc = svc.with_timeout(timeout);
        }
        svc
    }
}
