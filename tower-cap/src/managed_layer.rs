use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use cap_limit::Strategy;
use http::Request;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::util::BoxCloneSyncService;

use crate::CapError;
use crate::RateLimitLayer;
use crate::key::ClientAddrPath;
use crate::key::KeyExtractor;
use crate::on_limit::OnLimit;
use crate::on_limit::TooManyRequests;

/// A pre-composed rate limiting stack with a hard deadline.
///
/// Requests are decided immediately: over-limit traffic is rejected, never
/// queued.
///
/// ### Error Responsibilities:
/// - **RateLimited (`CapError::RateLimited`)**: the limiter rejected the
///   request and the reaction aborted it.
/// - **Store (`CapError::Store`)**: the limiter could not reach its store.
/// - **Timeout (`CapError::Timeout`)**: the decision plus the inner
///   service's work exceeded `max_wait`.
/// - **Inner (`CapError::Inner`)**: any other error from the inner service.
///
/// Every error leaving the stack is a boxed [`CapError`].
pub struct ManagedRateLimitLayer<L: ?Sized, B, K = ClientAddrPath, R = TooManyRequests> {
    limiter: Arc<L>,
    max_wait: Duration,
    key: K,
    on_limit: R,
    _phantom: PhantomData<fn(B)>,
}

// Note: Deriving Clone would require `B: Clone`, which request bodies rarely are.
impl<L: ?Sized, B, K: Clone, R: Clone> Clone for ManagedRateLimitLayer<L, B, K, R> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            max_wait: self.max_wait,
            key: self.key.clone(),
            on_limit: self.on_limit.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<L: ?Sized, B> ManagedRateLimitLayer<L, B> {
    pub fn new(limiter: Arc<L>, max_wait: Duration) -> Self {
        Self {
            limiter,
            max_wait,
            key: ClientAddrPath,
            on_limit: TooManyRequests,
            _phantom: PhantomData,
        }
    }
}

impl<L: ?Sized, B, K, R> ManagedRateLimitLayer<L, B, K, R> {
    pub fn with_key<K2>(self, key: K2) -> ManagedRateLimitLayer<L, B, K2, R> {
        ManagedRateLimitLayer {
            limiter: self.limiter,
            max_wait: self.max_wait,
            key,
            on_limit: self.on_limit,
            _phantom: PhantomData,
        }
    }

    pub fn with_on_limit<R2>(self, on_limit: R2) -> ManagedRateLimitLayer<L, B, K, R2> {
        ManagedRateLimitLayer {
            limiter: self.limiter,
            max_wait: self.max_wait,
            key: self.key,
            on_limit,
            _phantom: PhantomData,
        }
    }
}

impl<S, L, B, K, R> Layer<S> for ManagedRateLimitLayer<L, B, K, R>
where
    L: Strategy + ?Sized + 'static,
    S: Service<Request<B>, Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Response: 'static,
    K: KeyExtractor<B>,
    R: OnLimit<B>,
    B: Send + 'static,
{
    type Service = BoxCloneSyncService<Request<B>, S::Response, BoxError>;

    fn layer(&self, inner: S) -> Self::Service {
        let rl = RateLimitLayer::new(self.limiter.clone())
            .with_key(self.key.clone())
            .with_on_limit(self.on_limit.clone());

        // Timeout is outer to ensure a hard deadline on the entire process.
        let svc = tower::ServiceBuilder::new()
            .timeout(self.max_wait)
            .layer(rl)
            .service(inner);

        let mapped_svc = tower::util::MapErr::new(svc, |err: BoxError| {
            if err.is::<tower::timeout::error::Elapsed>() {
                BoxError::from(CapError::Timeout)
            } else if err.is::<CapError>() {
                err
            } else {
                // Wrap any other inner service errors
                Box::from(CapError::Inner(err.to_string()))
            }
        });

        BoxCloneSyncService::new(mapped_svc)
    }
}
