use std::sync::Arc;
use std::time::Duration;

use cap_limit::Strategy;
use tower::ServiceBuilder;
use tower::layer::util::Stack;

use crate::RateLimitLayer;

/// Service Builder Extension with additional useful functions for tower::ServiceBuilder.
pub trait ServiceBuilderExt<L> {
    /// Add a rate limit layer with the default key and reaction.
    fn cap_rate_limit(
        self,
        limiter: Arc<dyn Strategy>,
    ) -> ServiceBuilder<Stack<RateLimitLayer<dyn Strategy>, L>>;

    /// Add a rate limit layer whose store round trip is bounded by `timeout`.
    fn cap_rate_limit_with_timeout(
        self,
        limiter: Arc<dyn Strategy>,
        timeout: Duration,
    ) -> ServiceBuilder<Stack<RateLimitLayer<dyn Strategy>, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn cap_rate_limit(
        self,
        limiter: Arc<dyn Strategy>,
    ) -> ServiceBuilder<Stack<RateLimitLayer<dyn Strategy>, L>> {
        self.layer(RateLimitLayer::new(limiter))
    }

    fn cap_rate_limit_with_timeout(
        self,
        limiter: Arc<dyn Strategy>,
        timeout: Duration,
    ) -> ServiceBuilder<Stack<RateLimitLayer<dyn Strategy>, L>> {
        self.layer(RateLimitLayer::new(limiter).with_timeout(timeout))
    }
}
