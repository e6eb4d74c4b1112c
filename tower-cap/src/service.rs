use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::task::ready;
use std::time::Duration;

use cap_limit::Strategy;
use futures::future::BoxFuture;
use http::Request;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;
use tracing::debug;
use tracing::warn;

use crate::error::CapError;
use crate::key::ClientAddrPath;
use crate::key::KeyExtractor;
use crate::on_limit::OnLimit;
use crate::on_limit::TooManyRequests;

#[derive(Clone, Debug)]
struct RateLimitServiceMetrics {
    admitted: Counter<u64>,
    rejected: Counter<u64>,
    store_errors: Counter<u64>,
}

impl RateLimitServiceMetrics {
    fn new() -> Self {
        let meter = global::meter("tower_cap");
        Self {
            admitted: meter.u64_counter("cap.admitted").build(),
            rejected: meter.u64_counter("cap.rejected").build(),
            store_errors: meter.u64_counter("cap.store_errors").build(),
        }
    }
}

/// Checks every request against a [`Strategy`] before calling the inner service.
///
/// The only suspension point added is the store round trip. Readiness is the
/// inner service's readiness: the limiter never holds a request back, it
/// decides.
#[derive(Debug)]
pub struct RateLimitService<L, S, K = ClientAddrPath, R = TooManyRequests>
where
    L: ?Sized,
{
    inner: S,
    limiter: Arc<L>,
    key: K,
    on_limit: R,
    timeout: Option<Duration>,
    instruments: RateLimitServiceMetrics,
}

impl<L, S, K, R> Clone for RateLimitService<L, S, K, R>
where
    L: ?Sized,
    S: Clone,
    K: Clone,
    R: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            key: self.key.clone(),
            on_limit: self.on_limit.clone(),
            timeout: self.timeout,
            instruments: self.instruments.clone(),
        }
    }
}

impl<L, S> RateLimitService<L, S>
where
    L: ?Sized,
{
    pub fn new(inner: S, limiter: Arc<L>) -> Self {
        Self {
            inner,
            limiter,
            key: ClientAddrPath,
            on_limit: TooManyRequests,
            timeout: None,
            instruments: RateLimitServiceMetrics::new(),
        }
    }
}

impl<L, S, K, R> RateLimitService<L, S, K, R>
where
    L: ?Sized,
{
    pub fn with_key<K2>(self, key: K2) -> RateLimitService<L, S, K2, R> {
        RateLimitService {
            inner: self.inner,
            limiter: self.limiter,
            key,
            on_limit: self.on_limit,
            timeout: self.timeout,
            instruments: self.instruments,
        }
    }

    pub fn with_on_limit<R2>(self, on_limit: R2) -> RateLimitService<L, S, K, R2> {
        RateLimitService {
            inner: self.inner,
            limiter: self.limiter,
            key: self.key,
            on_limit,
            timeout: self.timeout,
            instruments: self.instruments,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pin_project! {
    /// Waits for the limiter's decision, then drives the inner service's future.
    pub struct ResponseFuture<F> {
        #[pin]
        state: State<F>,
    }
}

pin_project! {
    #[project = StateProj]
    enum State<F> {
        Checking {
            check: BoxFuture<'static, Result<F, BoxError>>,
        },
        Calling {
            #[pin]
            future: F,
        },
    }
}

impl<F, T> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, BoxError>>,
{
    type Output = Result<T, BoxError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            let mut this = self.as_mut().project();
            match this.state.as_mut().project() {
                StateProj::Checking { check } => {
                    let future = ready!(check.as_mut().poll(cx))?;
                    this.state.set(State::Calling { future });
                }
                StateProj::Calling { future } => return future.poll(cx),
            }
        }
    }
}

impl<L, S, K, R, B> Service<Request<B>> for RateLimitService<L, S, K, R>
where
    L: Strategy + ?Sized + 'static,
    S: Service<Request<B>, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    K: KeyExtractor<B>,
    R: OnLimit<B>,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Keep the service that was driven to readiness for this request
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let key = self.key.extract(&req);
        let limiter = Arc::clone(&self.limiter);
        let on_limit = self.on_limit.clone();
        let timeout = self.timeout;
        let instruments = self.instruments.clone();

        let check = Box::pin(async move {
            let strategy = limiter.name();
            let attributes = [KeyValue::new("strategy", strategy)];

            let decision = match timeout {
                Some(timeout) => tokio::time::timeout(timeout, limiter.process(&key))
                    .await
                    .map_err(|_| {
                        warn!(strategy, %key, ?timeout, "rate limit check timed out");
                        CapError::Timeout
                    })?,
                None => limiter.process(&key).await,
            };

            match decision {
                Ok(ControlFlow::Continue(())) => {
                    instruments.admitted.add(1, &attributes);
                }
                Ok(ControlFlow::Break(reason)) => {
                    instruments.rejected.add(1, &attributes);
                    debug!(
                        strategy,
                        %key,
                        retry_after_ms = ?reason.retry_after_ms(),
                        "request rate limited"
                    );
                    on_limit.on_limit(&req, &reason)?;
                }
                Err(err) => {
                    instruments.store_errors.add(1, &attributes);
                    warn!(strategy, %key, %err, "rate limit store failed");
                    return Err(BoxError::from(CapError::from(err)));
                }
            }

            Ok::<_, BoxError>(inner.call(req))
        });

        ResponseFuture {
            state: State::Checking { check },
        }
    }
}
