use cap_limit::Reason;
use http::Request;
use tower::BoxError;

use crate::CapError;

/// Decides what happens to a request the limiter rejected.
///
/// Returning `Ok(())` lets the request through anyway (useful for a dry run
/// of a new limit); returning an error aborts it with that error. Any
/// `Fn(&Request<B>, &Reason) -> Result<(), BoxError>` closure is a reaction.
pub trait OnLimit<B>: Clone + Send + Sync + 'static {
    fn on_limit(&self, request: &Request<B>, reason: &Reason) -> Result<(), BoxError>;
}

impl<B, F> OnLimit<B> for F
where
    F: Fn(&Request<B>, &Reason) -> Result<(), BoxError> + Clone + Send + Sync + 'static,
{
    fn on_limit(&self, request: &Request<B>, reason: &Reason) -> Result<(), BoxError> {
        self(request, reason)
    }
}

/// The default reaction: abort with [`CapError::RateLimited`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TooManyRequests;

impl<B> OnLimit<B> for TooManyRequests {
    fn on_limit(&self, _request: &Request<B>, reason: &Reason) -> Result<(), BoxError> {
        Err(Box::new(CapError::RateLimited {
            retry_after: reason.retry_after(),
        }))
    }
}
