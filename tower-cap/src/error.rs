use std::time::Duration;

/// Errors produced by the `tower-cap` middleware stack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapError {
    /// The store round trip, or the whole request under
    /// [`ManagedRateLimitLayer`](crate::ManagedRateLimitLayer), took too long.
    ///
    /// A check that timed out may still have consumed capacity.
    /// When the `axum` feature is enabled, this converts to `408 Request Timeout`.
    #[error("Request timed out waiting for a rate limit decision")]
    Timeout,

    /// The request was rejected due to rate limiting.
    ///
    /// `retry_after` is `None` when the key is never expected to recover.
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited {
        /// The duration to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// The limiter could not reach its store. Requests fail closed.
    ///
    /// When the `axum` feature is enabled, this converts to `503 Service Unavailable`.
    #[error("Rate limit store unavailable: {0}")]
    Store(String),

    /// An unexpected error occurred in the inner service.
    ///
    /// The string contains the `Display` representation of the inner error.
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

impl From<cap_limit::Error> for CapError {
    fn from(err: cap_limit::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// Whole seconds to wait, rounded up and never below one.
pub(crate) fn retry_after_secs(retry_after: Duration) -> u64 {
    (retry_after.as_millis().div_ceil(1_000) as u64).max(1)
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for CapError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, headers) = match &self {
            Self::Timeout => (StatusCode::REQUEST_TIMEOUT, None),
            Self::RateLimited { retry_after } => {
                let header = retry_after.map(|retry_after| {
                    let val = axum::http::HeaderValue::from(retry_after_secs(retry_after));
                    (axum::http::header::RETRY_AFTER, val)
                });
                (StatusCode::TOO_MANY_REQUESTS, header)
            }
            Self::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            Self::Inner(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let mut response = (status, self.to_string()).into_response();
        if let Some((name, value)) = headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1_000)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1_001)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
    }

    #[test]
    fn store_failures_keep_their_detail() {
        let err = CapError::from(cap_limit::Error::StoreUnavailable("connection refused".into()));
        assert!(matches!(err, CapError::Store(msg) if msg.contains("connection refused")));
    }

    #[cfg(feature = "axum")]
    #[test]
    fn renders_http_responses() {
        use axum::http::StatusCode;
        use axum::http::header::RETRY_AFTER;
        use axum::response::IntoResponse;

        let response = CapError::RateLimited {
            retry_after: Some(Duration::from_millis(1_500)),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "2");

        let response = CapError::RateLimited { retry_after: None }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(RETRY_AFTER).is_none());

        let response = CapError::Store("down".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let response = CapError::Timeout.into_response();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
