//! # Tower Cap
//!
//! `tower-cap` puts the store-backed strategies of [`cap_limit`] in front of any
//! [Tower](https://github.com/tower-rs/tower) service that takes an
//! [`http::Request`].
//!
//! For every request the middleware:
//!
//! 1. **Keys** it with a [`KeyExtractor`] (default [`ClientAddrPath`]:
//!    client address plus path).
//! 2. **Decides** with one call to the [`cap_limit::Strategy`], which is one
//!    round trip to the shared store.
//! 3. **Reacts** to rejections with an [`OnLimit`] (default
//!    [`TooManyRequests`]), which may abort the request or let it through.
//!
//! Store failures fail closed with [`CapError::Store`].
//!
//! ## The Managed Stack
//! [`ManagedRateLimitLayer`] adds a hard deadline over the decision and the
//! inner service, and maps every error into a cloneable [`CapError`].
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`CapError`] (429 with `Retry-After`,
//!   503, 408, 500) and reads the peer address from axum's `ConnectInfo`.

mod error;
mod key;
mod layer;
mod managed_layer;
mod on_limit;
mod service;
mod utils;


pub use error::CapError;
pub use key::ClientAddrPath;
pub use key::KeyExtractor;
pub use key::client_ip;
pub use layer::RateLimitLayer;
pub use managed_layer::ManagedRateLimitLayer;
pub use on_limit::OnLimit;
pub use on_limit::TooManyRequests;
pub use service::RateLimitService;
pub use service::ResponseFuture;
pub use utils::ServiceBuilderExt;
