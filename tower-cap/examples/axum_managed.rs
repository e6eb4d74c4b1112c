use std::net::SocketAddr;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use cap_limit::Gcra;
use cap_limit::MemoryStore;
use cap_limit::Rate;
use cap_limit::RedisStore;
use cap_limit::Strategy;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_cap::CapError;
use tower_cap::ManagedRateLimitLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 1. Setup Strategy: 10 requests per second with bursts of 5, shared
    // through Redis when REDIS_URL is set.
    let burst = NonZeroU64::new(5).ok_or("burst must be positive")?;
    let rate = Rate::default().per_second(10.0);
    let strategy: Arc<dyn Strategy> = match std::env::var("REDIS_URL") {
        Ok(url) => Arc::new(Gcra::new(RedisStore::open(&url).await?, burst, rate)?),
        Err(_) => Arc::new(Gcra::new(MemoryStore::new(), burst, rate)?),
    };
    tracing::info!(strategy = strategy.name(), "rate limiter ready");

    // 2. Setup Managed Layer
    let managed_layer = ManagedRateLimitLayer::<_, axum::body::Body>::new(
        strategy,
        Duration::from_millis(500),
    );

    // 3. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, Cap!" }))
        .layer(
            ServiceBuilder::new()
                // Outermost: turns the boxed CapError back into a response
                .layer(HandleErrorLayer::new(handle_cap_error))
                .layer(managed_layer)
                // Route is Infallible, the managed layer expects BoxError
                .map_err(BoxError::from),
        );

    // 4. Serve, exposing the peer address to the default key extractor
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    println!("📡 Listening on http://127.0.0.1:3000");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn handle_cap_error(err: BoxError) -> impl IntoResponse {
    if let Some(cap_err) = err.downcast_ref::<CapError>() {
        cap_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
