use std::hint::black_box;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use cap_limit::FixedWindow;
use cap_limit::Gcra;
use cap_limit::MemoryStore;
use cap_limit::Rate;
use cap_limit::SlidingWindow;
use cap_limit::Strategy;
use cap_limit::TokenBucket;
use criterion::BenchmarkGroup;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::measurement::WallTime;
use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use http::Request;
use http::Response;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;
use tower::service_fn;
use tower::util::BoxCloneSyncService;
use tower_cap::ManagedRateLimitLayer;
use tower_cap::RateLimitLayer;

// --- HELPERS & TYPES ---

type BenchService = BoxCloneSyncService<Request<String>, Response<String>, BoxError>;

async fn noop_handler(_req: Request<String>) -> Result<Response<String>, BoxError> {
    Ok(Response::new("ok".to_string()))
}

fn request(client: usize) -> Request<String> {
    Request::builder()
        .uri("/bench")
        .header("x-forwarded-for", format!("10.0.{}.{}", client / 256, client % 256))
        .body("test".to_string())
        .unwrap()
}

/// Generic runner for single-call overhead benchmarks
fn bench_overhead(
    group: &mut BenchmarkGroup<WallTime>,
    rt: &tokio::runtime::Runtime,
    id: &str,
    svc: BenchService,
) {
    group.bench_function(id, |b| {
        b.to_async(rt).iter(|| {
            let mut s = svc.clone();
            async move {
                let res = s.ready().await.unwrap().call(request(0)).await;
                black_box(res)
            }
        });
    });
}

/// Generic runner for burst/contention benchmarks, spread over distinct clients
fn bench_burst(
    group: &mut BenchmarkGroup<WallTime>,
    rt: &tokio::runtime::Runtime,
    id: &str,
    svc: BenchService,
    burst_size: usize,
) {
    group.bench_function(id, |b| {
        b.to_async(rt).iter(|| {
            let s = svc.clone();
            async move {
                let mut futures = FuturesUnordered::new();
                for client in 0..burst_size {
                    let mut local_svc = s.clone();
                    futures.push(async move {
                        local_svc.ready().await.unwrap().call(request(client)).await
                    });
                }
                while let Some(res) = futures.next().await {
                    let _ = black_box(res);
                }
            }
        });
    });
}

fn standard(strategy: Arc<dyn Strategy>) -> BenchService {
    BoxCloneSyncService::new(
        ServiceBuilder::new()
            .layer(RateLimitLayer::new(strategy))
            .service(service_fn(noop_handler)),
    )
}

fn managed(strategy: Arc<dyn Strategy>) -> BenchService {
    BoxCloneSyncService::new(
        ServiceBuilder::new()
            .layer(ManagedRateLimitLayer::new(
                strategy,
                Duration::from_millis(100),
            ))
            .service(service_fn(noop_handler)),
    )
}

// --- MAIN BENCHMARK ---

fn bench_all_scenarios(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(8)
        .enable_all()
        .build()
        .unwrap();

    // Use a massive limit so we measure the middleware and the procedure,
    // not the rejections.
    let limit = NonZeroU64::new(100_000_000).unwrap();
    let period = Duration::from_secs(60);
    let rate = Rate::default().per_second(100_000_000.0);
    let burst_size = 1000;
    let store = MemoryStore::new();

    let fixed: Arc<dyn Strategy> = Arc::new(FixedWindow::new(store.clone(), limit, period).unwrap());
    let sliding: Arc<dyn Strategy> =
        Arc::new(SlidingWindow::new(store.clone(), limit, period).unwrap());
    let bucket: Arc<dyn Strategy> = Arc::new(TokenBucket::new(store.clone(), limit, rate).unwrap());
    let gcra: Arc<dyn Strategy> = Arc::new(Gcra::new(store.clone(), limit, rate).unwrap());

    // Define Scenarios (ID, Service)
    let scenarios: Vec<(&str, BenchService)> = vec![
        (
            "baseline",
            BoxCloneSyncService::new(service_fn(noop_handler)),
        ),
        ("cap_standard_fixed", standard(fixed.clone())),
        ("cap_standard_sliding", standard(sliding.clone())),
        ("cap_standard_bucket", standard(bucket.clone())),
        ("cap_standard_gcra", standard(gcra.clone())),
        ("cap_managed_fixed", managed(fixed)),
        ("cap_managed_sliding", managed(sliding)),
        ("cap_managed_bucket", managed(bucket)),
        ("cap_managed_gcra", managed(gcra)),
    ];

    // Run Overhead Group
    let mut overhead_group = c.benchmark_group("Middleware Overhead");
    for (id, svc) in &scenarios {
        bench_overhead(&mut overhead_group, &rt, id, svc.clone());
    }
    overhead_group.finish();

    // Run Contention Group
    let mut contention_group = c.benchmark_group("High Contention (1000 Clients)");
    for (id, svc) in &scenarios {
        bench_burst(&mut contention_group, &rt, id, svc.clone(), burst_size);
    }
    contention_group.finish();
}

criterion_group!(benches, bench_all_scenarios);
criterion_main!(benches);
