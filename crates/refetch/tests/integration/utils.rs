use std::sync::Arc;
use std::time::Duration;

use refetch::{
    BoundedCache, Config, HttpTransport, InterceptorChain, PreparedRequest, RequestCoordinator,
    RequestKey, RetryPolicy,
};
use refetch_test as test;

pub use test::HitCounter;

/// Setup tests and create a coordinator backed by the real HTTP transport.
///
/// The `update_config` closure can modify any default configuration before
/// the coordinator is created.
pub fn setup_coordinator(update_config: impl FnOnce(&mut Config)) -> RequestCoordinator {
    test::setup();

    let mut config = Config::default();
    update_config(&mut config);

    let cache = BoundedCache::new(config.cache.count_limit, config.cache.total_cost_limit);
    RequestCoordinator::new(
        Arc::new(HttpTransport::new(config.connect_timeout)),
        Arc::new(cache),
        InterceptorChain::default(),
    )
}

/// A fast-failing policy suited to a local test server.
pub fn test_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(3)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(50))
        .with_jitter(0.0)
        .with_per_attempt_timeout(Duration::from_secs(5))
}

/// A GET request for the given server path, plus its derived key.
pub fn get(server: &HitCounter, path: &str) -> (RequestKey, PreparedRequest) {
    let request = PreparedRequest::get(server.url(path));
    let key = RequestKey::from_request(&request, &[]);
    (key, request)
}
