//! # Request coordination
//!
//! The [`RequestCoordinator`] is the deduplicating, retrying, cache-aware
//! request executor in front of a [`Transport`].
//!
//! A fetch goes through the following steps:
//! - First, the response cache is consulted. A hit returns immediately,
//!   without a transport call and without invoking any interceptors.
//! - On miss, concurrent fetches for the same [`RequestKey`] coalesce onto a
//!   single shared computation; every current and future waiter receives the
//!   identical terminal outcome.
//! - A fresh computation runs the retry loop: interceptors rewrite the
//!   outgoing request, the transport is called under the per-attempt timeout,
//!   interceptors observe the raw outcome, and the status code is validated.
//!   Failed attempts back off exponentially (with jitter) until the policy
//!   stops retrying.
//! - A successful 2xx response body is written to the cache *before* the
//!   in-flight entry is unregistered, so a request arriving right after
//!   completion sees either the cache or the still-live entry. Non-2xx
//!   responses and non-HTTP successes are never cached.
//!
//! Cancellation is cooperative. Dropping one waiter's fetch future never
//! affects the shared computation; [`RequestCoordinator::cancel`] stops the
//! underlying computation, but only once no waiters remain. A cancellation
//! observed mid-retry aborts immediately, without consuming a further attempt
//! and without being wrapped into another error kind.
//!
//! ### Metrics
//!
//! - `fetch.cache.hit`: fetches served straight from the cache.
//! - `fetch.coalesced`: fetches attached to an existing in-flight computation.
//! - `fetch.computation`: fresh computations actually being run.
//! - `fetch.computation.duration`: wall time of a computation, all attempts
//!   and backoff sleeps included.
//! - `fetch.attempts` / `fetch.retries`: transport attempts and backoff waits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;

use crate::caching::{BoundedCache, NetworkCache};
use crate::config::Config;
use crate::transport::{HttpTransport, PreparedRequest, Transport, TransportResponse};
use crate::utils::futures::CallOnDrop;

mod error;
mod interceptor;
mod key;
mod retry;

pub use error::FetchError;
pub use interceptor::{Interceptor, InterceptorChain, StaticHeaders};
pub use key::{RequestKey, RequestKeyBuilder};
pub use retry::RetryPolicy;

/// The attach-anytime handle yielding one computation's terminal outcome to
/// every waiter.
type SharedOutcome = Shared<BoxFuture<'static, Result<Bytes, FetchError>>>;

/// A currently running computation for one request key.
struct InFlight {
    outcome: SharedOutcome,
    cancel: CancellationToken,
    /// The number of fetch calls currently awaiting this outcome.
    waiters: Arc<AtomicUsize>,
}

/// The deduplicating, retrying, cache-aware request executor.
///
/// Cheap to clone; clones share the in-flight map and the cache.
#[derive(Clone)]
pub struct RequestCoordinator {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn NetworkCache>,
    interceptors: InterceptorChain,
    in_flight: Arc<Mutex<HashMap<RequestKey, InFlight>>>,
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_flight = self
            .in_flight
            .try_lock()
            .map(|m| m.len())
            .unwrap_or_default();
        f.debug_struct("RequestCoordinator")
            .field("in-flight computations", &in_flight)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

impl RequestCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn NetworkCache>,
        interceptors: InterceptorChain,
    ) -> Self {
        Self {
            transport,
            cache,
            interceptors,
            in_flight: Default::default(),
        }
    }

    /// Creates a coordinator with the reqwest transport and a fresh
    /// [`BoundedCache`] sized from the configuration.
    pub fn from_config(config: &Config) -> Self {
        let cache = BoundedCache::new(config.cache.count_limit, config.cache.total_cost_limit);
        Self::new(
            Arc::new(HttpTransport::new(config.connect_timeout)),
            Arc::new(cache),
            InterceptorChain::default(),
        )
    }

    /// Executes a logical request.
    ///
    /// Served from the cache when possible, otherwise coalesced with any
    /// in-flight computation for the same key, otherwise executed fresh under
    /// the given retry policy. All concurrent callers for one key receive the
    /// identical success value or identical failure.
    pub async fn fetch(
        &self,
        key: RequestKey,
        request: PreparedRequest,
        policy: RetryPolicy,
    ) -> Result<Bytes, FetchError> {
        if let Some(body) = self.cache.get(&key) {
            metric!(counter("fetch.cache.hit") += 1);
            tracing::trace!(%key, "Serving fetch from cache");
            return Ok(body);
        }

        let (outcome, waiters, fresh) = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(&key) {
                Some(entry) => {
                    metric!(counter("fetch.coalesced") += 1);
                    tracing::trace!(%key, "Attaching to in-flight computation");
                    // Registering as a waiter under the lock keeps an
                    // explicit cancel from firing in between.
                    entry.waiters.fetch_add(1, Ordering::SeqCst);
                    (entry.outcome.clone(), Arc::clone(&entry.waiters), false)
                }
                None => {
                    let cancel = CancellationToken::new();
                    let waiters = Arc::new(AtomicUsize::new(1));
                    let outcome = self.computation(key.clone(), request, policy, cancel.clone());
                    in_flight.insert(
                        key.clone(),
                        InFlight {
                            outcome: outcome.clone(),
                            cancel,
                            waiters: Arc::clone(&waiters),
                        },
                    );
                    (outcome, waiters, true)
                }
            }
        };

        if fresh {
            // Drive the computation independently of the waiters, so that
            // dropped waiters never stall or cancel it.
            tokio::spawn(outcome.clone());
        }

        let _waiter = CallOnDrop::new(move || {
            waiters.fetch_sub(1, Ordering::SeqCst);
        });
        outcome.await
    }

    /// Requests cancellation of the in-flight computation for `key`.
    ///
    /// The signal is isolated: it only lands when no fetch calls are waiting
    /// on the computation anymore. With waiters present this is a no-op.
    pub fn cancel(&self, key: &RequestKey) {
        let in_flight = self.in_flight.lock().unwrap();
        if let Some(entry) = in_flight.get(key)
            && entry.waiters.load(Ordering::SeqCst) == 0
        {
            tracing::debug!(%key, "Cancelling in-flight computation without waiters");
            entry.cancel.cancel();
        }
    }

    /// Whether a computation for `key` is currently registered.
    pub fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.in_flight.lock().unwrap().contains_key(key)
    }

    /// The full lifecycle of one fresh computation.
    ///
    /// The returned future is `'static` so it can be driven by a spawned
    /// task; it unregisters the in-flight entry unconditionally on the way
    /// out, after the cache write.
    fn computation(
        &self,
        key: RequestKey,
        request: PreparedRequest,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> SharedOutcome {
        let this = self.clone();
        let outcome = async move {
            let _unregister = CallOnDrop::new({
                let in_flight = Arc::clone(&this.in_flight);
                let key = key.clone();
                move || {
                    in_flight.lock().unwrap().remove(&key);
                }
            });

            metric!(counter("fetch.computation") += 1);
            let start = Instant::now();
            let result = this.run_attempts(&key, request, &policy, &cancel).await;
            metric!(timer("fetch.computation.duration") = start.elapsed());

            match result {
                Ok(response) => {
                    if response.is_http_success() {
                        tracing::trace!(%key, size = response.body.len(), "Caching response body");
                        this.cache.set(key.clone(), response.body.clone());
                    }
                    Ok(response.body)
                }
                Err(error) => {
                    if error != FetchError::Cancelled {
                        tracing::debug!(%key, kind = error.kind(), "Fetch failed terminally");
                    }
                    Err(error)
                }
            }
        };
        outcome.boxed().shared()
    }

    /// The retry loop of one computation.
    ///
    /// Cancellation is honored before each attempt, during the transport
    /// call, and during backoff sleeps; it aborts immediately and is never
    /// consulted with the retry predicate.
    async fn run_attempts(
        &self,
        key: &RequestKey,
        request: PreparedRequest,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, FetchError> {
        let max_attempts = policy.max_attempts();
        // `max_attempts` is clamped to at least 1, so the loop always
        // replaces this placeholder.
        let mut last_error = FetchError::custom("no attempts were executed", "empty retry loop");

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let mut prepared = request.clone().with_deadline(policy.per_attempt_timeout());
            for hook in self.interceptors.iter() {
                prepared = hook.will_send(prepared).await;
            }
            let deadline = prepared.deadline().unwrap_or(policy.per_attempt_timeout());

            metric!(counter("fetch.attempts") += 1);
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = tokio::time::timeout(deadline, self.transport.send(prepared)) => {
                    match result {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Unavailable(format!(
                            "attempt timed out after {deadline:?}"
                        ))),
                    }
                }
            };

            for hook in self.interceptors.iter() {
                hook.did_receive(result.as_ref()).await;
            }

            match result.and_then(validate_status) {
                Ok(response) => {
                    tracing::debug!(%key, attempt, "Fetch succeeded");
                    return Ok(response);
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(error) => {
                    tracing::debug!(%key, attempt, kind = error.kind(), "Fetch attempt failed");
                    last_error = error;
                }
            }

            if attempt + 1 == max_attempts || !policy.should_retry(&last_error, attempt) {
                break;
            }

            let delay = policy.backoff(attempt);
            metric!(counter("fetch.retries") += 1);
            tracing::trace!(%key, attempt, ?delay, "Backing off before next attempt");
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Err(last_error)
    }
}

/// Classifies an HTTP-style response by its status code.
///
/// Responses without a status code pass through untouched.
fn validate_status(response: TransportResponse) -> Result<TransportResponse, FetchError> {
    match response.status {
        Some(code) if !(200..300).contains(&code) => Err(FetchError::Status {
            code,
            body: response.body,
        }),
        _ => Ok(response),
    }
}
