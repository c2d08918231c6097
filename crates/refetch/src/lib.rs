//! # refetch
//!
//! A client-side request-execution engine that sits between application code
//! and a raw network transport. For every logical request it guarantees at
//! most one in-flight transport call per [`RequestKey`], retries failed
//! attempts with bounded exponential backoff plus jitter, runs a configurable
//! [`Interceptor`] chain over outgoing and incoming traffic, and caches
//! successful response bodies in a [`BoundedCache`] bounded by both entry
//! count and aggregate cost.
//!
//! The entry point is [`RequestCoordinator::fetch`]. The transport performing
//! the actual network call is abstracted behind the [`Transport`] trait;
//! [`HttpTransport`] is the reqwest-backed production implementation.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod transport;
mod utils;

pub use caching::{BoundedCache, NetworkCache};
pub use config::Config;
pub use fetch::{
    FetchError, Interceptor, InterceptorChain, RequestCoordinator, RequestKey, RequestKeyBuilder,
    RetryPolicy, StaticHeaders,
};
pub use transport::{HttpTransport, Method, PreparedRequest, Transport, TransportResponse};
