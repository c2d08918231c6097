use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::transport::{PreparedRequest, TransportResponse};

use super::FetchError;

/// A hook observing or rewriting traffic around each transport attempt.
///
/// Hooks must not block indefinitely; a slow hook delays the whole attempt,
/// including its own share of the per-attempt timeout budget.
pub trait Interceptor: Send + Sync {
    /// Invoked before each attempt, in chain order.
    ///
    /// May rewrite the outgoing request, e.g. to inject authentication
    /// headers or adjust the per-attempt deadline.
    fn will_send<'a>(&'a self, request: PreparedRequest) -> BoxFuture<'a, PreparedRequest> {
        Box::pin(std::future::ready(request))
    }

    /// Invoked after each attempt with the raw transport outcome, in chain
    /// order (not reversed). Purely for observation.
    fn did_receive<'a>(
        &'a self,
        result: Result<&'a TransportResponse, &'a FetchError>,
    ) -> BoxFuture<'a, ()> {
        let _ = result;
        Box::pin(std::future::ready(()))
    }
}

/// An ordered, immutable sequence of [`Interceptor`]s.
///
/// Ordering is caller-significant and preserved identically for the outbound
/// and inbound passes.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    hooks: Arc<[Arc<dyn Interceptor>]>,
}

impl InterceptorChain {
    pub fn new(hooks: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            hooks: hooks.into(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Interceptor>> {
        self.hooks.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// An interceptor injecting a fixed set of headers into every attempt.
///
/// Headers already present on the request win over the static ones.
#[derive(Debug, Default)]
pub struct StaticHeaders {
    headers: BTreeMap<String, String>,
}

impl StaticHeaders {
    pub fn new(headers: BTreeMap<String, String>) -> Self {
        Self { headers }
    }
}

impl Interceptor for StaticHeaders {
    fn will_send<'a>(&'a self, mut request: PreparedRequest) -> BoxFuture<'a, PreparedRequest> {
        for (name, value) in &self.headers {
            if !request.headers().contains_key(name) {
                request = request.with_header(name.clone(), value.clone());
            }
        }
        Box::pin(std::future::ready(request))
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    #[tokio::test]
    async fn test_static_headers_do_not_override() {
        let hook = StaticHeaders::new(BTreeMap::from([
            ("accept".to_owned(), "application/json".to_owned()),
            ("x-api-key".to_owned(), "secret".to_owned()),
        ]));

        let request = PreparedRequest::get(Url::parse("https://example.com/").unwrap())
            .with_header("accept", "image/png");
        let request = hook.will_send(request).await;

        assert_eq!(request.headers()["accept"], "image/png");
        assert_eq!(request.headers()["x-api-key"], "secret");
    }
}
