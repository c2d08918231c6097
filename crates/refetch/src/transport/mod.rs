//! The transport boundary.
//!
//! A [`Transport`] performs one network call given a [`PreparedRequest`] and
//! returns raw bytes plus response metadata. The coordinator owns everything
//! above this boundary (dedup, retries, interceptors, caching); HTTP semantics
//! like redirects, cookies, and compression live below it and are delegated to
//! the concrete implementation. The engine only ever inspects the returned
//! status code.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use url::Url;

use crate::fetch::FetchError;

mod http;

pub use http::HttpTransport;

/// The request method, mirroring the usual HTTP verbs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully described request, ready to hand to a [`Transport`].
///
/// Interceptors receive this by value in their `will_send` pass and may
/// rewrite any part of it, most commonly headers and the per-attempt
/// [`deadline`](Self::deadline).
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    method: Method,
    url: Url,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
    deadline: Option<Duration>,
}

impl PreparedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            body: None,
            deadline: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: Url, body: impl Into<Bytes>) -> Self {
        Self::new(Method::Post, url).with_body(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the deadline for this single attempt.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }
}

/// Raw bytes plus response metadata returned from a [`Transport`].
///
/// An absent status code means "non-HTTP success": the coordinator applies
/// neither status validation nor caching to such responses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportResponse {
    pub status: Option<u16>,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl TransportResponse {
    /// A successful response from a transport that does not speak HTTP.
    pub fn raw(body: impl Into<Bytes>) -> Self {
        Self {
            status: None,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// An HTTP-style response carrying a status code.
    pub fn http(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status: Some(status),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Whether this is an HTTP-style response with a 2xx status.
    ///
    /// Only such responses are eligible for caching.
    pub fn is_http_success(&self) -> bool {
        self.status.is_some_and(|code| (200..300).contains(&code))
    }
}

/// Performs one network call.
///
/// Implementations must be cheap to call concurrently; the coordinator issues
/// one call per distinct in-flight key.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: PreparedRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, FetchError>>;
}
