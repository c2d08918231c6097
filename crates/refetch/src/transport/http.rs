//! The reqwest-backed production transport.

use std::error::Error;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Client, header, redirect};

use crate::fetch::FetchError;

use super::{Method, PreparedRequest, Transport, TransportResponse};

const USER_AGENT: &str = concat!("refetch/", env!("CARGO_PKG_VERSION"));

impl FetchError {
    fn transport_error(mut error: &dyn Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        let mut error_string = error.to_string();

        // Special-case a few error strings
        if error_string.contains("certificate verify failed") {
            error_string = "certificate verify failed".to_string();
        }

        if error_string.contains("SSL routines") {
            error_string = "SSL error".to_string();
        }

        Self::Unavailable(error_string)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        Self::transport_error(&error)
    }
}

/// [`Transport`] implementation speaking HTTP via a shared [`Client`].
///
/// Redirects, cookies, and content decompression are handled here; the
/// coordinator above only looks at the resulting status code.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(redirect::Policy::limited(10))
            .build()
            .expect("reqwest client builder with static configuration");

        Self { client }
    }

    /// Wraps an externally configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn execute(&self, request: PreparedRequest) -> Result<TransportResponse, FetchError> {
        tracing::debug!("Sending {} request to `{}`", request.method(), request.url());

        let method = match request.method() {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.url().clone());

        for (key, value) in request.headers() {
            if let Ok(key) = header::HeaderName::from_bytes(key.as_bytes()) {
                builder = builder.header(key, value.as_str());
            }
        }
        builder = builder.header(header::USER_AGENT, USER_AGENT);

        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }
        if let Some(deadline) = request.deadline() {
            builder = builder.timeout(deadline);
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(TransportResponse {
            status: Some(status),
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: PreparedRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, FetchError>> {
        self.execute(request).boxed()
    }
}
