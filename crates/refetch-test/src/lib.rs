//! Helpers for testing the request engine.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - When using [`HitCounter`], make sure that the server is held until all
//!    requests to it have been made. If the server is dropped, the port
//!    remains open and all connections to it will time out. To avoid this,
//!    assign it to a variable: `let server = HitCounter::new();`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::routing::get;
use axum::{Router, extract, http::StatusCode, middleware};
use url::Url;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `refetch`
///    crate and mutes all other logs.
pub fn setup() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("refetch=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a
/// `tokio::test`. It automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A [`Server`] that counts the requests made to each of its paths.
///
/// Routes:
///  - `/ok`: responds `200` with a fixed body.
///  - `/respond_statuscode/:num`: responds with the given status code.
///  - `/flaky/:failures/*tail`: responds `503` for the first `failures` hits
///    of each distinct path, then `200`.
///  - `/delay/:time/*tail`: sleeps for the given (humantime) duration, then
///    responds `200` with the tail as body.
pub struct HitCounter {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl HitCounter {
    pub fn new() -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |extract::OriginalUri(uri): extract::OriginalUri,
                  req: extract::Request,
                  next: middleware::Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        let hits = hits.entry(uri.to_string()).or_default();
                        *hits += 1;
                    }

                    next.run(req).await
                }
            }
        };

        let flaky_state: Arc<Mutex<BTreeMap<String, usize>>> = Default::default();

        let router = Router::new()
            .route("/ok", get(|| async { "hello world" }))
            .route(
                "/respond_statuscode/:num",
                get(|extract::Path(num): extract::Path<u16>| async move {
                    StatusCode::from_u16(num).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                }),
            )
            .route(
                "/flaky/:failures/*tail",
                get({
                    let flaky_state = flaky_state.clone();
                    |extract::Path((failures, tail)): extract::Path<(usize, String)>| async move {
                        let seen = {
                            let mut state = flaky_state.lock().unwrap();
                            let seen = state.entry(tail.clone()).or_default();
                            *seen += 1;
                            *seen
                        };

                        if seen <= failures {
                            (StatusCode::SERVICE_UNAVAILABLE, String::new())
                        } else {
                            (StatusCode::OK, tail)
                        }
                    }
                }),
            )
            .route(
                "/delay/:time/*tail",
                get(
                    |extract::Path((time, tail)): extract::Path<(String, String)>| async move {
                        let duration = humantime::parse_duration(&time).unwrap();
                        tokio::time::sleep(duration).await;

                        (StatusCode::OK, tail)
                    },
                ),
            )
            .layer(middleware::from_fn(hitcounter));

        let server = Server::with_router(router);

        Self { server, hits }
    }

    /// Returns the total number of requests served so far, resetting the
    /// counters.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Returns the per-path hit counts, resetting the counters.
    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_iter().collect()
    }

    pub fn url(&self, path: &str) -> Url {
        self.server.url(path)
    }
}

impl Default for HitCounter {
    fn default() -> Self {
        Self::new()
    }
}
