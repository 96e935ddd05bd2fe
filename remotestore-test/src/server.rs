//! An in-process HTTP server that the fake remote stores are served from.
//!
//! ```
//! use axum::Router;
//! use axum::routing::get;
//! use remotestore_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let router = Router::new().route("/health", get(|| async { "ok" }));
//!    let server = TestServer::new(router).await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use bytes::Bytes;
use url::Url;

/// An in-process test server for use in integration tests.
///
/// The server listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl TestServer {
    /// Spawns a server for `router` on the current runtime.
    pub async fn new(router: Router) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns [`url`](Self::url) parsed.
    pub fn endpoint(&self, path: &str) -> Url {
        self.url(path).parse().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A log of every request a fake server received, as `"METHOD /raw/path"`.
#[derive(Clone, Debug, Default)]
pub struct RequestLog(Arc<Mutex<Vec<String>>>);

impl RequestLog {
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the number of requests received so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no request has been received.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Counts the requests with the given method whose path contains `fragment`.
    pub fn count(&self, method: &str, fragment: &str) -> usize {
        self.lock()
            .iter()
            .filter(|entry| {
                entry
                    .split_once(' ')
                    .is_some_and(|(m, path)| m == method && path.contains(fragment))
            })
            .count()
    }

    /// Wraps `router` so that every request is recorded in this log.
    pub fn layer(&self, router: Router) -> Router {
        router.layer(middleware::from_fn_with_state(self.clone(), record))
    }
}

async fn record(State(log): State<RequestLog>, request: Request, next: Next) -> Response {
    let entry = format!("{} {}", request.method(), request.uri().path());
    tracing::trace!(%entry, "fake server request");
    log.lock().push(entry);
    next.run(request).await
}

/// Applies the `Range` request header to `content`.
///
/// Returns the status, the selected bytes, and additional response headers. Only single ranges of
/// the form `bytes=start-` and `bytes=start-end` are understood; anything else serves the full
/// content.
pub fn ranged(content: &Bytes, headers: &HeaderMap) -> (StatusCode, Bytes, HeaderMap) {
    let mut response_headers = HeaderMap::new();
    let Some((start, end)) = headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_range)
    else {
        return (StatusCode::OK, content.clone(), response_headers);
    };

    let len = content.len() as u64;
    let end = end.map_or(len, |end| (end + 1).min(len));
    if start >= end {
        let value = format!("bytes */{len}");
        if let Ok(value) = HeaderValue::from_str(&value) {
            response_headers.insert(CONTENT_RANGE, value);
        }
        return (StatusCode::RANGE_NOT_SATISFIABLE, Bytes::new(), response_headers);
    }

    let value = format!("bytes {start}-{}/{len}", end - 1);
    if let Ok(value) = HeaderValue::from_str(&value) {
        response_headers.insert(CONTENT_RANGE, value);
    }
    let body = content.slice(start as usize..end as usize);
    (StatusCode::PARTIAL_CONTENT, body, response_headers)
}

fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse().ok()?),
    };
    Some((start, end))
}

/// Creates a monotonic fake identifier such as `"a1b2-0003"`.
pub(crate) fn fake_id(prefix: &str, counter: &mut u64) -> String {
    *counter += 1;
    format!("{prefix}-{:04x}", *counter)
}
