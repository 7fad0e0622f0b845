//! Ad hoc HTTP URLs for media a session wants to expose.
//!
//! Paths are `/{network}/{suffix}`. The HTTP listener starts with the first
//! registered path and stops when the last one is removed. Requests go to
//! the longest registered path that prefixes the request path.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Router;
use rand::Rng;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Attempts at binding a random port before giving up.
const RANDOM_PORT_TRIES: usize = 10;

/// Errors from registering a URL.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid public URL: {0}")]
    Url(#[from] url::ParseError),

    /// The HTTP listener needs a tokio runtime to run on.
    #[error("no tokio runtime to serve URLs on")]
    NoRuntime,
}

/// Serves requests for one registered path.
#[async_trait]
pub trait UrlHandler: Send + Sync + 'static {
    async fn serve(&self, req: Request) -> Response;
}

/// Fixed content with a content type.
#[derive(Debug, Clone)]
pub struct StaticContent {
    content_type: String,
    body: Bytes,
}

impl StaticContent {
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
impl UrlHandler for StaticContent {
    async fn serve(&self, _req: Request) -> Response {
        (
            [(header::CONTENT_TYPE, self.content_type.clone())],
            self.body.clone(),
        )
            .into_response()
    }
}

/// Where the listener binds and how URLs are spelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UrlMuxConfig {
    /// Prefix of returned URLs, e.g. `https://media.example.com`. Derived
    /// from the bound address when empty.
    pub public_url: String,

    /// Listen address. Taken from `public_url` when empty, else a random
    /// `localhost` port. A bare `:port` binds every interface and is
    /// published as `http://localhost:port`; port 0 picks a free port.
    pub bind_addr: String,
}

struct Running {
    public_url: String,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

#[derive(Default)]
struct MuxState {
    handlers: HashMap<String, Arc<dyn UrlHandler>>,
    server: Option<Running>,
}

/// Registry of served paths plus the HTTP listener serving them.
#[derive(Default)]
pub struct UrlMux {
    config: UrlMuxConfig,
    state: Arc<Mutex<MuxState>>,
}

impl UrlMux {
    pub fn new(config: UrlMuxConfig) -> Self {
        Self {
            config,
            state: Arc::default(),
        }
    }

    /// Registers `handler` for `/{network}/{suffix}` and returns its full URL.
    ///
    /// The first registration starts the listener and must run within a
    /// tokio runtime.
    ///
    /// # Errors
    /// [`MuxError`] if the listener cannot start. The path is not
    /// registered in that case.
    pub fn serve_url(
        &self,
        network: &str,
        suffix: &str,
        handler: Arc<dyn UrlHandler>,
    ) -> Result<String, MuxError> {
        let path = format!("/{network}/{suffix}");
        let mut state = self.lock();
        state.handlers.insert(path.clone(), handler);

        if state.server.is_none() {
            match self.start_server() {
                Ok(running) => state.server = Some(running),
                Err(e) => {
                    state.handlers.remove(&path);
                    return Err(e);
                }
            }
        }

        let base = state
            .server
            .as_ref()
            .map(|s| s.public_url.as_str())
            .unwrap_or_default();
        Ok(format!("{base}{path}"))
    }

    /// Stops serving `/{network}/{suffix}`. Removing the last path stops the
    /// listener.
    pub fn stop_serve_url(&self, network: &str, suffix: &str) {
        let path = format!("/{network}/{suffix}");
        let mut state = self.lock();
        state.handlers.remove(&path);
        if state.handlers.is_empty() {
            if let Some(server) = state.server.take() {
                server.shutdown.cancel();
                tracing::info!(addr = %server.local_addr, "url mux stopped");
            }
        }
    }

    /// Removes every path and stops the listener.
    pub fn close(&self) {
        let mut state = self.lock();
        state.handlers.clear();
        if let Some(server) = state.server.take() {
            server.shutdown.cancel();
            tracing::info!(addr = %server.local_addr, "url mux stopped");
        }
    }

    /// The address the listener is bound to, while it runs.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().server.as_ref().map(|s| s.local_addr)
    }

    /// The URL prefix in use, while the listener runs.
    pub fn public_url(&self) -> Option<String> {
        self.lock().server.as_ref().map(|s| s.public_url.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serves one request against the current table.
    pub async fn route(&self, req: Request) -> Response {
        route(&self.state, req).await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MuxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_server(&self) -> Result<Running, MuxError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MuxError::NoRuntime)?;

        let bind_addr = if !self.config.bind_addr.is_empty() {
            Some(self.config.bind_addr.clone())
        } else if !self.config.public_url.is_empty() {
            Some(host_of(&self.config.public_url)?)
        } else {
            None
        };
        let (listener, addr) = match bind_addr {
            Some(addr) => (bind(&addr)?, addr),
            None => bind_random()?,
        };
        let local_addr = listener.local_addr().map_err(|source| MuxError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let public_url = if self.config.public_url.is_empty() {
            derived_url(&addr, local_addr)
        } else {
            self.config.public_url.trim_end_matches('/').to_string()
        };

        let listener = {
            let _enter = runtime.enter();
            tokio::net::TcpListener::from_std(listener).map_err(|source| MuxError::Bind {
                addr: addr.clone(),
                source,
            })?
        };

        let shutdown = CancellationToken::new();
        let state = Arc::clone(&self.state);
        let app = Router::new().fallback(move |req: Request| {
            let state = Arc::clone(&state);
            async move { route(&state, req).await }
        });
        let stop = shutdown.clone();
        runtime.spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "url mux server error");
            }
        });

        tracing::info!(%local_addr, %public_url, "url mux listening");
        Ok(Running {
            public_url,
            local_addr,
            shutdown,
        })
    }
}

async fn route(state: &Mutex<MuxState>, req: Request) -> Response {
    let handler = {
        let state = state.lock().unwrap_or_else(PoisonError::into_inner);
        find_handler(&state.handlers, req.uri().path())
    };
    tracing::debug!(uri = %req.uri(), found = handler.is_some(), "url mux request");
    match handler {
        Some(handler) => handler.serve(req).await,
        None => not_found(),
    }
}

/// The handler with the longest path that prefixes `path`.
fn find_handler(
    handlers: &HashMap<String, Arc<dyn UrlHandler>>,
    path: &str,
) -> Option<Arc<dyn UrlHandler>> {
    handlers
        .iter()
        .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, handler)| Arc::clone(handler))
}

fn not_found() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from("Not Found\n"))
        .unwrap_or_else(|_| StatusCode::NOT_FOUND.into_response())
}

fn host_of(public_url: &str) -> Result<String, MuxError> {
    let url = url::Url::parse(public_url)?;
    let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
    Ok(match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// The URL prefix for a listener bound from `addr`.
fn derived_url(addr: &str, local_addr: SocketAddr) -> String {
    if addr.starts_with(':') {
        format!("http://localhost:{}", local_addr.port())
    } else if addr.ends_with(":0") {
        format!("http://{local_addr}")
    } else {
        format!("http://{addr}")
    }
}

fn bind(addr: &str) -> Result<std::net::TcpListener, MuxError> {
    let target = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    };
    let listener = std::net::TcpListener::bind(target).map_err(|source| MuxError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| MuxError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    Ok(listener)
}

fn bind_random() -> Result<(std::net::TcpListener, String), MuxError> {
    let mut rng = rand::rng();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let addr = format!("localhost:{}", 10000 + rng.random_range(0..50000));
        match bind(&addr) {
            Ok(listener) => return Ok((listener, addr)),
            Err(e) if attempt >= RANDOM_PORT_TRIES => return Err(e),
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn get(uri: &str) -> Request {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn handlers(paths: &[&str]) -> HashMap<String, Arc<dyn UrlHandler>> {
        paths
            .iter()
            .map(|p| {
                let h: Arc<dyn UrlHandler> = Arc::new(StaticContent::new("text/plain", p.to_string()));
                (p.to_string(), h)
            })
            .collect()
    }

    #[test]
    fn test_find_handler_longest_prefix() {
        let table = handlers(&["/net1/", "/net1/img"]);
        assert!(find_handler(&table, "/net1/img.png").is_some());
        assert!(find_handler(&table, "/net2/img.png").is_none());
    }

    #[test]
    fn test_host_of_public_url() {
        assert_eq!(host_of("http://example.com:8080/x").unwrap(), "example.com:8080");
        assert_eq!(host_of("https://example.com").unwrap(), "example.com:443");
        assert!(host_of("not a url").is_err());
    }

    #[test]
    fn test_derived_url() {
        let local: SocketAddr = "127.0.0.1:4321".parse().unwrap();
        assert_eq!(derived_url(":0", local), "http://localhost:4321");
        assert_eq!(derived_url(":4321", local), "http://localhost:4321");
        assert_eq!(derived_url("127.0.0.1:0", local), "http://127.0.0.1:4321");
        assert_eq!(derived_url("media.local:80", local), "http://media.local:80");
    }

    #[test]
    fn test_bind_port_only_address() {
        let listener = bind(":0").unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_unspecified());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_serve_url_on_port_only_bind() {
        let mux = UrlMux::new(UrlMuxConfig {
            bind_addr: ":0".into(),
            ..UrlMuxConfig::default()
        });
        let url = mux
            .serve_url("net1", "a.png", Arc::new(StaticContent::new("image/png", "x")))
            .unwrap();
        let port = mux.local_addr().unwrap().port();
        assert_eq!(url, format!("http://localhost:{port}/net1/a.png"));
        mux.close();
    }

    #[test]
    fn test_serve_url_without_runtime() {
        let mux = UrlMux::default();
        let handler = Arc::new(StaticContent::new("text/plain", "x"));
        assert!(matches!(
            mux.serve_url("net1", "a", handler),
            Err(MuxError::NoRuntime)
        ));
        assert!(mux.is_empty());
    }

    #[tokio::test]
    async fn test_route_prefers_longest_path() {
        let mux = UrlMux::new(UrlMuxConfig {
            bind_addr: "127.0.0.1:0".into(),
            ..UrlMuxConfig::default()
        });
        mux.serve_url("net1", "", Arc::new(StaticContent::new("text/plain", "dir")))
            .unwrap();
        mux.serve_url("net1", "img.png", Arc::new(StaticContent::new("image/png", "png")))
            .unwrap();

        let resp = mux.route(get("/net1/img.png?x=1")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");

        let resp = mux.route(get("/net1/other.txt")).await;
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");

        let resp = mux.route(get("/net2/img.png")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        mux.close();
    }

    #[tokio::test]
    async fn test_listener_stops_with_last_path() {
        let mux = UrlMux::new(UrlMuxConfig {
            bind_addr: "127.0.0.1:0".into(),
            ..UrlMuxConfig::default()
        });
        let url = mux
            .serve_url("net1", "img.png", Arc::new(StaticContent::new("image/png", "png")))
            .unwrap();
        let addr = mux.local_addr().unwrap();
        assert_eq!(url, format!("http://{addr}/net1/img.png"));

        mux.stop_serve_url("net1", "img.png");
        assert!(mux.local_addr().is_none());
        assert!(mux.public_url().is_none());

        let resp = mux.route(get("/net1/img.png")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_public_url_prefix() {
        let mux = UrlMux::new(UrlMuxConfig {
            public_url: "https://media.example.com/".into(),
            bind_addr: "127.0.0.1:0".into(),
        });
        let url = mux
            .serve_url("n", "a.png", Arc::new(StaticContent::new("image/png", "x")))
            .unwrap();
        assert_eq!(url, "https://media.example.com/n/a.png");
        mux.close();
    }
}
