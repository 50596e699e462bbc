//! The embedded server lifecycle controller.
//!
//! [`EmbeddedServer`] wraps everything a desktop-style application needs to
//! present its UI through a local browser: it binds a hyper server to
//! `127.0.0.1` on an OS-assigned port, serves the application's static
//! assets, lets the application register native route handlers after
//! start, and installs the HTTP shutdown endpoint with its cancellable
//! delayed stop.
//!
//! # Example
//!
//! ```rust,ignore
//! use hearth::{EmbeddedServer, ResourceMounts};
//!
//! #[derive(rust_embed::RustEmbed)]
//! #[folder = "web/"]
//! struct WebAssets;
//!
//! #[tokio::main]
//! async fn main() -> hearth::Result<()> {
//!     let mut server = EmbeddedServer::builder()
//!         .url_root("/myapp")
//!         .mounts(ResourceMounts::auto::<WebAssets>("web"))
//!         .build();
//!
//!     server.start().await?;
//!     server.install_shutdown_route("/shutdown")?;
//!     server.open_browser("http://localhost:%port%/myapp/")?;
//!     server.await_termination().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::assets::{Asset, ResourceMounts};
use crate::browser;
use crate::config::{ServerConfig, ServerConfigBuilder};
use crate::error::{Error, Result};
use crate::routes::{HttpResponse, RouteHandler, RouteRequest, RouteTable};
use crate::shutdown::{schedule_stop, ConnectionTracker, PendingShutdown, ShutdownSignal};
use crate::workdir::WorkDir;

/// Body returned by the shutdown endpoint when a stop has been scheduled.
const STOPPING_BODY: &str = "<html><head>\n</head><body>\nStopping application.\n</body></html>";

/// Body returned by the shutdown endpoint when a stop was cancelled.
const CANCELLED_BODY: &str = "<html><head>\n</head><body>\nShutdown cancelled.\n</body></html>";

/// Body returned for unresolved paths.
const NOT_FOUND_BODY: &str = "<html><head>\n</head><body>\nNot found.\n</body></html>";

/// Lifecycle state of the controller.
enum State {
    /// Not yet started.
    Idle,
    /// Accepting connections.
    Running(Running),
    /// Stopped and torn down; the controller cannot be restarted.
    Terminated,
}

/// State held while the server is running.
struct Running {
    port: u16,
    shutdown: ShutdownSignal,
    pending: PendingShutdown,
    routes: Arc<RwLock<RouteTable>>,
    accept_loop: Option<JoinHandle<()>>,
    workdir: Option<WorkDir>,
}

/// The embedded server lifecycle controller.
///
/// One controller manages at most one server for its whole lifetime: a
/// second `start()` fails with [`Error::AlreadyStarted`], and a stopped
/// controller cannot be restarted.
pub struct EmbeddedServer {
    config: ServerConfig,
    mounts: ResourceMounts,
    state: State,
}

impl EmbeddedServer {
    /// Creates a controller from a configuration and asset mounts.
    #[must_use]
    pub fn new(config: ServerConfig, mounts: ResourceMounts) -> Self {
        Self {
            config,
            mounts,
            state: State::Idle,
        }
    }

    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> EmbeddedServerBuilder {
        EmbeddedServerBuilder::default()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts the server.
    ///
    /// Creates the temporary working directory, binds `127.0.0.1` on an
    /// OS-assigned port, and spawns the accept loop. Returns once the
    /// listener is accepting connections.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] if this controller has already started;
    ///   the running server is unaffected.
    /// - [`Error::InvalidUrlRoot`] if the configured URL root is malformed.
    /// - [`Error::Launch`] if the working directory or the listener cannot
    ///   be created.
    pub async fn start(&mut self) -> Result<()> {
        if !matches!(self.state, State::Idle) {
            return Err(Error::AlreadyStarted);
        }
        self.config.validate()?;

        let workdir = WorkDir::create(self.config.workdir_prefix())
            .map_err(|e| Error::launch("creating working directory", e))?;

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|e| Error::launch("binding listener on 127.0.0.1", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| Error::launch("reading assigned port", e))?;

        let routes = Arc::new(RwLock::new(RouteTable::new()));
        let shutdown = ShutdownSignal::new();
        let dispatcher = Arc::new(Dispatcher {
            url_root: self.config.url_root().to_string(),
            index_file: self.config.index_file().to_string(),
            mounts: self.mounts.clone(),
            routes: Arc::clone(&routes),
        });

        let accept_task = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            shutdown.clone(),
            self.config.drain_timeout(),
        ));

        tracing::info!(
            port = addr.port(),
            workdir = %workdir.path().display(),
            url_root = self.config.url_root(),
            "embedded server listening"
        );

        self.state = State::Running(Running {
            port: addr.port(),
            shutdown,
            pending: PendingShutdown::new(),
            routes,
            accept_loop: Some(accept_task),
            workdir: Some(workdir),
        });
        Ok(())
    }

    /// Returns the OS-assigned listening port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] before `start()` or after
    /// termination.
    pub fn port(&self) -> Result<u16> {
        Ok(self.running()?.port)
    }

    /// Returns the path of the temporary working directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if the server is not running.
    pub fn workdir_path(&self) -> Result<&std::path::Path> {
        self.running()?
            .workdir
            .as_ref()
            .map(WorkDir::path)
            .ok_or(Error::NotStarted)
    }

    /// Signals the server to stop.
    ///
    /// Completes asynchronously from the caller's perspective: a blocked
    /// [`await_termination`](Self::await_termination) resumes once the
    /// accept loop has drained and teardown has finished, not when this
    /// call returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if the server is not running.
    pub fn stop(&self) -> Result<()> {
        self.running()?.shutdown.trigger();
        Ok(())
    }

    /// Blocks the calling task until the server has stopped, then performs
    /// final teardown (working-directory removal, errors logged).
    ///
    /// Not reentrant: exactly one task may wait here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] before `start()` or on a second call.
    pub async fn await_termination(&mut self) -> Result<()> {
        let running = match &mut self.state {
            State::Running(r) => r,
            _ => return Err(Error::NotStarted),
        };
        let accept_loop = running.accept_loop.take().ok_or(Error::NotStarted)?;

        if let Err(e) = accept_loop.await {
            tracing::error!(error = %e, "accept loop task failed");
        }
        if let Some(workdir) = running.workdir.take() {
            workdir.remove();
        }
        tracing::info!("embedded server terminated");

        self.state = State::Terminated;
        Ok(())
    }

    /// Registers a native route handler at `path` (relative to the URL
    /// root). Routes may be registered while the server is running; a
    /// later registration at the same path replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if the server is not running.
    pub fn add_route<F, Fut>(&self, path: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResponse> + Send + 'static,
    {
        let running = self.running()?;
        let handler: RouteHandler = Arc::new(move |req| Box::pin(handler(req)));
        let mut table = running
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        table.insert(path, handler);
        Ok(())
    }

    /// Installs the self-shutdown endpoint at `path`.
    ///
    /// A GET with no `cancel` parameter (or any value other than the
    /// case-insensitive literal `true`) responds immediately with a short
    /// stopping notice, arms the pending shutdown, and schedules a stop
    /// after the configured delay. A GET with `cancel=true` responds with
    /// a cancellation notice and disarms the pending shutdown; with
    /// nothing pending that is a no-op beyond the body.
    ///
    /// Each shutdown request schedules its own timer; overlapping requests
    /// race at-least-one-timer-wins, while a cancellation disarms them all
    /// by clearing the one shared flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if the server is not running.
    pub fn install_shutdown_route(&self, path: impl Into<String>) -> Result<()> {
        let running = self.running()?;
        let pending = running.pending.clone();
        let signal = running.shutdown.clone();
        let delay = self.config.shutdown_delay();

        self.add_route(path, move |req: RouteRequest| {
            let pending = pending.clone();
            let signal = signal.clone();
            async move {
                let cancelled = req
                    .query_param("cancel")
                    .is_some_and(|v| v.eq_ignore_ascii_case("true"));
                if cancelled {
                    pending.cancel();
                    tracing::info!("server shutdown cancelled");
                    html_response(StatusCode::OK, CANCELLED_BODY)
                } else {
                    tracing::info!("server shutdown requested");
                    pending.arm();
                    // The timer runs on its own task; the delay gives this
                    // response time to flush before the server stops.
                    schedule_stop(pending.clone(), signal.clone(), delay);
                    html_response(StatusCode::OK, STOPPING_BODY)
                }
            }
        })
    }

    /// Cancels any pending shutdown without sending a response.
    ///
    /// For the embedding application itself, e.g. to cancel a shutdown
    /// initiated by a page unload that turned out to be a reload. No-op if
    /// nothing is pending or the server is not running.
    pub fn cancel_pending_shutdown(&self) {
        if let State::Running(running) = &self.state {
            running.pending.cancel();
        }
    }

    /// Returns `true` if a delayed stop is currently armed.
    #[must_use]
    pub fn is_shutdown_pending(&self) -> bool {
        match &self.state {
            State::Running(running) => running.pending.is_armed(),
            _ => false,
        }
    }

    /// Opens the system browser on `url`.
    ///
    /// If the URL contains the literal `%port%` placeholder it is replaced
    /// with the assigned listening port. Fire and forget: launch failures
    /// are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if `%port%` is used before the server
    /// is started; no URL is opened in that case.
    pub fn open_browser(&self, url: &str) -> Result<()> {
        let resolved = if url.contains(browser::PORT_PLACEHOLDER) {
            browser::substitute_port(url, self.port()?)
        } else {
            url.to_string()
        };
        browser::launch(&resolved);
        Ok(())
    }

    fn running(&self) -> Result<&Running> {
        match &self.state {
            State::Running(running) => Ok(running),
            _ => Err(Error::NotStarted),
        }
    }
}

impl std::fmt::Debug for EmbeddedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Idle => "idle",
            State::Running(_) => "running",
            State::Terminated => "terminated",
        };
        f.debug_struct("EmbeddedServer")
            .field("state", &state)
            .field("url_root", &self.config.url_root())
            .finish()
    }
}

/// Builder for [`EmbeddedServer`].
#[derive(Debug, Default)]
pub struct EmbeddedServerBuilder {
    config_builder: ServerConfigBuilder,
    mounts: ResourceMounts,
}

impl EmbeddedServerBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application URL root (see
    /// [`ServerConfigBuilder::url_root`]).
    #[must_use]
    pub fn url_root(mut self, root: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.url_root(root);
        self
    }

    /// Sets the delay between a shutdown request and the actual stop.
    #[must_use]
    pub fn shutdown_delay(mut self, delay: Duration) -> Self {
        self.config_builder = self.config_builder.shutdown_delay(delay);
        self
    }

    /// Sets the connection drain timeout.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.drain_timeout(timeout);
        self
    }

    /// Sets the working-directory prefix.
    #[must_use]
    pub fn workdir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.workdir_prefix(prefix);
        self
    }

    /// Sets the index file served for directory requests.
    #[must_use]
    pub fn index_file(mut self, name: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.index_file(name);
        self
    }

    /// Sets the asset mount table.
    #[must_use]
    pub fn mounts(mut self, mounts: ResourceMounts) -> Self {
        self.mounts = mounts;
        self
    }

    /// Adds a single asset mount.
    #[must_use]
    pub fn mount(
        mut self,
        prefix: impl Into<String>,
        source: Arc<dyn crate::assets::AssetSource>,
    ) -> Self {
        self.mounts = self.mounts.mount(prefix, source);
        self
    }

    /// Builds the controller.
    #[must_use]
    pub fn build(self) -> EmbeddedServer {
        EmbeddedServer::new(self.config_builder.build(), self.mounts)
    }
}

/// Request dispatch state shared with the accept loop.
struct Dispatcher {
    url_root: String,
    index_file: String,
    mounts: ResourceMounts,
    routes: Arc<RwLock<RouteTable>>,
}

impl Dispatcher {
    /// Handles a single HTTP request.
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> std::result::Result<HttpResponse, Infallible> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let headers = req.headers().clone();

        tracing::debug!(%method, path = %path, "request");
        Ok(self.dispatch(method, &path, query, headers).await)
    }

    /// Routes a request: registered handlers first, then static assets,
    /// then 404.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: Option<String>,
        headers: HeaderMap,
    ) -> HttpResponse {
        let rel = match strip_url_root(path, &self.url_root) {
            Some(rel) => rel,
            None => return not_found_response(),
        };

        let handler = {
            let table = self.routes.read().unwrap_or_else(PoisonError::into_inner);
            table.get(rel)
        };
        if let Some(handler) = handler {
            let request = RouteRequest::new(method, rel, query, headers);
            return handler(request).await;
        }

        if method == Method::GET || method == Method::HEAD {
            if let Some(asset) = self.mounts.resolve(rel, &self.index_file) {
                return asset_response(&asset);
            }
        }

        not_found_response()
    }
}

/// Accepts connections until the shutdown signal fires, then drains
/// in-flight connections bounded by `drain_timeout`.
async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownSignal,
    drain_timeout: Duration,
) {
    let tracker = ConnectionTracker::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, remote_addr)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        let token = tracker.acquire();
                        let conn_shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) =
                                serve_connection(stream, remote_addr, dispatcher, conn_shutdown).await
                            {
                                tracing::debug!(remote = %remote_addr, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to accept connection");
                    }
                }
            }

            _ = shutdown.recv() => {
                tracing::info!("stop signal received, no longer accepting connections");
                break;
            }
        }
    }

    drop(listener);

    tokio::select! {
        _ = tracker.wait_for_idle() => {
            tracing::debug!("all connections closed");
        }
        _ = tokio::time::sleep(drain_timeout) => {
            tracing::warn!(
                active = tracker.active_connections(),
                "drain timeout reached with connections still active"
            );
        }
    }
}

/// Serves one connection, aborting it if the shutdown signal fires.
async fn serve_connection(
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownSignal,
) -> std::result::Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.handle_request(req).await }
    });

    let conn = http1::Builder::new().serve_connection(io, service);

    tokio::select! {
        result = conn => result,
        _ = shutdown.recv() => {
            tracing::debug!(remote = %remote_addr, "connection closed by shutdown");
            Ok(())
        }
    }
}

/// Strips the application URL root from a request path.
///
/// Returns `None` when the path is outside the root.
fn strip_url_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if root.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(root)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Builds a fixed HTML response.
fn html_response(status: StatusCode, body: &'static str) -> HttpResponse {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Builds a response for a resolved static asset.
fn asset_response(asset: &Asset) -> HttpResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, asset.mime())
        .body(Full::new(asset.bytes().clone()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Builds the 404 response.
fn not_found_response() -> HttpResponse {
    html_response(StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetSource;

    struct OneFile;

    impl AssetSource for OneFile {
        fn get(&self, path: &str) -> Option<Asset> {
            (path.trim_start_matches('/') == "index.html")
                .then(|| Asset::new(Bytes::from_static(b"<html>ui</html>"), "text/html; charset=utf-8"))
        }
    }

    fn dispatcher(url_root: &str) -> Dispatcher {
        Dispatcher {
            url_root: url_root.to_string(),
            index_file: "index.html".to_string(),
            mounts: ResourceMounts::new().mount("/", Arc::new(OneFile)),
            routes: Arc::new(RwLock::new(RouteTable::new())),
        }
    }

    #[test]
    fn test_strip_url_root_empty_root() {
        assert_eq!(strip_url_root("/index.html", ""), Some("/index.html"));
    }

    #[test]
    fn test_strip_url_root_exact_match() {
        assert_eq!(strip_url_root("/myapp", "/myapp"), Some("/"));
    }

    #[test]
    fn test_strip_url_root_nested() {
        assert_eq!(strip_url_root("/myapp/js/app.js", "/myapp"), Some("/js/app.js"));
    }

    #[test]
    fn test_strip_url_root_outside_root() {
        assert_eq!(strip_url_root("/other/x", "/myapp"), None);
        // A shared prefix that is not a path boundary does not match.
        assert_eq!(strip_url_root("/myapplication", "/myapp"), None);
    }

    #[test]
    fn test_builder_defaults() {
        let server = EmbeddedServer::builder().build();
        assert_eq!(server.config().url_root(), "");
        assert!(!server.is_shutdown_pending());
    }

    #[test]
    fn test_operations_before_start_fail() {
        let server = EmbeddedServer::builder().build();
        assert!(matches!(server.port(), Err(Error::NotStarted)));
        assert!(matches!(server.stop(), Err(Error::NotStarted)));
        assert!(matches!(
            server.install_shutdown_route("/shutdown"),
            Err(Error::NotStarted)
        ));
    }

    #[test]
    fn test_open_browser_placeholder_before_start_fails() {
        let server = EmbeddedServer::builder().build();
        let result = server.open_browser("http://localhost:%port%/");
        assert!(matches!(result, Err(Error::NotStarted)));
    }

    #[tokio::test]
    async fn test_await_termination_before_start_fails() {
        let mut server = EmbeddedServer::builder().build();
        assert!(matches!(
            server.await_termination().await,
            Err(Error::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_url_root() {
        let mut server = EmbeddedServer::builder().url_root("myapp").build();
        assert!(matches!(
            server.start().await,
            Err(Error::InvalidUrlRoot(_))
        ));
    }

    #[tokio::test]
    async fn test_second_start_fails_and_preserves_state() {
        let mut server = EmbeddedServer::builder().build();
        server.start().await.unwrap();
        let port = server.port().unwrap();

        assert!(matches!(server.start().await, Err(Error::AlreadyStarted)));
        assert_eq!(server.port().unwrap(), port);

        server.stop().unwrap();
        server.await_termination().await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_serves_asset() {
        let d = dispatcher("");
        let response = d
            .dispatch(Method::GET, "/index.html", None, HeaderMap::new())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_dispatch_index_fallback() {
        let d = dispatcher("");
        let response = d.dispatch(Method::GET, "/", None, HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_path_is_404() {
        let d = dispatcher("");
        let response = d
            .dispatch(Method::GET, "/missing.png", None, HeaderMap::new())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_enforces_url_root() {
        let d = dispatcher("/myapp");

        let inside = d
            .dispatch(Method::GET, "/myapp/index.html", None, HeaderMap::new())
            .await;
        assert_eq!(inside.status(), StatusCode::OK);

        let outside = d
            .dispatch(Method::GET, "/index.html", None, HeaderMap::new())
            .await;
        assert_eq!(outside.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_post_does_not_hit_assets() {
        let d = dispatcher("");
        let response = d
            .dispatch(Method::POST, "/index.html", None, HeaderMap::new())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_prefers_route_over_asset() {
        let d = dispatcher("");
        {
            let handler: RouteHandler =
                Arc::new(|_req| Box::pin(async { html_response(StatusCode::OK, "route") }));
            let mut table = d.routes.write().unwrap();
            table.insert("/index.html", handler);
        }

        let response = d
            .dispatch(Method::GET, "/index.html", None, HeaderMap::new())
            .await;
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(body.as_ref(), b"route");
    }
}
