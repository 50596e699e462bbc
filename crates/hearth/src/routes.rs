//! Dynamic route registration.
//!
//! Routes are exact-path handlers registered on a running server. The
//! table lives behind a lock shared with the accept loop, so installation
//! and dispatch may overlap freely.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Response};
use http_body_util::Full;

/// Type alias for HTTP response body.
pub type ResponseBody = Full<Bytes>;

/// Type alias for the HTTP response produced by handlers.
pub type HttpResponse = Response<ResponseBody>;

/// Boxed future returned by route handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HttpResponse> + Send>>;

/// A registered route handler.
pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> HandlerFuture + Send + Sync>;

/// The request view passed to route handlers.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
}

impl RouteRequest {
    /// Creates a request view.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>, query: Option<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            path: path.into(),
            query,
            headers,
        }
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path, relative to the application URL root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Looks up a query parameter by name.
    ///
    /// Plain `key=value` splitting, no percent-decoding; a key without a
    /// value yields an empty string. The first occurrence wins.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        let query = self.query.as_deref()?;
        for pair in query.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            if key == name {
                return Some(value);
            }
        }
        None
    }
}

/// Table of exact-path route handlers.
#[derive(Default, Clone)]
pub struct RouteTable {
    routes: HashMap<String, RouteHandler>,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler at the given path (relative to the URL root).
    ///
    /// A later registration at the same path replaces the earlier one.
    pub fn insert(&mut self, path: impl Into<String>, handler: RouteHandler) {
        let path = normalize_route_path(&path.into());
        self.routes.insert(path, handler);
    }

    /// Looks up the handler for a path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<RouteHandler> {
        self.routes.get(&normalize_route_path(path)).cloned()
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        f.debug_struct("RouteTable").field("paths", &paths).finish()
    }
}

/// Normalizes a route path to a single leading slash, no trailing slash.
fn normalize_route_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}
