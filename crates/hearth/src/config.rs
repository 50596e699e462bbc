//! Server configuration types.
//!
//! Configuration uses the builder pattern for ergonomic construction.
//!
//! # Example
//!
//! ```rust
//! use hearth::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .url_root("/myapp")
//!     .shutdown_delay(Duration::from_secs(2))
//!     .build();
//!
//! assert_eq!(config.url_root(), "/myapp");
//! ```

use std::time::Duration;

use crate::error::{Error, Result};

/// Default delay between a shutdown request and the actual stop.
///
/// The delay exists so the shutdown endpoint's HTTP response can flush to
/// the client before the server goes away.
pub const DEFAULT_SHUTDOWN_DELAY: Duration = Duration::from_secs(2);

/// Default time to wait for in-flight connections after the stop signal.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default prefix for the server's temporary working directory.
pub const DEFAULT_WORKDIR_PREFIX: &str = "hearth-app-";

/// Default index file served for directory requests.
pub const DEFAULT_INDEX_FILE: &str = "index.html";

/// Configuration for an [`EmbeddedServer`](crate::EmbeddedServer).
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Application URL root ("" or "/myapp"); all routes and assets are
    /// served under this prefix.
    url_root: String,

    /// Delay between a shutdown request and the stop signal.
    shutdown_delay: Duration,

    /// How long to wait for in-flight connections after the stop signal.
    drain_timeout: Duration,

    /// Prefix for the temporary working directory.
    workdir_prefix: String,

    /// Index file served for directory requests.
    index_file: String,
}

impl ServerConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the application URL root.
    #[must_use]
    pub fn url_root(&self) -> &str {
        &self.url_root
    }

    /// Returns the shutdown delay.
    #[must_use]
    pub fn shutdown_delay(&self) -> Duration {
        self.shutdown_delay
    }

    /// Returns the connection drain timeout.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Returns the working-directory prefix.
    #[must_use]
    pub fn workdir_prefix(&self) -> &str {
        &self.workdir_prefix
    }

    /// Returns the index file name.
    #[must_use]
    pub fn index_file(&self) -> &str {
        &self.index_file
    }

    /// Validates the configured URL root.
    ///
    /// The root must be empty, or start with `/` and not end with `/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrlRoot`] if the root is malformed.
    pub fn validate(&self) -> Result<()> {
        let root = &self.url_root;
        if root.is_empty() {
            return Ok(());
        }
        if root.starts_with('/') && !root.ends_with('/') {
            return Ok(());
        }
        Err(Error::InvalidUrlRoot(root.clone()))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    url_root: Option<String>,
    shutdown_delay: Option<Duration>,
    drain_timeout: Option<Duration>,
    workdir_prefix: Option<String>,
    index_file: Option<String>,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application URL root.
    ///
    /// Must be empty (serve at `/`), or start with `/` and not end with
    /// `/` (e.g. `"/myapp"`). Validated when the server starts.
    #[must_use]
    pub fn url_root(mut self, root: impl Into<String>) -> Self {
        self.url_root = Some(root.into());
        self
    }

    /// Sets the delay between a shutdown request and the actual stop.
    #[must_use]
    pub fn shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = Some(delay);
        self
    }

    /// Sets how long to wait for in-flight connections after the stop
    /// signal.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    /// Sets the prefix used for the temporary working directory.
    #[must_use]
    pub fn workdir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.workdir_prefix = Some(prefix.into());
        self
    }

    /// Sets the index file served for directory requests.
    #[must_use]
    pub fn index_file(mut self, name: impl Into<String>) -> Self {
        self.index_file = Some(name.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            url_root: self.url_root.unwrap_or_default(),
            shutdown_delay: self.shutdown_delay.unwrap_or(DEFAULT_SHUTDOWN_DELAY),
            drain_timeout: self.drain_timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT),
            workdir_prefix: self
                .workdir_prefix
                .unwrap_or_else(|| DEFAULT_WORKDIR_PREFIX.to_string()),
            index_file: self
                .index_file
                .unwrap_or_else(|| DEFAULT_INDEX_FILE.to_string()),
        }
    }
}
