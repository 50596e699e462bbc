//! # Hearth
//!
//! An embedded localhost web server for desktop-style applications that
//! present their UI in a browser, with no separate deployment step.
//!
//! Hearth handles the details of running an in-process HTTP server for an
//! application that ships as a single binary:
//!
//! - Binds `127.0.0.1` on an OS-assigned ephemeral port
//! - Serves static client assets from loose files when running from a
//!   cargo build tree, or from assets compiled into the executable when
//!   packaged
//! - Lets the application register native route handlers after start
//! - Installs an HTTP-triggered self-shutdown endpoint with a cancellable
//!   delayed stop, so a browser page can stop the application when it is
//!   closed (and un-stop it on a reload)
//! - Opens the system browser on the application URL, substituting the
//!   assigned port for a `%port%` placeholder
//! - Creates a recognizable temporary working directory and removes it at
//!   clean termination
//!
//! ## Example
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
//!     // Start the server on an OS-assigned port.
//!     server.start().await?;
//!
//!     // Stop the application when the browser GETs /myapp/shutdown.
//!     server.install_shutdown_route("/shutdown")?;
//!
//!     // Open a browser window (or tab) on the application root.
//!     server.open_browser("http://localhost:%port%/myapp/")?;
//!
//!     // Park here until the shutdown endpoint stops the server.
//!     server.await_termination().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/hearth/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod assets;
pub mod browser;
pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod workdir;

pub use assets::{Asset, AssetSource, BundledAssets, DirAssets, ResourceMounts, RunMode};
pub use browser::PORT_PLACEHOLDER;
pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{Error, Result};
pub use routes::{HttpResponse, RouteRequest};
pub use server::{EmbeddedServer, EmbeddedServerBuilder};
pub use shutdown::{PendingShutdown, ShutdownSignal};
