//! Static asset resolution for the embedded server.
//!
//! The application's client assets (HTML, CSS, JS, images) live in one of
//! two places depending on how the process was launched:
//!
//! - **Filesystem**: a loose directory in the source tree, used when
//!   running from a cargo build tree during development ([`DirAssets`]).
//! - **Packaged**: assets compiled into the executable with `rust-embed`,
//!   used when the application ships as a single binary
//!   ([`BundledAssets`]).
//!
//! Both strategies implement [`AssetSource`] and are selected by a single
//! runtime-detected flag ([`RunMode::detect`]), so each can be tested
//! without starting a server.
//!
//! # Example
//!
//! ```rust,ignore
//! use hearth::{BundledAssets, DirAssets, ResourceMounts, RunMode};
//!
//! #[derive(rust_embed::RustEmbed)]
//! #[folder = "web/"]
//! struct WebAssets;
//!
//! // Loose files during development, compiled-in assets when packaged.
//! let mounts = ResourceMounts::auto::<WebAssets>("web");
//! ```

use std::borrow::Cow;
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use rust_embed::RustEmbed;

/// A resolved static asset: its contents plus a MIME type.
#[derive(Debug, Clone)]
pub struct Asset {
    bytes: Bytes,
    mime: &'static str,
}

impl Asset {
    /// Creates an asset from raw bytes and a MIME type.
    #[must_use]
    pub fn new(bytes: Bytes, mime: &'static str) -> Self {
        Self { bytes, mime }
    }

    /// Returns the asset contents.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Returns the MIME type.
    #[must_use]
    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// Consumes the asset, returning its contents.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// A logical root of static resources.
///
/// Implementations resolve a URL path (relative to the mount point, no
/// leading slash required) to an [`Asset`], or `None` if the path does not
/// exist or is not allowed.
pub trait AssetSource: Send + Sync {
    /// Looks up an asset by relative path.
    fn get(&self, path: &str) -> Option<Asset>;
}

/// How the current process was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Running from a cargo build tree; assets are loose files on disk.
    Filesystem,
    /// Running as a packaged executable; assets are compiled in.
    Packaged,
}

impl RunMode {
    /// Detects the run mode for the current process.
    ///
    /// The process counts as a development run only if the executable
    /// lives under a cargo `target` directory *and* the development asset
    /// directory exists; anything else is treated as packaged.
    #[must_use]
    pub fn detect(dev_root: &Path) -> Self {
        let under_target = std::env::current_exe()
            .map(|exe| exe.components().any(|c| c.as_os_str() == "target"))
            .unwrap_or(false);

        if under_target && dev_root.is_dir() {
            Self::Filesystem
        } else {
            Self::Packaged
        }
    }
}

/// Serves assets from a filesystem directory.
///
/// Rejects parent-directory traversal and hidden path components, and
/// refuses to serve anything that resolves outside the root (symlink
/// escapes).
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    /// Creates a source rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks a relative path for traversal or hidden components.
    fn is_allowed(path: &str) -> bool {
        for component in Path::new(path).components() {
            match component {
                Component::ParentDir => return false,
                Component::Normal(name) => {
                    if name.to_str().is_some_and(|n| n.starts_with('.')) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }
}

impl AssetSource for DirAssets {
    fn get(&self, path: &str) -> Option<Asset> {
        let rel = path.trim_start_matches('/');
        if !Self::is_allowed(rel) {
            tracing::debug!(path = rel, "rejected asset path");
            return None;
        }

        let full = self.root.join(rel);
        let canonical = full.canonicalize().ok()?;
        let canonical_root = self.root.canonicalize().ok()?;
        if !canonical.starts_with(&canonical_root) {
            tracing::debug!(path = rel, "asset path escapes root");
            return None;
        }
        if !canonical.is_file() {
            return None;
        }

        match std::fs::read(&canonical) {
            Ok(data) => Some(Asset::new(Bytes::from(data), mime_for_path(&canonical))),
            Err(e) => {
                tracing::debug!(path = rel, error = %e, "failed to read asset");
                None
            }
        }
    }
}

/// Serves assets compiled into the executable via `rust-embed`.
///
/// The embedding application derives `RustEmbed` for its asset folder and
/// passes the type here; the folder contents are then available from the
/// packaged binary with no files on disk.
pub struct BundledAssets<A> {
    _marker: PhantomData<fn() -> A>,
}

impl<A> BundledAssets<A>
where
    A: RustEmbed + 'static,
{
    /// Creates a source backed by the embedded asset type.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<A> Default for BundledAssets<A>
where
    A: RustEmbed + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for BundledAssets<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundledAssets").finish()
    }
}

impl<A> AssetSource for BundledAssets<A>
where
    A: RustEmbed + 'static,
{
    fn get(&self, path: &str) -> Option<Asset> {
        let rel = path.trim_start_matches('/');
        let file = A::get(rel)?;
        let bytes = match file.data {
            Cow::Borrowed(b) => Bytes::from_static(b),
            Cow::Owned(v) => Bytes::from(v),
        };
        Some(Asset::new(bytes, mime_for_path(Path::new(rel))))
    }
}

/// An ordered table of mount points to asset sources.
///
/// Lookup tries mounts from the most specific prefix down; a mount whose
/// source has no match does not shadow a later mount at the same or a
/// shorter prefix, so sources can be layered.
#[derive(Clone, Default)]
pub struct ResourceMounts {
    mounts: Vec<(String, Arc<dyn AssetSource>)>,
}

impl ResourceMounts {
    /// Creates an empty mount table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the standard single-root layout, selecting the strategy by
    /// [`RunMode::detect`]: loose files from `dev_root` in development,
    /// the embedded asset type `A` when packaged.
    #[must_use]
    pub fn auto<A>(dev_root: impl Into<PathBuf>) -> Self
    where
        A: RustEmbed + 'static,
    {
        let dev_root = dev_root.into();
        let mode = RunMode::detect(&dev_root);
        tracing::info!(?mode, dev_root = %dev_root.display(), "selected asset strategy");
        match mode {
            RunMode::Filesystem => Self::new().mount("/", Arc::new(DirAssets::new(dev_root))),
            RunMode::Packaged => Self::new().mount("/", Arc::new(BundledAssets::<A>::new())),
        }
    }

    /// Adds a mount at the given URL prefix.
    #[must_use]
    pub fn mount(mut self, prefix: impl Into<String>, source: Arc<dyn AssetSource>) -> Self {
        let prefix = normalize_prefix(&prefix.into());
        self.mounts.push((prefix, source));
        // Most specific prefix first; insertion order breaks ties.
        self.mounts
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Returns the number of mounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Returns `true` if no mounts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Resolves a URL path against the mounts.
    ///
    /// Directory-style paths (empty, trailing slash, or no extension in
    /// the last segment) fall back to the given index file.
    #[must_use]
    pub fn resolve(&self, path: &str, index: &str) -> Option<Asset> {
        let path = path.trim_start_matches('/');

        for (prefix, source) in &self.mounts {
            let rel = match strip_prefix(path, prefix) {
                Some(rel) => rel,
                None => continue,
            };

            if !rel.is_empty() && !rel.ends_with('/') {
                if let Some(asset) = source.get(rel) {
                    return Some(asset);
                }
            }
            if wants_index(rel) {
                let with_index = if rel.is_empty() {
                    index.to_string()
                } else {
                    format!("{}/{}", rel.trim_end_matches('/'), index)
                };
                if let Some(asset) = source.get(&with_index) {
                    return Some(asset);
                }
            }
        }

        None
    }
}

impl std::fmt::Debug for ResourceMounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<&str> = self.mounts.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("ResourceMounts")
            .field("mounts", &prefixes)
            .finish()
    }
}

/// Normalizes a mount prefix to no leading or trailing slash ("" = root).
fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}

/// Strips a mount prefix from a path, returning the remainder.
fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

/// Whether a path should fall back to the directory index.
fn wants_index(rel: &str) -> bool {
    if rel.is_empty() || rel.ends_with('/') {
        return true;
    }
    let last = rel.rsplit('/').next().unwrap_or(rel);
    !last.contains('.')
}

/// Maps a file extension to a MIME type.
#[must_use]
pub fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        // Text
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",

        // Fonts
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",

        // Media
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",

        // Web
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "webmanifest" | "manifest" => "application/manifest+json",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    /// In-memory source for mount-table tests.
    struct MapSource(HashMap<&'static str, &'static str>);

    impl AssetSource for MapSource {
        fn get(&self, path: &str) -> Option<Asset> {
            self.0
                .get(path.trim_start_matches('/'))
                .map(|body| Asset::new(Bytes::from_static(body.as_bytes()), "text/plain"))
        }
    }

    fn map_source(entries: &[(&'static str, &'static str)]) -> Arc<dyn AssetSource> {
        Arc::new(MapSource(entries.iter().copied().collect()))
    }

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(
            mime_for_path(Path::new("index.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(mime_for_path(Path::new("app.js")), "text/javascript; charset=utf-8");
        assert_eq!(mime_for_path(Path::new("img/logo.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("data.bin")), "application/octet-stream");
        assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_dir_assets_serves_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "index.html", "<html>hi</html>");

        let source = DirAssets::new(dir.path());
        let asset = source.get("index.html").expect("file should resolve");
        assert_eq!(asset.bytes().as_ref(), b"<html>hi</html>");
        assert_eq!(asset.mime(), "text/html; charset=utf-8");
    }

    #[test]
    fn test_dir_assets_nested_and_leading_slash() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "js/app.js", "console.log(1)");

        let source = DirAssets::new(dir.path());
        assert!(source.get("js/app.js").is_some());
        assert!(source.get("/js/app.js").is_some());
    }

    #[test]
    fn test_dir_assets_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "index.html", "x");

        let source = DirAssets::new(dir.path().join("sub"));
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        assert!(source.get("../index.html").is_none());
    }

    #[test]
    fn test_dir_assets_rejects_hidden() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), ".secret", "x");

        let source = DirAssets::new(dir.path());
        assert!(source.get(".secret").is_none());
    }

    #[test]
    fn test_dir_assets_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirAssets::new(dir.path());
        assert!(source.get("nope.html").is_none());
    }

    #[test]
    fn test_run_mode_detect_filesystem() {
        // Tests run from the cargo target tree, so an existing directory
        // selects the filesystem strategy.
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(RunMode::detect(dir.path()), RunMode::Filesystem);
    }

    #[test]
    fn test_run_mode_detect_packaged_when_dir_missing() {
        let missing = Path::new("/definitely/not/a/real/asset/dir");
        assert_eq!(RunMode::detect(missing), RunMode::Packaged);
    }

    #[test]
    fn test_mounts_root_lookup() {
        let mounts =
            ResourceMounts::new().mount("/", map_source(&[("index.html", "root index")]));

        let asset = mounts.resolve("/index.html", "index.html").unwrap();
        assert_eq!(asset.bytes().as_ref(), b"root index");
    }

    #[test]
    fn test_mounts_index_fallback() {
        let mounts = ResourceMounts::new().mount(
            "/",
            map_source(&[("index.html", "root"), ("sub/index.html", "sub")]),
        );

        assert_eq!(
            mounts.resolve("/", "index.html").unwrap().bytes().as_ref(),
            b"root"
        );
        assert_eq!(
            mounts.resolve("/sub/", "index.html").unwrap().bytes().as_ref(),
            b"sub"
        );
        // No trailing slash, no extension: still a directory request.
        assert_eq!(
            mounts.resolve("/sub", "index.html").unwrap().bytes().as_ref(),
            b"sub"
        );
    }

    #[test]
    fn test_mounts_longest_prefix_wins() {
        let mounts = ResourceMounts::new()
            .mount("/", map_source(&[("app/a.txt", "outer")]))
            .mount("/app", map_source(&[("a.txt", "inner")]));

        let asset = mounts.resolve("/app/a.txt", "index.html").unwrap();
        assert_eq!(asset.bytes().as_ref(), b"inner");
    }

    #[test]
    fn test_mounts_layering_falls_through() {
        // A mount that misses does not shadow a broader one.
        let mounts = ResourceMounts::new()
            .mount("/app", map_source(&[("only.txt", "inner")]))
            .mount("/", map_source(&[("app/other.txt", "outer")]));

        let asset = mounts.resolve("/app/other.txt", "index.html").unwrap();
        assert_eq!(asset.bytes().as_ref(), b"outer");
    }

    #[test]
    fn test_mounts_miss_returns_none() {
        let mounts = ResourceMounts::new().mount("/", map_source(&[]));
        assert!(mounts.resolve("/missing.png", "index.html").is_none());
    }
}
