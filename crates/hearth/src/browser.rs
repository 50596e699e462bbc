//! Opening the application UI in the system browser.
//!
//! A one-shot, fire-and-forget dispatch to the OS "open URL" facility.
//! URLs may contain the literal `%port%` placeholder, which the server
//! substitutes with its assigned port before launching.

/// Placeholder substituted with the server's listening port.
pub const PORT_PLACEHOLDER: &str = "%port%";

/// Replaces every occurrence of [`PORT_PLACEHOLDER`] in `url` with `port`.
#[must_use]
pub fn substitute_port(url: &str, port: u16) -> String {
    url.replace(PORT_PLACEHOLDER, &port.to_string())
}

/// Opens the default browser on `url`.
///
/// Which browser, and whether a new window or tab appears, is up to the
/// OS. Launch failures are logged, not returned; there is no retry.
pub fn launch(url: &str) {
    tracing::info!(url, "opening browser");
    if let Err(e) = open::that_detached(url) {
        tracing::warn!(url, error = %e, "failed to open browser");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_port() {
        assert_eq!(
            substitute_port("http://localhost:%port%/myapp", 8123),
            "http://localhost:8123/myapp"
        );
    }

    #[test]
    fn test_substitute_port_no_placeholder() {
        assert_eq!(
            substitute_port("http://localhost:9000/", 8123),
            "http://localhost:9000/"
        );
    }

    #[test]
    fn test_substitute_port_multiple_occurrences() {
        assert_eq!(
            substitute_port("%port%:%port%", 80),
            "80:80"
        );
    }
}
