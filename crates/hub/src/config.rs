// Hub server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. CORS keeps its own env var (see cors.rs) — this module
// covers the core server settings.

use std::net::SocketAddr;

/// Core hub server configuration.
///
/// Constructed via [`HubConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Log filter directive (e.g. `info`, `coedit_hub=debug`).
    pub log_filter: String,
}

impl HubConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `COEDIT_HUB_HOST` | `0.0.0.0` |
    /// | `COEDIT_HUB_PORT` | `8000` |
    /// | `COEDIT_HUB_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("COEDIT_HUB_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("COEDIT_HUB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let log_filter = env("COEDIT_HUB_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self { listen_addr, log_filter }
    }
}
