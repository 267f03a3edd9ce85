//! Network configuration types for the Nado server.

use std::time::Duration;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 11211;

/// Default cap on a declared request body, 5 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

/// Top-level network configuration for the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Largest body a request may declare. Larger frames are refused before
    /// the body is read.
    pub max_body_size: usize,
    /// How long shutdown waits for in-flight connections.
    pub drain_timeout: Duration,
}

impl NetworkConfig {
    /// `host:port`, ready for `TcpListener::bind`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 11211);
        assert_eq!(config.max_body_size, 5_242_880);
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = NetworkConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..NetworkConfig::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:0");
    }
}
