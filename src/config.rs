//! Session configuration.
//!
//! The flexible construction surface of typical STOMP clients (positional
//! arguments, option objects, field aliases, boolean-or-object TLS) is
//! normalized here into one canonical [`SessionConfig`] before anything
//! reaches the protocol engine.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use stomp_session::SessionConfig;
//!
//! let config = SessionConfig::builder()
//!     .address("broker.example.net")
//!     .port(61614)
//!     .credentials("user", "secret")
//!     .protocol_version("1.1")
//!     .vhost("/prod")
//!     .reconnect(5, Duration::from_millis(500))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.version.as_str(), "1.1");
//! ```

use std::time::Duration;

use crate::error::{Result, StompError};
use crate::protocol::ProtocolVersion;

/// Default broker address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";

/// Default broker port.
pub const DEFAULT_PORT: u16 = 61613;

/// Reconnection policy: linear backoff, `attempt * delay` per retry
/// (zero delay on the very first retry).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum reconnect attempts before surfacing a fatal error.
    pub retries: u32,
    /// Backoff delay unit.
    pub delay: Duration,
}

/// TLS transport options.
///
/// `TlsOptions::default()` uses the webpki root store and the broker address
/// as the certificate server name.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Server name to present for SNI and certificate verification;
    /// defaults to the broker address.
    pub server_name: Option<String>,
}

/// Canonical, fully-normalized session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker address.
    pub address: String,
    /// Broker port.
    pub port: u16,
    /// `login` header of the CONNECT frame.
    pub login: String,
    /// `passcode` header of the CONNECT frame.
    pub passcode: String,
    /// Negotiated protocol version.
    pub version: ProtocolVersion,
    /// Virtual host, honored only on 1.1.
    pub vhost: Option<String>,
    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,
    /// TLS configuration; `None` means plain TCP.
    pub tls: Option<TlsOptions>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            login: String::new(),
            passcode: String::new(),
            version: ProtocolVersion::default(),
            vhost: None,
            reconnect: ReconnectPolicy::default(),
            tls: None,
        }
    }
}

impl SessionConfig {
    /// Start building a configuration.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }
}

/// Fluent builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
    version: Option<String>,
}

impl SessionConfigBuilder {
    /// Create a builder with documented defaults.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            version: None,
        }
    }

    /// Broker address (default `127.0.0.1`).
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Broker port (default `61613`).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Login and passcode sent on CONNECT (default empty).
    pub fn credentials(mut self, login: impl Into<String>, passcode: impl Into<String>) -> Self {
        self.config.login = login.into();
        self.config.passcode = passcode.into();
        self
    }

    /// Protocol version string (default `1.0`; only `1.0`/`1.1` accepted).
    ///
    /// Any other value fails [`build`](Self::build).
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Virtual host, sent as the `host` header on 1.1 connections.
    pub fn vhost(mut self, vhost: impl Into<String>) -> Self {
        self.config.vhost = Some(vhost.into());
        self
    }

    /// Reconnection policy.
    pub fn reconnect(mut self, retries: u32, delay: Duration) -> Self {
        self.config.reconnect = ReconnectPolicy { retries, delay };
        self
    }

    /// Enable TLS with default options.
    pub fn tls(mut self) -> Self {
        self.config.tls = Some(TlsOptions::default());
        self
    }

    /// Enable TLS with detailed options.
    pub fn tls_options(mut self, options: TlsOptions) -> Self {
        self.config.tls = Some(options);
        self
    }

    /// Finish, validating the protocol version.
    pub fn build(mut self) -> Result<SessionConfig> {
        if let Some(version) = self.version {
            self.config.version = version.parse()?;
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::builder().build().unwrap();

        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 61613);
        assert_eq!(config.login, "");
        assert_eq!(config.passcode, "");
        assert_eq!(config.version, ProtocolVersion::V1_0);
        assert!(config.vhost.is_none());
        assert_eq!(config.reconnect.retries, 0);
        assert!(config.tls.is_none());
    }

    #[test]
    fn test_full_construction() {
        let config = SessionConfig::builder()
            .address("test.host.net")
            .port(1234)
            .credentials("uname", "pw")
            .protocol_version("1.1")
            .vhost("q1.host.net")
            .reconnect(10, Duration::from_secs(1))
            .build()
            .unwrap();

        assert_eq!(config.address, "test.host.net");
        assert_eq!(config.port, 1234);
        assert_eq!(config.login, "uname");
        assert_eq!(config.passcode, "pw");
        assert_eq!(config.version, ProtocolVersion::V1_1);
        assert_eq!(config.vhost.as_deref(), Some("q1.host.net"));
        assert_eq!(config.reconnect.retries, 10);
        assert_eq!(config.reconnect.delay, Duration::from_secs(1));
    }

    #[test]
    fn test_unsupported_version_fails_construction() {
        let err = SessionConfig::builder()
            .protocol_version("1.2")
            .build()
            .unwrap_err();

        assert!(matches!(err, StompError::UnsupportedVersion(v) if v == "1.2"));
    }

    #[test]
    fn test_tls_boolean_style_and_options_style() {
        let config = SessionConfig::builder().tls().build().unwrap();
        let options = config.tls.expect("tls enabled");
        assert!(options.server_name.is_none());

        let config = SessionConfig::builder()
            .tls_options(TlsOptions {
                server_name: Some("secure.host.net".into()),
            })
            .build()
            .unwrap();
        assert_eq!(
            config.tls.unwrap().server_name.as_deref(),
            Some("secure.host.net")
        );
    }
}
