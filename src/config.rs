//! Server and posting configuration

use crate::connection::ReconnectPolicy;
use crate::error::{PostError, Result};

/// Default article size in bytes (750 KiB of raw data per article)
pub const DEFAULT_ARTICLE_SIZE: u64 = 768_000;

/// Default number of concurrent connections
pub const DEFAULT_CONNECTIONS: u32 = 4;

/// Default `X-Newsposter` header value
pub const DEFAULT_PRODUCT: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// NNTP server configuration
///
/// Address and credentials handed to every connection the pool creates.
///
/// # Example
///
/// ```
/// use nntp_poster::ServerConfig;
///
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
/// assert_eq!(config.port, 563);
/// ```
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Server hostname (e.g., "news.example.com")
    pub host: String,

    /// Server port (typically 119 for plain, 563 for TLS)
    pub port: u16,

    /// Use TLS/SSL encryption
    #[cfg_attr(feature = "serde", serde(default = "default_tls"))]
    pub tls: bool,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,
}

#[cfg(feature = "serde")]
fn default_tls() -> bool {
    true
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(
        host: impl Into<String>,
        port: u16,
        tls: bool,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Create a configuration for a TLS connection on the standard secure port (563)
    pub fn tls(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, 563, true, username, password)
    }

    /// Create a configuration for a plain connection on the standard port (119)
    ///
    /// **Warning:** Plain connections transmit credentials in clear text.
    pub fn plain(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, 119, false, username, password)
    }

    /// `host:port` string suitable for socket address resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Run-scoped posting configuration
///
/// Immutable for the duration of a run. The pool owns it; the scheduler and
/// article builder only read from it.
///
/// # Example
///
/// ```
/// use nntp_poster::{PosterConfig, ServerConfig};
///
/// let config = PosterConfig::new(
///     ServerConfig::tls("news.example.com", "user", "pass"),
///     "alt.binaries.test",
///     "poster <poster@example.com>",
/// )
/// .with_connections(8)
/// .with_article_size(500_000);
///
/// assert!(config.validate().is_ok());
/// ```
#[must_use]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PosterConfig {
    /// Server address and credentials
    pub server: ServerConfig,

    /// Number of concurrent connections to open
    #[cfg_attr(feature = "serde", serde(default = "default_connections"))]
    pub connections: u32,

    /// Newsgroup every article is posted to
    pub newsgroup: String,

    /// Sender identity for the `From` header
    pub from: String,

    /// Maximum raw bytes per article
    #[cfg_attr(feature = "serde", serde(default = "default_article_size"))]
    pub article_size: u64,

    /// Product identification for the `X-Newsposter` header
    #[cfg_attr(feature = "serde", serde(default = "default_product"))]
    pub product: String,

    /// Reconnect backoff and abandon policy
    #[cfg_attr(feature = "serde", serde(default))]
    pub reconnect: ReconnectPolicy,
}

#[cfg(feature = "serde")]
fn default_connections() -> u32 {
    DEFAULT_CONNECTIONS
}

#[cfg(feature = "serde")]
fn default_article_size() -> u64 {
    DEFAULT_ARTICLE_SIZE
}

#[cfg(feature = "serde")]
fn default_product() -> String {
    DEFAULT_PRODUCT.to_string()
}

impl PosterConfig {
    /// Create a posting configuration with default connection count and article size
    pub fn new(
        server: ServerConfig,
        newsgroup: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            server,
            connections: DEFAULT_CONNECTIONS,
            newsgroup: newsgroup.into(),
            from: from.into(),
            article_size: DEFAULT_ARTICLE_SIZE,
            product: DEFAULT_PRODUCT.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Set the number of concurrent connections
    pub fn with_connections(mut self, connections: u32) -> Self {
        self.connections = connections;
        self
    }

    /// Set the maximum raw bytes per article
    pub fn with_article_size(mut self, article_size: u64) -> Self {
        self.article_size = article_size;
        self
    }

    /// Set the `X-Newsposter` product string
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Check the configuration before a run starts
    ///
    /// # Errors
    ///
    /// Returns [`PostError::Config`] if the connection count or article size is
    /// zero, or if the newsgroup or sender is empty.
    pub fn validate(&self) -> Result<()> {
        if self.connections == 0 {
            return Err(PostError::Config(
                "At least one connection is required".to_string(),
            ));
        }
        if self.article_size == 0 {
            return Err(PostError::Config(
                "Article size must be greater than zero".to_string(),
            ));
        }
        if self.newsgroup.trim().is_empty() {
            return Err(PostError::Config("Newsgroup must not be empty".to_string()));
        }
        if self.from.trim().is_empty() {
            return Err(PostError::Config("Sender must not be empty".to_string()));
        }
        Ok(())
    }
}
