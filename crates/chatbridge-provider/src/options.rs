//! Provider configuration and listen-address parsing.

use std::path::PathBuf;
use std::time::Duration;

use chatbridge_net::DEFAULT_HANDSHAKE_TIMEOUT;
use serde::Deserialize;
use url::Url;

use crate::ProviderError;

/// How a provider is served.
///
/// ```rust
/// use chatbridge_provider::{ListenAddr, ProviderOptions};
///
/// let opts = ProviderOptions {
///     addr: "ws://127.0.0.1:9000/chat".into(),
///     ..ProviderOptions::default()
/// };
/// assert!(matches!(opts.validate().unwrap(), ListenAddr::WebSocket { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Empty or `-` for stdio, `ws://` or `wss://` for WebSocket,
    /// otherwise a TCP `host:port`.
    pub addr: String,
    /// Required from every connection via `provider-auth` when set.
    pub password: String,
    /// Concurrent connections allowed. 0 is treated as 1.
    pub max_conns: usize,
    /// The first connection sets the password (or skips auth and locks
    /// the others out).
    pub auto_password: bool,
    /// Stop accepting and close the service when the last connection
    /// closes.
    pub auto_exit: bool,
    pub cert_path: Option<PathBuf>,
    pub private_key_path: Option<PathBuf>,
    /// Seconds a peer gets to finish its TLS or WebSocket handshake.
    /// 0 uses the default.
    pub handshake_timeout_secs: u64,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            addr: String::new(),
            password: String::new(),
            max_conns: 1,
            auto_password: false,
            auto_exit: true,
            cert_path: None,
            private_key_path: None,
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
        }
    }
}

impl ProviderOptions {
    pub fn use_tls(&self) -> bool {
        self.cert_path.is_some() || self.private_key_path.is_some()
    }

    /// The effective connection cap.
    pub fn max_conns(&self) -> usize {
        self.max_conns.max(1)
    }

    pub fn handshake_timeout(&self) -> Duration {
        match self.handshake_timeout_secs {
            0 => DEFAULT_HANDSHAKE_TIMEOUT,
            secs => Duration::from_secs(secs),
        }
    }

    /// Both TLS paths, when configured.
    pub fn tls_paths(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.cert_path.as_ref().zip(self.private_key_path.as_ref())
    }

    /// Checks the options and parses the listen address.
    ///
    /// # Errors
    /// `ProviderError::Config` for a lone certificate or key, TLS with
    /// stdio, `ws://` with TLS, `wss://` without it, an unknown scheme or
    /// an unparseable WebSocket URL.
    pub fn validate(&self) -> Result<ListenAddr, ProviderError> {
        if self.cert_path.is_some() != self.private_key_path.is_some() {
            return Err(ProviderError::Config(
                "certificate and private key must be given together".into(),
            ));
        }
        let addr = ListenAddr::parse(&self.addr)?;
        match &addr {
            ListenAddr::Stdio if self.use_tls() => Err(ProviderError::Config(
                "do not use cert/privkey with standard I/O".into(),
            )),
            ListenAddr::WebSocket { secure: false, .. } if self.use_tls() => {
                Err(ProviderError::Config("expected wss:// url".into()))
            }
            ListenAddr::WebSocket { secure: true, .. } if !self.use_tls() => Err(
                ProviderError::Config("expected cert and private key for wss://".into()),
            ),
            _ => Ok(addr),
        }
    }
}

// ---------------------------------------------------------------------------
// ListenAddr
// ---------------------------------------------------------------------------

/// Where a provider listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Stdio,
    /// Newline-delimited TCP, TLS when configured.
    Tcp { addr: String },
    /// `host` is `host:port`; `path` is the upgrade path.
    WebSocket {
        host: String,
        path: String,
        secure: bool,
    },
}

impl ListenAddr {
    pub fn parse(addr: &str) -> Result<Self, ProviderError> {
        if addr.is_empty() || addr == "-" {
            return Ok(Self::Stdio);
        }
        if addr.starts_with("ws:") || addr.starts_with("wss:") {
            return Self::parse_ws(addr);
        }
        if let Some((scheme, _)) = addr.split_once("://") {
            return Err(ProviderError::Config(format!(
                "unsupported address scheme: {scheme}"
            )));
        }
        Ok(Self::Tcp {
            addr: addr.to_string(),
        })
    }

    fn parse_ws(addr: &str) -> Result<Self, ProviderError> {
        let url = Url::parse(addr)
            .map_err(|e| ProviderError::Config(format!("invalid websocket addr {addr}: {e}")))?;
        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            _ => return Err(ProviderError::Config("not a valid websocket addr".into())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| ProviderError::Config(format!("websocket addr has no host: {addr}")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProviderError::Config(format!("websocket addr has no port: {addr}")))?;
        Ok(Self::WebSocket {
            host: format!("{host}:{port}"),
            path: url.path().to_string(),
            secure,
        })
    }
}
