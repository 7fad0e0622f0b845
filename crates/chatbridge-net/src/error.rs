use std::io;
use std::time::Duration;

/// Errors raised by listeners and connections.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The listen address could not be bound.
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Accepting a connection or completing its handshake failed.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// Reading from a connection failed.
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),

    /// Writing to a connection failed.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// The peer did not finish its TLS or WebSocket handshake in time.
    #[error("handshake with {peer} timed out after {timeout:?}")]
    HandshakeTimeout { peer: String, timeout: Duration },

    /// Certificate or key loading, or TLS configuration.
    #[error("tls: {0}")]
    Tls(String),

    /// The listener or connection is closed.
    #[error("closed")]
    Closed,
}

impl NetError {
    pub(crate) fn recv(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Recv(io::Error::new(io::ErrorKind::ConnectionReset, err))
    }

    pub(crate) fn send(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Send(io::Error::new(io::ErrorKind::BrokenPipe, err))
    }
}
