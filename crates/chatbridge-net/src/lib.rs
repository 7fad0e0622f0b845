//! Byte-connection listeners for chatbridge providers.
//!
//! A [`Listener`] yields [`Incoming`] sockets that turn into
//! [`Connection`]s once their handshake completes. A connection is a stream
//! of inbound frames and a sink for outbound ones. Frames are whole envelopes: one line on
//! byte streams, one text frame on WebSockets.
//!
//! # Feature Flags
//!
//! - `websocket` (default): [`WebSocketListener`] via `tokio-tungstenite`
//! - `tls` (default): TLS for TCP and WebSocket listeners via `tokio-rustls`

#![allow(async_fn_in_trait)]

mod connection;
mod error;
mod incoming;
mod stdio;
mod tcp;
#[cfg(feature = "tls")]
mod tls;
#[cfg(feature = "websocket")]
mod websocket;

pub use connection::{ByteStream, Connection, Inbound, MAX_LINE_LENGTH, Outbound};
pub use error::NetError;
pub use incoming::{DEFAULT_HANDSHAKE_TIMEOUT, Incoming};
pub use stdio::StdioListener;
pub use tcp::TcpLineListener;
#[cfg(feature = "tls")]
pub use tls::{load_tls_config, tls_acceptor};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketListener;

use std::fmt;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts incoming connections.
pub trait Listener: Send + 'static {
    /// Waits for the next peer. Handshakes are left to
    /// [`Incoming::establish`].
    ///
    /// Returns `NetError::Closed` once the listener has nothing more to
    /// give: after `shutdown`, or after its only connection for stdio.
    async fn accept(&mut self) -> Result<Incoming, NetError>;

    /// Stops accepting. Connections already handed out are unaffected.
    async fn shutdown(&mut self) -> Result<(), NetError>;

    /// The bound address, for socket listeners.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}
