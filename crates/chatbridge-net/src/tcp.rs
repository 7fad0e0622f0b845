use std::net::SocketAddr;

use tokio::net::TcpListener;
#[cfg(feature = "tls")]
use tokio_rustls::TlsAcceptor;

use crate::{Connection, Incoming, Listener, NetError};

/// Newline-delimited connections over TCP, optionally wrapped in TLS.
pub struct TcpLineListener {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    #[cfg(feature = "tls")]
    tls: Option<TlsAcceptor>,
}

impl TcpLineListener {
    pub async fn bind(addr: &str) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| NetError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(NetError::Accept)?;
        tracing::info!(%local_addr, "TCP listener ready");
        Ok(Self {
            listener: Some(listener),
            local_addr,
            #[cfg(feature = "tls")]
            tls: None,
        })
    }

    /// Requires a TLS handshake on every accepted connection.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }
}

impl Listener for TcpLineListener {
    async fn accept(&mut self) -> Result<Incoming, NetError> {
        let listener = self.listener.as_ref().ok_or(NetError::Closed)?;
        let (stream, addr) = listener.accept().await.map_err(NetError::Accept)?;
        let peer = addr.to_string();

        #[cfg(feature = "tls")]
        if let Some(acceptor) = self.tls.clone() {
            tracing::debug!(%addr, "accepted TCP socket, TLS handshake pending");
            return Ok(Incoming::pending(peer.clone(), async move {
                let stream = acceptor.accept(stream).await.map_err(NetError::Accept)?;
                let conn = Connection::from_stream(peer, stream);
                tracing::debug!(id = %conn.id(), %addr, "accepted TLS connection");
                Ok(conn)
            }));
        }

        let conn = Connection::from_stream(peer, stream);
        tracing::debug!(id = %conn.id(), %addr, "accepted TCP connection");
        Ok(Incoming::ready(conn))
    }

    async fn shutdown(&mut self) -> Result<(), NetError> {
        if self.listener.take().is_some() {
            tracing::info!(local_addr = %self.local_addr, "TCP listener closed");
        }
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}
