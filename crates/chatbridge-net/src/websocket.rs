//! WebSocket listener using `tokio-tungstenite`. One text frame per envelope.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt, future, stream};
use tokio::net::TcpListener;
#[cfg(feature = "tls")]
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::{ByteStream, Connection, Incoming, Listener, NetError};

/// Accepts WebSocket upgrades on one path.
///
/// The upgrade itself runs in [`Incoming::establish`].
///
/// A path ending in `/` accepts any request path under it; otherwise the
/// request path must match exactly. Other paths get a 404.
pub struct WebSocketListener {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    path: String,
    #[cfg(feature = "tls")]
    tls: Option<TlsAcceptor>,
}

impl WebSocketListener {
    /// Binds `addr` (`host:port`) and accepts upgrades on `path`. An empty
    /// path means `/`.
    pub async fn bind(addr: &str, path: &str) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| NetError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(NetError::Accept)?;
        let path = if path.is_empty() { "/" } else { path };
        tracing::info!(%local_addr, path, "WebSocket listener ready");
        Ok(Self {
            listener: Some(listener),
            local_addr,
            path: path.to_string(),
            #[cfg(feature = "tls")]
            tls: None,
        })
    }

    /// Serves `wss://`: a TLS handshake precedes every upgrade.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern.ends_with('/') {
        path.starts_with(pattern)
    } else {
        path == pattern
    }
}

async fn upgrade<S: ByteStream>(
    stream: S,
    peer: String,
    pattern: &str,
) -> Result<Connection, NetError> {
    let check = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if path_matches(pattern, req.uri().path()) {
            Ok(resp)
        } else {
            let mut err = ErrorResponse::new(Some("Not Found".to_string()));
            *err.status_mut() = StatusCode::NOT_FOUND;
            Err(err)
        }
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, check)
        .await
        .map_err(|e| {
            NetError::Accept(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

    let (sink, source) = ws.split();

    let inbound = stream::unfold(source, |mut source| async move {
        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some((Ok(text.as_bytes().to_vec()), source));
                }
                Some(Ok(Message::Binary(data))) => return Some((Ok(data.to_vec()), source)),
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => return Some((Err(NetError::recv(e)), source)),
            }
        }
    })
    .boxed();

    let outbound = sink.sink_map_err(NetError::send).with(|bytes: Vec<u8>| {
        future::ready(
            String::from_utf8(bytes)
                .map(Message::text)
                .map_err(NetError::send),
        )
    });

    Ok(Connection::new(peer, inbound, Box::pin(outbound)))
}

impl Listener for WebSocketListener {
    async fn accept(&mut self) -> Result<Incoming, NetError> {
        let listener = self.listener.as_ref().ok_or(NetError::Closed)?;
        let (stream, addr) = listener.accept().await.map_err(NetError::Accept)?;
        let peer = addr.to_string();
        let path = self.path.clone();

        #[cfg(feature = "tls")]
        if let Some(acceptor) = self.tls.clone() {
            return Ok(Incoming::pending(peer.clone(), async move {
                let stream = acceptor.accept(stream).await.map_err(NetError::Accept)?;
                let conn = upgrade(stream, peer, &path).await?;
                tracing::debug!(id = %conn.id(), %addr, "accepted secure WebSocket connection");
                Ok(conn)
            }));
        }

        Ok(Incoming::pending(peer.clone(), async move {
            let conn = upgrade(stream, peer, &path).await?;
            tracing::debug!(id = %conn.id(), %addr, "accepted WebSocket connection");
            Ok(conn)
        }))
    }

    async fn shutdown(&mut self) -> Result<(), NetError> {
        if self.listener.take().is_some() {
            tracing::info!(local_addr = %self.local_addr, "WebSocket listener closed");
        }
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matches_exact() {
        assert!(path_matches("/chat", "/chat"));
        assert!(!path_matches("/chat", "/chat/x"));
        assert!(!path_matches("/chat", "/other"));
    }

    #[test]
    fn test_path_matches_subtree() {
        assert!(path_matches("/", "/anything"));
        assert!(path_matches("/chat/", "/chat/room"));
        assert!(!path_matches("/chat/", "/chat"));
    }
}
