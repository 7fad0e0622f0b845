use std::future::Future;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::{Connection, NetError};

/// How long a handshake may take when the caller doesn't say.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// An accepted socket whose handshake has not run yet.
///
/// Listeners hand these out as soon as the peer connects so the accept
/// loop never waits on a slow or silent peer. The TLS handshake and the
/// WebSocket upgrade happen in [`Incoming::establish`], on whatever task
/// owns the connection.
pub struct Incoming {
    peer: String,
    handshake: BoxFuture<'static, Result<Connection, NetError>>,
}

impl Incoming {
    /// A connection with nothing left to negotiate.
    pub fn ready(conn: Connection) -> Self {
        Self {
            peer: conn.peer().to_string(),
            handshake: futures_util::future::ready(Ok(conn)).boxed(),
        }
    }

    /// A connection that becomes usable once `handshake` completes.
    pub fn pending<F>(peer: impl Into<String>, handshake: F) -> Self
    where
        F: Future<Output = Result<Connection, NetError>> + Send + 'static,
    {
        Self {
            peer: peer.into(),
            handshake: handshake.boxed(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Runs the handshake.
    ///
    /// # Errors
    /// `NetError::HandshakeTimeout` if it takes longer than `timeout`, or
    /// whatever the handshake itself failed with.
    pub async fn establish(self, timeout: Duration) -> Result<Connection, NetError> {
        match tokio::time::timeout(timeout, self.handshake).await {
            Ok(result) => result,
            Err(_) => Err(NetError::HandshakeTimeout {
                peer: self.peer,
                timeout,
            }),
        }
    }
}

impl std::fmt::Debug for Incoming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Incoming")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
