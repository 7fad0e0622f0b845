use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt, future};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::{ConnectionId, NetError};

/// Longest line a byte-stream connection accepts.
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Inbound frames of a connection. Ends when the peer closes.
pub type Inbound = BoxStream<'static, Result<Vec<u8>, NetError>>;

/// Outbound frames of a connection.
pub type Outbound = Pin<Box<dyn Sink<Vec<u8>, Error = NetError> + Send>>;

/// A duplex byte stream a listener can frame: plain TCP or TLS over it.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// One accepted connection.
pub struct Connection {
    id: ConnectionId,
    peer: String,
    inbound: Inbound,
    outbound: Outbound,
}

impl Connection {
    /// Wraps framed halves, assigning the next connection ID.
    pub fn new(peer: impl Into<String>, inbound: Inbound, outbound: Outbound) -> Self {
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            peer: peer.into(),
            inbound,
            outbound,
        }
    }

    /// Frames a reader and writer as newline-delimited text.
    pub fn lines<R, W>(peer: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let inbound = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH))
            .map(|line| line.map(String::into_bytes).map_err(NetError::recv))
            .boxed();
        let framed = FramedWrite::new(writer, LinesCodec::new());
        let outbound = SinkExt::<String>::sink_map_err(framed, NetError::send)
            .with(|bytes: Vec<u8>| future::ready(String::from_utf8(bytes).map_err(NetError::send)));
        Self::new(peer, inbound, Box::pin(outbound))
    }

    /// Frames a duplex stream as newline-delimited text.
    pub fn from_stream<S: ByteStream>(peer: impl Into<String>, stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::lines(peer, reader, writer)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The remote address, or a label for non-socket connections.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Receives the next frame. `Ok(None)` when the peer has closed.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, NetError> {
        self.inbound.next().await.transpose()
    }

    pub async fn send(&mut self, data: Vec<u8>) -> Result<(), NetError> {
        self.outbound.send(data).await
    }

    /// Flushes and closes the outbound half.
    pub async fn close(&mut self) -> Result<(), NetError> {
        self.outbound.close().await
    }

    /// Splits into ID, inbound and outbound halves so they can be driven
    /// by different tasks.
    pub fn into_parts(self) -> (ConnectionId, Inbound, Outbound) {
        (self.id, self.inbound, self.outbound)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
