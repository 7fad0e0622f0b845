//! Single-sink transport backed by a bounded queue.

use std::sync::{Mutex, PoisonError, RwLock};

use chatbridge_protocol::{Codec, Envelope, JsonCodec, Msg};
use futures_util::{Sink, SinkExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::{DEFAULT_PROTOCOL, Transport, TransportError};

/// Envelopes a stream transport buffers before publishes start failing.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Encodes each publish as a `{"node", "payload"}` envelope and queues the
/// bytes for one writer.
///
/// A full or closed queue fails the publish immediately. Dropping or
/// closing the transport ends the writer once the queue drains.
pub struct StreamTransport {
    protocol: RwLock<String>,
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl StreamTransport {
    /// A transport and the receiving end of its queue. Each item is one
    /// encoded envelope without a trailing newline.
    pub fn new(protocol: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let tp = Self {
            protocol: RwLock::new(protocol.into()),
            tx: Mutex::new(Some(tx)),
        };
        (tp, rx)
    }

    /// Spawns a writer task that forwards each envelope into `sink`.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn_sink<S, E>(
        protocol: impl Into<String>,
        sink: S,
    ) -> (Self, JoinHandle<Result<(), TransportError>>)
    where
        S: Sink<Vec<u8>, Error = E> + Send + Unpin + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
    {
        let (tp, rx) = Self::new(protocol, DEFAULT_QUEUE_CAPACITY);
        let handle = tokio::spawn(forward_to_sink(rx, sink));
        (tp, handle)
    }

    /// Spawns a writer task that writes newline-delimited envelopes to
    /// `writer` (stdout, a socket's write half).
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn_writer<W>(
        protocol: impl Into<String>,
        writer: W,
    ) -> (Self, JoinHandle<Result<(), TransportError>>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tp, rx) = Self::new(protocol, DEFAULT_QUEUE_CAPACITY);
        let handle = tokio::spawn(write_lines(rx, writer));
        (tp, handle)
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(|tx| tx.is_closed())
    }
}

impl Transport for StreamTransport {
    fn protocol(&self) -> String {
        self.protocol
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn advertise(&self) -> Result<(), TransportError> {
        let mut protocol = self.protocol.write().unwrap_or_else(PoisonError::into_inner);
        if protocol.is_empty() {
            *protocol = DEFAULT_PROTOCOL.to_string();
        }
        Ok(())
    }

    fn publish(
        &self,
        _network: &str,
        _chat: &str,
        node: &str,
        payload: &Msg,
    ) -> Result<(), TransportError> {
        let bytes = JsonCodec.encode(&Envelope::new(node, payload))?;

        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(TransportError::Closed);
        };
        tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => {
                tracing::warn!(node, "outbound queue full, dropping message");
                TransportError::QueueFull
            }
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn close(&self) -> Result<(), TransportError> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Writer tasks
// ---------------------------------------------------------------------------

async fn forward_to_sink<S, E>(
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut sink: S,
) -> Result<(), TransportError>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    while let Some(bytes) = rx.recv().await {
        sink.send(bytes).await.map_err(sink_error)?;
    }
    sink.close().await.map_err(sink_error)?;
    tracing::debug!("stream transport writer finished");
    Ok(())
}

async fn write_lines<W>(mut rx: mpsc::Receiver<Vec<u8>>, mut writer: W) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut bytes) = rx.recv().await {
        bytes.push(b'\n');
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }
    tracing::debug!("stream transport writer finished");
    Ok(())
}

fn sink_error<E>(err: E) -> TransportError
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    TransportError::Io(std::io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_protocol::BaseMsg;

    fn ping() -> Msg {
        BaseMsg::new("1", "other/ping", "").into()
    }

    #[test]
    fn test_publish_encodes_envelope() {
        let (tp, mut rx) = StreamTransport::new("dummy", 4);
        tp.publish("", "", "other", &ping()).unwrap();

        let bytes = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["node"], "other");
        assert_eq!(value["payload"]["type"], "other/ping");
    }

    #[test]
    fn test_publish_full_queue() {
        let (tp, _rx) = StreamTransport::new("dummy", 1);
        tp.publish("", "", "other", &ping()).unwrap();
        assert!(matches!(
            tp.publish("", "", "other", &ping()),
            Err(TransportError::QueueFull)
        ));
    }

    #[test]
    fn test_publish_after_receiver_dropped() {
        let (tp, rx) = StreamTransport::new("dummy", 4);
        drop(rx);
        assert!(tp.is_closed());
        assert!(matches!(
            tp.publish("", "", "other", &ping()),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_close_ends_queue() {
        let (tp, mut rx) = StreamTransport::new("dummy", 4);
        tp.publish("", "", "other", &ping()).unwrap();
        tp.close().unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            tp.publish("", "", "other", &ping()),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_spawn_writer_writes_lines() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (tp, handle) = StreamTransport::spawn_writer("dummy", client);
        tp.publish("", "", "a", &ping()).unwrap();
        tp.publish("", "", "b", &ping()).unwrap();
        tp.close().unwrap();
        handle.await.unwrap().unwrap();

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut out)
            .await
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""node":"a""#));
        assert!(lines[1].contains(r#""node":"b""#));
    }
}
