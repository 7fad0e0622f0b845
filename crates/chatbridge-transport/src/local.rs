//! In-process transport.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chatbridge_protocol::{Codec, Envelope, JsonCodec, Msg};

use crate::{DEFAULT_PROTOCOL, Transport, TransportError};

/// Called for every publish: `(network, chat, node, payload)`.
pub type PublishFn =
    Box<dyn Fn(&str, &str, &str, &Msg) -> Result<(), TransportError> + Send + Sync>;

/// A transport that hands every publish to a function.
///
/// [`LocalTransport::stdout`] writes newline-delimited envelopes to stdout;
/// [`LocalTransport::recording`] keeps them in memory.
pub struct LocalTransport {
    protocol: RwLock<String>,
    on_publish: PublishFn,
    closed: AtomicBool,
}

impl LocalTransport {
    pub fn new<F>(protocol: impl Into<String>, on_publish: F) -> Self
    where
        F: Fn(&str, &str, &str, &Msg) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        Self {
            protocol: RwLock::new(protocol.into()),
            on_publish: Box::new(on_publish),
            closed: Default::default(),
        }
    }

    /// Writes each envelope as one JSON line to stdout.
    pub fn stdout(protocol: impl Into<String>) -> Self {
        Self::new(
            protocol,
            |_network: &str, _chat: &str, node: &str, payload: &Msg| {
                let mut line = JsonCodec.encode(&Envelope::new(node, payload))?;
                line.push(b'\n');
                let mut out = std::io::stdout().lock();
                out.write_all(&line)?;
                out.flush()?;
                Ok(())
            },
        )
    }

    /// Records every publish. The returned [`Recorder`] reads them back.
    pub fn recording(protocol: impl Into<String>) -> (Self, Recorder) {
        let recorder = Recorder::default();
        let sink = recorder.clone();
        let tp = Self::new(
            protocol,
            move |network: &str, chat: &str, node: &str, payload: &Msg| {
                sink.push(Published {
                    network: network.to_string(),
                    chat: chat.to_string(),
                    node: node.to_string(),
                    payload: payload.clone(),
                });
                Ok(())
            },
        );
        (tp, recorder)
    }
}

impl Transport for LocalTransport {
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
        network: &str,
        chat: &str,
        node: &str,
        payload: &Msg,
    ) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        (self.on_publish)(network, chat, node, payload)
    }

    fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// One recorded publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub network: String,
    pub chat: String,
    pub node: String,
    pub payload: Msg,
}

impl Published {
    /// The `text/plain` body of the payload.
    pub fn text(&self) -> &str {
        self.payload.base().text()
    }
}

/// Shared view of what a recording [`LocalTransport`] has published.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Vec<Published>>>,
}

impl Recorder {
    fn push(&self, item: Published) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    pub fn snapshot(&self) -> Vec<Published> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<Published> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything published on `node`.
    pub fn on_node(&self, node: &str) -> Vec<Published> {
        self.snapshot()
            .into_iter()
            .filter(|p| p.node == node)
            .collect()
    }
}
