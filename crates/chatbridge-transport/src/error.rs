//! Error types for publishing.

use std::fmt;
use std::sync::Arc;

use chatbridge_protocol::ProtocolError;

use crate::Transport;

/// Errors that can occur while publishing to a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The payload could not be encoded.
    #[error(transparent)]
    Encode(#[from] ProtocolError),

    /// The sink's outbound queue is full; the message was dropped.
    #[error("send queue full")]
    QueueFull,

    /// The transport was closed.
    #[error("transport closed")]
    Closed,

    /// Writing to the underlying sink failed.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Exactly one sink of a fan-out failed.
    #[error(transparent)]
    Sink(#[from] SingleTransportError),

    /// More than one sink of a fan-out failed.
    #[error(transparent)]
    Multi(#[from] MultiTransportError),
}

impl TransportError {
    /// Every per-sink failure carried by this error. Empty for errors that
    /// did not come from a fan-out.
    pub fn sink_errors(&self) -> &[SingleTransportError] {
        match self {
            Self::Sink(e) => std::slice::from_ref(e),
            Self::Multi(e) => &e.errors,
            _ => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Fan-out errors
// ---------------------------------------------------------------------------

/// One failed sink in a fan-out, with the sink that failed.
#[derive(Clone, thiserror::Error)]
#[error("{source}")]
pub struct SingleTransportError {
    pub transport: Arc<dyn Transport>,
    pub source: Arc<TransportError>,
}

impl SingleTransportError {
    pub fn new(transport: Arc<dyn Transport>, source: TransportError) -> Self {
        Self {
            transport,
            source: Arc::new(source),
        }
    }
}

impl fmt::Debug for SingleTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleTransportError")
            .field("protocol", &self.transport.protocol())
            .field("source", &self.source)
            .finish()
    }
}

/// Two or more failed sinks in a fan-out, in sink order.
#[derive(Debug, Clone)]
pub struct MultiTransportError {
    pub errors: Vec<SingleTransportError>,
}

impl fmt::Display for MultiTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.errors.first() else {
            return f.write_str("no transport errors");
        };
        write!(f, "{first}")?;
        if self.errors.len() > 1 {
            write!(f, " (and {} more)", self.errors.len() - 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiTransportError {}

/// Collects per-sink failures and folds them into one result.
#[derive(Default)]
pub(crate) struct ErrorCollector {
    errors: Vec<SingleTransportError>,
}

impl ErrorCollector {
    pub(crate) fn add(&mut self, transport: Arc<dyn Transport>, err: TransportError) {
        self.errors.push(SingleTransportError::new(transport, err));
    }

    pub(crate) fn finish(mut self) -> Result<(), TransportError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(TransportError::Sink(self.errors.remove(0))),
            _ => Err(TransportError::Multi(MultiTransportError {
                errors: self.errors,
            })),
        }
    }
}
