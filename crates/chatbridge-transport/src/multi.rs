//! Fan-out to any number of transports.

use std::sync::{Arc, PoisonError, RwLock};

use chatbridge_protocol::Msg;

use crate::error::ErrorCollector;
use crate::{DEFAULT_PROTOCOL, Transport, TransportError};

/// Relays every publish to each registered transport.
///
/// Sinks fail independently: one failing sink does not stop delivery to
/// the others. Failures are folded into one result:
///
/// - none → `Ok(())`
/// - one → [`TransportError::Sink`]
/// - more → [`TransportError::Multi`]
pub struct MultiTransport {
    protocol: RwLock<String>,
    transports: RwLock<Vec<Arc<dyn Transport>>>,
}

impl MultiTransport {
    /// An empty fan-out. An empty `protocol` is filled in at advertise time.
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: RwLock::new(protocol.into()),
            transports: RwLock::new(Vec::new()),
        }
    }

    pub fn add_transport(&self, transport: Arc<dyn Transport>) {
        self.transports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transport);
    }

    /// Removes `transport` by identity. Returns whether it was registered.
    pub fn remove_transport(&self, transport: &Arc<dyn Transport>) -> bool {
        let mut transports = self.transports.write().unwrap_or_else(PoisonError::into_inner);
        match transports.iter().position(|t| Arc::ptr_eq(t, transport)) {
            Some(index) => {
                transports.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.transports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn Transport>> {
        self.transports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MultiTransport {
    fn default() -> Self {
        Self::new("")
    }
}

impl Transport for MultiTransport {
    fn protocol(&self) -> String {
        self.protocol
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Defaults the protocol to the first sink's, else `"protocol"`.
    fn advertise(&self) -> Result<(), TransportError> {
        let first = self.snapshot().first().map(|t| t.protocol());
        let mut protocol = self.protocol.write().unwrap_or_else(PoisonError::into_inner);
        if protocol.is_empty() {
            *protocol = first
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
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
        let mut errors = ErrorCollector::default();
        for tp in self.snapshot() {
            if let Err(e) = tp.publish(network, chat, node, payload) {
                errors.add(tp, e);
            }
        }
        errors.finish()
    }

    /// Closes every sink and clears the set.
    fn close(&self) -> Result<(), TransportError> {
        let transports =
            std::mem::take(&mut *self.transports.write().unwrap_or_else(PoisonError::into_inner));
        let mut errors = ErrorCollector::default();
        for tp in transports {
            if let Err(e) = tp.close() {
                errors.add(tp, e);
            }
        }
        errors.finish()
    }
}
