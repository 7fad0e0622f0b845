//! Unified error type for chatbridge.

use chatbridge_net::NetError;
use chatbridge_protocol::ProtocolError;
use chatbridge_provider::ProviderError;
use chatbridge_service::{MuxError, ServiceError};
use chatbridge_transport::TransportError;

/// Wraps every crate-specific error so `?` works across layers.
#[derive(Debug, thiserror::Error)]
pub enum ChatbridgeError {
    /// Encoding, decoding or validating a message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Publishing to one or more sinks.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Registry and session lifecycle.
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Mux(#[from] MuxError),

    /// Listening, accepting, reading or writing connections.
    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::NotAMessage("bogus".into());
        let err: ChatbridgeError = err.into();
        assert!(matches!(err, ChatbridgeError::Protocol(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_from_transport_error() {
        let err: ChatbridgeError = TransportError::QueueFull.into();
        assert!(matches!(err, ChatbridgeError::Transport(_)));
    }

    #[test]
    fn test_from_service_error() {
        let err: ChatbridgeError = ServiceError::NetworkIdInUse("net1".into()).into();
        assert!(matches!(err, ChatbridgeError::Service(_)));
        assert_eq!(err.to_string(), "network ID is in use: net1");
    }

    #[test]
    fn test_from_net_error() {
        let err: ChatbridgeError = NetError::Closed.into();
        assert!(matches!(err, ChatbridgeError::Net(_)));
    }

    #[test]
    fn test_from_provider_error() {
        let err: ChatbridgeError = ProviderError::Config("bad addr".into()).into();
        assert!(matches!(err, ChatbridgeError::Provider(_)));
        assert!(err.to_string().contains("bad addr"));
    }

    #[test]
    fn test_from_mux_error() {
        let err: ChatbridgeError = MuxError::NoRuntime.into();
        assert!(matches!(err, ChatbridgeError::Mux(_)));
    }
}
