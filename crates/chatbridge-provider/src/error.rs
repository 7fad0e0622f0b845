use chatbridge_net::NetError;
use chatbridge_service::ServiceError;
use chatbridge_transport::TransportError;

/// Errors that stop a provider from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Invalid options. Reported before anything is bound.
    #[error("invalid provider options: {0}")]
    Config(String),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
