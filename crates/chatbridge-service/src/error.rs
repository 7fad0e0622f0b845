//! Error types for the service layer.

use chatbridge_transport::TransportError;

/// Errors from the session registry and from sessions themselves.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The registry no longer accepts sessions.
    #[error("service is closed")]
    ServiceClosed,

    /// `close` was called a second time.
    #[error("already closed")]
    AlreadyClosed,

    /// A registered session already reports this network ID.
    #[error("network ID is in use: {0}")]
    NetworkIdInUse(String),

    /// No session has this network ID or connection ID.
    #[error("unable to logout {0} ID not found")]
    LogoutTargetNotFound(String),

    #[error("network not found: {0}")]
    NetworkNotFound(String),

    /// A session failed to start.
    #[error("start failed: {0}")]
    Start(String),

    /// A session could not be created, or rejected a request.
    #[error("{0}")]
    Client(String),

    /// A caller broke a registry contract, e.g. reporting an open session
    /// as closed. The call that detected it is aborted.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
