//! Error types for the protocol layer.

/// Errors from encoding or decoding messages.
///
/// All of these are per-message: the caller reports them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are malformed, truncated, or don't match the shape.
    #[cfg(feature = "json")]
    #[error("message load error: {0}")]
    Decode(serde_json::Error),

    /// The bytes parsed but fail validation. Holds the type tag, which may
    /// be empty.
    #[error("not a valid message (type {0:?})")]
    NotAMessage(String),
}
