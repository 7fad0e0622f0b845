//! Publish transports for chatbridge.
//!
//! A [`Transport`] turns an internal event into delivery. Three kinds are
//! provided:
//!
//! - [`LocalTransport`]: calls a function in-process.
//! - [`StreamTransport`]: queues encoded envelopes for one byte sink.
//! - [`MultiTransport`]: fans one publish out to any number of transports
//!   and folds their failures into one error.
//!
//! Publishing is synchronous and never waits on I/O.

mod error;
mod local;
mod multi;
mod stream;

pub use error::{MultiTransportError, SingleTransportError, TransportError};
pub use local::{LocalTransport, PublishFn, Published, Recorder};
pub use multi::MultiTransport;
pub use stream::{DEFAULT_QUEUE_CAPACITY, StreamTransport};

use std::fmt;

use chatbridge_protocol::{Msg, NetMsg};

/// Protocol name used when none has been configured by advertise time.
pub const DEFAULT_PROTOCOL: &str = "protocol";

/// Node that error events are published on.
pub const ERROR_NODE: &str = "error";

/// A publish sink.
pub trait Transport: Send + Sync + 'static {
    /// The protocol name this transport publishes under.
    fn protocol(&self) -> String;

    /// Announces the service is up. Call before clients do anything.
    fn advertise(&self) -> Result<(), TransportError>;

    /// Publishes a message.
    ///
    /// `network` and `chat` may be empty. `node` is the final topic segment
    /// naming the kind of event, e.g. `error`, `msg`, `network`.
    fn publish(
        &self,
        network: &str,
        chat: &str,
        node: &str,
        payload: &Msg,
    ) -> Result<(), TransportError>;

    /// Publishes an `error` event whose text is `err`.
    ///
    /// `id` is the request ID when the error answers a request. `network`
    /// is empty for protocol-level errors.
    fn publish_error(
        &self,
        id: &str,
        network: &str,
        err: &dyn fmt::Display,
    ) -> Result<(), TransportError> {
        let msg = error_msg(id, &self.protocol(), network, err);
        self.publish(network, "", ERROR_NODE, &msg.into())
    }

    /// Stops delivery. Later publishes fail with [`TransportError::Closed`].
    fn close(&self) -> Result<(), TransportError>;
}

/// Builds the `error` event published by [`Transport::publish_error`].
pub fn error_msg(id: &str, protocol: &str, network: &str, err: &dyn fmt::Display) -> NetMsg {
    let mut msg = NetMsg::new(id, "error", protocol, network);
    msg.message.set_text(err.to_string());
    msg
}
