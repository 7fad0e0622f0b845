//! Session registry and dispatch for chatbridge.
//!
//! - [`Service`]: owns the live sessions ([`Networker`]s), routes inbound
//!   messages and commands to them, and handles `login`, `logout`, `ping`.
//! - [`dispatch_msg`]: decodes raw inbound bytes for a [`Receiver`].
//! - [`IdGenerator`]: short unique IDs for published events.
//! - [`DoneSignal`]: the one-shot cancellation scope sessions and the
//!   service expose.
//! - [`UrlMux`]: ad hoc HTTP URLs for media.

mod dispatch;
mod done;
mod error;
mod id;
mod networker;
mod service;
mod url_mux;

pub use dispatch::dispatch_msg;
pub use done::DoneSignal;
pub use error::ServiceError;
pub use id::IdGenerator;
pub use networker::{
    ClientStateInfo, LoginRequest, NewClientFn, Networker, Receiver, ServiceStateInfo,
    SessionPhase, SessionStateInfo,
};
pub use service::{DEFAULT_LOGOUT_REASON, Service, ServiceBuilder};
pub use url_mux::{MuxError, StaticContent, UrlHandler, UrlMux, UrlMuxConfig};
