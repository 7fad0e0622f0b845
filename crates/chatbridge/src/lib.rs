//! # chatbridge
//!
//! A protocol-agnostic chat-bridging runtime.
//!
//! A chat protocol implements [`Networker`](service::Networker) for one
//! logged-in network. The [`Service`](service::Service) registry owns those
//! sessions and routes inbound traffic to them, every outbound event goes
//! through a [`Transport`](transport::Transport), and a
//! [`Provider`](provider::Provider) serves the whole thing to controllers
//! over stdio, TCP or WebSocket.
//!
//! ```text
//! bytes ──→ parse_msg ──→ dispatch ──→ session ──→ publish ──→ fan-out ──→ every transport
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chatbridge::prelude::*;
//!
//! async fn serve() -> Result<(), ChatbridgeError> {
//!     let new_client: NewClientFn = Arc::new(
//!         |_: &Arc<Service>, req: LoginRequest| -> Result<Arc<dyn Networker>, ServiceError> {
//!             Err(ServiceError::Client(format!("cannot reach {}", req.remote)))
//!         },
//!     );
//!     let transport = Arc::new(MultiTransport::new("myproto"));
//!     let service = Service::new(Arc::clone(&transport) as Arc<dyn Transport>, new_client);
//!     transport.advertise()?;
//!
//!     let options = ProviderOptions {
//!         addr: "127.0.0.1:7000".into(),
//!         ..ProviderOptions::default()
//!     };
//!     Provider::new(options, service, transport)
//!         .listen_and_serve()
//!         .await?;
//!     Ok(())
//! }
//! ```

mod error;

pub use error::ChatbridgeError;

pub use chatbridge_net as net;
pub use chatbridge_protocol as protocol;
pub use chatbridge_provider as provider;
pub use chatbridge_service as service;
pub use chatbridge_transport as transport;

/// The types most programs need.
pub mod prelude {
    pub use crate::ChatbridgeError;
    pub use chatbridge_protocol::{
        BaseMsg, ChatMsg, CmdMsg, Codec, EntityInfo, JsonCodec, MessageInfo, Msg, NetMsg,
        ValuesInfo, parse_msg,
    };
    pub use chatbridge_provider::{Provider, ProviderOptions};
    pub use chatbridge_service::{
        ClientStateInfo, DoneSignal, IdGenerator, LoginRequest, NewClientFn, Networker, Receiver,
        Service, ServiceError, dispatch_msg,
    };
    pub use chatbridge_transport::{LocalTransport, MultiTransport, StreamTransport, Transport};
}
