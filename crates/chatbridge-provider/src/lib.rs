//! Serves a chatbridge [`Service`](chatbridge_service::Service) to byte
//! connections.
//!
//! Each connection gets its own stream transport. Once authenticated it
//! joins the provider's fan-out, so every connection sees every event, and
//! its inbound frames are dispatched to the service.
//!
//! ```text
//! accept ──→ [Unauthenticated] ──provider-auth / skip──→ [Authenticated] ──→ closed
//!                   │                                           │
//!                   └─ replies on own transport only            └─ dispatch_msg → service
//! ```
//!
//! With no password and no auto-password, connections start authenticated.

mod auth;
mod error;
mod handler;
mod options;
mod server;

pub use auth::PasswordGate;
pub use error::ProviderError;
pub use handler::PROVIDER_AUTH_INFO;
pub use options::{ListenAddr, ProviderOptions};
pub use server::Provider;
