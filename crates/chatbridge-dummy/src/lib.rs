//! A fake network for trying chatbridge without a real chat protocol.
//!
//! Logging in creates the single network `dummy`. It announces itself
//! online, greets you from `FakeUser`, and answers every message you send
//! with an echo and a `you said "..."` reply from the recipient.

mod client;

use std::sync::Arc;

use chatbridge_service::{LoginRequest, NewClientFn, Networker, Service, ServiceError};
use chatbridge_transport::Transport;

pub use client::DummyClient;

pub const PROTOCOL: &str = "dummy";
pub const NETWORK_ID: &str = "dummy";
pub const NETWORK_NAME: &str = "Dummy";
pub const USER_ID: &str = "myself";
pub const USER_NAME: &str = "Myself";

/// A service whose logins create [`DummyClient`]s.
pub fn new_service(transport: Arc<dyn Transport>) -> Arc<Service> {
    Service::new(transport, new_client_fn())
}

/// The session factory, for building a service with other options.
pub fn new_client_fn() -> NewClientFn {
    Arc::new(new_client)
}

fn new_client(svc: &Arc<Service>, _req: LoginRequest) -> Result<Arc<dyn Networker>, ServiceError> {
    if svc.is_closed() {
        return Err(ServiceError::ServiceClosed);
    }
    Ok(Arc::new(DummyClient::new(svc)))
}
