//! The capability traits sessions implement, and their state snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use chatbridge_protocol::{
    ChatMsg, CmdMsg, NetworkStateInfo, ProtocolStateInfo, SubscriptionStateInfo, ValuesInfo,
};

use crate::{DoneSignal, Service, ServiceError};

/// Receives inbound messages and commands.
#[async_trait]
pub trait Receiver: Send + Sync {
    async fn handler(&self, msg: ChatMsg);

    async fn cmd_handler(&self, msg: CmdMsg);
}

/// A live session for one network login.
///
/// Sessions are created by a [`NewClientFn`], registered and started by
/// [`Service::login`], and must call [`Service::on_client_closed`] once they
/// have closed.
#[async_trait]
pub trait Networker: Receiver + 'static {
    /// Closes the session and fires its [`done`](Self::done) signal.
    async fn close(&self) -> Result<(), ServiceError>;

    /// Like `close`, with a reason that may be shown to chat users.
    async fn logout(&self, reason: &str) -> Result<(), ServiceError>;

    /// Starts the session. `scope` bounds its background work and
    /// `request_id` is the login request's ID.
    async fn start(&self, scope: &DoneSignal, request_id: &str) -> Result<(), ServiceError>;

    fn network_id(&self) -> String;

    /// Empty for connectionless protocols.
    fn conn_id(&self) -> String {
        String::new()
    }

    /// Fires once the session has fully closed.
    fn done(&self) -> &DoneSignal;

    fn is_closed(&self) -> bool {
        self.done().is_closed()
    }

    fn state_info(&self) -> ClientStateInfo;
}

/// Lifecycle phases a session moves through, as tracked by the registry.
/// See [`Service::phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionPhase {
    /// Built by the factory and registered, not yet started.
    Created,
    /// `start` is running.
    Started,
    /// Running and reachable through the registry.
    Active,
    /// `close` or `logout` is in progress.
    Closing,
    /// Done; waiting for or past deregistration.
    Closed,
}

/// Arguments of a `login` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginRequest {
    pub remote: String,
    pub user_id: String,
    pub auth: String,
    pub values: ValuesInfo,
}

/// Builds a session for a login. Runs under the registry's construction
/// lock, so it must not block.
pub type NewClientFn =
    Arc<dyn Fn(&Arc<Service>, LoginRequest) -> Result<Arc<dyn Networker>, ServiceError> + Send + Sync>;

// ---------------------------------------------------------------------------
// State snapshots
// ---------------------------------------------------------------------------

/// One session's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStateInfo {
    pub network: NetworkStateInfo,
    pub subscriptions: Vec<SubscriptionStateInfo>,
}

/// The whole registry's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStateInfo {
    pub protocol: ProtocolStateInfo,
    pub networks: Vec<NetworkStateInfo>,
    pub subscriptions: Vec<SubscriptionStateInfo>,
    /// Every registered session with its lifecycle phase.
    pub sessions: Vec<SessionStateInfo>,
}

/// The registry's view of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStateInfo {
    pub network_id: String,
    /// Empty for connectionless protocols.
    pub conn_id: String,
    pub phase: SessionPhase,
}
