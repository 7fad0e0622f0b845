//! The session registry.
//!
//! [`Service`] owns every live session, routes inbound traffic to them and
//! handles the service-level commands (`login`, `logout`, `ping`).
//!
//! ```text
//! login ──→ factory ──→ register ──→ start ──→ [Active]
//!          [Created]   [Created]   [Started]
//!                          │            │
//!                          │            └─ fails ──→ deregister
//!                          ▼
//!              duplicate network / closed ──→ error
//!
//! logout / close ──→ session closes ──→ on_client_closed ──→ deregister
//!   [Closing]          [Closed]
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use chatbridge_protocol::{BaseMsg, ChatMsg, CmdMsg, Msg, ProtocolStateInfo, ValuesInfo};
use chatbridge_transport::Transport;

use crate::{
    DoneSignal, IdGenerator, LoginRequest, NewClientFn, Networker, Receiver, ServiceError,
    ServiceStateInfo, SessionPhase, SessionStateInfo, UrlMux,
};

/// Reason used by `logout` when the command gives none.
pub const DEFAULT_LOGOUT_REASON: &str = "Logout";

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`Service`].
///
/// ```rust,ignore
/// let svc = Service::builder(transport, new_client)
///     .url_mux(Arc::new(UrlMux::default()))
///     .build();
/// ```
pub struct ServiceBuilder {
    transport: Arc<dyn Transport>,
    new_client: NewClientFn,
    ids: Option<Arc<IdGenerator>>,
    url_mux: Option<Arc<UrlMux>>,
}

impl ServiceBuilder {
    /// Shares an ID generator instead of creating one.
    pub fn ids(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Enables ad hoc media URLs for sessions.
    pub fn url_mux(mut self, mux: Arc<UrlMux>) -> Self {
        self.url_mux = Some(mux);
        self
    }

    pub fn build(self) -> Arc<Service> {
        Arc::new_cyclic(|me| Service {
            me: me.clone(),
            transport: self.transport,
            new_client: self.new_client,
            new_client_lock: Mutex::new(()),
            clients: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
            done: DoneSignal::new(),
            ids: self.ids.unwrap_or_default(),
            url_mux: self.url_mux,
        })
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// A registry entry: the session and the phase the registry has moved it to.
struct Registered {
    client: Arc<dyn Networker>,
    phase: SessionPhase,
}

/// Registry of live sessions, one per network ID.
pub struct Service {
    me: Weak<Service>,
    transport: Arc<dyn Transport>,
    new_client: NewClientFn,
    /// Serializes session construction.
    new_client_lock: Mutex<()>,
    clients: RwLock<Vec<Registered>>,
    closed: AtomicBool,
    done: DoneSignal,
    ids: Arc<IdGenerator>,
    url_mux: Option<Arc<UrlMux>>,
}

impl Service {
    pub fn new(transport: Arc<dyn Transport>, new_client: NewClientFn) -> Arc<Self> {
        Self::builder(transport, new_client).build()
    }

    pub fn builder(transport: Arc<dyn Transport>, new_client: NewClientFn) -> ServiceBuilder {
        ServiceBuilder {
            transport,
            new_client,
            ids: None,
            url_mux: None,
        }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn protocol(&self) -> String {
        self.transport.protocol()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    pub fn url_mux(&self) -> Option<&Arc<UrlMux>> {
        self.url_mux.as_ref()
    }

    /// Fires after `close` has closed every session.
    pub fn done(&self) -> &DoneSignal {
        &self.done
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A snapshot of the registered sessions.
    pub fn clients(&self) -> Vec<Arc<dyn Networker>> {
        self.registered()
            .into_iter()
            .map(|(client, _)| client)
            .collect()
    }

    pub fn client_by_network(&self, network_id: &str) -> Option<Arc<dyn Networker>> {
        self.clients()
            .into_iter()
            .find(|c| c.network_id() == network_id)
    }

    /// Where the session for `network_id` is in its lifecycle, or `None`
    /// if no such session is registered.
    ///
    /// A session that has fired its done signal but not yet deregistered
    /// reports [`SessionPhase::Closed`].
    pub fn phase(&self, network_id: &str) -> Option<SessionPhase> {
        self.registered()
            .into_iter()
            .find(|(c, _)| c.network_id() == network_id)
            .map(|(c, phase)| effective_phase(&*c, phase))
    }

    fn registered(&self) -> Vec<(Arc<dyn Networker>, SessionPhase)> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| (Arc::clone(&r.client), r.phase))
            .collect()
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Creates, registers and starts a session.
    ///
    /// # Errors
    /// - [`ServiceError::ServiceClosed`] if the registry is closed.
    /// - [`ServiceError::NetworkIdInUse`] if any registered session reports
    ///   the new session's network ID. The existing session is untouched.
    /// - Whatever the factory or the session's `start` returns. A session
    ///   that fails to start is deregistered.
    pub async fn login(
        &self,
        remote: &str,
        user_id: &str,
        auth: &str,
        values: ValuesInfo,
        request_id: &str,
    ) -> Result<Arc<dyn Networker>, ServiceError> {
        let me = self.me.upgrade().ok_or(ServiceError::ServiceClosed)?;
        let client = {
            let _guard = self
                .new_client_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.is_closed() {
                return Err(ServiceError::ServiceClosed);
            }
            (self.new_client)(
                &me,
                LoginRequest {
                    remote: remote.to_string(),
                    user_id: user_id.to_string(),
                    auth: auth.to_string(),
                    values,
                },
            )?
        };

        self.add_client(Arc::clone(&client))?;

        self.set_phase(&client, SessionPhase::Started);
        if let Err(e) = client.start(client.done(), request_id).await {
            tracing::warn!(network = %client.network_id(), error = %e, "session failed to start");
            self.remove_client(&client);
            return Err(e);
        }

        self.set_phase(&client, SessionPhase::Active);
        tracing::info!(network = %client.network_id(), remote, user_id, "session logged in");
        Ok(client)
    }

    /// Logs out the session whose network ID or connection ID is `target`.
    pub async fn logout(
        &self,
        target: &str,
        reason: &str,
        _values: ValuesInfo,
        _request_id: &str,
    ) -> Result<(), ServiceError> {
        let client = self
            .find_logout_target(target)
            .ok_or_else(|| ServiceError::LogoutTargetNotFound(target.to_string()))?;
        tracing::info!(network = %client.network_id(), reason, "session logging out");
        self.set_phase(&client, SessionPhase::Closing);
        client.logout(reason).await
    }

    /// Closes every session, waits for each to finish, then fires
    /// [`done`](Self::done).
    ///
    /// Every session is asked to close even if one fails; the first failure
    /// is returned.
    ///
    /// # Errors
    /// [`ServiceError::AlreadyClosed`] on the second call.
    pub async fn close(&self) -> Result<(), ServiceError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::AlreadyClosed);
        }
        tracing::info!("closing service");

        let clients = self.clients();
        let mut first_err = None;
        let mut closing = Vec::with_capacity(clients.len());
        for client in clients {
            self.set_phase(&client, SessionPhase::Closing);
            match client.close().await {
                Ok(()) => closing.push(client),
                Err(e) => {
                    tracing::warn!(network = %client.network_id(), error = %e, "session close failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        for client in &closing {
            client.done().wait().await;
        }

        if let Some(mux) = &self.url_mux {
            mux.close();
        }
        self.done.close()?;

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deregisters a session. Sessions call this once they have closed.
    ///
    /// # Errors
    /// [`ServiceError::InvariantViolation`] if `client` does not report
    /// itself closed. Nothing is deregistered in that case.
    pub fn on_client_closed(&self, client: &dyn Networker) -> Result<(), ServiceError> {
        if !client.is_closed() {
            let network = client.network_id();
            tracing::error!(%network, "on_client_closed called for an open session");
            return Err(ServiceError::InvariantViolation(format!(
                "session {network} reported closed while still open"
            )));
        }
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let target = client as *const dyn Networker;
        if let Some(index) = clients
            .iter()
            .position(|r| std::ptr::addr_eq(Arc::as_ptr(&r.client), target))
        {
            clients.remove(index);
            tracing::info!(network = %client.network_id(), "session deregistered");
        }
        Ok(())
    }

    fn add_client(&self, client: Arc<dyn Networker>) -> Result<(), ServiceError> {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Err(ServiceError::ServiceClosed);
        }
        let network_id = client.network_id();
        if clients.iter().any(|r| r.client.network_id() == network_id) {
            return Err(ServiceError::NetworkIdInUse(network_id));
        }
        clients.push(Registered {
            client,
            phase: SessionPhase::Created,
        });
        Ok(())
    }

    fn remove_client(&self, client: &Arc<dyn Networker>) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|r| !Arc::ptr_eq(&r.client, client));
    }

    fn set_phase(&self, client: &Arc<dyn Networker>, phase: SessionPhase) {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = clients.iter_mut().find(|r| Arc::ptr_eq(&r.client, client)) {
            entry.phase = phase;
        }
    }

    fn find_logout_target(&self, target: &str) -> Option<Arc<dyn Networker>> {
        self.clients()
            .into_iter()
            .find(|c| c.network_id() == target || c.conn_id() == target)
    }

    // -- Publishing -----------------------------------------------------------

    /// Publishes through the service's transport, logging failures.
    pub fn publish(&self, network: &str, chat: &str, node: &str, payload: Msg) {
        if let Err(e) = self.transport.publish(network, chat, node, &payload) {
            tracing::warn!(node, error = %e, "publish failed");
        }
    }

    /// Publishes an `error` event, logging failures.
    pub fn publish_error(&self, id: &str, network: &str, err: &dyn fmt::Display) {
        if let Err(e) = self.transport.publish_error(id, network, err) {
            tracing::warn!(error = %e, "publish of error event failed");
        }
    }

    /// Reports an error that has no request or network scope.
    pub fn generic_error(&self, err: &dyn fmt::Display) {
        self.publish_error("", "", err);
    }

    fn cmd_error(&self, msg: &CmdMsg, err: &dyn fmt::Display) {
        let text = format!("command {} error: {}", msg.command, err);
        self.publish_error(&msg.id, &msg.net.id, &text);
    }

    /// True if `msg` has at least `n` arguments; otherwise publishes an
    /// error and returns false.
    pub fn check_args(&self, n: usize, msg: &CmdMsg) -> bool {
        if msg.args.len() < n {
            self.cmd_error(msg, &format!("expected {n} args"));
            return false;
        }
        true
    }

    // -- State ----------------------------------------------------------------

    pub fn state_info(&self) -> ServiceStateInfo {
        let mut state = ServiceStateInfo {
            protocol: ProtocolStateInfo::new(self.protocol()),
            networks: Vec::new(),
            subscriptions: Vec::new(),
            sessions: Vec::new(),
        };
        for (client, phase) in self.registered() {
            state.sessions.push(SessionStateInfo {
                network_id: client.network_id(),
                conn_id: client.conn_id(),
                phase: effective_phase(&*client, phase),
            });
            let info = client.state_info();
            state.networks.push(info.network);
            state.subscriptions.extend(info.subscriptions);
        }
        state
    }
}

fn effective_phase(client: &dyn Networker, phase: SessionPhase) -> SessionPhase {
    if client.is_closed() {
        SessionPhase::Closed
    } else {
        phase
    }
}

// ---------------------------------------------------------------------------
// Inbound routing
// ---------------------------------------------------------------------------

#[async_trait]
impl Receiver for Service {
    /// Routes a chat message to its network's session.
    async fn handler(&self, msg: ChatMsg) {
        if msg.kind.is_empty() || msg.net.id.is_empty() {
            self.publish_error(&self.ids.make_id(&msg.id), "", &"invalid message");
            return;
        }
        match self.client_by_network(&msg.net.id) {
            Some(client) => client.handler(msg).await,
            None => {
                let err = ServiceError::NetworkNotFound(msg.net.id.clone());
                self.publish_error(&self.ids.make_id(&msg.id), "", &err);
            }
        }
    }

    /// Forwards network-scoped commands, handles the rest.
    async fn cmd_handler(&self, msg: CmdMsg) {
        if !msg.net.id.is_empty() {
            match self.client_by_network(&msg.net.id) {
                Some(client) => client.cmd_handler(msg).await,
                None => {
                    let err = ServiceError::NetworkNotFound(msg.net.id.clone());
                    self.publish_error(&self.ids.make_id(&msg.id), "", &err);
                }
            }
            return;
        }

        tracing::debug!(cmd = %msg.command, id = %msg.id, "service command");
        match msg.command.as_str() {
            "login" => {
                if self.check_args(3, &msg) {
                    let result = self
                        .login(
                            &msg.args[0],
                            &msg.args[1],
                            &msg.args[2],
                            msg.values.clone(),
                            &msg.id,
                        )
                        .await;
                    if let Err(e) = result {
                        self.cmd_error(&msg, &e);
                    }
                }
            }
            "logout" => {
                if self.check_args(1, &msg) {
                    let reason = msg
                        .args
                        .get(1)
                        .map(String::as_str)
                        .unwrap_or(DEFAULT_LOGOUT_REASON);
                    let result = self
                        .logout(&msg.args[0], reason, msg.values.clone(), &msg.id)
                        .await;
                    if let Err(e) = result {
                        self.cmd_error(&msg, &e);
                    }
                }
            }
            "ping" => {
                let mut pong = BaseMsg::new(self.ids.make_id(&msg.id), "other/ping", "");
                if let Some(text) = msg.args.first() {
                    pong.message.set_text(text.as_str());
                }
                self.publish("", "", "other", pong.into());
            }
            other => {
                let text = format!("unhandled command: {other}");
                self.publish_error(&msg.id, &msg.net.id, &text);
            }
        }
    }
}
