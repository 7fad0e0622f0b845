use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use chatbridge_protocol::{ChatMsg, CmdMsg, EntityInfo, NetMsg, NetworkStateInfo};
use chatbridge_service::{ClientStateInfo, DoneSignal, Networker, Receiver, Service, ServiceError};

use crate::{NETWORK_ID, NETWORK_NAME, PROTOCOL, USER_ID, USER_NAME};

/// The session for the `dummy` network.
pub struct DummyClient {
    svc: Weak<Service>,
    /// Lowercased user ID to the name it was first seen with.
    users: Mutex<HashMap<String, String>>,
    done: DoneSignal,
}

impl DummyClient {
    pub fn new(svc: &Arc<Service>) -> Self {
        let mut users = HashMap::new();
        users.insert(USER_ID.to_string(), USER_NAME.to_string());
        Self {
            svc: Arc::downgrade(svc),
            users: Mutex::new(users),
            done: DoneSignal::new(),
        }
    }

    /// Resolves a user by case-insensitive ID, remembering new ones.
    fn user(&self, name: &str) -> EntityInfo {
        let id = name.to_lowercase();
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let known = users
            .entry(id.clone())
            .or_insert_with(|| name.to_string())
            .clone();
        drop(users);
        let mut user = EntityInfo::new(id, "user");
        user.set_name(&known, "");
        user
    }

    fn myself() -> EntityInfo {
        let mut me = EntityInfo::new(USER_ID, "user");
        me.set_name(USER_NAME, "");
        me
    }

    fn publish_fake_msg(&self, svc: &Service, from: &str, text: &str) {
        let mut msg = ChatMsg::new(svc.ids().make_id(""), "msg/dummy.fakeMsg", PROTOCOL, NETWORK_ID);
        msg.from = self.user(from);
        msg.dest = msg.from.clone();
        msg.message.set_text(text);
        let dest = msg.dest.id.clone();
        svc.publish(NETWORK_ID, &dest, "msg", msg.into());
    }

    fn publish_network_state(&self, svc: &Service, request_id: &str, kind: &str) {
        let msg = NetMsg::new(svc.ids().make_id(request_id), kind, PROTOCOL, NETWORK_ID);
        svc.publish(NETWORK_ID, "", "network", msg.into());
    }
}

#[async_trait]
impl Receiver for DummyClient {
    async fn handler(&self, msg: ChatMsg) {
        let Some(svc) = self.svc.upgrade() else {
            return;
        };
        match msg.kind.as_str() {
            "msg" | "msg/dummy.fakeMsg" => {
                let text = msg.text().to_string();

                let mut out = ChatMsg::new(
                    svc.ids().make_id(&msg.id),
                    "msg/dummy.fakeMsg",
                    PROTOCOL,
                    NETWORK_ID,
                );
                out.from = Self::myself();
                out.dest = self.user(msg.dest.name());
                out.message.set_text(text.as_str());
                let dest = out.dest.clone();
                svc.publish(NETWORK_ID, &dest.id, "msg-out", out.into());

                self.publish_fake_msg(&svc, dest.name(), &format!("you said \"{text}\""));
            }
            other => {
                let err = format!("unhandled message of type {other}");
                svc.publish_error(&svc.ids().make_id(&msg.id), &msg.net.id, &err);
            }
        }
    }

    async fn cmd_handler(&self, msg: CmdMsg) {
        if let Some(svc) = self.svc.upgrade() {
            let err = format!("unhandled command: {}", msg.command);
            svc.publish_error(&msg.id, &msg.net.id, &err);
        }
    }
}

#[async_trait]
impl Networker for DummyClient {
    async fn close(&self) -> Result<(), ServiceError> {
        if self.done.close().is_err() {
            return Ok(());
        }
        tracing::debug!(network = NETWORK_ID, "dummy session closing");
        if let Some(svc) = self.svc.upgrade() {
            self.publish_network_state(&svc, "", "offline");
            svc.on_client_closed(self)?;
        }
        Ok(())
    }

    async fn logout(&self, _reason: &str) -> Result<(), ServiceError> {
        self.close().await
    }

    async fn start(&self, _scope: &DoneSignal, request_id: &str) -> Result<(), ServiceError> {
        let svc = self.svc.upgrade().ok_or(ServiceError::ServiceClosed)?;
        self.publish_network_state(&svc, request_id, "online");
        self.publish_fake_msg(&svc, "FakeUser", "hello");
        Ok(())
    }

    fn network_id(&self) -> String {
        NETWORK_ID.to_string()
    }

    fn done(&self) -> &DoneSignal {
        &self.done
    }

    fn state_info(&self) -> ClientStateInfo {
        let mut net = EntityInfo::new(NETWORK_ID, "net");
        net.set_name(NETWORK_NAME, "");
        let mut network = NetworkStateInfo::new(net, PROTOCOL, Self::myself());
        network.ready = true;
        ClientStateInfo {
            network,
            subscriptions: Vec::new(),
        }
    }
}
