//! Message shapes.
//!
//! Each shape extends a smaller one by flattening it in, so a `ChatMsg`
//! encodes as one JSON object holding the `BaseMsg`, `NetMsg` and chat
//! fields side by side. `Deref` exposes the embedded fields directly:
//! `chat.net.id`, `chat.id`, `chat.kind`.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{
    EntityInfo, MediaInfo, MemberInfo, MessageInfo, UserInfo, ValuesInfo, is_type,
    null_as_default,
};

/// Implements `Deref`/`DerefMut` from a message shape to the shape it extends.
macro_rules! extends {
    ($ty:ty => $field:ident: $parent:ty) => {
        impl Deref for $ty {
            type Target = $parent;

            fn deref(&self) -> &$parent {
                &self.$field
            }
        }

        impl DerefMut for $ty {
            fn deref_mut(&mut self) -> &mut $parent {
                &mut self.$field
            }
        }
    };
}

// ---------------------------------------------------------------------------
// BaseMsg / NetMsg / ChatMsg
// ---------------------------------------------------------------------------

/// Fields common to every message. The `kind` tag is `/`-delimited:
/// `msg/*`, `info/*`, `enter/*`, `other/*` and so on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseMsg {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub id: String,

    /// Empty when the message did not come from the protocol.
    #[serde(rename = "proto", default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,

    /// Unset for messages built by a controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    #[serde(
        rename = "msg",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "MessageInfo::is_empty"
    )]
    pub message: MessageInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "ValuesInfo::is_empty"
    )]
    pub values: ValuesInfo,
}

impl BaseMsg {
    /// A message stamped with the current time.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            protocol: protocol.into(),
            time: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn is_msg(&self) -> bool {
        !self.kind.is_empty()
    }

    pub fn is_type(&self, part: &str) -> bool {
        is_type(&self.kind, part)
    }

    /// The `text/plain` body.
    pub fn text(&self) -> &str {
        self.message.text()
    }
}

/// A message scoped to one network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetMsg {
    #[serde(flatten)]
    pub base: BaseMsg,

    #[serde(rename = "net", default, deserialize_with = "null_as_default")]
    pub net: EntityInfo,
}

extends!(NetMsg => base: BaseMsg);

impl NetMsg {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        protocol: impl Into<String>,
        network_id: impl Into<String>,
    ) -> Self {
        Self {
            base: BaseMsg::new(id, kind, protocol),
            net: EntityInfo::new(network_id, "net"),
        }
    }

    pub fn is_msg(&self) -> bool {
        self.base.is_msg() && !self.net.id.is_empty()
    }
}

/// A message to or from a chat participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMsg {
    #[serde(flatten)]
    pub net_msg: NetMsg,

    #[serde(
        rename = "dest",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "EntityInfo::is_empty"
    )]
    pub dest: EntityInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "EntityInfo::is_empty"
    )]
    pub from: EntityInfo,

    #[serde(rename = "replyTo", default, skip_serializing_if = "String::is_empty")]
    pub reply_to: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub attachments: Vec<MediaInfo>,
}

extends!(ChatMsg => net_msg: NetMsg);

impl ChatMsg {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        protocol: impl Into<String>,
        network_id: impl Into<String>,
    ) -> Self {
        Self {
            net_msg: NetMsg::new(id, kind, protocol, network_id),
            ..Self::default()
        }
    }

    /// Valid when it has a network and a destination or sender.
    pub fn is_msg(&self) -> bool {
        self.net_msg.is_msg() && (!self.dest.id.is_empty() || !self.from.id.is_empty())
    }
}

// ---------------------------------------------------------------------------
// CmdMsg
// ---------------------------------------------------------------------------

/// A command. With `net` set it is routed to that network's session,
/// otherwise it is handled by the service.
///
/// The `message` field is reserved and should stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CmdMsg {
    #[serde(flatten)]
    pub base: BaseMsg,

    #[serde(
        rename = "net",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "EntityInfo::is_empty"
    )]
    pub net: EntityInfo,

    #[serde(rename = "cmd", default)]
    pub command: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub args: Vec<String>,
}

extends!(CmdMsg => base: BaseMsg);

impl CmdMsg {
    pub fn is_msg(&self) -> bool {
        self.base.is_msg() && !self.command.is_empty()
    }

    /// The `n`th argument, or an empty string.
    pub fn arg(&self, n: usize) -> &str {
        self.args.get(n).map(String::as_str).unwrap_or("")
    }
}

/// A command of type `cmd`.
pub fn new_cmd<I, S>(id: impl Into<String>, command: impl Into<String>, args: I) -> CmdMsg
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CmdMsg {
        base: BaseMsg {
            kind: "cmd".to_string(),
            id: id.into(),
            ..BaseMsg::default()
        },
        net: EntityInfo::default(),
        command: command.into(),
        args: args.into_iter().map(Into::into).collect(),
    }
}

pub fn new_login(id: impl Into<String>, remote: &str, user_id: &str, auth: &str) -> CmdMsg {
    new_cmd(id, "login", [remote, user_id, auth])
}

/// `target` is a network ID or a connection ID.
pub fn new_logout(id: impl Into<String>, target: &str) -> CmdMsg {
    new_cmd(id, "logout", [target])
}

/// The reason may be announced to chat users as a leave message.
pub fn new_logout_reason(id: impl Into<String>, target: &str, reason: &str) -> CmdMsg {
    new_cmd(id, "logout", [target, reason])
}

/// A protocol-specific raw command for one network.
pub fn new_raw<I, S>(id: impl Into<String>, network_id: &str, args: I) -> CmdMsg
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut cmd = new_cmd(id, "raw", args);
    cmd.net = EntityInfo::new(network_id, "net");
    cmd
}

// ---------------------------------------------------------------------------
// ConnMsg
// ---------------------------------------------------------------------------

/// Connection state carried by [`ConnMsg`].
///
/// `Failed` during connecting or reconnecting does not end the attempt.
/// Only `Disconnected` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Failed,
}

impl ConnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }

    /// True for the state that ends a connection attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connection state change; also used for network online/offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnMsg {
    #[serde(flatten)]
    pub net_msg: NetMsg,

    #[serde(default, deserialize_with = "null_as_default")]
    pub conn: EntityInfo,

    pub state: ConnState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cause: String,
}

extends!(ConnMsg => net_msg: NetMsg);

impl ConnMsg {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        protocol: impl Into<String>,
        network_id: impl Into<String>,
        conn_id: impl Into<String>,
        state: ConnState,
    ) -> Self {
        Self {
            net_msg: NetMsg::new(id, kind, protocol, network_id),
            conn: EntityInfo::new(conn_id, "conn"),
            state,
            cause: String::new(),
        }
    }

    pub fn is_msg(&self) -> bool {
        self.net_msg.is_msg()
    }
}

// ---------------------------------------------------------------------------
// Chat events
// ---------------------------------------------------------------------------

/// A member entered a chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnterMsg {
    #[serde(flatten)]
    pub chat: ChatMsg,

    #[serde(default, deserialize_with = "null_as_default")]
    pub member: MemberInfo,
}

extends!(EnterMsg => chat: ChatMsg);

/// A member left a chat. The message body may carry a parting message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaveMsg {
    #[serde(flatten)]
    pub chat: ChatMsg,

    #[serde(default, deserialize_with = "null_as_default")]
    pub user: EntityInfo,
}

extends!(LeaveMsg => chat: ChatMsg);

/// A user changed on the network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserChangedMsg {
    #[serde(flatten)]
    pub net_msg: NetMsg,

    #[serde(default, deserialize_with = "null_as_default")]
    pub user: EntityInfo,

    #[serde(default, deserialize_with = "null_as_default")]
    pub info: UserInfo,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub myself: bool,
}

extends!(UserChangedMsg => net_msg: NetMsg);

/// A member changed within a chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberChangedMsg {
    #[serde(flatten)]
    pub chat: ChatMsg,

    #[serde(default, deserialize_with = "null_as_default")]
    pub user: EntityInfo,

    #[serde(default, deserialize_with = "null_as_default")]
    pub member: MemberInfo,
}

extends!(MemberChangedMsg => chat: ChatMsg);

/// Subscribing to (or unsubscribing from) a chat. The destination's type
/// says what kind of chat it is. `members` includes myself on subscribe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeMsg {
    #[serde(flatten)]
    pub chat: ChatMsg,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "MessageInfo::is_empty"
    )]
    pub subject: MessageInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "MediaInfo::is_empty"
    )]
    pub photo: MediaInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub members: Vec<MemberInfo>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub myself: EntityInfo,

    #[serde(rename = "history", default, skip_serializing_if = "String::is_empty")]
    pub history_url: String,
}

extends!(SubscribeMsg => chat: ChatMsg);

/// A user is typing at the destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingMsg {
    #[serde(flatten)]
    pub chat: ChatMsg,

    #[serde(default)]
    pub typing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

extends!(TypingMsg => chat: ChatMsg);

// ---------------------------------------------------------------------------
// Msg
// ---------------------------------------------------------------------------

/// Every message shape. Produced by [`parse_msg`](crate::parse_msg) and
/// accepted by transports.
///
/// Serializes as the inner shape with no extra tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Msg {
    Base(BaseMsg),
    Net(NetMsg),
    Chat(ChatMsg),
    Cmd(CmdMsg),
    Conn(ConnMsg),
    Enter(EnterMsg),
    Leave(LeaveMsg),
    UserChanged(UserChangedMsg),
    MemberChanged(MemberChangedMsg),
    Subscribe(SubscribeMsg),
    Typing(TypingMsg),
}

impl Msg {
    pub fn base(&self) -> &BaseMsg {
        match self {
            Self::Base(m) => m,
            Self::Net(m) => &m.base,
            Self::Chat(m) => &m.base,
            Self::Cmd(m) => &m.base,
            Self::Conn(m) => &m.base,
            Self::Enter(m) => &m.base,
            Self::Leave(m) => &m.base,
            Self::UserChanged(m) => &m.base,
            Self::MemberChanged(m) => &m.base,
            Self::Subscribe(m) => &m.base,
            Self::Typing(m) => &m.base,
        }
    }

    pub fn kind(&self) -> &str {
        &self.base().kind
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// The network this message is scoped to, if any.
    pub fn network(&self) -> Option<&EntityInfo> {
        let net = match self {
            Self::Base(_) => return None,
            Self::Cmd(m) => &m.net,
            Self::Net(m) => &m.net,
            Self::Chat(m) => &m.net,
            Self::Conn(m) => &m.net,
            Self::Enter(m) => &m.net,
            Self::Leave(m) => &m.net,
            Self::UserChanged(m) => &m.net,
            Self::MemberChanged(m) => &m.net,
            Self::Subscribe(m) => &m.net,
            Self::Typing(m) => &m.net,
        };
        (!net.id.is_empty()).then_some(net)
    }

    pub fn is_msg(&self) -> bool {
        match self {
            Self::Base(m) => m.is_msg(),
            Self::Net(m) => m.is_msg(),
            Self::Chat(m) => m.is_msg(),
            Self::Cmd(m) => m.is_msg(),
            Self::Conn(m) => m.is_msg(),
            Self::Enter(m) => m.is_msg(),
            Self::Leave(m) => m.is_msg(),
            Self::UserChanged(m) => m.is_msg(),
            Self::MemberChanged(m) => m.is_msg(),
            Self::Subscribe(m) => m.is_msg(),
            Self::Typing(m) => m.is_msg(),
        }
    }
}

macro_rules! msg_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Msg {
                fn from(msg: $ty) -> Self {
                    Self::$variant(msg)
                }
            }
        )*
    };
}

msg_from!(
    Base(BaseMsg),
    Net(NetMsg),
    Chat(ChatMsg),
    Cmd(CmdMsg),
    Conn(ConnMsg),
    Enter(EnterMsg),
    Leave(LeaveMsg),
    UserChanged(UserChangedMsg),
    MemberChanged(MemberChangedMsg),
    Subscribe(SubscribeMsg),
    Typing(TypingMsg),
);

// ===========================================================================
// Tests
// ===========================================================================
