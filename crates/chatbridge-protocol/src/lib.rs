//! Message model for chatbridge.
//!
//! - **Entities** ([`EntityInfo`], [`MessageInfo`], [`ValuesInfo`],
//!   [`MediaInfo`]): the building blocks every message uses.
//! - **Messages** ([`BaseMsg`], [`NetMsg`], [`ChatMsg`], [`CmdMsg`], …) and
//!   the closed [`Msg`] enum over all of them.
//! - **Decode** ([`parse_msg`]) picks the concrete shape from the type tag.
//! - **State** snapshots ([`ProtocolStateInfo`], [`NetworkStateInfo`],
//!   [`SubscriptionStateInfo`]).
//!
//! ```text
//! Net (bytes) → Protocol (Msg) → Service (sessions) → Transport (fan-out)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod entity;
mod error;
mod msg;
mod state;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, Envelope, parse_msg};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use entity::{
    EntityInfo, KeyValue, MediaInfo, MemberInfo, Message, MessageInfo, TEXT_PLAIN, UserInfo,
    ValuesInfo, is_type,
};
pub use error::ProtocolError;
pub use msg::{
    BaseMsg, ChatMsg, CmdMsg, ConnMsg, ConnState, EnterMsg, LeaveMsg, MemberChangedMsg, Msg,
    NetMsg, SubscribeMsg, TypingMsg, UserChangedMsg, new_cmd, new_login, new_logout,
    new_logout_reason, new_raw,
};
pub use state::{
    NETWORK_STATE, NetworkStateInfo, PROTO_STATE, ProtocolStateInfo, SUBSCRIPTION_STATE,
    SubscriptionStateInfo,
};
