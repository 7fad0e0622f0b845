//! Codecs and the polymorphic message decoder.
//!
//! A [`Codec`] turns values into bytes and back. [`parse_msg`] sits on top
//! of it and picks the concrete [`Msg`] shape from the message's type tag.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::ProtocolError;
use crate::msg::{
    ChatMsg, CmdMsg, ConnMsg, EnterMsg, LeaveMsg, MemberChangedMsg, Msg, NetMsg, SubscribeMsg,
    TypingMsg, UserChangedMsg,
};

/// Encodes values to bytes and decodes them back.
///
/// `Send + Sync + 'static` so a codec can be shared by long-lived tasks.
pub trait Codec: Send + Sync + 'static {
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`. Behind the `json` feature (default).
///
/// ```rust
/// use chatbridge_protocol::{BaseMsg, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let msg = BaseMsg::new("1", "other/ping", "");
/// let bytes = codec.encode(&msg).unwrap();
/// let back: BaseMsg = codec.decode(&bytes).unwrap();
/// assert_eq!(back.kind, "other/ping");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// What travels on a transport: the topic's final segment plus the message.
///
/// Byte streams carry one encoded envelope per line; WebSockets carry one
/// per text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub node: String,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(node: impl Into<String>, payload: T) -> Self {
        Self {
            node: node.into(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Polymorphic decode
// ---------------------------------------------------------------------------

/// Decodes `raw` into the most specific message shape.
///
/// The bytes are first read as a [`ChatMsg`]. If the type tag matches one of
/// `enter`, `leave`, `user-changed`, `member-changed`, `subscribe` /
/// `unsubscribe`, `typing`, `conn-state` or `cmd` (checked in that order)
/// they are decoded again as that shape. Otherwise the widest valid shape
/// wins: a valid chat message, else a network message when `net.id` is set,
/// else a base message.
///
/// # Errors
/// - `ProtocolError::Decode` when the bytes are not parseable as the shape.
/// - `ProtocolError::NotAMessage` when they parse but fail validation.
pub fn parse_msg<C: Codec>(codec: &C, raw: &[u8]) -> Result<Msg, ProtocolError> {
    let chat: ChatMsg = codec.decode(raw)?;

    let msg: Msg = if chat.is_type("enter") {
        codec.decode::<EnterMsg>(raw)?.into()
    } else if chat.is_type("leave") {
        codec.decode::<LeaveMsg>(raw)?.into()
    } else if chat.is_type("user-changed") {
        codec.decode::<UserChangedMsg>(raw)?.into()
    } else if chat.is_type("member-changed") {
        codec.decode::<MemberChangedMsg>(raw)?.into()
    } else if chat.is_type("subscribe") || chat.is_type("unsubscribe") {
        codec.decode::<SubscribeMsg>(raw)?.into()
    } else if chat.is_type("typing") {
        codec.decode::<TypingMsg>(raw)?.into()
    } else if chat.is_type("conn-state") {
        codec.decode::<ConnMsg>(raw)?.into()
    } else if chat.is_type("cmd") {
        codec.decode::<CmdMsg>(raw)?.into()
    } else if chat.is_msg() {
        return Ok(Msg::Chat(chat));
    } else if chat.base.is_msg() {
        let ChatMsg { net_msg, .. } = chat;
        return Ok(if net_msg.net.id.is_empty() {
            Msg::Base(net_msg.base)
        } else {
            Msg::Net(NetMsg {
                base: net_msg.base,
                net: net_msg.net,
            })
        });
    } else {
        return Err(ProtocolError::NotAMessage(chat.base.kind.clone()));
    };

    if msg.is_msg() {
        Ok(msg)
    } else {
        Err(ProtocolError::NotAMessage(msg.kind().to_string()))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
