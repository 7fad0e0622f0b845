//! State snapshots. These are recomputed on demand and never persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityInfo, MemberInfo, MessageInfo, ValuesInfo, null_as_default};

pub const PROTO_STATE: &str = "proto-state";
pub const NETWORK_STATE: &str = "network-state";
pub const SUBSCRIPTION_STATE: &str = "subscription-state";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStateInfo {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(rename = "proto")]
    pub protocol: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "ValuesInfo::is_empty"
    )]
    pub values: ValuesInfo,
}

impl ProtocolStateInfo {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            kind: PROTO_STATE.to_string(),
            protocol: protocol.into(),
            values: ValuesInfo::default(),
        }
    }
}

impl fmt::Display for ProtocolStateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Protocol: {}", self.protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStateInfo {
    #[serde(rename = "type")]
    pub kind: String,

    pub net: EntityInfo,

    #[serde(rename = "proto")]
    pub protocol: String,

    /// Set only for protocols with connections.
    #[serde(default, skip_serializing_if = "EntityInfo::is_empty")]
    pub conn: EntityInfo,

    pub myself: EntityInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "ValuesInfo::is_empty"
    )]
    pub values: ValuesInfo,

    pub ready: bool,
}

impl NetworkStateInfo {
    pub fn new(net: EntityInfo, protocol: impl Into<String>, myself: EntityInfo) -> Self {
        Self {
            kind: NETWORK_STATE.to_string(),
            net,
            protocol: protocol.into(),
            conn: EntityInfo::default(),
            myself,
            values: ValuesInfo::default(),
            ready: false,
        }
    }
}

impl fmt::Display for NetworkStateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Network: {} | Protocol: {}",
            self.net.display_name(),
            self.protocol
        )
    }
}

/// `history_url` points at a JSON history API when the protocol has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStateInfo {
    #[serde(rename = "type")]
    pub kind: String,

    pub net: EntityInfo,

    #[serde(rename = "proto")]
    pub protocol: String,

    pub dest: EntityInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "MessageInfo::is_empty"
    )]
    pub subject: MessageInfo,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub members: Vec<MemberInfo>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "ValuesInfo::is_empty"
    )]
    pub values: ValuesInfo,

    #[serde(rename = "history", default, skip_serializing_if = "String::is_empty")]
    pub history_url: String,
}

impl SubscriptionStateInfo {
    pub fn new(net: EntityInfo, protocol: impl Into<String>, dest: EntityInfo) -> Self {
        Self {
            kind: SUBSCRIPTION_STATE.to_string(),
            net,
            protocol: protocol.into(),
            dest,
            subject: MessageInfo::default(),
            members: Vec::new(),
            values: ValuesInfo::default(),
            history_url: String::new(),
        }
    }
}

impl fmt::Display for SubscriptionStateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subscription: {} | Network: {} | Protocol: {}",
            self.dest.display_name(),
            self.net.display_name(),
            self.protocol
        )
    }
}
