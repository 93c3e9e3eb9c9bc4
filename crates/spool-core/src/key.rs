//! Channel keys.
//!
//! A channel key is six bytes, little-endian: four bytes of leaseholder node
//! ID followed by two bytes of engine-local key. The leaseholder of a key is
//! therefore a pure function of the key itself, and routing decisions never
//! require a cluster round trip. Keys have a canonical string form
//! `"<nodeID>-<engineKey>"` that round-trips exactly and is the
//! representation used on the wire.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::node::NodeId;
use crate::proxy::Lease;

/// A key local to a single node's engine. Unique only within that node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EngineKey(pub u16);

impl fmt::Display for EngineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid channel key {0:?}")]
    Invalid(String),
}

/// The globally unique key of a channel: leaseholder node ID plus
/// engine-local key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChannelKey([u8; 6]);

impl ChannelKey {
    pub fn new(node_id: NodeId, engine_key: EngineKey) -> ChannelKey {
        let mut b = [0u8; 6];
        b[0..4].copy_from_slice(&node_id.0.to_le_bytes());
        b[4..6].copy_from_slice(&engine_key.0.to_le_bytes());
        ChannelKey(b)
    }

    /// The node that holds the lease on this channel.
    pub fn node_id(&self) -> NodeId {
        NodeId(u32::from_le_bytes([
            self.0[0], self.0[1], self.0[2], self.0[3],
        ]))
    }

    /// The key of the channel within its leaseholder's engine.
    pub fn engine_key(&self) -> EngineKey {
        EngineKey(u16::from_le_bytes([self.0[4], self.0[5]]))
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl Lease for ChannelKey {
    fn lease(&self) -> NodeId {
        self.node_id()
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.node_id(), self.engine_key())
    }
}

impl FromStr for ChannelKey {
    type Err = KeyError;

    /// Parses the canonical `"<nodeID>-<engineKey>"` form. Any other shape
    /// fails, including trailing sections, empty fields, and non-decimal
    /// digits.
    fn from_str(s: &str) -> Result<ChannelKey, KeyError> {
        let invalid = || KeyError::Invalid(s.to_string());
        let (node, engine) = s.split_once('-').ok_or_else(invalid)?;
        if node.is_empty() || engine.is_empty() || engine.contains('-') {
            return Err(invalid());
        }
        let node_id: u32 = node.parse().map_err(|_| invalid())?;
        let engine_key: u16 = engine.parse().map_err(|_| invalid())?;
        Ok(ChannelKey::new(NodeId(node_id), EngineKey(engine_key)))
    }
}

impl Serialize for ChannelKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChannelKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<ChannelKey, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An ordered collection of channel keys with the projections the
/// distribution layer needs for routing and translation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keys(pub Vec<ChannelKey>);

impl Keys {
    pub fn new(keys: Vec<ChannelKey>) -> Keys {
        Keys(keys)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The unique leaseholder node IDs, in order of first appearance.
    pub fn unique_node_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        for key in &self.0 {
            if !ids.contains(&key.node_id()) {
                ids.push(key.node_id());
            }
        }
        ids
    }

    /// Projects the keys onto their engine-local components.
    pub fn engine_keys(&self) -> Vec<EngineKey> {
        self.0.iter().map(|k| k.engine_key()).collect()
    }

    /// Builds the engine-key to channel-key map used to translate engine
    /// segments back into distribution segments.
    pub fn engine_map(&self) -> HashMap<EngineKey, ChannelKey> {
        self.0.iter().map(|k| (k.engine_key(), *k)).collect()
    }

    pub fn strings(&self) -> Vec<String> {
        self.0.iter().map(|k| k.to_string()).collect()
    }

    pub fn parse(strings: &[String]) -> Result<Keys, KeyError> {
        strings.iter().map(|s| s.parse()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChannelKey> {
        self.0.iter()
    }
}

impl std::ops::Deref for Keys {
    type Target = [ChannelKey];
    fn deref(&self) -> &[ChannelKey] {
        &self.0
    }
}

impl FromIterator<ChannelKey> for Keys {
    fn from_iter<I: IntoIterator<Item = ChannelKey>>(iter: I) -> Keys {
        Keys(iter.into_iter().collect())
    }
}

impl From<Vec<ChannelKey>> for Keys {
    fn from(keys: Vec<ChannelKey>) -> Keys {
        Keys(keys)
    }
}

impl<'a> IntoIterator for &'a Keys {
    type Item = &'a ChannelKey;
    type IntoIter = std::slice::Iter<'a, ChannelKey>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
