//! Distribution segments and engine-key translation.
//!
//! Engine segments carry engine-local keys; everything that leaves a node
//! carries channel keys. Translators are seeded at open time with the
//! engine-key map of the open request's key set. An engine segment whose
//! key is missing from the map is a server bug, not a user error, and is
//! reported as such.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use spool_core::{ChannelKey, EngineKey, Keys, Lease, NodeId, TimeStamp};

use crate::error::DistError;

/// The unit of time-series data transported across the distribution layer.
/// Once emitted into a pipeline stream a segment is handed off; downstream
/// stages treat it as read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "channelKey")]
    pub channel_key: ChannelKey,
    pub start: TimeStamp,
    pub data: Bytes,
}

impl Segment {
    pub fn new(channel_key: ChannelKey, start: TimeStamp, data: impl Into<Bytes>) -> Segment {
        Segment {
            channel_key,
            start,
            data: data.into(),
        }
    }

    /// Projects the segment into its leaseholder's engine.
    pub fn to_engine(&self) -> spool_engine::Segment {
        spool_engine::Segment::new(self.channel_key.engine_key(), self.start, self.data.clone())
    }
}

impl Lease for Segment {
    fn lease(&self) -> NodeId {
        self.channel_key.node_id()
    }
}

/// Wraps engine segments with the channel keys they belong to.
pub struct SegmentTranslator {
    map: HashMap<EngineKey, ChannelKey>,
}

impl SegmentTranslator {
    /// Seeds the translator from an open request's key set.
    pub fn new(keys: &Keys) -> SegmentTranslator {
        SegmentTranslator {
            map: keys.engine_map(),
        }
    }

    pub fn wrap(&self, segments: Vec<spool_engine::Segment>) -> Result<Vec<Segment>, DistError> {
        segments
            .into_iter()
            .map(|seg| {
                let key = self.map.get(&seg.channel_key).ok_or_else(|| {
                    DistError::Internal(format!(
                        "engine key {} missing from translation map",
                        seg.channel_key
                    ))
                })?;
                Ok(Segment {
                    channel_key: *key,
                    start: seg.start,
                    data: seg.data,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_core::NodeId;

    #[test]
    fn wraps_known_keys_and_flags_unknown_ones() {
        let key = ChannelKey::new(NodeId(1), EngineKey(2));
        let translator = SegmentTranslator::new(&Keys::new(vec![key]));
        let wrapped = translator
            .wrap(vec![spool_engine::Segment::new(
                EngineKey(2),
                TimeStamp(0),
                vec![1, 2, 3],
            )])
            .unwrap();
        assert_eq!(wrapped[0].channel_key, key);

        let err = translator
            .wrap(vec![spool_engine::Segment::new(
                EngineKey(9),
                TimeStamp(0),
                vec![],
            )])
            .unwrap_err();
        assert!(matches!(err, DistError::Internal(_)));
    }
}
