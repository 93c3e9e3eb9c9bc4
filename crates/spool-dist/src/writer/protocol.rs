//! Writer wire protocol.
//!
//! The first client-to-server message carries the keys to lock and no
//! segments; every subsequent message carries segments. Server-to-client
//! messages carry an optional error per flushed batch.

use serde::{Deserialize, Serialize};
use spool_core::Keys;

use crate::frame::Segment;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    /// Only set on the open message.
    #[serde(rename = "openKeys", default, skip_serializing_if = "Keys::is_empty")]
    pub open_keys: Keys,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<Segment>,
}

impl Request {
    pub fn open(keys: Keys) -> Request {
        Request {
            open_keys: keys,
            segments: Vec::new(),
        }
    }

    pub fn data(segments: Vec<Segment>) -> Request {
        Request {
            open_keys: Keys::default(),
            segments,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Response {
        Response {
            error: Some(message.into()),
        }
    }
}
