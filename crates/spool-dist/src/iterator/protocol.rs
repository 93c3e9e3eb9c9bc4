//! Iterator wire protocol.
//!
//! Requests flow client to server over a bidirectional stream; responses
//! multiplex acknowledgements and data behind a tagged variant, which is
//! what lets one response stream double as both the data path and the
//! command-completion bus.

use serde::{Deserialize, Serialize};
use spool_core::{Keys, NodeId, TimeRange, TimeSpan, TimeStamp};

use crate::frame::Segment;

/// Iterator command codes. The numeric values are wire-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Command {
    Open = 0,
    Next = 1,
    Prev = 2,
    First = 3,
    Last = 4,
    NextSpan = 5,
    PrevSpan = 6,
    NextRange = 7,
    SeekFirst = 8,
    SeekLast = 9,
    SeekLT = 10,
    SeekGE = 11,
    Exhaust = 12,
    Valid = 13,
    Error = 14,
    Close = 15,
}

impl From<Command> for u8 {
    fn from(c: Command) -> u8 {
        c as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = String;

    fn try_from(v: u8) -> Result<Command, String> {
        use Command::*;
        Ok(match v {
            0 => Open,
            1 => Next,
            2 => Prev,
            3 => First,
            4 => Last,
            5 => NextSpan,
            6 => PrevSpan,
            7 => NextRange,
            8 => SeekFirst,
            9 => SeekLast,
            10 => SeekLT,
            11 => SeekGE,
            12 => Exhaust,
            13 => Valid,
            14 => Error,
            15 => Close,
            other => return Err(format!("unknown iterator command {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub span: TimeSpan,
    #[serde(default)]
    pub range: TimeRange,
    #[serde(default)]
    pub stamp: TimeStamp,
    /// Only used on `Open`.
    #[serde(default)]
    pub keys: Keys,
}

impl Request {
    pub fn new(command: Command) -> Request {
        Request {
            command,
            span: TimeSpan::ZERO,
            range: TimeRange::default(),
            stamp: TimeStamp::default(),
            keys: Keys::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ResponseVariant {
    Ack = 1,
    Data = 2,
}

impl From<ResponseVariant> for u8 {
    fn from(v: ResponseVariant) -> u8 {
        v as u8
    }
}

impl TryFrom<u8> for ResponseVariant {
    type Error = String;

    fn try_from(v: u8) -> Result<ResponseVariant, String> {
        match v {
            1 => Ok(ResponseVariant::Ack),
            2 => Ok(ResponseVariant::Data),
            other => Err(format!("unknown response variant {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub variant: ResponseVariant,
    #[serde(rename = "nodeID")]
    pub node_id: NodeId,
    /// Echoed on acknowledgements.
    pub command: Command,
    #[serde(default)]
    pub ack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Response {
    /// An acknowledgement for `command` from `node_id`.
    pub fn ack(node_id: NodeId, command: Command, ack: bool) -> Response {
        Response {
            variant: ResponseVariant::Ack,
            node_id,
            command,
            ack,
            error: None,
            segments: Vec::new(),
        }
    }

    /// A negative acknowledgement carrying an error.
    pub fn nack(node_id: NodeId, command: Command, error: impl Into<String>) -> Response {
        Response {
            error: Some(error.into()),
            ..Response::ack(node_id, command, false)
        }
    }

    /// A data batch from `node_id`.
    pub fn data(node_id: NodeId, segments: Vec<Segment>) -> Response {
        Response {
            variant: ResponseVariant::Data,
            node_id,
            command: Command::Open,
            ack: false,
            error: None,
            segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_core::{ChannelKey, EngineKey, NodeId};

    #[test]
    fn request_wire_shape() {
        let request = Request {
            command: Command::NextRange,
            span: TimeSpan(5),
            range: TimeRange::new(TimeStamp(1), TimeStamp(2)),
            stamp: TimeStamp(3),
            keys: Keys::new(vec![ChannelKey::new(NodeId(1), EngineKey(2))]),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["command"], 7);
        assert_eq!(value["span"], 5);
        assert_eq!(value["range"]["start"], 1);
        assert_eq!(value["range"]["end"], 2);
        assert_eq!(value["stamp"], 3);
        assert_eq!(value["keys"][0], "1-2");
    }

    #[test]
    fn response_wire_shape() {
        let response = Response::nack(NodeId(3), Command::Close, "unreachable");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["variant"], 1);
        assert_eq!(value["nodeID"], 3);
        assert_eq!(value["command"], 15);
        assert_eq!(value["ack"], false);
        assert_eq!(value["error"], "unreachable");

        let round_trip: Response = serde_json::from_value(value).unwrap();
        assert_eq!(round_trip.node_id, NodeId(3));
        assert_eq!(round_trip.command, Command::Close);
    }

    #[test]
    fn command_codes_are_wire_stable() {
        assert_eq!(u8::from(Command::Open), 0);
        assert_eq!(u8::from(Command::NextRange), 7);
        assert_eq!(u8::from(Command::Exhaust), 12);
        assert_eq!(u8::from(Command::Valid), 13);
        assert_eq!(u8::from(Command::Error), 14);
        assert_eq!(u8::from(Command::Close), 15);
        assert!(Command::try_from(16).is_err());
    }

    #[test]
    fn response_variants_round_trip() {
        assert_eq!(ResponseVariant::try_from(1).unwrap(), ResponseVariant::Ack);
        assert_eq!(ResponseVariant::try_from(2).unwrap(), ResponseVariant::Data);
        assert!(ResponseVariant::try_from(0).is_err());
    }
}
