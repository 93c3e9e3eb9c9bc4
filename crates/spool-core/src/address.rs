//! Addresses name both pipeline nodes and network endpoints. The dataflow
//! runtime routes streams between addresses; transports resolve them to
//! peers. Sharing one type keeps the two routing layers interchangeable.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Address {
        Address(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Address {
        Address(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Address {
        Address(s)
    }
}
