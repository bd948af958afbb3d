//! Identifiers minted by the history engine

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a monitored tree
pub type TreeId = String;

/// Identifier of a history entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one outstanding unit of coordination work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An exchange token: one open exchange against one history entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Exchange {
    pub history_entry_id: EntryId,
    pub exchange_id: ExchangeId,
}

impl Exchange {
    pub fn new(history_entry_id: EntryId, exchange_id: ExchangeId) -> Self {
        Self {
            history_entry_id,
            exchange_id,
        }
    }

    /// Fresh entry id and fresh exchange id
    pub fn random() -> Self {
        Self::new(EntryId::random(), ExchangeId::random())
    }

    /// A new exchange against the same entry
    pub fn sibling(&self) -> Self {
        Self::new(self.history_entry_id.clone(), ExchangeId::random())
    }
}
