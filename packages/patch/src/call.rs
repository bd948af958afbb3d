//! Call attribution.
//!
//! Every mutation happens inside a call. Calls nest: a batch command runs its
//! sub-commands as child calls, and a recorder watching a call accepts patches
//! from the call itself and from any of its descendants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one call, unique within the tree that minted it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequential call id generator seeded by the owning tree's id
#[derive(Debug, Clone)]
pub struct CallIdGenerator {
    seed: String,
    count: u64,
}

impl CallIdGenerator {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            count: 0,
        }
    }

    /// Generate next sequential ID
    pub fn next_id(&mut self) -> CallId {
        self.count += 1;
        CallId(format!("{}-{}", self.seed, self.count))
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}

/// Execution context of a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEnv {
    pub id: CallId,

    /// Action name of this call
    pub action: String,

    /// Enclosing calls, outermost first
    ancestors: Vec<CallId>,
}

impl CallEnv {
    pub fn root(id: CallId, action: impl Into<String>) -> Self {
        Self {
            id,
            action: action.into(),
            ancestors: Vec::new(),
        }
    }

    pub fn child(&self, id: CallId, action: impl Into<String>) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.id.clone());
        Self {
            id,
            action: action.into(),
            ancestors,
        }
    }

    pub fn parent(&self) -> Option<&CallId> {
        self.ancestors.last()
    }

    /// The outermost call this one runs under (itself if it is a root)
    pub fn root_id(&self) -> &CallId {
        self.ancestors.first().unwrap_or(&self.id)
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// True if this call is `call` or runs (transitively) inside it
    pub fn is_descendant_of(&self, call: &CallId) -> bool {
        &self.id == call || self.ancestors.contains(call)
    }
}
