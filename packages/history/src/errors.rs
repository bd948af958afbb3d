//! Error types for the history engine

use thiserror::Error;
use tiledoc_patch::PatchError;

use crate::{EntryId, ExchangeId, TreeId};

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tree not found: {0}")]
    TreeNotFound(TreeId),

    #[error("Tree already registered: {0}")]
    DuplicateTree(TreeId),

    #[error("Tree has been destroyed: {0}")]
    TreeDestroyed(TreeId),

    #[error("Tile not found: {0}")]
    TileNotFound(String),

    #[error("Tile already exists: {0}")]
    DuplicateTile(String),

    #[error("Shared model not found: {0}")]
    SharedModelNotFound(String),

    #[error("Shared model already exists: {0}")]
    DuplicateSharedModel(String),

    #[error("Tile reaction failed: {0}")]
    TileReaction(String),

    #[error("History entry not found: {0}")]
    UnknownEntry(EntryId),

    #[error("Exchange {exchange_id} is not open on entry {entry_id}")]
    UnknownExchange {
        entry_id: EntryId,
        exchange_id: ExchangeId,
    },

    #[error("History entry is already complete: {0}")]
    EntryAlreadyComplete(EntryId),

    #[error("Shared model {shared_model_id} cascaded twice in tree {tree} (entry {entry_id})")]
    CascadeCycle {
        entry_id: EntryId,
        tree: TreeId,
        shared_model_id: String,
    },

    #[error("Cascade depth {depth} exceeds limit {limit} (entry {entry_id})")]
    CascadeDepthExceeded {
        entry_id: EntryId,
        depth: usize,
        limit: usize,
    },

    #[error("{0} history entries are still recording")]
    EntriesInFlight(usize),

    #[error("History index {index} is out of range (log length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid history snapshot: {0}")]
    InvalidSnapshot(String),
}
