//! # Tiledoc History
//!
//! Versioned history, undo/redo and shared-model synchronization for a set
//! of document trees.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ DocumentTree + middleware                   │
//! │  - runs commands through a recorded Draft   │
//! │  - undoes itself when an action fails       │
//! │  - reports shared models it touched         │
//! └─────────────────────────────────────────────┘
//!                     ↓ FinishedAction
//! ┌─────────────────────────────────────────────┐
//! │ Manager                                     │
//! │  - one entry per user action                │
//! │  - exchanges track outstanding cascades     │
//! │  - snapshots shared models to other trees   │
//! └─────────────────────────────────────────────┘
//!                     ↓ completed entries
//! ┌─────────────────────────────────────────────┐
//! │ CDocument                                   │
//! │  - ordered log + cursor                     │
//! │  - navigation, replay, persistence          │
//! └─────────────────────────────────────────────┘
//! ```

mod command;
mod config;
mod document;
mod errors;
mod events;
mod ids;
mod ledger;
mod manager;
pub mod middleware;
mod navigation;
pub mod paths;
mod record;
mod tile;
mod tree;

pub use command::Command;
pub use config::{HistoryConfig, DEFAULT_CONFIG_NAME};
pub use document::CDocument;
pub use errors::HistoryError;
pub use events::HistoryEvent;
pub use ids::{EntryId, Exchange, ExchangeId, TreeId};
pub use ledger::EntryStatus;
pub use manager::{ActionReceipt, Manager, TreeHandle};
pub use middleware::{Action, CascadeOrigin, FinishedAction, SharedModelBroadcast};
pub use record::{EntryState, HistoryEntry, TreePatchRecord};
pub use tile::{TileBehavior, TileDraft, TileRegistry};
pub use tree::DocumentTree;

pub use tiledoc_patch::{Patch, PatchOp};
