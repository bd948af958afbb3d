//! # Tiledoc Patch
//!
//! Reversible structural patches over JSON trees.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Draft: the only way a tree is mutated       │
//! │  - computes patch + inverse per write       │
//! │  - attributes each write to a CallEnv       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ PatchRecorder: per-call capture             │
//! │  - accepts the watched call + descendants   │
//! │  - counts shared-model payload touches      │
//! │  - undo on failure                          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Patches are applied in the order recorded and undone by applying their
//! inverses in the reverse order.

mod apply;
mod call;
mod draft;
mod errors;
pub mod pointer;
mod recorder;
pub mod shared;
mod types;

pub use apply::{apply_patch, apply_patches, revert_patches};
pub use call::{CallEnv, CallId, CallIdGenerator};
pub use draft::Draft;
pub use errors::PatchError;
pub use recorder::{PatchEvent, PatchRecorder, RecordedPatch};
pub use shared::{shared_model_id, SharedModelModifications};
pub use types::{Patch, PatchOp};
