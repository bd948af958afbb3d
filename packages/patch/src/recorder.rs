//! # Patch Recorder
//!
//! Captures the patches produced while one call (and its descendants) runs.
//!
//! ## Design
//!
//! - A recorder watches a single [`CallId`]
//! - The accept predicate decides which observed patches belong to that call;
//!   the default accepts the call itself and every descendant
//! - Suppressed patches (see [`crate::Draft::without_undo`]) are never accepted
//! - Accepted patches whose path points into a shared model payload also bump
//!   the [`SharedModelModifications`] counter; they are recorded either way
//! - `undo` reverts everything captured, newest first

use serde_json::Value;

use crate::shared::{shared_model_id, SharedModelModifications};
use crate::{apply_patch, CallEnv, CallId, Patch, PatchError};

/// One mutation as seen by the recorders attached to a draft
#[derive(Debug, Clone, Copy)]
pub struct PatchEvent<'a> {
    pub patch: &'a Patch,
    pub inverse: &'a Patch,

    /// Call the mutation was made from
    pub origin: &'a CallEnv,

    /// Made inside a `without_undo` scope
    pub suppressed: bool,

    /// Non-historical field; recorded for failure undo, never submitted
    pub volatile: bool,

    /// Applied on behalf of the manager; never counted as a shared-model change
    pub from_manager: bool,
}

/// A captured patch with its inverse
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPatch {
    pub patch: Patch,
    pub inverse: Patch,
    pub volatile: bool,
}

type AcceptFn = Box<dyn Fn(&PatchEvent<'_>) -> bool + Send + Sync>;

pub struct PatchRecorder {
    watched: CallId,
    recording: bool,
    entries: Vec<RecordedPatch>,
    modifications: SharedModelModifications,
    accept: AcceptFn,
}

impl PatchRecorder {
    /// Start recording patches made by `call` or any call nested inside it
    pub fn start(call: &CallEnv) -> Self {
        let watched = call.id.clone();
        let accept_id = watched.clone();
        Self::build(
            watched,
            Box::new(move |event: &PatchEvent<'_>| event.origin.is_descendant_of(&accept_id)),
        )
    }

    /// Start recording with a custom accept predicate
    pub fn with_filter<F>(call: &CallEnv, accept: F) -> Self
    where
        F: Fn(&PatchEvent<'_>) -> bool + Send + Sync + 'static,
    {
        Self::build(call.id.clone(), Box::new(accept))
    }

    fn build(watched: CallId, accept: AcceptFn) -> Self {
        Self {
            watched,
            recording: true,
            entries: Vec::new(),
            modifications: SharedModelModifications::new(),
            accept,
        }
    }

    /// Offer a patch to this recorder. Returns true if it was captured.
    pub fn observe(&mut self, event: &PatchEvent<'_>) -> bool {
        if !self.recording || event.suppressed || !(self.accept)(event) {
            return false;
        }

        if !event.from_manager {
            if let Some(id) = shared_model_id(&event.patch.path) {
                self.modifications.touch(id);
            }
        }

        self.entries.push(RecordedPatch {
            patch: event.patch.clone(),
            inverse: event.inverse.clone(),
            volatile: event.volatile,
        });
        true
    }

    pub fn watched(&self) -> &CallId {
        &self.watched
    }

    pub fn stop(&mut self) {
        self.recording = false;
    }

    pub fn resume(&mut self) {
        self.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RecordedPatch] {
        &self.entries
    }

    /// Captured patches in the order they were made
    pub fn patches(&self) -> Vec<Patch> {
        self.entries.iter().map(|e| e.patch.clone()).collect()
    }

    /// Inverses of [`Self::patches`], index for index
    pub fn inverse_patches(&self) -> Vec<Patch> {
        self.entries.iter().map(|e| e.inverse.clone()).collect()
    }

    /// Patches and inverses with volatile fields filtered out
    pub fn historical_patches(&self) -> (Vec<Patch>, Vec<Patch>) {
        self.entries
            .iter()
            .filter(|e| !e.volatile)
            .map(|e| (e.patch.clone(), e.inverse.clone()))
            .unzip()
    }

    pub fn shared_model_modifications(&self) -> &SharedModelModifications {
        &self.modifications
    }

    /// Revert everything captured so far, newest first.
    ///
    /// Inverses are applied straight to `root`, so no recorder sees them.
    pub fn undo(&self, root: &mut Value) -> Result<(), PatchError> {
        for entry in self.entries.iter().rev() {
            apply_patch(root, &entry.inverse)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PatchRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchRecorder")
            .field("watched", &self.watched)
            .field("recording", &self.recording)
            .field("entries", &self.entries)
            .field("modifications", &self.modifications)
            .finish_non_exhaustive()
    }
}
