//! # Action Tracking
//!
//! Wraps every top-level action on a [`DocumentTree`]:
//!
//! 1. **Start**: assign an exchange (fresh, or the one the manager supplied)
//!    and register the call in the tracked-call table
//! 2. **Run**: execute the action through a [`Draft`] with a
//!    [`PatchRecorder`] attached
//! 3. **Finish**: on success hand back a [`FinishedAction`] for the manager;
//!    on failure undo the recorded patches and return the error
//!
//! Nested calls made inside an action go through `Draft::nested` and never
//! reach this layer, so only the outermost call is tracked.

use serde_json::Value;
use tiledoc_patch::shared::{shared_model_entry_path, shared_model_path};
use tiledoc_patch::{CallEnv, Draft, Patch, PatchRecorder};
use tracing::{debug, warn};

use crate::paths::{linked_tiles, tile_path};
use crate::tile::TileDraft;
use crate::{Command, DocumentTree, Exchange, HistoryError, TileRegistry, TreeId, TreePatchRecord};

pub const APPLY_PATCHES_FROM_MANAGER: &str = "applyPatchesFromManager";
pub const APPLY_SHARED_MODEL_SNAPSHOT: &str = "applySharedModelSnapshotFromManager";
pub const HANDLE_SHARED_MODEL_CHANGES: &str = "handleSharedModelChanges";
pub const REACT_TO_SHARED_MODEL_CHANGE: &str = "reactToSharedModelChange";

/// A top-level action a tree can run
#[derive(Debug, Clone)]
pub enum Action {
    /// A user command; opens a new history entry
    Command(Command),

    /// Apply patches produced elsewhere. Never schedules cascades.
    ApplyPatchesFromManager { exchange: Exchange, patches: Vec<Patch> },

    /// Overwrite a shared model payload with the source tree's copy
    ApplySharedModelSnapshot {
        exchange: Exchange,
        shared_model_id: String,
        snapshot: Value,
    },

    /// Let every tile linked to a shared model react to its change
    HandleSharedModelChanged {
        exchange: Exchange,
        shared_model_id: String,
        /// The change arrived as a snapshot from another tree
        from_manager: bool,
    },
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Command(command) => command.name(),
            Action::ApplyPatchesFromManager { .. } => APPLY_PATCHES_FROM_MANAGER,
            Action::ApplySharedModelSnapshot { .. } => APPLY_SHARED_MODEL_SNAPSHOT,
            Action::HandleSharedModelChanged { .. } => HANDLE_SHARED_MODEL_CHANGES,
        }
    }

    /// The exchange the manager assigned, if this action is manager-directed
    pub fn manager_exchange(&self) -> Option<&Exchange> {
        match self {
            Action::Command(_) => None,
            Action::ApplyPatchesFromManager { exchange, .. }
            | Action::ApplySharedModelSnapshot { exchange, .. }
            | Action::HandleSharedModelChanged { exchange, .. } => Some(exchange),
        }
    }

    fn undoable(&self) -> bool {
        match self {
            Action::Command(command) => command.undoable(),
            Action::ApplyPatchesFromManager { .. } => false,
            Action::ApplySharedModelSnapshot { .. } | Action::HandleSharedModelChanged { .. } => true,
        }
    }
}

/// Where the shared-model changes of a finished action came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeOrigin {
    Local,
    /// Applied from another tree's snapshot; reactions must not rebroadcast
    Snapshot,
}

/// Shared model state to forward to other trees
#[derive(Debug, Clone, PartialEq)]
pub struct SharedModelBroadcast {
    pub shared_model_id: String,
    pub snapshot: Value,
}

/// What a tree hands the manager after an action succeeded
#[derive(Debug, Clone)]
pub struct FinishedAction {
    pub exchange: Exchange,
    pub tree: TreeId,
    pub action: String,
    pub record: TreePatchRecord,
    /// Shared models whose payload the action touched
    pub shared_models_changed: Vec<String>,
    pub broadcast: Option<SharedModelBroadcast>,
    /// The manager opened the entry before the action ran
    pub manager_directed: bool,
    pub undoable: bool,
    pub origin: CascadeOrigin,
    /// Cascade depth of the action within its entry
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct TrackedCall {
    pub exchange: Exchange,
    pub manager_directed: bool,
    pub undoable: bool,
}

impl DocumentTree {
    /// Run a top-level action.
    ///
    /// On error the tree is left as it was before the call and nothing is
    /// returned for history; the manager decides how to close the exchange.
    pub fn run_action(&mut self, action: Action, depth: usize) -> Result<FinishedAction, HistoryError> {
        if self.is_destroyed() {
            return Err(HistoryError::TreeDestroyed(self.id.clone()));
        }

        let call = self.on_start(&action);
        let mut recorder = PatchRecorder::start(&call);

        let bracketed = matches!(action, Action::ApplyPatchesFromManager { .. });
        if bracketed {
            self.start_applying_patches_from_manager();
        }

        let outcome = {
            let DocumentTree {
                state,
                call_ids,
                registry,
                ..
            } = self;
            let mut draft = Draft::new(state, call_ids, call.clone());
            draft.attach(&mut recorder);
            dispatch(&action, &mut draft, registry)
        };

        recorder.stop();
        let finished = self.on_finish(&call, &action, recorder, outcome, depth);
        if bracketed {
            self.finish_applying_patches_from_manager();
        }
        finished
    }

    fn on_start(&mut self, action: &Action) -> CallEnv {
        let (exchange, manager_directed) = match action.manager_exchange() {
            Some(exchange) => (exchange.clone(), true),
            None => (Exchange::random(), false),
        };

        let call = CallEnv::root(self.call_ids.next_id(), action.name());
        debug!(
            tree = %self.id,
            call = %call.id,
            action = action.name(),
            entry = %exchange.history_entry_id,
            "action started"
        );
        self.tracked.insert(
            call.id.clone(),
            TrackedCall {
                exchange,
                manager_directed,
                undoable: action.undoable(),
            },
        );
        call
    }

    fn on_finish(
        &mut self,
        call: &CallEnv,
        action: &Action,
        recorder: PatchRecorder,
        outcome: Result<Option<String>, HistoryError>,
        depth: usize,
    ) -> Result<FinishedAction, HistoryError> {
        let tracked = match self.tracked.remove(&call.id) {
            Some(tracked) => tracked,
            None => panic!("call {} finished without being tracked", call.id),
        };

        let broadcast_id = match outcome {
            Ok(broadcast_id) => broadcast_id,
            Err(err) => {
                warn!(tree = %self.id, action = action.name(), error = %err, "action failed, undoing");
                if let Err(undo_err) = recorder.undo(&mut self.state) {
                    tracing::error!(tree = %self.id, error = %undo_err, "undo after failed action did not apply");
                }
                return Err(err);
            }
        };

        let (patches, inverse_patches) = recorder.historical_patches();
        let record = TreePatchRecord::new(self.id.clone(), action.name(), patches, inverse_patches);
        // Inside the manager bracket shared model changes never propagate
        let shared_models_changed: Vec<String> = if self.is_applying_patches_from_manager() {
            Vec::new()
        } else {
            recorder
                .shared_model_modifications()
                .changed()
                .map(str::to_string)
                .collect()
        };
        let broadcast = broadcast_id.and_then(|shared_model_id| {
            self.shared_model_snapshot(&shared_model_id)
                .map(|snapshot| SharedModelBroadcast {
                    shared_model_id,
                    snapshot,
                })
        });
        let origin = match action {
            Action::ApplySharedModelSnapshot { .. } => CascadeOrigin::Snapshot,
            _ => CascadeOrigin::Local,
        };

        debug!(
            tree = %self.id,
            action = action.name(),
            patches = record.patches.len(),
            shared_models = shared_models_changed.len(),
            "action finished"
        );

        Ok(FinishedAction {
            exchange: tracked.exchange,
            tree: self.id.clone(),
            action: action.name().to_string(),
            record,
            shared_models_changed,
            broadcast,
            manager_directed: tracked.manager_directed,
            undoable: tracked.undoable,
            origin,
            depth,
        })
    }
}

/// Execute an action's body. Returns the shared model to broadcast, if any.
fn dispatch(
    action: &Action,
    draft: &mut Draft<'_>,
    registry: &TileRegistry,
) -> Result<Option<String>, HistoryError> {
    match action {
        Action::Command(command) => {
            command.apply(draft)?;
            Ok(None)
        }

        Action::ApplyPatchesFromManager { patches, .. } => {
            draft.applying_from_manager(|d| patches.iter().try_for_each(|patch| d.apply(patch)))?;
            Ok(None)
        }

        Action::ApplySharedModelSnapshot {
            shared_model_id,
            snapshot,
            ..
        } => {
            if !draft.contains(&shared_model_entry_path(shared_model_id)) {
                return Err(HistoryError::SharedModelNotFound(shared_model_id.clone()));
            }
            draft.set(&shared_model_path(shared_model_id), snapshot.clone())?;
            Ok(None)
        }

        Action::HandleSharedModelChanged {
            shared_model_id,
            from_manager,
            ..
        } => {
            react_to_shared_model_change(draft, registry, shared_model_id)?;
            Ok((!from_manager).then(|| shared_model_id.clone()))
        }
    }
}

fn react_to_shared_model_change(
    draft: &mut Draft<'_>,
    registry: &TileRegistry,
    shared_model_id: &str,
) -> Result<(), HistoryError> {
    for tile_id in linked_tiles(draft.root(), shared_model_id) {
        let tile_type = draft
            .get(&tile_path(&tile_id))
            .and_then(|tile| tile.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let Some(behavior) = tile_type.as_deref().and_then(|t| registry.get(t)) else {
            debug!(tile = %tile_id, "no behavior registered, skipping reaction");
            continue;
        };

        draft.nested(REACT_TO_SHARED_MODEL_CHANGE, |d| {
            let mut tile = TileDraft::new(d, &tile_id);
            behavior.react_to_shared_model_change(&mut tile, shared_model_id)
        })?;
    }
    Ok(())
}
