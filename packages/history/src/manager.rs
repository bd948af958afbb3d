//! # History Manager
//!
//! Coordinates history across every registered tree.
//!
//! ```text
//! execute(tree, command)
//!     │  run_action (synchronous, under the tree lock)
//!     ▼
//! queue ── Task::Complete ──► open entry, schedule cascades,
//!     ▲                        broadcast snapshots, close exchange
//!     │
//!     └──── Task::Run ◄────── handleSharedModelChanges / applySnapshot
//! ```
//!
//! The queue is drained by [`Manager::settle`] (deterministic, used by tests
//! and the CLI) or by a background loop from [`Manager::spawn_worker`].
//! An entry completes once every exchange opened against it has been closed.
//! Its place in the log is reserved while the initiating tree is still
//! locked, so the log follows the order changes reached the trees, not the
//! order their coordination finished.
//!
//! Lock order is tree before ledger.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tiledoc_patch::Patch;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, warn};

use crate::ledger::{EntryStatus, Ledger, Settled};
use crate::middleware::{CascadeOrigin, FinishedAction};
use crate::{
    Action, CDocument, Command, DocumentTree, EntryId, Exchange, HistoryConfig, HistoryEntry,
    HistoryError, HistoryEvent, TreeId, TreePatchRecord,
};

pub type TreeHandle = Arc<Mutex<DocumentTree>>;

/// Returned by [`Manager::execute`]: the entry and exchange the action opened
pub type ActionReceipt = Exchange;

enum Task {
    /// A tree finished an action; fold it into the ledger
    Complete {
        tree: Weak<Mutex<DocumentTree>>,
        finished: FinishedAction,
    },
    /// Run a manager-directed action on a tree
    Run {
        tree_id: TreeId,
        tree: Weak<Mutex<DocumentTree>>,
        action: Action,
        depth: usize,
    },
}

impl Task {
    fn entry_id(&self) -> Option<&EntryId> {
        match self {
            Task::Complete { finished, .. } => Some(&finished.exchange.history_entry_id),
            Task::Run { action, .. } => action.manager_exchange().map(|e| &e.history_entry_id),
        }
    }
}

pub(crate) struct ManagerInner {
    pub(crate) config: HistoryConfig,
    pub(crate) ledger: Mutex<Ledger>,
    pub(crate) trees: RwLock<HashMap<TreeId, TreeHandle>>,
    queue: Mutex<VecDeque<Task>>,
    wakeup: Notify,
    pub(crate) events: broadcast::Sender<HistoryEvent>,
}

#[derive(Clone)]
pub struct Manager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl Manager {
    pub fn new() -> Self {
        Self::with_config(HistoryConfig::default())
    }

    pub fn with_config(config: HistoryConfig) -> Self {
        let ledger = Ledger::new(config.prune_empty_entries);
        Self::from_parts(config, ledger)
    }

    /// Start from a persisted log. Registered trees are expected to be fresh;
    /// call `replay_history_to_trees` or `restore_history` to bring them up.
    pub fn with_history(config: HistoryConfig, document: CDocument) -> Result<Self, HistoryError> {
        document.validate()?;
        let ledger = Ledger::with_document(document, config.prune_empty_entries);
        Ok(Self::from_parts(config, ledger))
    }

    fn from_parts(config: HistoryConfig, ledger: Ledger) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(ManagerInner {
                config,
                ledger: Mutex::new(ledger),
                trees: RwLock::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                wakeup: Notify::new(),
                events,
            }),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.inner.config
    }

    pub async fn add_tree(&self, tree: DocumentTree) -> Result<TreeHandle, HistoryError> {
        let mut trees = self.inner.trees.write().await;
        let id = tree.id().clone();
        if trees.contains_key(&id) {
            return Err(HistoryError::DuplicateTree(id));
        }
        let handle = Arc::new(Mutex::new(tree));
        trees.insert(id.clone(), handle.clone());
        info!(tree = %id, "tree registered");
        Ok(handle)
    }

    /// Unregister and destroy a tree. Queued work for it is dropped.
    pub async fn remove_tree(&self, tree_id: &str) -> Result<(), HistoryError> {
        let handle = self
            .inner
            .trees
            .write()
            .await
            .remove(tree_id)
            .ok_or_else(|| HistoryError::TreeNotFound(tree_id.to_string()))?;
        handle.lock().await.destroy();
        info!(tree = %tree_id, "tree removed");
        Ok(())
    }

    pub async fn tree_handle(&self, tree_id: &str) -> Result<TreeHandle, HistoryError> {
        self.inner
            .trees
            .read()
            .await
            .get(tree_id)
            .cloned()
            .ok_or_else(|| HistoryError::TreeNotFound(tree_id.to_string()))
    }

    pub async fn tree_ids(&self) -> Vec<TreeId> {
        let mut ids: Vec<_> = self.inner.trees.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn tree_snapshot(&self, tree_id: &str) -> Result<serde_json::Value, HistoryError> {
        let handle = self.tree_handle(tree_id).await?;
        let tree = handle.lock().await;
        Ok(tree.snapshot().clone())
    }

    /// Run a user command. The tree changes before this returns; history
    /// bookkeeping and cascades are queued.
    pub async fn execute(&self, tree_id: &str, command: Command) -> Result<ActionReceipt, HistoryError> {
        let handle = self.tree_handle(tree_id).await?;
        self.run_root_action(&handle, Action::Command(command)).await
    }

    /// Apply patches that originated outside this manager. They land in a
    /// non-undoable entry and never trigger shared-model cascades. A batch
    /// that fails to apply leaves the tree unchanged and opens no entry.
    pub async fn apply_remote_patches(&self, tree_id: &str, patches: Vec<Patch>) -> Result<ActionReceipt, HistoryError> {
        let handle = self.tree_handle(tree_id).await?;
        let action = Action::ApplyPatchesFromManager {
            exchange: Exchange::random(),
            patches,
        };
        self.run_root_action(&handle, action).await
    }

    async fn run_root_action(&self, handle: &TreeHandle, action: Action) -> Result<ActionReceipt, HistoryError> {
        let finished = {
            let mut tree = handle.lock().await;
            let finished = tree.run_action(action, 0)?;
            self.inner.ledger.lock().await.reserve(
                &finished.exchange,
                &finished.tree,
                &finished.action,
                finished.undoable,
            );
            finished
        };

        let receipt = finished.exchange.clone();
        self.emit(HistoryEvent::EntryStarted {
            entry_id: receipt.history_entry_id.clone(),
            tree: finished.tree.clone(),
            action: finished.action.clone(),
        });
        self.enqueue(Task::Complete {
            tree: Arc::downgrade(handle),
            finished,
        })
        .await;
        Ok(receipt)
    }

    /// Open an exchange on an entry, creating the entry if it is new
    pub async fn add_history_entry(
        &self,
        exchange: &Exchange,
        tree_id: &str,
        action: &str,
        undoable: bool,
    ) -> Result<(), HistoryError> {
        let created = self
            .inner
            .ledger
            .lock()
            .await
            .add_history_entry(exchange, tree_id, action, undoable)?;
        if created {
            self.emit(HistoryEvent::EntryStarted {
                entry_id: exchange.history_entry_id.clone(),
                tree: tree_id.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    pub async fn start_exchange(&self, exchange: &Exchange, reason: &str) -> Result<(), HistoryError> {
        self.inner.ledger.lock().await.start_exchange(exchange, reason)
    }

    /// Close an exchange with the patches it produced
    pub async fn add_tree_patch_record(&self, exchange: &Exchange, record: TreePatchRecord) -> Result<(), HistoryError> {
        let settled = self
            .inner
            .ledger
            .lock()
            .await
            .add_tree_patch_record(exchange, record)?;
        self.emit_settled(settled);
        Ok(())
    }

    /// Send a shared model snapshot to every other tree that holds the model.
    /// Each target gets its own exchange on `entry_id`.
    pub async fn update_shared_model(
        &self,
        entry_id: &EntryId,
        source_tree: &str,
        shared_model_id: &str,
        snapshot: serde_json::Value,
        depth: usize,
    ) -> Result<Vec<Exchange>, HistoryError> {
        let candidates: Vec<(TreeId, TreeHandle)> = self
            .inner
            .trees
            .read()
            .await
            .iter()
            .filter(|(id, _)| id.as_str() != source_tree)
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();

        let mut targets = Vec::new();
        for (tree_id, handle) in candidates {
            let tree = handle.lock().await;
            if !tree.is_destroyed() && tree.has_shared_model(shared_model_id) {
                targets.push((tree_id, Arc::downgrade(&handle)));
            }
        }
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        let mut exchanges = Vec::with_capacity(targets.len());
        for (tree_id, weak) in targets {
            let exchange = Exchange::new(entry_id.clone(), crate::ExchangeId::random());
            self.start_exchange(&exchange, &format!("updateSharedModel:{}", shared_model_id))
                .await?;
            debug!(entry = %entry_id, from = source_tree, to = %tree_id, shared_model = shared_model_id, "broadcasting shared model");
            self.enqueue(Task::Run {
                tree_id,
                tree: weak,
                action: Action::ApplySharedModelSnapshot {
                    exchange: exchange.clone(),
                    shared_model_id: shared_model_id.to_string(),
                    snapshot: snapshot.clone(),
                },
                depth,
            })
            .await;
            exchanges.push(exchange);
        }
        Ok(exchanges)
    }

    /// Process queued work until the queue is empty
    pub async fn settle(&self) -> Result<(), HistoryError> {
        loop {
            let task = self.inner.queue.lock().await.pop_front();
            let Some(task) = task else {
                return Ok(());
            };
            if let Err(err) = self.process(task).await {
                error!(error = %err, "history task failed");
                return Err(err);
            }
        }
    }

    /// Drain the queue in the background whenever work arrives
    pub fn spawn_worker(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                // Errors are already logged by settle
                let _ = manager.settle().await;
                manager.inner.wakeup.notified().await;
            }
        })
    }

    /// Wait until an entry completes (or is pruned). Does not drive the
    /// queue itself; a worker or a concurrent `settle` must be running.
    pub async fn wait_for_entry(&self, entry_id: &EntryId) -> Result<EntryStatus, HistoryError> {
        let mut events = self.inner.events.subscribe();
        loop {
            match self.entry_status(entry_id).await {
                status @ (EntryStatus::Complete | EntryStatus::Discarded) => return Ok(status),
                _ => {}
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(HistoryError::UnknownEntry(entry_id.clone()))
                }
            }
        }
    }

    pub async fn entry_status(&self, entry_id: &EntryId) -> EntryStatus {
        self.inner.ledger.lock().await.status(entry_id)
    }

    pub async fn is_entry_complete(&self, entry_id: &EntryId) -> bool {
        self.entry_status(entry_id).await == EntryStatus::Complete
    }

    pub async fn entry(&self, entry_id: &EntryId) -> Option<HistoryEntry> {
        self.inner.ledger.lock().await.entry(entry_id).cloned()
    }

    /// Completed entries in log order
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.inner.ledger.lock().await.document().history.clone()
    }

    pub async fn current_history_index(&self) -> usize {
        self.inner.ledger.lock().await.document().current_history_index()
    }

    pub async fn pending_entries(&self) -> usize {
        self.inner.ledger.lock().await.pending_count()
    }

    /// A copy of the completed log and cursor, suitable for `CDocument::save`
    pub async fn history_snapshot(&self) -> CDocument {
        self.inner.ledger.lock().await.document().clone()
    }

    pub fn subscribe(&self) -> BroadcastStream<HistoryEvent> {
        BroadcastStream::new(self.inner.events.subscribe())
    }

    pub(crate) fn emit(&self, event: HistoryEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub(crate) async fn queued_tasks(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    fn emit_settled(&self, settled: Vec<Settled>) {
        for settled in settled {
            match settled {
                Settled::Completed { entry_id, index } => self.emit(HistoryEvent::EntryCompleted { entry_id, index }),
                Settled::Discarded { entry_id } => self.emit(HistoryEvent::EntryDiscarded { entry_id }),
            }
        }
    }

    async fn discard_entry(&self, entry_id: &EntryId) -> Option<HistoryEntry> {
        let (entry, settled) = self.inner.ledger.lock().await.discard(entry_id);
        if entry.is_some() {
            self.emit(HistoryEvent::EntryDiscarded {
                entry_id: entry_id.clone(),
            });
        }
        self.emit_settled(settled);
        entry
    }

    /// Drop an entry after a cascade guard failed: its queued work is
    /// removed and every record it produced so far is reverted, newest first.
    async fn abandon_entry(&self, entry_id: &EntryId, current: TreePatchRecord) {
        let purged = {
            let mut queue = self.inner.queue.lock().await;
            let before = queue.len();
            queue.retain(|task| task.entry_id() != Some(entry_id));
            before - queue.len()
        };

        let mut records = self
            .discard_entry(entry_id)
            .await
            .map(|entry| entry.records)
            .unwrap_or_default();
        records.push(current);

        for record in records.iter().rev().filter(|r| !r.is_empty()) {
            let result = match self.tree_handle(&record.tree).await {
                Ok(handle) => handle.lock().await.revert_patches_from_manager(&record.inverse_patches),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                error!(entry = %entry_id, tree = %record.tree, error = %err, "could not revert abandoned record");
            }
        }
        warn!(entry = %entry_id, purged, records = records.len(), "history entry abandoned");
    }

    async fn enqueue(&self, task: Task) {
        self.inner.queue.lock().await.push_back(task);
        self.inner.wakeup.notify_one();
    }

    async fn process(&self, task: Task) -> Result<(), HistoryError> {
        match task {
            Task::Complete { tree, finished } => self.complete_action(tree, finished).await,
            Task::Run {
                tree_id,
                tree,
                action,
                depth,
            } => self.run_manager_action(tree_id, tree, action, depth).await,
        }
    }

    async fn run_manager_action(
        &self,
        tree_id: TreeId,
        weak: Weak<Mutex<DocumentTree>>,
        action: Action,
        depth: usize,
    ) -> Result<(), HistoryError> {
        let name = action.name().to_string();
        let exchange = action.manager_exchange().cloned();

        let result = match weak.upgrade() {
            Some(handle) => {
                let mut tree = handle.lock().await;
                if tree.is_destroyed() {
                    None
                } else {
                    Some(tree.run_action(action, depth))
                }
            }
            None => None,
        };

        let Some(result) = result else {
            warn!(tree = %tree_id, action = %name, "tree removed before manager action ran");
            if let Some(exchange) = exchange {
                self.add_tree_patch_record(&exchange, TreePatchRecord::empty(tree_id, name))
                    .await?;
            }
            return Ok(());
        };

        match result {
            Ok(finished) => self.complete_action(weak, finished).await,
            Err(err) => {
                error!(tree = %tree_id, action = %name, error = %err, "manager action failed");
                if let Some(exchange) = exchange {
                    self.add_tree_patch_record(&exchange, TreePatchRecord::empty(tree_id, name))
                        .await?;
                }
                Ok(())
            }
        }
    }

    async fn complete_action(&self, weak: Weak<Mutex<DocumentTree>>, finished: FinishedAction) -> Result<(), HistoryError> {
        let alive = match weak.upgrade() {
            Some(handle) => !handle.lock().await.is_destroyed(),
            None => false,
        };
        if !alive {
            debug!(tree = %finished.tree, action = %finished.action, "dropping completion for destroyed tree");
            if finished.depth == 0 {
                self.discard_entry(&finished.exchange.history_entry_id).await;
                return Ok(());
            }
            let record = TreePatchRecord::empty(finished.tree, finished.action);
            return self.add_tree_patch_record(&finished.exchange, record).await;
        }

        let FinishedAction {
            exchange,
            tree,
            record,
            shared_models_changed,
            broadcast,
            origin,
            depth,
            ..
        } = finished;
        let entry_id = exchange.history_entry_id.clone();

        if !shared_models_changed.is_empty() || broadcast.is_some() {
            let next_depth = depth + 1;
            let limit = self.inner.config.max_cascade_depth;
            if next_depth > limit {
                let err = HistoryError::CascadeDepthExceeded {
                    entry_id: entry_id.clone(),
                    depth: next_depth,
                    limit,
                };
                error!(entry = %entry_id, tree = %tree, error = %err, "cascade guard tripped");
                self.abandon_entry(&entry_id, record).await;
                return Err(err);
            }
        }

        for shared_model_id in shared_models_changed {
            let begun = self
                .inner
                .ledger
                .lock()
                .await
                .begin_cascade(&entry_id, &tree, &shared_model_id);
            if let Err(err) = begun {
                error!(entry = %entry_id, tree = %tree, error = %err, "cascade guard tripped");
                self.abandon_entry(&entry_id, record).await;
                return Err(err);
            }

            let cascade = exchange.sibling();
            self.start_exchange(&cascade, &format!("sharedModelChanged:{}", shared_model_id))
                .await?;
            self.enqueue(Task::Run {
                tree_id: tree.clone(),
                tree: weak.clone(),
                action: Action::HandleSharedModelChanged {
                    exchange: cascade,
                    shared_model_id,
                    from_manager: origin == CascadeOrigin::Snapshot,
                },
                depth: depth + 1,
            })
            .await;
        }

        if let Some(broadcast) = broadcast {
            self.update_shared_model(&entry_id, &tree, &broadcast.shared_model_id, broadcast.snapshot, depth + 1)
                .await?;
        }

        self.add_tree_patch_record(&exchange, record).await
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
