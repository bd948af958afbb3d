pub mod inspect;
pub mod replay;
pub mod verify;

pub use inspect::{inspect, InspectArgs};
pub use replay::{replay, ReplayArgs};
pub use verify::{verify, VerifyArgs};

use anyhow::{Context, Result};
use std::path::Path;
use tiledoc_history::{CDocument, DocumentTree, HistoryConfig, Manager};

pub(crate) fn load_document(path: &Path) -> Result<CDocument> {
    CDocument::load(path).with_context(|| format!("Failed to load history log {}", path.display()))
}

pub(crate) fn load_config(dir: &Path) -> Result<HistoryConfig> {
    HistoryConfig::load(dir).with_context(|| format!("Failed to load config from {}", dir.display()))
}

/// A manager over the log with one fresh tree per tree the log names
pub(crate) async fn manager_for(config: HistoryConfig, document: CDocument) -> Result<Manager> {
    let tree_ids = document.tree_ids();
    let manager = Manager::with_history(config, document)?;
    for id in tree_ids {
        manager.add_tree(DocumentTree::new(id)).await?;
    }
    Ok(manager)
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread().enable_all().build()?)
}
