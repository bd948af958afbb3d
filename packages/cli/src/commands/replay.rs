use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tiledoc_history::{CDocument, HistoryConfig, TreeId};

use super::{load_config, load_document, manager_for, runtime};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Saved history log (JSON)
    pub log: PathBuf,

    /// Number of entries to apply (defaults to all)
    #[arg(long)]
    pub to: Option<usize>,

    /// Only print this tree
    #[arg(long)]
    pub tree: Option<String>,

    /// Write the snapshots to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn replay(args: ReplayArgs, config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;
    let document = load_document(&args.log)?;
    let target = args.to.unwrap_or(document.len());

    let mut snapshots = runtime()?.block_on(replay_document(config, document, target))?;

    if let Some(tree) = &args.tree {
        snapshots.retain(|id, _| id == tree);
        if snapshots.is_empty() {
            return Err(anyhow::anyhow!("Tree {} does not appear in the log", tree));
        }
    }

    let output = serde_json::to_string_pretty(&snapshots)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, output)?;
            eprintln!(
                "{} Replayed {} entries into {}",
                "✓".green(),
                target,
                path.display()
            );
        }
        None => println!("{}", output),
    }

    Ok(())
}

/// Snapshots of every tree after the first `target` entries
pub(crate) async fn replay_document(
    config: HistoryConfig,
    document: CDocument,
    target: usize,
) -> Result<BTreeMap<TreeId, Value>> {
    let manager = manager_for(config, document).await?;
    manager.go_to_history_entry(target).await?;

    let mut snapshots = BTreeMap::new();
    for id in manager.tree_ids().await {
        let snapshot = manager.tree_snapshot(&id).await?;
        snapshots.insert(id, snapshot);
    }
    Ok(snapshots)
}
