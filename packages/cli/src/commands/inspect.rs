use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tiledoc_history::{CDocument, HistoryEntry};

use super::load_document;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Saved history log (JSON)
    pub log: PathBuf,

    /// List each record of every entry
    #[arg(short, long)]
    pub records: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let document = load_document(&args.log)?;

    match args.format.as_str() {
        "text" => print_text(&document, args.records),
        "json" => println!("{}", serde_json::to_string_pretty(&summary(&document))?),
        other => return Err(anyhow::anyhow!("Invalid format: {}. Use: text or json", other)),
    }

    Ok(())
}

fn print_text(document: &CDocument, records: bool) {
    println!("📜 {} {}", "History".green().bold(), document.len());
    println!("   Cursor: {}", document.current_history_index());
    println!(
        "   Trees:  {}",
        document.tree_ids().into_iter().collect::<Vec<_>>().join(", ")
    );
    println!();

    for (index, entry) in document.entries().iter().enumerate() {
        let marker = if index < document.current_history_index() {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!("{} {}", marker, entry_line(index, entry));

        if records {
            for record in &entry.records {
                println!(
                    "      {} {} ({} patches)",
                    record.tree.cyan(),
                    record.action,
                    record.patches.len()
                );
            }
        }
    }
}

fn entry_line(index: usize, entry: &HistoryEntry) -> String {
    let undo = if entry.undoable { "" } else { " [not undoable]" };
    format!(
        "{:>3} {} on {} - {} records, {} patches{} ({})",
        index,
        entry.action.bold(),
        entry.tree,
        entry.records.len(),
        entry.patch_count(),
        undo,
        entry.created.format("%Y-%m-%d %H:%M:%S")
    )
}

fn summary(document: &CDocument) -> serde_json::Value {
    let entries: Vec<_> = document
        .entries()
        .iter()
        .map(|entry| {
            serde_json::json!({
                "id": entry.id,
                "action": entry.action,
                "tree": entry.tree,
                "undoable": entry.undoable,
                "records": entry.records.len(),
                "patches": entry.patch_count(),
                "trees": entry.trees(),
            })
        })
        .collect();

    serde_json::json!({
        "currentHistoryIndex": document.current_history_index(),
        "entries": entries,
    })
}
