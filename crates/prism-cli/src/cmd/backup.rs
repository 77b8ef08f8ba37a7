use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use prism_core::Store;
use std::path::Path;

#[derive(Subcommand)]
pub enum BackupSubcommand {
    /// Snapshot the current state
    Create {
        /// Optional label, e.g. before-refactor
        #[arg(long)]
        name: Option<String>,
    },
    /// List backups, newest first
    List,
    /// Replace the state with a backup (by sequence number, name or id)
    Restore { id: String },
}

pub fn run(root: &Path, subcmd: BackupSubcommand, json: bool) -> anyhow::Result<()> {
    let store =
        Store::open(root).with_context(|| format!("no prism project at {}", root.display()))?;
    match subcmd {
        BackupSubcommand::Create { name } => create(&store, name.as_deref(), json),
        BackupSubcommand::List => list(&store, json),
        BackupSubcommand::Restore { id } => restore(&store, &id, json),
    }
}

fn create(store: &Store, name: Option<&str>, json: bool) -> anyhow::Result<()> {
    let info = store.backup(name).context("failed to create backup")?;
    if json {
        print_json(&info)?;
    } else {
        println!("Created backup {}", info.id);
    }
    Ok(())
}

fn list(store: &Store, json: bool) -> anyhow::Result<()> {
    let backups = store.backups()?;
    if json {
        print_json(&backups)?;
        return Ok(());
    }
    if backups.is_empty() {
        println!("No backups.");
        return Ok(());
    }
    let rows = backups
        .iter()
        .map(|b| {
            vec![
                b.seq.to_string(),
                b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                b.name.clone().unwrap_or_default(),
                b.size.to_string(),
            ]
        })
        .collect();
    print_table(&["SEQ", "CREATED (UTC)", "NAME", "BYTES"], rows);
    Ok(())
}

fn restore(store: &Store, id: &str, json: bool) -> anyhow::Result<()> {
    let outcome = store
        .restore(id)
        .with_context(|| format!("failed to restore backup '{id}'"))?;
    if json {
        print_json(&serde_json::json!({
            "restored": outcome.restored,
            "safety": outcome.safety,
        }))?;
    } else {
        println!("Restored {}", outcome.restored.id);
        if let Some(safety) = &outcome.safety {
            println!("Previous state saved as {}", safety.id);
        }
    }
    Ok(())
}
