use crate::output::print_json;
use anyhow::Context;
use prism_core::{paths, Store};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>, json: bool) -> anyhow::Result<()> {
    let name = match name {
        Some(n) => n.to_string(),
        None => default_name(root),
    };
    let (store, project) = Store::init(root, &name)
        .with_context(|| format!("failed to initialize {}", root.display()))?;

    if json {
        print_json(&serde_json::json!({
            "root": store.root(),
            "project": project.name(),
            "state": paths::state_path(store.root()),
        }))?;
    } else {
        println!(
            "Initialized project '{}' in {}",
            project.name(),
            paths::prsm_dir(store.root()).display()
        );
    }
    Ok(())
}

/// Directory name of the root, or `project` when it has none.
fn default_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "project".to_string())
}
