use super::Session;
use crate::output::print_json;
use anyhow::Context;
use prism_core::{Level, Node, PrismError, Status};
use std::path::Path;

pub struct AddArgs<'a> {
    pub parent: &'a str,
    pub id: &'a str,
    pub label: Option<&'a str>,
    pub reason: Option<&'a str>,
    pub tags: &'a [String],
    pub at: Option<usize>,
}

/// The new node's tier follows from where it is added: under `/` a Phase,
/// under a Phase a Milestone, and so on.
pub fn add(root: &Path, args: AddArgs<'_>, json: bool) -> anyhow::Result<()> {
    let mut session = Session::open(root)?;
    let parent = session.resolve(args.parent)?;
    let level = Level::at_depth(parent.len()).ok_or_else(|| {
        PrismError::Validation(format!("'{parent}' is a subtask and cannot have children"))
    })?;
    let mut node = Node::new(level, args.id, args.label.unwrap_or_default())?
        .with_tags(args.tags.iter().cloned());
    if let Some(reason) = args.reason {
        node = node.with_reason(reason);
    }
    let path = session
        .project
        .add(&parent, node, args.at)
        .with_context(|| format!("failed to add {level} '{}'", args.id))?;
    session.save()?;

    if json {
        print_json(&serde_json::json!({ "path": path.to_string(), "level": level }))?;
    } else {
        println!("Added {level} {path}");
    }
    Ok(())
}

pub fn remove(root: &Path, raw: &str, json: bool) -> anyhow::Result<()> {
    let mut session = Session::open(root)?;
    let path = session.resolve(raw)?;
    let removed = session.project.remove(&path)?;
    session.save()?;

    let count = removed.subtree_len();
    if json {
        print_json(&serde_json::json!({
            "path": path.to_string(),
            "removed": count,
            "cursor": session.project.cursor().path().to_string(),
        }))?;
    } else {
        println!("Removed {path} ({count} entities)");
    }
    Ok(())
}

pub fn mv(
    root: &Path,
    raw: &str,
    new_parent: &str,
    at: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let mut session = Session::open(root)?;
    let path = session.resolve(raw)?;
    let new_parent = session.resolve(new_parent)?;
    let same_parent = path.parent().as_ref() == Some(&new_parent);
    let new_path = match (same_parent, at) {
        (true, Some(index)) => {
            session.project.reorder(&path, index)?;
            path.clone()
        }
        _ => session.project.move_node(&path, &new_parent, at)?,
    };
    session.save()?;

    if json {
        print_json(&serde_json::json!({
            "from": path.to_string(),
            "to": new_path.to_string(),
        }))?;
    } else {
        println!("Moved {path} -> {new_path}");
    }
    Ok(())
}

pub fn set_status(root: &Path, raw: &str, status: &str, json: bool) -> anyhow::Result<()> {
    let status: Status = status.parse()?;
    let mut session = Session::open(root)?;
    let path = session.resolve(raw)?;
    session.project.set_status(&path, status)?;
    session.save()?;

    // Report every ancestor's derived status so the propagation is visible.
    let chain: Vec<(String, Status)> = (1..=path.len())
        .rev()
        .filter_map(|len| {
            let p = path.prefix(len);
            session
                .project
                .get(&p)
                .ok()
                .map(|n| (p.to_string(), n.status))
        })
        .collect();

    if json {
        let chain: Vec<_> = chain
            .iter()
            .map(|(p, s)| serde_json::json!({ "path": p, "status": s }))
            .collect();
        print_json(&serde_json::json!({ "path": path.to_string(), "chain": chain }))?;
    } else {
        for (p, s) in &chain {
            println!("{:<12} {p}", s.as_str());
        }
    }
    Ok(())
}
