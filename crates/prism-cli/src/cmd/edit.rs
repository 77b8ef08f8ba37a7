use super::Session;
use crate::output::print_json;
use prism_core::{NodePatch, PrismError};
use std::path::Path;

pub fn run(
    root: &Path,
    raw: &str,
    label: Option<String>,
    reason: Option<String>,
    tags: Option<Vec<String>>,
    json: bool,
) -> anyhow::Result<()> {
    if label.is_none() && reason.is_none() && tags.is_none() {
        return Err(PrismError::Validation(
            "nothing to edit: pass at least one of --label, --reason, --tag".into(),
        )
        .into());
    }
    let mut session = Session::open(root)?;
    let path = session.resolve(raw)?;
    session.project.edit(
        &path,
        NodePatch {
            label,
            reason,
            tags,
        },
    )?;
    session.save()?;

    let node = session.project.get(&path)?;
    if json {
        print_json(node)?;
    } else {
        println!("Updated {path}: {}", node.label);
    }
    Ok(())
}
