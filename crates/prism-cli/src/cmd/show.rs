use super::Session;
use crate::output::{fmt_duration, print_json, status_mark};
use prism_core::{Node, Project, TaskPath};
use std::path::Path;

pub fn run(root: &Path, path: Option<&str>, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root)?;
    let project = &session.project;
    let path = match path {
        Some(raw) => session.resolve(raw)?,
        None => TaskPath::root(),
    };

    if json {
        if path.is_root() {
            print_json(&serde_json::json!({
                "project": project.name(),
                "cursor": project.cursor().path().to_string(),
                "timer": project.timer().state(),
                "phases": project.tree().phases(),
            }))?;
        } else {
            print_json(project.get(&path)?)?;
        }
        return Ok(());
    }

    if path.is_root() {
        println!("{}", project.name());
        if project.tree().is_empty() {
            println!("  (empty: add a phase with `prsm add / <id>`)");
        }
        for phase in project.tree().phases() {
            print_node(project, &TaskPath::root(), phase, 1);
        }
    } else {
        let node = project.get(&path)?;
        let parent = path.parent().unwrap_or_default();
        print_node(project, &parent, node, 0);
        if let Some(version) = node.version() {
            println!("\n{} version {version}", node.level);
        }
        if let Some(reason) = &node.reason {
            println!("\nwhy: {reason}");
        }
        if !node.tags.is_empty() {
            println!("tags: {}", node.tags.join(", "));
        }
    }
    Ok(())
}

fn print_node(project: &Project, parent: &TaskPath, node: &Node, depth: usize) {
    let path = parent.join(node.id.clone());
    let mut line = format!(
        "{}{} {}",
        "  ".repeat(depth),
        status_mark(node.status),
        node.id
    );
    if node.label != node.id {
        line.push_str(&format!(" - {}", node.label));
    }
    let spent = node.total_time();
    if !spent.is_zero() {
        line.push_str(&format!(" ({})", fmt_duration(spent)));
    }
    if project.timer().target() == Some(&path) {
        line.push_str(&format!(" [timer {}]", project.timer().state()));
    }
    if project.cursor().path() == &path {
        line.push_str("  <");
    }
    println!("{line}");
    for child in &node.children {
        print_node(project, &path, child, depth + 1);
    }
}
