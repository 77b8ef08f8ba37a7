use super::Session;
use crate::output::print_json;
use prism_core::{Project, TaskPath};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub enum Move {
    Next,
    Prev,
    Enter,
    Up,
}

pub fn cd(root: &Path, raw: &str, json: bool) -> anyhow::Result<()> {
    let mut session = Session::open(root)?;
    let path = session.resolve(raw)?;
    session.project.set_cursor(path)?;
    session.save()?;
    report(&session.project, json)
}

pub fn step(root: &Path, movement: Move, json: bool) -> anyhow::Result<()> {
    let mut session = Session::open(root)?;
    match movement {
        Move::Next => session.project.next()?,
        Move::Prev => session.project.previous()?,
        Move::Enter => session.project.enter()?,
        Move::Up => session.project.leave()?,
    };
    session.save()?;
    report(&session.project, json)
}

pub fn pwd(root: &Path, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root)?;
    report(&session.project, json)
}

fn report(project: &Project, json: bool) -> anyhow::Result<()> {
    let path: &TaskPath = project.cursor().path();
    let node = project.get(path).ok();
    if json {
        print_json(&serde_json::json!({
            "cursor": path.to_string(),
            "level": node.map(|n| n.level),
            "label": node.map(|n| n.label.as_str()),
            "status": node.map(|n| n.status),
        }))?;
    } else {
        match node {
            Some(n) => println!("{path}  ({} {}, {})", n.level, n.label, n.status),
            None => println!("{path}"),
        }
    }
    Ok(())
}
