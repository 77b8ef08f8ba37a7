//! Forward-only schema migrations for the state document.
//!
//! Each step rewrites a raw YAML document from version `n` to `n + 1`. The
//! loader runs every step from the document's `schema_version` up to
//! [`SCHEMA_VERSION`] before deserializing into typed structs.

use crate::error::{PrismError, Result};
use chrono::Utc;
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

type Step = fn(Value) -> std::result::Result<Value, String>;

/// Registered steps keyed by the version they upgrade from.
const MIGRATIONS: &[(u32, Step)] = &[(1, migrate_v1_to_v2)];

/// `schema_version` of a raw document. Documents without one predate the
/// field and are version 1.
pub fn version_of(doc: &Value) -> std::result::Result<u32, String> {
    match doc.get("schema_version") {
        None | Some(Value::Null) => Ok(1),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| format!("schema_version must be a positive integer, got {v:?}")),
    }
}

/// Upgrade `doc` to [`SCHEMA_VERSION`]. `path` only feeds error messages.
pub fn migrate(mut doc: Value, path: &Path) -> Result<Value> {
    let mut version = version_of(&doc).map_err(|e| PrismError::corrupt(path, e))?;
    if version > SCHEMA_VERSION || version == 0 {
        return Err(PrismError::UnsupportedVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }
    while version < SCHEMA_VERSION {
        let Some((_, step)) = MIGRATIONS.iter().find(|(from, _)| *from == version) else {
            return Err(PrismError::UnsupportedVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        };
        doc = step(doc).map_err(|e| {
            PrismError::corrupt(path, format!("migrating from version {version}: {e}"))
        })?;
        tracing::info!(
            from = version,
            to = version + 1,
            path = %path.display(),
            "migrated state document"
        );
        version += 1;
    }
    Ok(doc)
}

// ---------------------------------------------------------------------------
// v1 → v2
// ---------------------------------------------------------------------------

/// Version 1 nested each tier under its own key (`milestones`, `blocks`,
/// `tasks`, `subtasks`), identified Phases/Tasks/Subtasks by `name`,
/// Milestones by `versions` and Blocks by `version`, used the statuses
/// `not_started` and `on_hold`, and stored the cursor as a `nav_path` string.
/// It had no timer. Orphans are not part of the hierarchy and are dropped.
pub fn migrate_v1_to_v2(doc: Value) -> std::result::Result<Value, String> {
    let Value::Mapping(old) = doc else {
        return Err("document root is not a mapping".into());
    };
    let now = Value::String(Utc::now().to_rfc3339());

    let phases = match old.get("phases") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(seq)) => seq
            .iter()
            .map(|p| convert_node(p, 0, &now))
            .collect::<std::result::Result<_, _>>()?,
        Some(_) => return Err("`phases` is not a list".into()),
    };

    let cursor: Vec<Value> = old
        .get("nav_path")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| Value::String(s.to_string()))
        .collect();

    if let Some(Value::Sequence(orphans)) = old.get("orphans") {
        if !orphans.is_empty() {
            tracing::warn!(count = orphans.len(), "dropping orphan tasks during migration");
        }
    }

    let project = old
        .get("project")
        .and_then(Value::as_str)
        .unwrap_or("untitled")
        .to_string();

    let mut new = Mapping::new();
    new.insert("schema_version".into(), Value::from(2u64));
    new.insert("project".into(), Value::String(project));
    new.insert("updated_at".into(), now.clone());
    new.insert("phases".into(), Value::Sequence(phases));
    let mut timer = Mapping::new();
    timer.insert("state".into(), "idle".into());
    new.insert("timer".into(), Value::Mapping(timer));
    new.insert("cursor".into(), Value::Sequence(cursor));
    new.insert("history".into(), Value::Sequence(Vec::new()));
    Ok(Value::Mapping(new))
}

/// Per tier: level name, identifier key, children key.
const V1_TIERS: [(&str, &str, Option<&str>); 5] = [
    ("phase", "name", Some("milestones")),
    ("milestone", "versions", Some("blocks")),
    ("block", "version", Some("tasks")),
    ("task", "name", Some("subtasks")),
    ("subtask", "name", None),
];

fn convert_node(old: &Value, depth: usize, now: &Value) -> std::result::Result<Value, String> {
    let (level, id_key, children_key) = V1_TIERS[depth];
    let Value::Mapping(old) = old else {
        return Err(format!("{level} entry is not a mapping"));
    };
    let id = old
        .get(id_key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{level} is missing `{id_key}`"))?
        .to_string();

    let mut node = Mapping::new();
    node.insert("id".into(), Value::String(id.clone()));
    node.insert("label".into(), Value::String(id.clone()));
    node.insert("level".into(), level.into());

    let reason = match old.get("reason").and_then(Value::as_str) {
        Some(r) if !r.trim().is_empty() => Some(r.to_string()),
        _ => old
            .get("version_match")
            .and_then(Value::as_str)
            .map(|v| format!("matches versions {v}")),
    };
    if let Some(reason) = reason {
        node.insert("reason".into(), Value::String(reason));
    }

    let status = match old.get("status").and_then(Value::as_str) {
        None | Some("not_started") => "pending",
        Some("on_hold") => "blocked",
        Some(s @ ("in_progress" | "completed" | "blocked")) => s,
        Some(other) => return Err(format!("{level} '{id}' has unknown status '{other}'")),
    };
    node.insert("status".into(), status.into());

    let stamp = old.get("started_at").filter(|v| !v.is_null()).cloned();
    node.insert("created_at".into(), stamp.clone().unwrap_or_else(|| now.clone()));
    node.insert("updated_at".into(), now.clone());
    if let Some(started) = stamp {
        node.insert("started_at".into(), started);
    }
    if let Some(finished) = old.get("finished_at").filter(|v| !v.is_null()) {
        node.insert("finished_at".into(), finished.clone());
    }

    if let Some(key) = children_key {
        if let Some(Value::Sequence(kids)) = old.get(key) {
            let children = kids
                .iter()
                .map(|k| convert_node(k, depth + 1, now))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| format!("under {level} '{id}': {e}"))?;
            if !children.is_empty() {
                node.insert("children".into(), Value::Sequence(children));
            }
        }
    }
    Ok(Value::Mapping(node))
}
