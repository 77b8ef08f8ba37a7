use super::Session;
use crate::output::{fmt_duration, print_json, print_table};
use clap::Subcommand;
use prism_core::{PrismError, TimerState};
use std::path::Path;
use std::time::Duration;

#[derive(Subcommand)]
pub enum TimerSubcommand {
    /// Start timing a subtask (defaults to the cursor)
    Start {
        path: Option<String>,
        /// What you are working on
        #[arg(long)]
        note: Option<String>,
    },
    /// Pause the running timer
    Pause,
    /// Resume the paused timer
    Resume,
    /// Stop the timer and record its time on the subtask
    Stop {
        /// Replace the session note
        #[arg(long)]
        note: Option<String>,
    },
    /// Show the timer state
    Status,
    /// Log time directly on a subtask or a task without subtasks
    Log {
        path: String,
        /// e.g. 90s, 25m, 1h30m; a bare number means minutes
        duration: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Show recent timer sessions
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(root: &Path, subcmd: TimerSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TimerSubcommand::Start { path, note } => {
            start(root, path.as_deref().unwrap_or("."), note, json)
        }
        TimerSubcommand::Pause => pause(root, json),
        TimerSubcommand::Resume => resume(root, json),
        TimerSubcommand::Stop { note } => stop(root, note, json),
        TimerSubcommand::Status => status(root, json),
        TimerSubcommand::Log {
            path,
            duration,
            note,
        } => log(root, &path, &duration, note, json),
        TimerSubcommand::History { limit } => history(root, limit, json),
    }
}

fn start(root: &Path, raw: &str, note: Option<String>, json: bool) -> anyhow::Result<()> {
    let mut session = Session::open(root)?;
    let path = session.resolve(raw)?;
    let previous = session.project.start(&path)?;
    if note.is_some() {
        session.project.describe(note)?;
    }
    session.save()?;

    if json {
        print_json(&serde_json::json!({
            "target": path.to_string(),
            "state": TimerState::Running,
            "stopped": previous,
        }))?;
    } else {
        if let Some(prev) = &previous {
            println!(
                "Stopped {} after {}",
                prev.target,
                fmt_duration(prev.duration)
            );
        }
        println!("Timer running on {path}");
    }
    Ok(())
}

fn pause(root: &Path, json: bool) -> anyhow::Result<()> {
    let mut session = Session::open(root)?;
    let elapsed = session.project.pause()?;
    session.save()?;

    if json {
        print_json(&serde_json::json!({
            "state": TimerState::Paused,
            "elapsed_secs": elapsed.as_secs(),
        }))?;
    } else {
        println!("Timer paused at {}", fmt_duration(elapsed));
    }
    Ok(())
}

fn resume(root: &Path, json: bool) -> anyhow::Result<()> {
    let mut session = Session::open(root)?;
    session.project.resume()?;
    session.save()?;

    let target = session
        .project
        .timer()
        .target()
        .map(ToString::to_string)
        .unwrap_or_default();
    if json {
        print_json(&serde_json::json!({ "state": TimerState::Running, "target": target }))?;
    } else {
        println!("Timer resumed on {target}");
    }
    Ok(())
}

fn stop(root: &Path, note: Option<String>, json: bool) -> anyhow::Result<()> {
    let mut session = Session::open(root)?;
    if note.is_some() {
        session.project.describe(note)?;
    }
    let entry = session.project.stop()?;
    session.save()?;

    let total = session.project.time_spent(&entry.target).unwrap_or_default();
    if json {
        print_json(&serde_json::json!({
            "entry": entry,
            "total_secs": total.as_secs(),
        }))?;
    } else {
        println!(
            "Recorded {} on {} (total {})",
            fmt_duration(entry.duration),
            entry.target,
            fmt_duration(total)
        );
    }
    Ok(())
}

fn status(root: &Path, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root)?;
    let timer = session.project.timer();
    let elapsed = session.project.elapsed();

    if json {
        print_json(&serde_json::json!({
            "state": timer.state(),
            "target": timer.target().map(ToString::to_string),
            "elapsed_secs": elapsed.as_secs(),
            "note": timer.description(),
        }))?;
    } else {
        match timer.target() {
            Some(target) => {
                println!(
                    "{} on {target} ({})",
                    timer.state(),
                    fmt_duration(elapsed)
                );
                if let Some(note) = timer.description() {
                    println!("note: {note}");
                }
            }
            None => println!("{}", timer.state()),
        }
    }
    Ok(())
}

fn log(
    root: &Path,
    raw: &str,
    duration: &str,
    note: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let duration = parse_duration(duration)?;
    let mut session = Session::open(root)?;
    let path = session.resolve(raw)?;
    let total = session.project.log_time(&path, duration, note)?;
    session.save()?;

    if json {
        print_json(&serde_json::json!({
            "path": path.to_string(),
            "logged_secs": duration.as_secs(),
            "total_secs": total.as_secs(),
        }))?;
    } else {
        println!(
            "Logged {} on {path} (total {})",
            fmt_duration(duration),
            fmt_duration(total)
        );
    }
    Ok(())
}

fn history(root: &Path, limit: usize, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root)?;
    let entries = session.project.history();
    let recent = &entries[entries.len().saturating_sub(limit)..];

    if json {
        print_json(&recent)?;
        return Ok(());
    }
    if recent.is_empty() {
        println!("No timer sessions recorded.");
        return Ok(());
    }
    let rows = recent
        .iter()
        .rev()
        .map(|e| {
            vec![
                e.ended_at.format("%Y-%m-%d %H:%M").to_string(),
                fmt_duration(e.duration),
                e.target.to_string(),
                e.description.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["ENDED", "DURATION", "TARGET", "NOTE"], rows);
    Ok(())
}

/// `90s`, `25m`, `1h30m`, `1h 5m 10s`; a bare number is minutes.
fn parse_duration(raw: &str) -> Result<Duration, PrismError> {
    let invalid = || {
        PrismError::Validation(format!(
            "invalid duration '{raw}': use e.g. 90s, 25m or 1h30m"
        ))
    };
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(invalid());
    }
    if let Ok(minutes) = compact.parse::<u64>() {
        let secs = minutes.checked_mul(60).ok_or_else(invalid)?;
        return if secs == 0 {
            Err(invalid())
        } else {
            Ok(Duration::from_secs(secs))
        };
    }
    let mut total = 0u64;
    let mut digits = String::new();
    for c in compact.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let scale = match c.to_ascii_lowercase() {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        let n: u64 = digits.parse().map_err(|_| invalid())?;
        total = n
            .checked_mul(scale)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
        digits.clear();
    }
    if !digits.is_empty() || total == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}
